//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into `OUT_DIR`; `src/generated.rs`
//! includes the result. A vendored `protoc` is used unless `PROTOC` is
//! already set, so no system install is required.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}
