use hemmer_provider_dcos::{init_logging, serve, DcosProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    serve(DcosProvider::new()).await
}
