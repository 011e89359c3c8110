//! Hemmer provider for DC/OS
//!
//! This crate maps declarative resources onto a DC/OS cluster's REST APIs:
//! IAM users, groups, service accounts, permissions and SAML providers,
//! secrets, Metronome jobs and schedules, Cosmos packages and repositories,
//! plus arbitrary DC/OS CLI commands run from a private sandbox.
//!
//! # Overview
//!
//! - **[`DcosProvider`]**: the [`ProviderService`] implementation; it turns
//!   the provider block into an authenticated client and dispatches every
//!   call to a resource or data source handler
//! - **[`client`]**: a typed REST client over a pluggable [`client::Transport`]
//! - **[`resources`] and [`data_sources`]**: one handler per kind
//! - **[`cli`]**: the sandboxed DC/OS CLI used by `dcos_cli`
//! - **[`server`]**: the gRPC host protocol and handshake
//! - **[`testing`]**: a provider harness and an in-memory cluster
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it prints a handshake line to
//! stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`
//!
//! The host spawns the provider as a subprocess, reads that line and
//! connects over gRPC. Logs go to stderr.
//!
//! # Configuration
//!
//! ```hcl
//! provider "dcos" {
//!   dcos_url = "https://dcos.example.com"
//!   user     = "bootstrapuser"
//!   password = var.dcos_password
//! }
//! ```
//!
//! Without `dcos_url` the cluster attached in the local DC/OS CLI
//! configuration (`$DCOS_DIR` or `~/.dcos`) is used as is.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod client;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{DcosProvider, ProviderContext};
pub use schema::ProviderSchema;
pub use server::{serve, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};
