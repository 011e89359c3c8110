//! Data source handlers.
//!
//! A data source reads its configuration, queries the cluster (or computes
//! locally) and returns the configuration with its computed attributes
//! filled in.

mod cluster;
mod job;
mod package;
mod service;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

pub use cluster::{BaseUrl, Token, Version};
pub use job::JobInfo;
pub use package::{PackageConfig, PackageVersion};
pub use service::ServiceInfo;

/// A data source kind served by the provider.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Type name, e.g. `dcos_version`.
    fn name(&self) -> &'static str;

    /// Schema of the data source block.
    fn schema(&self) -> Schema;

    /// Compute the data source's state from its configuration.
    async fn read(&self, ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError>;
}

/// Every data source kind.
pub fn all() -> Vec<Box<dyn DataSource>> {
    vec![
        Box::new(BaseUrl),
        Box::new(JobInfo),
        Box::new(PackageConfig),
        Box::new(PackageVersion),
        Box::new(ServiceInfo),
        Box::new(Token),
        Box::new(Version),
    ]
}

pub(crate) fn decode<T: DeserializeOwned>(kind: &str, config: Value) -> Result<T, ProviderError> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config
    };
    serde_json::from_value(config)
        .map_err(|e| ProviderError::Validation(format!("invalid {} configuration: {}", kind, e)))
}

/// Schema with the computed `id` every data source reports.
pub(crate) fn data_source_schema(description: &str) -> Schema {
    Schema::v0()
        .with_description(description)
        .with_attribute("id", Attribute::computed_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_data_source_names() {
        let names: HashSet<_> = all().iter().map(|d| d.name()).collect();
        let expected: HashSet<_> = [
            "dcos_base_url",
            "dcos_job",
            "dcos_package_config",
            "dcos_package_version",
            "dcos_service",
            "dcos_token",
            "dcos_version",
        ]
        .into_iter()
        .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_null_configuration_decodes_as_empty() {
        #[derive(serde::Deserialize)]
        struct Empty {
            #[serde(default)]
            name: Option<String>,
        }
        let empty: Empty = decode("dcos_version", Value::Null).unwrap();
        assert!(empty.name.is_none());
    }
}
