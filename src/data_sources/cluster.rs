//! Data sources describing the configured cluster itself.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{data_source_schema, DataSource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

/// `dcos_base_url`: URL of the configured cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseUrl;

#[async_trait]
impl DataSource for BaseUrl {
    fn name(&self) -> &'static str {
        "dcos_base_url"
    }

    fn schema(&self) -> Schema {
        data_source_schema("URL of the configured cluster")
            .with_attribute("url", Attribute::computed_string())
    }

    async fn read(&self, ctx: &ProviderContext, _config: Value) -> Result<Value, ProviderError> {
        let url = ctx.client.config().url.trim_end_matches('/').to_string();
        Ok(json!({ "id": url, "url": url }))
    }
}

/// `dcos_token`: the ACS token the provider authenticates with.
#[derive(Debug, Clone, Copy, Default)]
pub struct Token;

#[async_trait]
impl DataSource for Token {
    fn name(&self) -> &'static str {
        "dcos_token"
    }

    fn schema(&self) -> Schema {
        data_source_schema("ACS token of the configured cluster")
            .with_attribute("token", Attribute::computed_string().sensitive())
    }

    async fn read(&self, ctx: &ProviderContext, _config: Value) -> Result<Value, ProviderError> {
        let config = ctx.client.config();
        let token = config.acs_token.clone().ok_or_else(|| {
            ProviderError::Configuration(format!("no ACS token configured for {}", config.url))
        })?;
        Ok(json!({ "id": config.url, "token": token }))
    }
}

/// `dcos_version`: DC/OS release information.
#[derive(Debug, Clone, Copy, Default)]
pub struct Version;

#[async_trait]
impl DataSource for Version {
    fn name(&self) -> &'static str {
        "dcos_version"
    }

    fn schema(&self) -> Schema {
        data_source_schema("DC/OS version of the configured cluster")
            .with_attribute("version", Attribute::computed_string())
            .with_attribute(
                "dcos_variant",
                Attribute::computed_string().with_description("open or enterprise"),
            )
            .with_attribute("dcos_image_commit", Attribute::computed_string())
            .with_attribute("bootstrap_id", Attribute::computed_string())
    }

    async fn read(&self, ctx: &ProviderContext, _config: Value) -> Result<Value, ProviderError> {
        let version = ctx.client.metadata().version().await?;
        Ok(json!({
            "id": version.bootstrap_id,
            "version": version.version,
            "dcos_variant": version.dcos_variant,
            "dcos_image_commit": version.dcos_image_commit,
            "bootstrap_id": version.bootstrap_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::FakeCluster;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_base_url_and_token() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(FakeCluster::new()), dir.path());

        let url = BaseUrl.read(&ctx, Value::Null).await.unwrap();
        assert_eq!(url["url"], "https://cluster.example");

        let token = Token.read(&ctx, json!({})).await.unwrap();
        assert_eq!(token["token"], "token-for-alice");
        assert!(Token.schema().attribute("token").unwrap().flags.sensitive);
    }

    #[tokio::test]
    async fn test_version_reads_metadata() {
        let fake = FakeCluster::new().with_version(json!({
            "version": "2.1.0",
            "dcos-variant": "enterprise",
            "dcos-image-commit": "abc123",
            "bootstrap-id": "b00t"
        }));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(fake), dir.path());

        let version = Version.read(&ctx, Value::Null).await.unwrap();
        assert_eq!(version["version"], "2.1.0");
        assert_eq!(version["dcos_variant"], "enterprise");
        assert_eq!(version["bootstrap_id"], "b00t");
    }
}
