//! Package data sources: catalog version lookup and options assembly.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{data_source_schema, decode, DataSource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// `dcos_package_version`: resolves a catalog package version.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageVersion;

#[derive(Deserialize)]
struct VersionQuery {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[async_trait]
impl DataSource for PackageVersion {
    fn name(&self) -> &'static str {
        "dcos_package_version"
    }

    fn schema(&self) -> Schema {
        data_source_schema("A package version from the catalog")
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "version",
                Attribute::optional_computed_string()
                    .with_description("Version to pin; the latest one when empty"),
            )
            .with_attribute(
                "spec",
                Attribute::computed_string()
                    .with_description("JSON document naming the package and version"),
            )
    }

    async fn read(&self, ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError> {
        let query: VersionQuery = decode(self.name(), config)?;
        let requested = query.version.as_deref().filter(|v| !v.is_empty());
        let package = ctx
            .client
            .packages()
            .describe_package(&query.name, requested)
            .await?;

        let spec = json!({ "name": package.name, "version": package.version });
        Ok(json!({
            "id": format!("{}:{}", package.name, package.version),
            "name": query.name,
            "version": package.version,
            "spec": spec.to_string(),
        }))
    }
}

/// `dcos_package_config`: assembles package options without touching the
/// cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageConfig;

#[derive(Deserialize)]
struct ConfigQuery {
    #[serde(default)]
    version_spec: Option<String>,
    #[serde(default)]
    extend: Option<String>,
    #[serde(default)]
    section: Option<Vec<Section>>,
}

#[derive(Deserialize)]
struct Section {
    #[serde(default)]
    path: Option<String>,
    json: String,
}

fn parse_json(what: &str, text: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(text)
        .map_err(|e| ProviderError::Validation(format!("{} is not valid JSON: {}", what, e)))
}

/// Recursively merge `patch` into `target`; non-object values replace.
fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                deep_merge(target.entry(key).or_insert(Value::Null), value);
            }
        },
        (target, patch) => *target = patch,
    }
}

/// The value at dotted `path`, replacing non-objects along the way.
fn object_at<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    let mut node = root;
    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = &mut node[segment];
    }
    node
}

#[async_trait]
impl DataSource for PackageConfig {
    fn name(&self) -> &'static str {
        "dcos_package_config"
    }

    fn schema(&self) -> Schema {
        let section = Block::new()
            .with_attribute(
                "path",
                Attribute::optional_string()
                    .with_description("Dotted path the JSON is merged at; the root when empty"),
            )
            .with_attribute("json", Attribute::required_string());

        data_source_schema("Package options assembled from JSON sections")
            .with_attribute(
                "version_spec",
                Attribute::optional_string()
                    .with_description("spec of a dcos_package_version data source"),
            )
            .with_attribute(
                "extend",
                Attribute::optional_string().with_description("JSON document to start from"),
            )
            .with_block("section", NestedBlock::list(section))
            .with_attribute("config", Attribute::computed_string())
            .with_attribute("spec", Attribute::computed_string())
    }

    async fn read(&self, _ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError> {
        let query: ConfigQuery = decode(self.name(), config.clone())?;

        let mut merged = match query.extend.as_deref().filter(|e| !e.trim().is_empty()) {
            Some(text) => parse_json("extend", text)?,
            None => Value::Object(Map::new()),
        };
        for section in query.section.unwrap_or_default() {
            let path = section.path.unwrap_or_default();
            let patch = parse_json(&format!("section '{}'", path), &section.json)?;
            deep_merge(object_at(&mut merged, &path), patch);
        }

        let rendered = merged.to_string();
        let mut state = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        state.insert("id".to_string(), json!(rendered));
        state.insert("config".to_string(), json!(rendered));
        state.insert("spec".to_string(), json!(query.version_spec));
        Ok(Value::Object(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::FakeCluster;
    use std::sync::Arc;

    #[test]
    fn test_deep_merge_keeps_siblings() {
        let mut target = json!({"brokers": {"count": 3, "cpus": 1}, "name": "kafka"});
        deep_merge(&mut target, json!({"brokers": {"count": 5}}));
        assert_eq!(target, json!({"brokers": {"count": 5, "cpus": 1}, "name": "kafka"}));
    }

    #[tokio::test]
    async fn test_package_version_defaults_to_latest() {
        let fake = FakeCluster::new().with_package("kafka", &["2.9.0", "2.10.0"]);
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(fake), dir.path());

        let latest = PackageVersion
            .read(&ctx, json!({"name": "kafka", "version": ""}))
            .await
            .unwrap();
        assert_eq!(latest["version"], "2.10.0");
        let spec: Value = serde_json::from_str(latest["spec"].as_str().unwrap()).unwrap();
        assert_eq!(spec, json!({"name": "kafka", "version": "2.10.0"}));

        let pinned = PackageVersion
            .read(&ctx, json!({"name": "kafka", "version": "2.9.0"}))
            .await
            .unwrap();
        assert_eq!(pinned["version"], "2.9.0");

        let err = PackageVersion
            .read(&ctx, json!({"name": "kafka", "version": "9.9.9"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_package_config_merges_sections() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(FakeCluster::new()), dir.path());

        let state = PackageConfig
            .read(
                &ctx,
                json!({
                    "version_spec": "{\"name\":\"kafka\",\"version\":\"2.10.0\"}",
                    "extend": "{\"service\": {\"name\": \"kafka\"}}",
                    "section": [
                        {"path": "brokers", "json": "{\"count\": 3}"},
                        {"path": "service.security", "json": "{\"tls\": true}"},
                        {"path": null, "json": "{\"service\": {\"user\": \"nobody\"}}"}
                    ]
                }),
            )
            .await
            .unwrap();

        let config: Value = serde_json::from_str(state["config"].as_str().unwrap()).unwrap();
        assert_eq!(
            config,
            json!({
                "service": {"name": "kafka", "security": {"tls": true}, "user": "nobody"},
                "brokers": {"count": 3}
            })
        );
        assert_eq!(state["spec"], state["version_spec"]);
    }

    #[tokio::test]
    async fn test_package_config_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(FakeCluster::new()), dir.path());

        let err = PackageConfig
            .read(&ctx, json!({"section": [{"path": "a", "json": "{"}]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("section 'a'"));
    }
}
