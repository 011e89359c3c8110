//! `dcos_service`: a running Marathon service.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{data_source_schema, decode, DataSource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_service";

/// Handler for the `dcos_service` data source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceInfo;

#[derive(Deserialize)]
struct ServiceQuery {
    service_id: String,
}

#[async_trait]
impl DataSource for ServiceInfo {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        data_source_schema("A Marathon service")
            .with_attribute(
                "service_id",
                Attribute::required_string().with_description("Marathon app id"),
            )
            .with_attribute("version", Attribute::computed_string())
            .with_attribute("cmd", Attribute::computed_string())
            .with_attribute("instances", Attribute::computed_int64())
            .with_attribute("cpus", Attribute::computed_float64())
            .with_attribute("mem", Attribute::computed_float64())
            .with_attribute("disk", Attribute::computed_float64())
            .with_attribute("docker_image", Attribute::computed_string())
            .with_attribute("labels", Attribute::computed_string_map())
            .with_attribute("env", Attribute::computed_string_map())
            .with_attribute("tasks_running", Attribute::computed_int64())
            .with_attribute("tasks_healthy", Attribute::computed_int64())
    }

    async fn read(&self, ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError> {
        let query: ServiceQuery = decode(KIND, config)?;
        let app = ctx.client.marathon().get_app(&query.service_id).await?;

        let env: BTreeMap<&str, &str> = app
            .env
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
            .collect();

        Ok(json!({
            "id": app.id,
            "service_id": query.service_id,
            "version": app.version,
            "cmd": app.cmd,
            "instances": app.instances,
            "cpus": app.cpus,
            "mem": app.mem,
            "disk": app.disk,
            "docker_image": app.docker_image(),
            "labels": app.labels,
            "env": env,
            "tasks_running": app.tasks_running,
            "tasks_healthy": app.tasks_healthy,
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
    async fn test_reads_marathon_app() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert_app(json!({
            "id": "/web",
            "version": "2024-01-01T00:00:00Z",
            "instances": 3,
            "cpus": 0.5,
            "mem": 256.0,
            "container": {"docker": {"image": "nginx:1.25"}},
            "labels": {"team": "web"},
            "env": {"PORT": "80", "DB_PASSWORD": {"secret": "db"}},
            "tasksRunning": 3,
            "tasksHealthy": 2
        }));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = ServiceInfo
            .read(&ctx, json!({"service_id": "web"}))
            .await
            .unwrap();

        assert_eq!(state["id"], "/web");
        assert_eq!(state["docker_image"], "nginx:1.25");
        assert_eq!(state["instances"], 3);
        assert_eq!(state["env"], json!({"PORT": "80"}));
        assert_eq!(state["tasks_healthy"], 2);
    }

    #[tokio::test]
    async fn test_unknown_service_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(FakeCluster::new()), dir.path());

        let err = ServiceInfo
            .read(&ctx, json!({"service_id": "missing"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }
}
