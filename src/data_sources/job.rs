//! `dcos_job` data source: an existing Metronome job.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{data_source_schema, decode, DataSource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_job";

/// Handler for the `dcos_job` data source.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobInfo;

#[derive(Deserialize)]
struct JobQuery {
    name: String,
}

#[async_trait]
impl DataSource for JobInfo {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        data_source_schema("An existing Metronome job")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("cmd", Attribute::computed_string())
            .with_attribute("cpus", Attribute::computed_float64())
            .with_attribute("mem", Attribute::computed_float64())
            .with_attribute("disk", Attribute::computed_float64())
            .with_attribute("user", Attribute::computed_string())
            .with_attribute("labels", Attribute::computed_string_map())
            .with_attribute("docker_image", Attribute::computed_string())
    }

    async fn read(&self, ctx: &ProviderContext, config: Value) -> Result<Value, ProviderError> {
        let query: JobQuery = decode(KIND, config)?;
        let job = ctx.client.jobs().get_job(&query.name).await?;
        let run = job.run;

        Ok(json!({
            "id": job.id,
            "name": query.name,
            "description": job.description,
            "cmd": run.cmd,
            "cpus": run.cpus,
            "mem": run.mem,
            "disk": run.disk,
            "user": run.user,
            "labels": job.labels,
            "docker_image": run.docker.map(|d| d.image),
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
    async fn test_reads_job_definition() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(
            "/service/metronome/v1/jobs/report",
            json!({
                "id": "report",
                "labels": {"owner": "finance"},
                "run": {"cmd": "make report", "cpus": 2.0, "mem": 512.0, "docker": {"image": "python:3.12"}}
            }),
        );
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = JobInfo.read(&ctx, json!({"name": "report"})).await.unwrap();
        assert_eq!(state["cmd"], "make report");
        assert_eq!(state["docker_image"], "python:3.12");
        assert_eq!(state["labels"]["owner"], "finance");
        assert!(state["user"].is_null());
    }
}
