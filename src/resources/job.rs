//! `dcos_job`: a Metronome job definition.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::client::jobs::{JobArtifact, JobDocker, JobRestart, JobRun, JobSpec, JobVolume};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

const KIND: &str = "dcos_job";

const DEFAULT_CPUS: f64 = 1.0;
const DEFAULT_MEM: f64 = 128.0;
const DEFAULT_DISK: f64 = 0.0;

/// Handler for `dcos_job`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Job;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct JobState {
    id: Option<String>,
    name: String,
    description: Option<String>,
    labels: Option<BTreeMap<String, String>>,
    cmd: Option<String>,
    args: Option<Vec<String>>,
    cpus: Option<f64>,
    mem: Option<f64>,
    disk: Option<f64>,
    user: Option<String>,
    max_launch_delay: Option<i64>,
    restart_policy: Option<String>,
    restart_active_deadline: Option<i64>,
    env: Option<BTreeMap<String, String>>,
    docker: Option<DockerBlock>,
    artifacts: Option<Vec<ArtifactBlock>>,
    volumes: Option<Vec<VolumeBlock>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DockerBlock {
    image: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ArtifactBlock {
    uri: String,
    #[serde(default)]
    executable: Option<bool>,
    #[serde(default)]
    extract: Option<bool>,
    #[serde(default)]
    cache: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VolumeBlock {
    container_path: String,
    host_path: String,
    mode: String,
}

fn non_empty_map<V>(map: BTreeMap<String, V>) -> Option<BTreeMap<String, V>> {
    (!map.is_empty()).then_some(map)
}

fn non_empty_vec<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

impl JobState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.name)
    }

    fn to_spec(&self) -> JobSpec {
        let restart = self.restart_policy.as_ref().map(|policy| JobRestart {
            policy: policy.clone(),
            active_deadline_seconds: self.restart_active_deadline,
        });

        JobSpec {
            id: self.name.clone(),
            description: self.description.clone(),
            labels: self.labels.clone().unwrap_or_default(),
            run: JobRun {
                cmd: self.cmd.clone(),
                args: self.args.clone().unwrap_or_default(),
                cpus: self.cpus.unwrap_or(DEFAULT_CPUS),
                mem: self.mem.unwrap_or(DEFAULT_MEM),
                disk: self.disk.unwrap_or(DEFAULT_DISK),
                user: self.user.clone(),
                max_launch_delay: self.max_launch_delay,
                restart,
                docker: self.docker.as_ref().map(|d| JobDocker {
                    image: d.image.clone(),
                }),
                env: self
                    .env
                    .iter()
                    .flatten()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
                artifacts: self
                    .artifacts
                    .iter()
                    .flatten()
                    .map(|a| JobArtifact {
                        uri: a.uri.clone(),
                        executable: a.executable.unwrap_or(false),
                        extract: a.extract.unwrap_or(true),
                        cache: a.cache.unwrap_or(false),
                    })
                    .collect(),
                volumes: self
                    .volumes
                    .iter()
                    .flatten()
                    .map(|v| JobVolume {
                        container_path: v.container_path.clone(),
                        host_path: v.host_path.clone(),
                        mode: v.mode.clone(),
                    })
                    .collect(),
            },
        }
    }

    /// Overwrite every attribute with what the cluster reports.
    ///
    /// Environment entries that are secret references rather than plain
    /// strings are not managed here and are skipped.
    fn apply(&mut self, spec: JobSpec) {
        let run = spec.run;
        self.name = spec.id;
        self.id = Some(self.name.clone());
        self.description = spec.description;
        self.labels = non_empty_map(spec.labels);
        self.cmd = run.cmd;
        self.args = non_empty_vec(run.args);
        self.cpus = Some(run.cpus);
        self.mem = Some(run.mem);
        self.disk = Some(run.disk);
        self.user = run.user;
        self.max_launch_delay = run.max_launch_delay;
        self.restart_policy = run.restart.as_ref().map(|r| r.policy.clone());
        self.restart_active_deadline = run.restart.and_then(|r| r.active_deadline_seconds);
        self.env = non_empty_map(
            run.env
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k, s)),
                    _ => None,
                })
                .collect::<BTreeMap<_, _>>(),
        );
        self.docker = run.docker.map(|d| DockerBlock { image: d.image });
        self.artifacts = non_empty_vec(
            run.artifacts
                .into_iter()
                .map(|a| ArtifactBlock {
                    uri: a.uri,
                    executable: Some(a.executable),
                    extract: Some(a.extract),
                    cache: Some(a.cache),
                })
                .collect::<Vec<_>>(),
        );
        self.volumes = non_empty_vec(
            run.volumes
                .into_iter()
                .map(|v| VolumeBlock {
                    container_path: v.container_path,
                    host_path: v.host_path,
                    mode: v.mode,
                })
                .collect::<Vec<_>>(),
        );
    }
}

#[async_trait]
impl Resource for Job {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        let docker = Block::new().with_attribute("image", Attribute::required_string());
        let artifact = Block::new()
            .with_attribute("uri", Attribute::required_string())
            .with_attribute("executable", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute("extract", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute("cache", Attribute::optional_bool().with_default(json!(false)));
        let volume = Block::new()
            .with_attribute("container_path", Attribute::required_string())
            .with_attribute("host_path", Attribute::required_string())
            .with_attribute(
                "mode",
                Attribute::required_string().with_description("RO or RW"),
            );

        resource_schema(0, "A Metronome job")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Job id"),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("labels", Attribute::optional_string_map())
            .with_attribute("cmd", Attribute::optional_string())
            .with_attribute("args", Attribute::optional_string_list())
            .with_attribute(
                "cpus",
                Attribute::optional_float64().with_default(json!(DEFAULT_CPUS)),
            )
            .with_attribute(
                "mem",
                Attribute::optional_float64()
                    .with_default(json!(DEFAULT_MEM))
                    .with_description("Memory in MiB"),
            )
            .with_attribute(
                "disk",
                Attribute::optional_float64()
                    .with_default(json!(DEFAULT_DISK))
                    .with_description("Disk in MiB"),
            )
            .with_attribute("user", Attribute::optional_string())
            .with_attribute("max_launch_delay", Attribute::optional_int64())
            .with_attribute(
                "restart_policy",
                Attribute::optional_string().with_description("NEVER or ON_FAILURE"),
            )
            .with_attribute("restart_active_deadline", Attribute::optional_int64())
            .with_attribute("env", Attribute::optional_string_map())
            .with_block("docker", NestedBlock::single(docker))
            .with_block("artifacts", NestedBlock::list(artifact))
            .with_block("volumes", NestedBlock::list(volume))
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: JobState = decode(KIND, planned)?;
        let created = ctx.client.jobs().create_job(&state.to_spec()).await?;

        state.id = Some(created.id.clone());
        present(KIND, &created.id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: JobState = decode(KIND, current)?;
        let id = state.identity().to_string();

        match ctx.client.jobs().get_job(&id).await {
            Ok(spec) => {
                state.apply(spec);
                encode(&state)
            },
            Err(e) if e.is_not_found() => Ok(gone(KIND, &id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: JobState = decode(KIND, prior)?;
        let mut state: JobState = decode(KIND, planned)?;
        let id = prior.identity().to_string();

        let spec = state.to_spec();
        if spec != prior.to_spec() {
            ctx.client.jobs().update_job(&spec).await?;
        }

        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: JobState = decode(KIND, current)?;
        let id = state.identity();
        deleted(KIND, id, ctx.client.jobs().delete_job(id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = JobState {
            id: Some(id.to_string()),
            name: id.to_string(),
            ..Default::default()
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::{assert_gone, FakeCluster};
    use crate::validation;
    use std::sync::Arc;

    fn backup() -> Value {
        json!({
            "name": "nightly-backup",
            "description": "Dump the database",
            "cmd": "pg_dump > /backup/db.sql",
            "cpus": 0.5,
            "mem": 256.0,
            "disk": 0.0,
            "restart_policy": "ON_FAILURE",
            "restart_active_deadline": 120,
            "env": {"PGHOST": "db.marathon.l4lb.thisdcos.directory"},
            "docker": {"image": "postgres:15"},
            "volumes": [{"container_path": "/backup", "host_path": "/mnt/backup", "mode": "RW"}]
        })
    }

    #[test]
    fn test_config_passes_schema_validation() {
        assert!(validation::is_valid(&Job.schema(), &backup()));
    }

    #[tokio::test]
    async fn test_create_posts_metronome_spec() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = Job.create(&ctx, backup()).await.unwrap();
        assert_eq!(state["id"], "nightly-backup");
        assert_eq!(state["docker"]["image"], "postgres:15");
        assert_eq!(state["volumes"][0]["mode"], "RW");
        assert!(state["artifacts"].is_null());

        let stored = fake.get("/service/metronome/v1/jobs/nightly-backup").unwrap();
        assert_eq!(stored["run"]["restart"]["policy"], "ON_FAILURE");
        assert_eq!(stored["run"]["restart"]["activeDeadlineSeconds"], 120);
        assert_eq!(stored["run"]["volumes"][0]["containerPath"], "/backup");
        assert_eq!(stored["run"]["cpus"], 0.5);
    }

    #[tokio::test]
    async fn test_update_replaces_definition() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = Job.create(&ctx, backup()).await.unwrap();
        let mut planned = state.clone();
        planned["mem"] = json!(512.0);
        let state = Job.update(&ctx, state, planned).await.unwrap();

        assert_eq!(state["mem"], 512.0);
        let stored = fake.get("/service/metronome/v1/jobs/nightly-backup").unwrap();
        assert_eq!(stored["run"]["mem"], 512.0);
    }

    #[tokio::test]
    async fn test_delete_then_read_is_gone() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = Job.create(&ctx, backup()).await.unwrap();
        Job.delete(&ctx, state.clone()).await.unwrap();
        Job.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&Job.read(&ctx, state).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_skips_secret_env() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(
            "/service/metronome/v1/jobs/report",
            json!({
                "id": "report",
                "run": {
                    "cmd": "make report",
                    "cpus": 1.0,
                    "mem": 64.0,
                    "env": {"MODE": "full", "TOKEN": {"secret": "token"}}
                }
            }),
        );
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = Job.import(&ctx, "report").await.unwrap();
        assert_eq!(state["cmd"], "make report");
        assert_eq!(state["env"], json!({"MODE": "full"}));
        assert_eq!(state["disk"], 0.0);
    }
}
