//! Metronome job API.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientError, DcosClient};

const METRONOME: [&str; 4] = ["service", "metronome", "v1", "jobs"];

/// A Metronome job definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Job id.
    pub id: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// What each run executes.
    pub run: JobRun,
}

/// The run section of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    /// Shell command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    /// Arguments, used instead of `cmd` with a container entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// CPU shares.
    pub cpus: f64,
    /// Memory in MiB.
    pub mem: f64,
    /// Disk in MiB.
    #[serde(default)]
    pub disk: f64,
    /// User to run as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Maximum launch delay in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_launch_delay: Option<i64>,
    /// Restart policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<JobRestart>,
    /// Docker container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<JobDocker>,
    /// Environment; values are strings or secret references.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, serde_json::Value>,
    /// Artifacts fetched into the sandbox.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<JobArtifact>,
    /// Host volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<JobVolume>,
}

/// Restart policy of a job run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRestart {
    /// `NEVER` or `ON_FAILURE`.
    pub policy: String,
    /// How long restarts are attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
}

/// Docker settings of a job run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocker {
    /// Image reference.
    pub image: String,
}

/// An artifact fetched before the run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobArtifact {
    /// Source URI.
    pub uri: String,
    /// Mark as executable.
    #[serde(default)]
    pub executable: bool,
    /// Extract archives.
    #[serde(default)]
    pub extract: bool,
    /// Cache the download.
    #[serde(default)]
    pub cache: bool,
}

/// A host volume mounted into the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobVolume {
    /// Path inside the container.
    pub container_path: String,
    /// Path on the agent.
    pub host_path: String,
    /// `RO` or `RW`.
    pub mode: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_concurrency_policy() -> String {
    "ALLOW".to_string()
}

fn default_enabled() -> bool {
    true
}

/// A cron schedule attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSchedule {
    /// Schedule id, unique per job.
    pub id: String,
    /// Cron expression.
    pub cron: String,
    /// Time zone of the cron expression.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Whether the schedule fires.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds a missed run may still start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_deadline_seconds: Option<i64>,
    /// `ALLOW` or `FORBID` overlapping runs.
    #[serde(default = "default_concurrency_policy")]
    pub concurrency_policy: String,
}

/// Metronome calls.
pub struct JobsApi<'a> {
    client: &'a DcosClient,
}

impl<'a> JobsApi<'a> {
    pub(crate) fn new(client: &'a DcosClient) -> Self {
        Self { client }
    }

    fn url(&self, tail: &[&str]) -> Result<reqwest::Url, ClientError> {
        let segments: Vec<&str> = METRONOME
            .iter()
            .copied()
            .chain(tail.iter().copied())
            .collect();
        self.client.url(&segments)
    }

    /// Create a job.
    pub async fn create_job(&self, job: &JobSpec) -> Result<JobSpec, ClientError> {
        let url = self.url(&[])?;
        self.client.send_json(Method::POST, url, job, None).await
    }

    /// Fetch a job.
    pub async fn get_job(&self, id: &str) -> Result<JobSpec, ClientError> {
        self.client.get_json(self.url(&[id])?).await
    }

    /// Replace a job definition.
    pub async fn update_job(&self, job: &JobSpec) -> Result<JobSpec, ClientError> {
        let url = self.url(&[job.id.as_str()])?;
        self.client.send_json(Method::PUT, url, job, None).await
    }

    /// Delete a job, stopping any active runs.
    pub async fn delete_job(&self, id: &str) -> Result<(), ClientError> {
        let mut url = self.url(&[id])?;
        url.query_pairs_mut()
            .append_pair("stopCurrentJobRuns", "true");
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }

    /// Add a schedule to a job.
    pub async fn create_schedule(
        &self,
        job_id: &str,
        schedule: &JobSchedule,
    ) -> Result<JobSchedule, ClientError> {
        let url = self.url(&[job_id, "schedules"])?;
        self.client
            .send_json(Method::POST, url, schedule, None)
            .await
    }

    /// Fetch a schedule.
    pub async fn get_schedule(
        &self,
        job_id: &str,
        schedule_id: &str,
    ) -> Result<JobSchedule, ClientError> {
        self.client
            .get_json(self.url(&[job_id, "schedules", schedule_id])?)
            .await
    }

    /// Replace a schedule.
    pub async fn update_schedule(
        &self,
        job_id: &str,
        schedule: &JobSchedule,
    ) -> Result<JobSchedule, ClientError> {
        let url = self.url(&[job_id, "schedules", schedule.id.as_str()])?;
        self.client
            .send_json(Method::PUT, url, schedule, None)
            .await
    }

    /// Remove a schedule.
    pub async fn delete_schedule(&self, job_id: &str, schedule_id: &str) -> Result<(), ClientError> {
        let url = self.url(&[job_id, "schedules", schedule_id])?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::testing::FakeCluster;
    use std::sync::Arc;

    fn job(id: &str) -> JobSpec {
        JobSpec {
            id: id.to_string(),
            description: Some("nightly".into()),
            run: JobRun {
                cmd: Some("backup.sh".into()),
                cpus: 0.5,
                mem: 128.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_job_spec_wire_format() {
        let mut spec = job("backup");
        spec.run.max_launch_delay = Some(3600);
        spec.run.restart = Some(JobRestart {
            policy: "ON_FAILURE".into(),
            active_deadline_seconds: Some(120),
        });
        let value = serde_json::to_value(&spec).unwrap();

        assert_eq!(value["run"]["maxLaunchDelay"], 3600);
        assert_eq!(value["run"]["restart"]["activeDeadlineSeconds"], 120);
        assert!(value.get("labels").is_none());
        assert!(value["run"].get("docker").is_none());
    }

    #[test]
    fn test_schedule_defaults() {
        let schedule: JobSchedule =
            serde_json::from_value(serde_json::json!({"id": "daily", "cron": "0 0 * * *"}))
                .unwrap();
        assert_eq!(schedule.timezone, "UTC");
        assert!(schedule.enabled);
        assert_eq!(schedule.concurrency_policy, "ALLOW");
    }

    #[tokio::test]
    async fn test_delete_stops_active_runs() {
        let fake = Arc::new(FakeCluster::new());
        let client =
            DcosClient::with_transport(ClusterConfig::new("https://cluster"), fake.clone())
                .unwrap();

        client.jobs().create_job(&job("backup")).await.unwrap();
        client.jobs().delete_job("backup").await.unwrap();

        let requests = fake.requests();
        let delete = requests.last().unwrap();
        assert_eq!(delete.method, Method::DELETE);
        assert_eq!(delete.url.query(), Some("stopCurrentJobRuns=true"));
        assert!(client.jobs().get_job("backup").await.unwrap_err().is_not_found());
    }
}
