//! `dcos_job_schedule`: a cron schedule attached to a Metronome job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, deleted, encode, gone, present, resource_schema, split_id, Resource};
use crate::client::jobs;
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_job_schedule";

const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_CONCURRENCY_POLICY: &str = "ALLOW";

/// Handler for `dcos_job_schedule`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobSchedule;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ScheduleState {
    id: Option<String>,
    dcos_job_id: String,
    name: String,
    cron: String,
    timezone: Option<String>,
    enabled: Option<bool>,
    starting_deadline_seconds: Option<i64>,
    concurrency_policy: Option<String>,
}

impl ScheduleState {
    fn identity(&self) -> String {
        format!("{}/{}", self.dcos_job_id, self.name)
    }

    /// Recover the job and schedule ids from an `id`-only state.
    fn resolve(mut self) -> Result<Self, ProviderError> {
        if let Some(id) = self
            .id
            .clone()
            .filter(|_| self.dcos_job_id.is_empty() || self.name.is_empty())
        {
            let parts = split_id(KIND, &id, '/', 2)?;
            self.dcos_job_id = parts[0].to_string();
            self.name = parts[1].to_string();
        }
        Ok(self)
    }

    fn to_schedule(&self) -> jobs::JobSchedule {
        jobs::JobSchedule {
            id: self.name.clone(),
            cron: self.cron.clone(),
            timezone: self
                .timezone
                .clone()
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            enabled: self.enabled.unwrap_or(true),
            starting_deadline_seconds: self.starting_deadline_seconds,
            concurrency_policy: self
                .concurrency_policy
                .clone()
                .unwrap_or_else(|| DEFAULT_CONCURRENCY_POLICY.to_string()),
        }
    }

    fn apply(&mut self, schedule: jobs::JobSchedule) {
        self.name = schedule.id;
        self.cron = schedule.cron;
        self.timezone = Some(schedule.timezone);
        self.enabled = Some(schedule.enabled);
        self.starting_deadline_seconds = schedule.starting_deadline_seconds;
        self.concurrency_policy = Some(schedule.concurrency_policy);
        self.id = Some(self.identity());
    }
}

#[async_trait]
impl Resource for JobSchedule {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A cron schedule for a Metronome job")
            .with_attribute("dcos_job_id", Attribute::required_string().with_force_new())
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Schedule id, unique per job"),
            )
            .with_attribute("cron", Attribute::required_string())
            .with_attribute(
                "timezone",
                Attribute::optional_string().with_default(json!(DEFAULT_TIMEZONE)),
            )
            .with_attribute("enabled", Attribute::optional_bool().with_default(json!(true)))
            .with_attribute("starting_deadline_seconds", Attribute::optional_int64())
            .with_attribute(
                "concurrency_policy",
                Attribute::optional_string()
                    .with_default(json!(DEFAULT_CONCURRENCY_POLICY))
                    .with_description("ALLOW or FORBID"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: ScheduleState = decode(KIND, planned)?;
        ctx.client
            .jobs()
            .create_schedule(&state.dcos_job_id, &state.to_schedule())
            .await?;

        let id = state.identity();
        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state = decode::<ScheduleState>(KIND, current)?.resolve()?;
        let id = state.identity();

        match ctx
            .client
            .jobs()
            .get_schedule(&state.dcos_job_id, &state.name)
            .await
        {
            Ok(schedule) => {
                state.apply(schedule);
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
        let prior: ScheduleState = decode(KIND, prior)?;
        let state: ScheduleState = decode(KIND, planned)?;

        let schedule = state.to_schedule();
        if schedule != prior.to_schedule() {
            ctx.client
                .jobs()
                .update_schedule(&state.dcos_job_id, &schedule)
                .await?;
        }

        let id = state.identity();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state = decode::<ScheduleState>(KIND, current)?.resolve()?;
        let result = ctx
            .client
            .jobs()
            .delete_schedule(&state.dcos_job_id, &state.name)
            .await;
        deleted(KIND, &state.identity(), result)
    }

    /// Import ids are `<job id>/<schedule name>`.
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let parts = split_id(KIND, id, '/', 2)?;
        let state = ScheduleState {
            id: Some(id.to_string()),
            dcos_job_id: parts[0].to_string(),
            name: parts[1].to_string(),
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
    use std::sync::Arc;

    const JOB: &str = "/service/metronome/v1/jobs/nightly-backup";

    fn cluster() -> Arc<FakeCluster> {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(
            JOB,
            json!({"id": "nightly-backup", "run": {"cmd": "backup", "cpus": 1.0, "mem": 128.0}}),
        );
        fake
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let fake = cluster();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = JobSchedule
            .create(
                &ctx,
                json!({"dcos_job_id": "nightly-backup", "name": "at-two", "cron": "0 2 * * *"}),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "nightly-backup/at-two");
        assert_eq!(state["timezone"], "UTC");
        assert_eq!(state["enabled"], true);
        let stored = fake.get(&format!("{}/schedules/at-two", JOB)).unwrap();
        assert_eq!(stored["concurrencyPolicy"], "ALLOW");
    }

    #[tokio::test]
    async fn test_schedule_for_missing_job_fails() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let err = JobSchedule
            .create(
                &ctx,
                json!({"dcos_job_id": "nightly-backup", "name": "at-two", "cron": "0 2 * * *"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_read_and_delete_with_only_id() {
        let fake = cluster();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());
        JobSchedule
            .create(
                &ctx,
                json!({"dcos_job_id": "nightly-backup", "name": "at-two", "cron": "0 2 * * *"}),
            )
            .await
            .unwrap();

        let id = json!({"id": "nightly-backup/at-two"});
        let state = JobSchedule.read(&ctx, id.clone()).await.unwrap();
        assert_eq!(state["cron"], "0 2 * * *");

        JobSchedule.delete(&ctx, id.clone()).await.unwrap();
        assert_gone(&JobSchedule.read(&ctx, id.clone()).await.unwrap());
        JobSchedule.delete(&ctx, id).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_then_delete() {
        let fake = cluster();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = JobSchedule
            .create(
                &ctx,
                json!({"dcos_job_id": "nightly-backup", "name": "at-two", "cron": "0 2 * * *"}),
            )
            .await
            .unwrap();
        let mut planned = state.clone();
        planned["cron"] = json!("0 3 * * *");
        planned["enabled"] = json!(false);
        let state = JobSchedule.update(&ctx, state, planned).await.unwrap();
        assert_eq!(state["cron"], "0 3 * * *");
        assert_eq!(state["enabled"], false);

        JobSchedule.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&JobSchedule.read(&ctx, state.clone()).await.unwrap());
        assert_eq!(
            JobSchedule.import(&ctx, "nightly-backup/at-two").await.unwrap_err().to_string(),
            "Resource not found: dcos_job_schedule 'nightly-backup/at-two'"
        );
    }
}
