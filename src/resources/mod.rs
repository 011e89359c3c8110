//! Resource handlers, one per resource kind.
//!
//! Every handler maps one remote DC/OS entity onto a typed state struct and
//! implements the same contract:
//!
//! - `create` makes the remote call, sets `id` and refreshes through `read`;
//! - `read` returns `Value::Null` when the entity is gone, which clears its
//!   identity on the host side;
//! - `update` only sends the mutable fields, then refreshes;
//! - `delete` treats a missing entity as already deleted.

mod cli_command;
mod grant_user;
mod group;
mod group_user;
mod job;
mod job_schedule;
mod package;
mod package_repo;
mod saml_provider;
mod secret;
mod service_account;
mod user;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::client::ClientError;
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema, Timeouts};

pub use cli_command::CliCommand;
pub use grant_user::IamGrantUser;
pub use group::IamGroup;
pub use group_user::IamGroupUser;
pub use job::Job;
pub use job_schedule::JobSchedule;
pub use package::Package;
pub use package_repo::PackageRepo;
pub use saml_provider::SamlProvider;
pub use secret::Secret;
pub use service_account::ServiceAccount;
pub use user::IamUser;

/// A resource kind served by the provider.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name, e.g. `dcos_iam_user`.
    fn name(&self) -> &'static str;

    /// Schema of the resource block and its state.
    fn schema(&self) -> Schema;

    /// Create the remote entity from planned state.
    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state; `Value::Null` when the entity no longer exists.
    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError>;

    /// Push changed mutable fields and refresh.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote entity; succeeds if it is already gone.
    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError>;

    /// Build state for an existing entity from its identity.
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let _ = (ctx, id);
        Err(ProviderError::Unimplemented(format!(
            "{} cannot be imported",
            self.name()
        )))
    }

    /// Rewrite state written by an older schema version.
    fn upgrade_state(&self, version: i64, state: Value) -> Result<Value, ProviderError> {
        let _ = version;
        Ok(state)
    }
}

/// Every resource kind.
pub fn all() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(IamGrantUser),
        Box::new(IamGroup),
        Box::new(IamGroupUser),
        Box::new(SamlProvider),
        Box::new(ServiceAccount),
        Box::new(IamUser),
        Box::new(Job),
        Box::new(JobSchedule),
        Box::new(Package),
        Box::new(PackageRepo),
        Box::new(Secret),
        Box::new(CliCommand),
    ]
}

/// Decode handler state, reporting which resource it belongs to.
pub(crate) fn decode<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::Validation(format!("invalid {} state: {}", kind, e)))
}

pub(crate) fn encode<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// The `id` attribute every resource carries.
pub(crate) fn id_attribute() -> Attribute {
    Attribute::computed_string().with_description("Identity of the remote entity")
}

/// Schema at `version` with the standard operation limits.
pub(crate) fn resource_schema(version: u64, description: &str) -> Schema {
    Schema::new(version)
        .with_description(description)
        .with_timeouts(Timeouts::standard())
        .with_attribute("id", id_attribute())
}

/// The entity is gone: log it and clear the identity.
pub(crate) fn gone(kind: &str, id: &str) -> Value {
    info!(resource_type = kind, id, "not found, removing from state");
    Value::Null
}

/// Absorb a not-found answer to a delete.
pub(crate) fn deleted(kind: &str, id: &str, result: Result<(), ClientError>) -> Result<(), ProviderError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            info!(resource_type = kind, id, "already deleted");
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}

/// Turn a refresh that found nothing into an error.
///
/// Used after create, update and import, where the entity must exist.
pub(crate) fn present(kind: &str, id: &str, state: Value) -> Result<Value, ProviderError> {
    if state.is_null() {
        Err(ProviderError::NotFound(format!("{} '{}'", kind, id)))
    } else {
        Ok(state)
    }
}

/// Split an import id into `n` parts on the first `n - 1` separators.
pub(crate) fn split_id<'a>(kind: &str, id: &'a str, sep: char, n: usize) -> Result<Vec<&'a str>, ProviderError> {
    let parts: Vec<&str> = id.splitn(n, sep).collect();
    if parts.len() == n && parts.iter().all(|p| !p.is_empty()) {
        Ok(parts)
    } else {
        Err(ProviderError::Validation(format!(
            "invalid {} id '{}'",
            kind, id
        )))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::cli::CliWrapper;
    use crate::client::DcosClient;
    use crate::config::ClusterConfig;
    use crate::provider::ProviderContext;
    use crate::testing::FakeCluster;

    /// A context talking to `fake`, with its CLI sandbox in `sandbox`.
    pub(crate) fn context(fake: Arc<FakeCluster>, sandbox: &std::path::Path) -> ProviderContext {
        let cluster = ClusterConfig::new("https://cluster.example").with_acs_token("token-for-alice");
        let client = DcosClient::with_transport(cluster.clone(), fake).unwrap();
        let cli = CliWrapper::provision(sandbox, &cluster, None).unwrap();
        ProviderContext::new(client, cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resource_names_are_unique() {
        let names: HashSet<_> = all().iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), 12);
        assert!(names.contains("dcos_iam_grant_user"));
        assert!(names.contains("dcos_cli"));
    }

    #[test]
    fn test_every_schema_has_identity_and_timeouts() {
        for resource in all() {
            let schema = resource.schema();
            let id = schema.attribute("id").unwrap();
            assert!(id.flags.is_computed_only(), "{}", resource.name());
            assert_eq!(schema.timeouts, Some(Timeouts::standard()), "{}", resource.name());
        }
    }

    #[tokio::test]
    async fn test_missing_entities_read_and_delete_from_identity_alone() {
        use crate::testing::FakeCluster;
        use serde_json::json;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_support::context(Arc::new(FakeCluster::new()), dir.path());
        let ids = [
            ("dcos_iam_grant_user", "alice:dcos:adminrouter:service:marathon:full"),
            ("dcos_iam_group", "ghosts"),
            ("dcos_iam_group_user", "ghosts/alice"),
            ("dcos_iam_saml_provider", "okta"),
            ("dcos_iam_service_account", "robot"),
            ("dcos_iam_user", "bob"),
            ("dcos_job", "nightly-backup"),
            ("dcos_job_schedule", "nightly-backup/at-two"),
            ("dcos_package", "/kafka"),
            ("dcos_package_repo", "universe"),
            ("dcos_secret", "default/x"),
        ];

        for resource in all().into_iter().filter(|r| r.name() != "dcos_cli") {
            let (_, id) = ids.iter().find(|(name, _)| *name == resource.name()).unwrap();
            let state = json!({"id": id});
            let read = resource.read(&ctx, state.clone()).await;
            assert_eq!(read.unwrap(), Value::Null, "{}", resource.name());
            let delete = resource.delete(&ctx, state).await;
            assert!(delete.is_ok(), "{}: {:?}", resource.name(), delete);
        }
    }

    #[test]
    fn test_split_id() {
        assert_eq!(split_id("dcos_secret", "default/db/password", '/', 2).unwrap(), vec!["default", "db/password"]);
        assert!(split_id("dcos_iam_group_user", "ops", '/', 2).is_err());
        assert!(split_id("dcos_iam_group_user", "ops/", '/', 2).is_err());
    }

    #[test]
    fn test_deleted_absorbs_not_found() {
        let not_found = ClientError::Api {
            status: reqwest::StatusCode::NOT_FOUND,
            message: String::new(),
        };
        assert!(deleted("dcos_iam_user", "alice", Err(not_found)).is_ok());

        let forbidden = ClientError::Api {
            status: reqwest::StatusCode::FORBIDDEN,
            message: "forbidden".into(),
        };
        let err = deleted("dcos_iam_user", "alice", Err(forbidden)).unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
