//! `dcos_iam_service_account`: an IAM identity authenticating with a key pair.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::client::iam::{IamUserCreate, IamUserUpdate};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_iam_service_account";

/// Handler for `dcos_iam_service_account`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceAccount;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ServiceAccountState {
    id: Option<String>,
    uid: String,
    description: String,
    public_key: Option<String>,
}

impl ServiceAccountState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.uid)
    }
}

#[async_trait]
impl Resource for ServiceAccount {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(1, "A DC/OS IAM service account")
            .with_attribute("uid", Attribute::required_string().with_force_new())
            .with_attribute("description", Attribute::required_string())
            .with_attribute(
                "public_key",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("PEM encoded public key the account signs logins with"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: ServiceAccountState = decode(KIND, planned)?;
        let body = IamUserCreate {
            description: Some(state.description.clone()),
            password: None,
            public_key: state.public_key.clone(),
        };
        ctx.client.iam().create_user(&state.uid, &body).await?;

        state.id = Some(state.uid.clone());
        let uid = state.uid.clone();
        present(KIND, &uid, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: ServiceAccountState = decode(KIND, current)?;
        let id = state.identity().to_string();

        let account = match ctx.client.iam().get_user(&id).await {
            Ok(account) => account,
            Err(e) if e.is_absent() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };

        state.id = Some(id.clone());
        state.uid = if account.uid.is_empty() { id } else { account.uid };
        state.description = account.description;
        if account.public_key.is_some() {
            state.public_key = account.public_key;
        }
        encode(&state)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: ServiceAccountState = decode(KIND, prior)?;
        let mut state: ServiceAccountState = decode(KIND, planned)?;
        let id = prior.identity().to_string();

        if state.description != prior.description {
            let update = IamUserUpdate {
                description: Some(state.description.clone()),
                password: None,
            };
            ctx.client.iam().update_user(&id, &update).await?;
        }

        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: ServiceAccountState = decode(KIND, current)?;
        let id = state.identity();
        deleted(KIND, id, ctx.client.iam().delete_user(id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = ServiceAccountState {
            id: Some(id.to_string()),
            uid: id.to_string(),
            ..Default::default()
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }

    /// Version 0 state had no `id`; the uid was the identity.
    fn upgrade_state(&self, version: i64, mut state: Value) -> Result<Value, ProviderError> {
        if version >= 1 {
            return Ok(state);
        }
        if let Some(obj) = state.as_object_mut() {
            let uid = obj.get("uid").cloned().unwrap_or(Value::Null);
            if obj.get("id").map_or(true, Value::is_null) {
                obj.insert("id".to_string(), uid);
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::{assert_gone, FakeCluster};
    use serde_json::json;
    use std::sync::Arc;

    const KEY: &str = "-----BEGIN PUBLIC KEY-----\nMIIB\n-----END PUBLIC KEY-----";

    #[tokio::test]
    async fn test_create_marks_account_as_service() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = ServiceAccount
            .create(
                &ctx,
                json!({"uid": "ci-runner", "description": "CI", "public_key": KEY}),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "ci-runner");
        assert_eq!(state["public_key"], KEY);
        let stored = fake.get("/acs/api/v1/users/ci-runner").unwrap();
        assert_eq!(stored["is_service"], true);
        assert!(stored.get("password").is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_ends_in_cleared_identity() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = ServiceAccount
            .create(&ctx, json!({"uid": "ci-runner", "description": "CI", "public_key": KEY}))
            .await
            .unwrap();

        let mut planned = state.clone();
        planned["description"] = json!("CI runner");
        let state = ServiceAccount.update(&ctx, state, planned).await.unwrap();
        assert_eq!(state["description"], "CI runner");

        ServiceAccount.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&ServiceAccount.read(&ctx, state.clone()).await.unwrap());
        assert_gone(&ServiceAccount.read(&ctx, state).await.unwrap());
    }

    #[test]
    fn test_schema_is_version_one_with_force_new_key() {
        let schema = ServiceAccount.schema();
        assert_eq!(schema.version, 1);
        assert!(schema.forces_new("uid"));
        assert!(schema.forces_new("public_key"));
        assert!(!schema.forces_new("description"));
    }

    #[test]
    fn test_upgrade_from_v0_fills_identity() {
        let upgraded = ServiceAccount
            .upgrade_state(0, json!({"uid": "ci-runner", "description": "CI"}))
            .unwrap();
        assert_eq!(upgraded["id"], "ci-runner");

        let current = json!({"id": "other", "uid": "ci-runner", "description": "CI"});
        assert_eq!(ServiceAccount.upgrade_state(1, current.clone()).unwrap(), current);
    }
}
