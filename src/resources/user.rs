//! `dcos_iam_user`: a local IAM user that logs in with a password.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::client::iam::{IamUserCreate, IamUserUpdate};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_iam_user";

/// Handler for `dcos_iam_user`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IamUser;

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserState {
    id: Option<String>,
    uid: String,
    description: String,
    password: Option<String>,
}

impl UserState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.uid)
    }
}

#[async_trait]
impl Resource for IamUser {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A DC/OS IAM user")
            .with_attribute(
                "uid",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("User id used to log in"),
            )
            .with_attribute(
                "description",
                Attribute::required_string().with_description("Display name of the user"),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Login password"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: UserState = decode(KIND, planned)?;
        let body = IamUserCreate {
            description: Some(state.description.clone()),
            password: state.password.clone(),
            public_key: None,
        };
        ctx.client.iam().create_user(&state.uid, &body).await?;

        state.id = Some(state.uid.clone());
        let uid = state.uid.clone();
        present(KIND, &uid, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: UserState = decode(KIND, current)?;
        let id = state.identity().to_string();

        let user = match ctx.client.iam().get_user(&id).await {
            Ok(user) => user,
            Err(e) if e.is_absent() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };

        state.id = Some(id.clone());
        state.uid = if user.uid.is_empty() { id } else { user.uid };
        state.description = user.description;
        encode(&state)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: UserState = decode(KIND, prior)?;
        let mut state: UserState = decode(KIND, planned)?;
        let id = prior.identity().to_string();

        let mut update = IamUserUpdate::default();
        if state.description != prior.description {
            update.description = Some(state.description.clone());
        }
        if state.password != prior.password {
            update.password = state.password.clone();
        }
        if update != IamUserUpdate::default() {
            ctx.client.iam().update_user(&id, &update).await?;
        }

        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: UserState = decode(KIND, current)?;
        let id = state.identity();
        deleted(KIND, id, ctx.client.iam().delete_user(id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = UserState {
            id: Some(id.to_string()),
            uid: id.to_string(),
            ..Default::default()
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::resources::test_support::context;
    use crate::testing::{assert_gone, FakeCluster};
    use reqwest::{Method, StatusCode};
    use serde_json::json;
    use std::sync::Arc;

    const PATH: &str = "/acs/api/v1/users/alice";

    #[tokio::test]
    async fn test_create_reads_back_and_keeps_password() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = IamUser
            .create(
                &ctx,
                json!({"uid": "alice", "description": "Alice", "password": "s3cret"}),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "alice");
        assert_eq!(state["description"], "Alice");
        assert_eq!(state["password"], "s3cret");
        assert_eq!(fake.get(PATH).unwrap()["password"], "s3cret");
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(PATH, json!({"uid": "alice", "description": "Alice", "password": "x"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let prior = json!({"id": "alice", "uid": "alice", "description": "Alice", "password": "x"});
        let planned = json!({"id": "alice", "uid": "alice", "description": "Alice Smith", "password": "x"});
        let state = IamUser.update(&ctx, prior, planned).await.unwrap();
        assert_eq!(state["description"], "Alice Smith");

        let patch = fake
            .requests()
            .into_iter()
            .find(|r| r.method == Method::PATCH)
            .unwrap();
        assert_eq!(patch.json_body(), json!({"description": "Alice Smith"}));
    }

    #[tokio::test]
    async fn test_read_absorbs_bad_request() {
        let fake = Arc::new(FakeCluster::new());
        fake.respond(
            Method::GET,
            PATH,
            ApiResponse::json(StatusCode::BAD_REQUEST, &json!({"code": "ERR_INVALID_USER_ID"})),
        );
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamUser
            .read(&ctx, json!({"id": "alice", "uid": "alice", "description": "Alice"}))
            .await
            .unwrap();
        assert_gone(&state);
    }

    #[tokio::test]
    async fn test_read_propagates_server_errors() {
        let fake = Arc::new(FakeCluster::new());
        fake.respond(
            Method::GET,
            PATH,
            ApiResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        );
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let err = IamUser
            .read(&ctx, json!({"id": "alice", "uid": "alice", "description": "Alice"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_delete_twice_succeeds() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(PATH, json!({"uid": "alice", "description": "Alice"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());
        let state = json!({"id": "alice", "uid": "alice", "description": "Alice"});

        IamUser.delete(&ctx, state.clone()).await.unwrap();
        IamUser.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&IamUser.read(&ctx, state).await.unwrap());
    }

    #[tokio::test]
    async fn test_identity_only_state_reads_back_in_full() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(PATH, json!({"uid": "alice", "description": "Alice"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamUser.read(&ctx, json!({"id": "alice"})).await.unwrap();
        assert_eq!(state["uid"], "alice");
        assert_eq!(state["description"], "Alice");

        IamUser.delete(&ctx, json!({"id": "alice"})).await.unwrap();
        IamUser.delete(&ctx, json!({"id": "bob", "uid": "bob"})).await.unwrap();
        assert_gone(&IamUser.read(&ctx, json!({"id": "alice"})).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_existing_user() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(PATH, json!({"uid": "alice", "description": "Alice"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamUser.import(&ctx, "alice").await.unwrap();
        assert_eq!(state["uid"], "alice");
        assert_eq!(state["description"], "Alice");
        assert!(state["password"].is_null());

        let err = IamUser.import(&ctx, "bob").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
