//! `dcos_secret`: a value in a DC/OS secret store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, deleted, encode, gone, present, resource_schema, split_id, Resource};
use crate::client::secrets;
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_secret";

const DEFAULT_STORE: &str = "default";

/// Handler for `dcos_secret`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secret;

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SecretState {
    id: Option<String>,
    path: String,
    store: Option<String>,
    value: String,
}

impl SecretState {
    fn store(&self) -> &str {
        self.store
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STORE)
    }

    fn path(&self) -> &str {
        self.path.trim_matches('/')
    }

    fn identity(&self) -> String {
        format!("{}/{}", self.store(), self.path())
    }

    /// Recover `store` and `path` from an `id`-only state.
    fn resolve(mut self) -> Result<Self, ProviderError> {
        if let Some(id) = self.id.clone().filter(|_| self.path().is_empty()) {
            let parts = split_id(KIND, &id, '/', 2)?;
            self.store = Some(parts[0].to_string());
            self.path = parts[1].to_string();
        }
        Ok(self)
    }

    fn normalize(&mut self) {
        self.store = Some(self.store().to_string());
        self.path = self.path().to_string();
        self.id = Some(self.identity());
    }
}

#[async_trait]
impl Resource for Secret {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A secret in a DC/OS secret store")
            .with_attribute(
                "path",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Secret path; may contain '/'"),
            )
            .with_attribute(
                "store",
                Attribute::optional_string()
                    .with_force_new()
                    .with_default(json!(DEFAULT_STORE)),
            )
            .with_attribute("value", Attribute::required_string().sensitive())
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: SecretState = decode(KIND, planned)?;
        state.normalize();
        let secret = secrets::Secret {
            value: state.value.clone(),
        };
        ctx.client
            .secrets()
            .create(state.store(), state.path(), &secret)
            .await?;

        let id = state.identity();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state = decode::<SecretState>(KIND, current)?.resolve()?;
        let id = state.identity();

        let secret = match ctx.client.secrets().get(state.store(), state.path()).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };

        state.normalize();
        state.value = secret.value;
        encode(&state)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior = decode::<SecretState>(KIND, prior)?.resolve()?;
        let mut state: SecretState = decode(KIND, planned)?;
        state.normalize();

        if state.value != prior.value {
            let secret = secrets::Secret {
                value: state.value.clone(),
            };
            ctx.client
                .secrets()
                .update(state.store(), state.path(), &secret)
                .await?;
        }

        let id = state.identity();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state = decode::<SecretState>(KIND, current)?.resolve()?;
        let result = ctx.client.secrets().delete(state.store(), state.path()).await;
        deleted(KIND, &state.identity(), result)
    }

    /// Import ids are `store/path`.
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let parts = split_id(KIND, id, '/', 2)?;
        let state = SecretState {
            id: Some(id.to_string()),
            store: Some(parts[0].to_string()),
            path: parts[1].to_string(),
            value: String::new(),
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

    #[tokio::test]
    async fn test_create_defaults_store_and_nests_path() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = Secret
            .create(&ctx, json!({"path": "db/password", "store": null, "value": "hunter2"}))
            .await
            .unwrap();

        assert_eq!(state["id"], "default/db/password");
        assert_eq!(state["store"], "default");
        assert_eq!(
            fake.get("/secrets/v1/secret/default/db/password").unwrap()["value"],
            "hunter2"
        );
    }

    #[tokio::test]
    async fn test_update_replaces_value() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = Secret
            .create(&ctx, json!({"path": "db/password", "value": "hunter2"}))
            .await
            .unwrap();
        let mut planned = state.clone();
        planned["value"] = json!("correct horse");
        let state = Secret.update(&ctx, state, planned).await.unwrap();

        assert_eq!(state["value"], "correct horse");
    }

    #[tokio::test]
    async fn test_read_and_delete_with_only_id() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert("/secrets/v1/secret/vault/api/key", json!({"value": "k"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = Secret.read(&ctx, json!({"id": "vault/api/key"})).await.unwrap();
        assert_eq!(state["path"], "api/key");
        assert_eq!(state["value"], "k");

        Secret.delete(&ctx, json!({"id": "vault/api/key"})).await.unwrap();
        assert!(fake.get("/secrets/v1/secret/vault/api/key").is_none());

        assert_gone(&Secret.read(&ctx, json!({"id": "default/x"})).await.unwrap());
        Secret.delete(&ctx, json!({"id": "default/x"})).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_then_read_is_gone() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert("/secrets/v1/secret/vault/api/key", json!({"value": "k"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = Secret.import(&ctx, "vault/api/key").await.unwrap();
        assert_eq!(state["store"], "vault");
        assert_eq!(state["path"], "api/key");
        assert_eq!(state["value"], "k");

        Secret.delete(&ctx, state.clone()).await.unwrap();
        Secret.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&Secret.read(&ctx, state).await.unwrap());
    }
}
