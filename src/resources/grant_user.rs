//! `dcos_iam_grant_user`: permission for a user to perform an action on an
//! ACL resource id such as `dcos:adminrouter:service:marathon`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_iam_grant_user";

const DEFAULT_ACTION: &str = "full";

/// Handler for `dcos_iam_grant_user`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IamGrantUser;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GrantState {
    id: Option<String>,
    uid: String,
    resource: String,
    action: Option<String>,
    description: Option<String>,
}

impl GrantState {
    fn action(&self) -> &str {
        self.action
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ACTION)
    }

    fn identity(&self) -> String {
        format!("{}:{}:{}", self.uid, self.resource, self.action())
    }

    /// Recover uid, resource and action from an `id`-only state.
    fn resolve(self) -> Result<Self, ProviderError> {
        let Some(id) = self
            .id
            .clone()
            .filter(|_| self.uid.is_empty() || self.resource.is_empty())
        else {
            return Ok(self);
        };
        Ok(Self {
            description: self.description,
            ..Self::from_identity(&id)?
        })
    }

    /// Parse `uid:resource:action`; the resource id itself contains colons.
    fn from_identity(id: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::Validation(format!("invalid {} id '{}'", KIND, id));
        let (uid, rest) = id.split_once(':').ok_or_else(invalid)?;
        let (resource, action) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if uid.is_empty() || resource.is_empty() || action.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            id: Some(id.to_string()),
            uid: uid.to_string(),
            resource: resource.to_string(),
            action: Some(action.to_string()),
            description: None,
        })
    }
}

#[async_trait]
impl Resource for IamGrantUser {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "Grants a DC/OS IAM user an action on an ACL resource")
            .with_attribute("uid", Attribute::required_string().with_force_new())
            .with_attribute(
                "resource",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ACL resource id"),
            )
            .with_attribute(
                "action",
                Attribute::optional_string()
                    .with_force_new()
                    .with_default(json!(DEFAULT_ACTION))
                    .with_description("Action to permit: create, read, update, delete or full"),
            )
            .with_attribute(
                "description",
                Attribute::optional_string()
                    .with_description("Description of the ACL; a change is applied to the existing ACL"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: GrantState = decode(KIND, planned)?;
        let iam = ctx.client.iam();

        let description = state.description.clone().unwrap_or_default();
        match iam.create_acl(&state.resource, &description).await {
            Ok(()) => {},
            Err(e) if e.is_conflict() => {},
            Err(e) => return Err(e.into()),
        }
        iam.grant_user_action(&state.resource, &state.uid, state.action())
            .await?;

        let id = state.identity();
        state.action = Some(state.action().to_string());
        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state = decode::<GrantState>(KIND, current)?.resolve()?;
        let id = state.identity();

        let allowed = match ctx
            .client
            .iam()
            .user_action_allowed(&state.resource, &state.uid, state.action())
            .await
        {
            Ok(allowed) => allowed,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };
        if !allowed {
            return Ok(gone(KIND, &id));
        }

        state.id = Some(id);
        encode(&state)
    }

    /// Only the description can change without replacement.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior = decode::<GrantState>(KIND, prior)?.resolve()?;
        let state: GrantState = decode(KIND, planned)?;

        if let Some(description) = state.description.as_deref() {
            if state.description != prior.description {
                ctx.client
                    .iam()
                    .update_acl(&state.resource, description)
                    .await?;
            }
        }

        let id = state.identity();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state = decode::<GrantState>(KIND, current)?.resolve()?;
        let result = ctx
            .client
            .iam()
            .revoke_user_action(&state.resource, &state.uid, state.action())
            .await;
        deleted(KIND, &state.identity(), result)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = GrantState::from_identity(id)?;
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::{assert_gone, FakeCluster};
    use reqwest::Method;
    use std::sync::Arc;

    const MARATHON: &str = "dcos:adminrouter:service:marathon";

    #[test]
    fn test_identity_round_trips_colons_in_resource() {
        let state = GrantState::from_identity("alice:dcos:adminrouter:service:marathon:full").unwrap();
        assert_eq!(state.uid, "alice");
        assert_eq!(state.resource, MARATHON);
        assert_eq!(state.action(), "full");
        assert_eq!(state.identity(), "alice:dcos:adminrouter:service:marathon:full");

        assert!(GrantState::from_identity("alice").is_err());
        assert!(GrantState::from_identity("alice:full").is_err());
    }

    #[tokio::test]
    async fn test_create_makes_acl_and_grants_default_action() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = IamGrantUser
            .create(&ctx, json!({"uid": "alice", "resource": MARATHON}))
            .await
            .unwrap();

        assert_eq!(state["id"], format!("alice:{}:full", MARATHON));
        assert_eq!(state["action"], "full");
        assert!(fake.get(&format!("/acs/api/v1/acls/{}", MARATHON)).is_some());
    }

    #[tokio::test]
    async fn test_existing_acl_is_reused() {
        let fake = Arc::new(FakeCluster::new());
        fake.insert(&format!("/acs/api/v1/acls/{}", MARATHON), json!({"description": "Marathon"}));
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        IamGrantUser
            .create(&ctx, json!({"uid": "alice", "resource": MARATHON, "action": "read"}))
            .await
            .unwrap();

        let acl = fake.get(&format!("/acs/api/v1/acls/{}", MARATHON)).unwrap();
        assert_eq!(acl["description"], "Marathon");
        let grant = fake.requests().pop().unwrap();
        assert_eq!(grant.method, Method::GET);
        assert!(grant.url.path().ends_with("/users/alice/read"));
    }

    #[tokio::test]
    async fn test_update_changes_acl_description() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = IamGrantUser
            .create(
                &ctx,
                json!({"uid": "alice", "resource": MARATHON, "description": "Marathon"}),
            )
            .await
            .unwrap();
        let mut planned = state.clone();
        planned["description"] = json!("Marathon UI");
        let state = IamGrantUser.update(&ctx, state, planned).await.unwrap();

        assert_eq!(state["description"], "Marathon UI");
        let acl = fake.get(&format!("/acs/api/v1/acls/{}", MARATHON)).unwrap();
        assert_eq!(acl["description"], "Marathon UI");
    }

    #[tokio::test]
    async fn test_unchanged_description_leaves_acl_alone() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake.clone(), dir.path());

        let state = IamGrantUser
            .create(&ctx, json!({"uid": "alice", "resource": MARATHON, "description": "M"}))
            .await
            .unwrap();
        fake.clear_requests();
        IamGrantUser.update(&ctx, state.clone(), state).await.unwrap();

        assert!(fake.requests().iter().all(|r| r.method == Method::GET));
    }

    #[tokio::test]
    async fn test_read_and_delete_with_only_id() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());
        IamGrantUser
            .create(&ctx, json!({"uid": "alice", "resource": MARATHON, "action": "read"}))
            .await
            .unwrap();

        let id = json!({"id": format!("alice:{}:read", MARATHON)});
        let state = IamGrantUser.read(&ctx, id.clone()).await.unwrap();
        assert_eq!(state["resource"], MARATHON);
        assert_eq!(state["action"], "read");

        IamGrantUser.delete(&ctx, id.clone()).await.unwrap();
        assert_gone(&IamGrantUser.read(&ctx, id.clone()).await.unwrap());
        IamGrantUser.delete(&ctx, id).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoked_grant_reads_as_gone() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamGrantUser
            .create(&ctx, json!({"uid": "alice", "resource": MARATHON, "action": "read"}))
            .await
            .unwrap();

        IamGrantUser.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&IamGrantUser.read(&ctx, state.clone()).await.unwrap());
        IamGrantUser.delete(&ctx, state).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_without_acl_clears_identity() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamGrantUser
            .read(&ctx, json!({"uid": "alice", "resource": MARATHON, "action": "full"}))
            .await
            .unwrap();
        assert_gone(&state);
    }
}
