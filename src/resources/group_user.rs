//! `dcos_iam_group_user`: membership of a user in a group.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, deleted, encode, gone, present, resource_schema, split_id, Resource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_iam_group_user";

/// Handler for `dcos_iam_group_user`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IamGroupUser;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MembershipState {
    id: Option<String>,
    gid: String,
    uid: String,
}

impl MembershipState {
    fn identity(&self) -> String {
        format!("{}/{}", self.gid, self.uid)
    }

    /// Recover `gid` and `uid` from an `id`-only state.
    fn resolve(mut self) -> Result<Self, ProviderError> {
        if let Some(id) = self.id.clone().filter(|_| self.gid.is_empty() || self.uid.is_empty()) {
            let parts = split_id(KIND, &id, '/', 2)?;
            self.gid = parts[0].to_string();
            self.uid = parts[1].to_string();
        }
        Ok(self)
    }
}

#[async_trait]
impl Resource for IamGroupUser {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "Membership of a user in a DC/OS IAM group")
            .with_attribute("gid", Attribute::required_string().with_force_new())
            .with_attribute("uid", Attribute::required_string().with_force_new())
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: MembershipState = decode(KIND, planned)?;
        ctx.client
            .iam()
            .add_group_member(&state.gid, &state.uid)
            .await?;

        let id = state.identity();
        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state = decode::<MembershipState>(KIND, current)?.resolve()?;
        let id = state.identity();

        let members = match ctx.client.iam().list_group_members(&state.gid).await {
            Ok(members) => members,
            Err(e) if e.is_not_found() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };
        if !members.iter().any(|m| m.uid == state.uid) {
            return Ok(gone(KIND, &id));
        }

        state.id = Some(id);
        encode(&state)
    }

    /// Both attributes force a new membership, so only the identity is refreshed.
    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let state: MembershipState = decode(KIND, planned)?;
        let id = state.identity();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state = decode::<MembershipState>(KIND, current)?.resolve()?;
        deleted(
            KIND,
            &state.identity(),
            ctx.client
                .iam()
                .remove_group_member(&state.gid, &state.uid)
                .await,
        )
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let parts = split_id(KIND, id, '/', 2)?;
        let state = MembershipState {
            id: Some(id.to_string()),
            gid: parts[0].to_string(),
            uid: parts[1].to_string(),
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::{assert_gone, FakeCluster};
    use serde_json::json;
    use std::sync::Arc;

    fn cluster() -> Arc<FakeCluster> {
        let fake = Arc::new(FakeCluster::new());
        fake.insert("/acs/api/v1/groups/ops", json!({"gid": "ops", "description": "Ops"}));
        fake.insert("/acs/api/v1/users/alice", json!({"uid": "alice", "description": "Alice"}));
        fake
    }

    #[tokio::test]
    async fn test_membership_lifecycle() {
        let fake = cluster();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamGroupUser
            .create(&ctx, json!({"gid": "ops", "uid": "alice"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "ops/alice");

        IamGroupUser.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&IamGroupUser.read(&ctx, state.clone()).await.unwrap());
        IamGroupUser.delete(&ctx, state).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_of_deleted_group_clears_identity() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = IamGroupUser
            .read(&ctx, json!({"id": "ops/alice", "gid": "ops", "uid": "alice"}))
            .await
            .unwrap();
        assert_gone(&state);
    }

    #[tokio::test]
    async fn test_read_and_delete_with_only_id() {
        let fake = cluster();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());
        IamGroupUser
            .create(&ctx, json!({"gid": "ops", "uid": "alice"}))
            .await
            .unwrap();

        let state = IamGroupUser.read(&ctx, json!({"id": "ops/alice"})).await.unwrap();
        assert_eq!(state["gid"], "ops");
        assert_eq!(state["uid"], "alice");

        IamGroupUser.delete(&ctx, json!({"id": "ops/alice"})).await.unwrap();
        assert_gone(&IamGroupUser.read(&ctx, json!({"id": "ops/alice"})).await.unwrap());
        IamGroupUser.delete(&ctx, json!({"id": "ops/alice"})).await.unwrap();
    }

    #[tokio::test]
    async fn test_import_splits_identity() {
        let fake = cluster();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());
        IamGroupUser
            .create(&ctx, json!({"gid": "ops", "uid": "alice"}))
            .await
            .unwrap();

        let state = IamGroupUser.import(&ctx, "ops/alice").await.unwrap();
        assert_eq!(state["gid"], "ops");
        assert_eq!(state["uid"], "alice");

        let err = IamGroupUser.import(&ctx, "ops").await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
