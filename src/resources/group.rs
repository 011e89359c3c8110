//! `dcos_iam_group`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::client::iam::IamGroupUpdate;
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_iam_group";

/// Handler for `dcos_iam_group`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IamGroup;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GroupState {
    id: Option<String>,
    gid: String,
    description: String,
}

impl GroupState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.gid)
    }
}

#[async_trait]
impl Resource for IamGroup {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A DC/OS IAM group")
            .with_attribute("gid", Attribute::required_string().with_force_new())
            .with_attribute("description", Attribute::required_string())
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: GroupState = decode(KIND, planned)?;
        let body = IamGroupUpdate {
            description: state.description.clone(),
        };
        ctx.client.iam().create_group(&state.gid, &body).await?;

        state.id = Some(state.gid.clone());
        let gid = state.gid.clone();
        present(KIND, &gid, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: GroupState = decode(KIND, current)?;
        let id = state.identity().to_string();

        let group = match ctx.client.iam().get_group(&id).await {
            Ok(group) => group,
            Err(e) if e.is_not_found() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };

        state.id = Some(id.clone());
        state.gid = if group.gid.is_empty() { id } else { group.gid };
        state.description = group.description;
        encode(&state)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: GroupState = decode(KIND, prior)?;
        let mut state: GroupState = decode(KIND, planned)?;
        let id = prior.identity().to_string();

        if state.description != prior.description {
            let body = IamGroupUpdate {
                description: state.description.clone(),
            };
            ctx.client.iam().update_group(&id, &body).await?;
        }

        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: GroupState = decode(KIND, current)?;
        let id = state.identity();
        deleted(KIND, id, ctx.client.iam().delete_group(id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = GroupState {
            id: Some(id.to_string()),
            gid: id.to_string(),
            ..Default::default()
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}
