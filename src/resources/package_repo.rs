//! `dcos_package_repo`: a package repository registered with Cosmos.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

const KIND: &str = "dcos_package_repo";

/// Handler for `dcos_package_repo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageRepo;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RepoState {
    id: Option<String>,
    name: String,
    url: String,
    index: Option<i64>,
}

impl RepoState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.name)
    }
}

#[async_trait]
impl Resource for PackageRepo {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A Cosmos package repository")
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "url",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Repository URI"),
            )
            .with_attribute(
                "index",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_force_new()
                    .with_description("Position in the repository list; appended when unset"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: RepoState = decode(KIND, planned)?;
        ctx.client
            .packages()
            .add_repository(&state.name, &state.url, state.index)
            .await?;

        state.id = Some(state.name.clone());
        let id = state.name.clone();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: RepoState = decode(KIND, current)?;
        let id = state.identity().to_string();

        let repositories = ctx.client.packages().list_repositories().await?;
        let Some((index, repo)) = repositories
            .into_iter()
            .enumerate()
            .find(|(_, r)| r.name == id)
        else {
            return Ok(gone(KIND, &id));
        };

        state.id = Some(id);
        state.name = repo.name;
        state.url = repo.uri;
        state.index = i64::try_from(index).ok();
        encode(&state)
    }

    /// Every attribute forces a new repository; nothing to send.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: RepoState = decode(KIND, prior)?;
        let mut state: RepoState = decode(KIND, planned)?;
        let id = prior.identity().to_string();
        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: RepoState = decode(KIND, current)?;
        let id = state.identity();
        deleted(KIND, id, ctx.client.packages().delete_repository(id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = RepoState {
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
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_index_places_repository() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let universe = PackageRepo
            .create(
                &ctx,
                json!({"name": "Universe", "url": "https://universe.mesosphere.com/repo"}),
            )
            .await
            .unwrap();
        assert_eq!(universe["index"], 0);

        let local = PackageRepo
            .create(
                &ctx,
                json!({"name": "local", "url": "http://repo.internal/repo", "index": 0}),
            )
            .await
            .unwrap();
        assert_eq!(local["index"], 0);
        assert_eq!(PackageRepo.read(&ctx, universe).await.unwrap()["index"], 1);
    }

    #[tokio::test]
    async fn test_removed_repository_reads_as_gone() {
        let fake = Arc::new(FakeCluster::new());
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(fake, dir.path());

        let state = PackageRepo
            .create(&ctx, json!({"name": "local", "url": "http://repo.internal/repo"}))
            .await
            .unwrap();
        PackageRepo.delete(&ctx, state.clone()).await.unwrap();
        PackageRepo.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&PackageRepo.read(&ctx, state).await.unwrap());
    }
}
