//! `dcos_iam_saml_provider`: a SAML 2.0 identity provider for cluster login.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::client::iam::SamlProviderConfig;
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_iam_saml_provider";

/// Handler for `dcos_iam_saml_provider`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamlProvider;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SamlState {
    id: Option<String>,
    provider_id: String,
    description: String,
    idp_metadata: String,
    base_url: String,
    callback_url: Option<String>,
    metadata: Option<String>,
}

impl SamlState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.provider_id)
    }

    fn config(&self) -> SamlProviderConfig {
        SamlProviderConfig {
            description: self.description.clone(),
            idp_metadata: self.idp_metadata.clone(),
            sp_base_url: self.base_url.clone(),
        }
    }
}

#[async_trait]
impl Resource for SamlProvider {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A SAML identity provider")
            .with_attribute("provider_id", Attribute::required_string().with_force_new())
            .with_attribute("description", Attribute::required_string())
            .with_attribute(
                "idp_metadata",
                Attribute::required_string().with_description("Identity provider metadata XML"),
            )
            .with_attribute(
                "base_url",
                Attribute::required_string()
                    .with_description("Base URL the identity provider redirects back to"),
            )
            .with_attribute(
                "callback_url",
                Attribute::computed_string()
                    .with_description("Assertion consumer service URL to register with the IdP"),
            )
            .with_attribute(
                "metadata",
                Attribute::computed_string().with_description("Service provider metadata XML"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: SamlState = decode(KIND, planned)?;
        ctx.client
            .iam()
            .create_saml_provider(&state.provider_id, &state.config())
            .await?;

        state.id = Some(state.provider_id.clone());
        let id = state.provider_id.clone();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: SamlState = decode(KIND, current)?;
        let id = state.identity().to_string();
        let iam = ctx.client.iam();

        let config = match iam.get_saml_provider(&id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };
        let callback_url = iam.saml_callback_url(&id).await?;
        let metadata = iam.saml_sp_metadata(&id).await?;

        state.id = Some(id.clone());
        state.provider_id = id;
        state.description = config.description;
        state.idp_metadata = config.idp_metadata;
        state.base_url = config.sp_base_url;
        state.callback_url = Some(callback_url);
        state.metadata = Some(metadata);
        encode(&state)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: SamlState = decode(KIND, prior)?;
        let mut state: SamlState = decode(KIND, planned)?;
        let id = prior.identity().to_string();

        if state.config() != prior.config() {
            ctx.client
                .iam()
                .update_saml_provider(&id, &state.config())
                .await?;
        }

        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: SamlState = decode(KIND, current)?;
        let id = state.identity();
        deleted(KIND, id, ctx.client.iam().delete_saml_provider(id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = SamlState {
            id: Some(id.to_string()),
            provider_id: id.to_string(),
            ..Default::default()
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}
