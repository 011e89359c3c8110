//! `dcos_package`: a catalog package installed as a service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{decode, deleted, encode, gone, present, resource_schema, Resource};
use crate::client::packages::{PackageInstall, ServiceUpdate};
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_package";

/// Handler for `dcos_package`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Package;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PackageState {
    id: Option<String>,
    app_id: String,
    package_name: String,
    package_version: Option<String>,
    config_json: Option<String>,
}

impl PackageState {
    fn identity(&self) -> &str {
        self.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.app_id)
    }

    /// Parsed `config_json`; `None` when unset or blank.
    fn options(&self) -> Result<Option<Value>, ProviderError> {
        match self.config_json.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => serde_json::from_str(text).map(Some).map_err(|e| {
                ProviderError::Validation(format!("config_json is not valid JSON: {}", e))
            }),
        }
    }

    fn version(&self) -> Option<String> {
        self.package_version.clone().filter(|v| !v.is_empty())
    }
}

fn is_empty_options(options: &Value) -> bool {
    match options {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[async_trait]
impl Resource for Package {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "A DC/OS catalog package installed as a service")
            .with_attribute(
                "app_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Marathon app id of the installed service"),
            )
            .with_attribute("package_name", Attribute::required_string().with_force_new())
            .with_attribute(
                "package_version",
                Attribute::optional_computed_string()
                    .with_description("Catalog version; the latest one when unset"),
            )
            .with_attribute(
                "config_json",
                Attribute::optional_string().with_description("Service options as a JSON document"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: PackageState = decode(KIND, planned)?;
        let install = PackageInstall {
            package_name: state.package_name.clone(),
            package_version: state.version(),
            options: state.options()?,
            app_id: Some(state.app_id.clone()),
        };
        let installed = ctx.client.packages().install(&install).await?;

        state.package_version = Some(installed.package_version);
        state.id = Some(state.app_id.clone());
        let id = state.app_id.clone();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: PackageState = decode(KIND, current)?;
        let id = state.identity().to_string();

        let service = match ctx.client.packages().describe_service(&id).await {
            Ok(service) => service,
            Err(e) if e.is_absent() => return Ok(gone(KIND, &id)),
            Err(e) => return Err(e.into()),
        };

        let remote = service.user_provided_options.unwrap_or(Value::Null);
        let local = state.options()?.unwrap_or(Value::Null);
        if remote != local && !(is_empty_options(&remote) && is_empty_options(&local)) {
            state.config_json = Some(remote.to_string());
        }

        state.id = Some(id.clone());
        state.app_id = id;
        state.package_name = service.package.name;
        state.package_version = Some(service.package.version);
        encode(&state)
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: PackageState = decode(KIND, prior)?;
        let mut state: PackageState = decode(KIND, planned)?;
        let id = prior.identity().to_string();

        let options = state.options()?;
        let version_changed = state.version().is_some() && state.version() != prior.version();
        if version_changed || options != prior.options().ok().flatten() {
            let update = ServiceUpdate {
                app_id: id.clone(),
                options: Some(options.unwrap_or_else(|| Value::Object(Default::default()))),
                package_version: state.version().filter(|_| version_changed),
                replace: true,
            };
            ctx.client.packages().update_service(&update).await?;
        }

        state.id = Some(id.clone());
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: PackageState = decode(KIND, current)?;
        let id = state.identity();
        let packages = ctx.client.packages();

        // Uninstall needs the package name, which id-only state lacks.
        let package_name = if state.package_name.is_empty() {
            match packages.describe_service(id).await {
                Ok(service) => service.package.name,
                Err(e) if e.is_absent() => {
                    info!(resource_type = KIND, id, "already deleted");
                    return Ok(());
                },
                Err(e) => return Err(e.into()),
            }
        } else {
            state.package_name.clone()
        };
        deleted(KIND, id, packages.uninstall(&package_name, id).await)
    }

    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let state = PackageState {
            id: Some(id.to_string()),
            app_id: id.to_string(),
            ..Default::default()
        };
        present(KIND, id, self.read(ctx, encode(&state)?).await?)
    }
}
