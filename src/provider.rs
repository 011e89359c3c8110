//! The DC/OS provider: configuration and dispatch to handlers.
//!
//! [`DcosProvider`] implements [`ProviderService`]. `configure` turns the
//! provider block into a [`ProviderContext`] (an authenticated client and a
//! provisioned CLI sandbox); every resource and data source call then looks
//! up its handler by type name and runs it against that context.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cli::{CliWrapper, SANDBOX_DIR};
use crate::client::iam::IamLogin;
use crate::client::{DcosClient, Transport};
use crate::config::{
    ClusterConfig, ClusterSource, ClusterStore, LoginCredentials, LoginSecret, ProviderConfig,
    TlsMode,
};
use crate::data_sources::{self, DataSource};
use crate::error::ProviderError;
use crate::plan;
use crate::resources::{self, Resource};
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

/// What handlers work with once the provider is configured.
#[derive(Debug)]
pub struct ProviderContext {
    /// Authenticated REST client.
    pub client: DcosClient,
    /// CLI sandbox pointing at the same cluster.
    pub cli: CliWrapper,
}

impl ProviderContext {
    /// Bundle a client and its sandbox.
    pub fn new(client: DcosClient, cli: CliWrapper) -> Self {
        Self { client, cli }
    }
}

/// Schema of the `provider "dcos"` block.
pub fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_description("Connection to a DC/OS cluster")
        .with_attribute(
            "dcos_acs_token",
            Attribute::optional_string()
                .with_description("ACS token to log in with")
                .sensitive(),
        )
        .with_attribute(
            "ssl_verify",
            Attribute::optional_bool()
                .with_description("Verify the cluster's TLS certificate")
                .with_default(Value::Bool(true)),
        )
        .with_attribute(
            "dcos_url",
            Attribute::optional_string()
                .with_description("Cluster URL; the locally attached cluster when empty"),
        )
        .with_attribute(
            "cluster",
            Attribute::optional_string().with_description("Cluster name override"),
        )
        .with_attribute(
            "user",
            Attribute::optional_string().with_description("User to log in as"),
        )
        .with_attribute(
            "password",
            Attribute::optional_string()
                .with_description("Password to log in with")
                .sensitive(),
        )
        .with_attribute(
            "cli_version",
            Attribute::optional_string()
                .with_description("DC/OS CLI version used by dcos_cli resources")
                .with_force_new(),
        )
}

/// Provider serving every DC/OS resource and data source kind.
pub struct DcosProvider {
    context: RwLock<Option<Arc<ProviderContext>>>,
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
    transport: Option<Arc<dyn Transport>>,
    cluster_store: Option<ClusterStore>,
    sandbox: PathBuf,
}

impl Default for DcosProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DcosProvider {
    /// An unconfigured provider talking HTTPS, sandboxed under the host's
    /// working directory.
    pub fn new() -> Self {
        Self {
            context: RwLock::new(None),
            resources: resources::all().into_iter().map(|r| (r.name(), r)).collect(),
            data_sources: data_sources::all()
                .into_iter()
                .map(|d| (d.name(), d))
                .collect(),
            transport: None,
            cluster_store: None,
            sandbox: PathBuf::from(SANDBOX_DIR),
        }
    }

    /// Send every request through `transport` instead of HTTPS.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Read the locally attached cluster from `store` instead of
    /// `$DCOS_DIR` or `~/.dcos`.
    pub fn with_cluster_store(mut self, store: ClusterStore) -> Self {
        self.cluster_store = Some(store);
        self
    }

    /// Provision the CLI sandbox under `sandbox`.
    pub fn with_sandbox(mut self, sandbox: impl Into<PathBuf>) -> Self {
        self.sandbox = sandbox.into();
        self
    }

    /// The context built by the last successful `configure`.
    pub async fn context(&self) -> Result<Arc<ProviderContext>, ProviderError> {
        self.context.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    fn client(&self, cluster: ClusterConfig) -> Result<DcosClient, ProviderError> {
        let client = match &self.transport {
            Some(transport) => DcosClient::with_transport(cluster, transport.clone())?,
            None => DcosClient::new(cluster)?,
        };
        Ok(client)
    }

    async fn login(
        client: &DcosClient,
        credentials: &LoginCredentials,
    ) -> Result<String, ProviderError> {
        let (password, token) = match &credentials.secret {
            LoginSecret::Password(password) => (Some(password.clone()), None),
            LoginSecret::Token(token) => (None, Some(token.clone())),
        };
        let login = IamLogin {
            uid: credentials.uid.clone(),
            password,
            token,
        };
        let response = client.iam().login(&login).await.map_err(|e| {
            ProviderError::Authentication(format!("login as '{}' failed: {}", credentials.uid, e))
        })?;
        Ok(response.token)
    }

    /// Build the context for a provider block.
    async fn connect(&self, config: &ProviderConfig) -> Result<ProviderContext, ProviderError> {
        let source = config.source()?;
        let (mut cluster, credentials) = match source {
            ClusterSource::Explicit { url, login } => (ClusterConfig::new(url), Some(login)),
            ClusterSource::LocalDefault => {
                let store = match &self.cluster_store {
                    Some(store) => store.clone(),
                    None => ClusterStore::from_env()?,
                };
                let cluster = store.current()?;
                debug!(url = %cluster.url, "using locally attached cluster");
                (cluster, None)
            },
        };

        if !config.verify_tls() {
            cluster.tls = TlsMode::Insecure;
        }
        if let Some(name) = config.cluster_name() {
            cluster.name = Some(name.to_string());
        }

        let mut client = self.client(cluster)?;
        if let Some(credentials) = credentials {
            let token = Self::login(&client, &credentials).await?;
            client.set_acs_token(token);
            info!(uid = %credentials.uid, "logged in");
        }

        let cli = CliWrapper::provision(&self.sandbox, client.config(), config.cli_version())?;
        Ok(ProviderContext::new(client, cli))
    }
}

#[async_trait::async_trait]
impl ProviderService for DcosProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(provider_config_schema());
        let schema = self
            .resources
            .values()
            .fold(schema, |s, r| s.with_resource(r.name(), r.schema()));
        self.data_sources
            .values()
            .fold(schema, |s, d| s.with_data_source(d.name(), d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_config_schema(), &config);
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        let config = ProviderConfig::from_value(config)?;
        if let Err(e) = config.source() {
            diagnostics.push(Diagnostic::error(e.message()));
        }
        if !config.verify_tls() {
            diagnostics.push(
                Diagnostic::warning("TLS verification is disabled").with_attribute("ssl_verify"),
            );
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        let context = self.connect(&config).await?;
        info!(
            url = %context.client.config().url,
            cluster = ?context.client.config().name,
            "provider configured"
        );
        *self.context.write().await = Some(Arc::new(context));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.context.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.resource(resource_type)?.schema(), &config))
    }

    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.upgrade_state(version, state)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        Ok(plan::plan(&schema, prior_state.as_ref(), &proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.create(&ctx, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        if current_state.is_null() {
            return Ok(Value::Null);
        }
        let ctx = self.context().await?;
        resource.read(&ctx, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.update(&ctx, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        if current_state.is_null() {
            warn!(resource_type, "delete called without state");
            return Ok(());
        }
        let ctx = self.context().await?;
        resource.delete(&ctx, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        let state = resource.import(&ctx, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.data_source(data_source_type)?.schema(), &config))
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let ctx = self.context().await?;
        data_source.read(&ctx, config).await
    }
}
