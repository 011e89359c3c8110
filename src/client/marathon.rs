//! Marathon application lookups.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{ClientError, DcosClient};

/// A Marathon application as returned by `GET /v2/apps/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarathonApp {
    /// App id, absolute.
    #[serde(default)]
    pub id: String,
    /// Deployed version timestamp.
    #[serde(default)]
    pub version: String,
    /// Shell command.
    #[serde(default)]
    pub cmd: Option<String>,
    /// Requested instance count.
    #[serde(default)]
    pub instances: i64,
    /// CPU shares per instance.
    #[serde(default)]
    pub cpus: f64,
    /// Memory in MiB per instance.
    #[serde(default)]
    pub mem: f64,
    /// Disk in MiB per instance.
    #[serde(default)]
    pub disk: f64,
    /// Container settings.
    #[serde(default)]
    pub container: Option<AppContainer>,
    /// Labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Environment; values are strings or secret references.
    #[serde(default)]
    pub env: BTreeMap<String, serde_json::Value>,
    /// Running tasks.
    #[serde(default)]
    pub tasks_running: i64,
    /// Healthy tasks.
    #[serde(default)]
    pub tasks_healthy: i64,
}

impl MarathonApp {
    /// Image of the app's Docker container, if it has one.
    pub fn docker_image(&self) -> Option<&str> {
        self.container
            .as_ref()
            .and_then(|c| c.docker.as_ref())
            .map(|d| d.image.as_str())
    }
}

/// Container section of an app.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppContainer {
    /// Docker settings.
    #[serde(default)]
    pub docker: Option<AppDocker>,
}

/// Docker section of an app container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppDocker {
    /// Image reference.
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Deserialize)]
struct AppEnvelope {
    app: MarathonApp,
}

/// Marathon calls.
pub struct MarathonApi<'a> {
    client: &'a DcosClient,
}

impl<'a> MarathonApi<'a> {
    pub(crate) fn new(client: &'a DcosClient) -> Self {
        Self { client }
    }

    /// Fetch an app by id; a leading `/` is optional.
    pub async fn get_app(&self, id: &str) -> Result<MarathonApp, ClientError> {
        let mut segments = vec!["marathon", "v2", "apps"];
        segments.extend(id.split('/').filter(|s| !s.is_empty()));
        let envelope: AppEnvelope = self.client.get_json(self.client.url(&segments)?).await?;
        Ok(envelope.app)
    }
}
