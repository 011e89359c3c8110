//! Cluster version metadata.

use serde::Deserialize;

use super::{ClientError, DcosClient};

/// Contents of `/dcos-metadata/dcos-version.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DcosVersion {
    /// Release version, e.g. `2.2.0`.
    #[serde(default)]
    pub version: String,
    /// `open` or `enterprise`.
    #[serde(default)]
    pub dcos_variant: String,
    /// Commit the image was built from.
    #[serde(default)]
    pub dcos_image_commit: String,
    /// Bootstrap id of the installation.
    #[serde(default)]
    pub bootstrap_id: String,
}

/// Metadata calls.
pub struct MetadataApi<'a> {
    client: &'a DcosClient,
}

impl<'a> MetadataApi<'a> {
    pub(crate) fn new(client: &'a DcosClient) -> Self {
        Self { client }
    }

    /// The cluster's version information.
    pub async fn version(&self) -> Result<DcosVersion, ClientError> {
        let url = self.client.url(&["dcos-metadata", "dcos-version.json"])?;
        self.client.get_json(url).await
    }
}
