//! Secret store API.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientError, DcosClient};

/// A secret value.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    /// The secret payload.
    #[serde(default)]
    pub value: String,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Secret store calls. Paths may contain `/` to address nested secrets.
pub struct SecretsApi<'a> {
    client: &'a DcosClient,
}

impl<'a> SecretsApi<'a> {
    pub(crate) fn new(client: &'a DcosClient) -> Self {
        Self { client }
    }

    fn url(&self, store: &str, path: &str) -> Result<reqwest::Url, ClientError> {
        let mut segments = vec!["secrets", "v1", "secret", store];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        self.client.url(&segments)
    }

    /// Create a secret.
    pub async fn create(&self, store: &str, path: &str, secret: &Secret) -> Result<(), ClientError> {
        let url = self.url(store, path)?;
        self.client
            .send(Method::PUT, url, Some(secret), None)
            .await
            .map(drop)
    }

    /// Fetch a secret.
    pub async fn get(&self, store: &str, path: &str) -> Result<Secret, ClientError> {
        self.client.get_json(self.url(store, path)?).await
    }

    /// Replace a secret's value.
    pub async fn update(&self, store: &str, path: &str, secret: &Secret) -> Result<(), ClientError> {
        let url = self.url(store, path)?;
        self.client
            .send(Method::PATCH, url, Some(secret), None)
            .await
            .map(drop)
    }

    /// Delete a secret.
    pub async fn delete(&self, store: &str, path: &str) -> Result<(), ClientError> {
        let url = self.url(store, path)?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }
}
