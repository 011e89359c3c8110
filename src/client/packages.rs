//! Cosmos API: package installation, service lifecycle and repositories.
//!
//! Every Cosmos call is a POST with versioned `application/vnd.dcos.*`
//! media types.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientError, DcosClient, MediaType};

/// Request to install a package as a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstall {
    /// Package name in the catalog.
    pub package_name: String,
    /// Version to install; latest when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    /// Service options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    /// Marathon app id of the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// Result of an installation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallResult {
    /// Installed package name.
    #[serde(default)]
    pub package_name: String,
    /// Installed version.
    #[serde(default)]
    pub package_version: String,
    /// App id of the service.
    #[serde(default)]
    pub app_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PackageUninstall<'a> {
    package_name: &'a str,
    app_id: &'a str,
}

/// A catalog entry as returned by describe calls.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageDefinition {
    /// Package name.
    #[serde(default)]
    pub name: String,
    /// Package version.
    #[serde(default)]
    pub version: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A running service installed from a package.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    /// The package the service runs.
    pub package: PackageDefinition,
    /// Options the user supplied.
    #[serde(default)]
    pub user_provided_options: Option<serde_json::Value>,
    /// Options after defaults were applied.
    #[serde(default)]
    pub resolved_options: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDescribe<'a> {
    app_id: &'a str,
}

/// Request to reconfigure or upgrade a running service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    /// App id of the service.
    pub app_id: String,
    /// New options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
    /// Version to move to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    /// Replace the options rather than merging them.
    pub replace: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PackageDescribe<'a> {
    package_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_version: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PackageDescribeResponse {
    package: PackageDefinition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListVersions<'a> {
    package_name: &'a str,
    include_package_versions: bool,
}

#[derive(Debug, Deserialize)]
struct ListVersionsResponse {
    #[serde(default)]
    results: BTreeMap<String, String>,
}

/// A package repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRepository {
    /// Repository name.
    pub name: String,
    /// Repository URI.
    pub uri: String,
}

#[derive(Debug, Serialize)]
struct RepositoryAdd<'a> {
    name: &'a str,
    uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RepositoryDelete<'a> {
    name: &'a str,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryList {
    #[serde(default)]
    repositories: Vec<PackageRepository>,
}

/// Cosmos calls.
pub struct PackagesApi<'a> {
    client: &'a DcosClient,
}

impl<'a> PackagesApi<'a> {
    pub(crate) fn new(client: &'a DcosClient) -> Self {
        Self { client }
    }

    /// Install a package.
    pub async fn install(&self, install: &PackageInstall) -> Result<PackageInstallResult, ClientError> {
        let url = self.client.url(&["package", "install"])?;
        let media = MediaType::cosmos("package", "install", "v1", "v2");
        self.client
            .send_json(Method::POST, url, install, Some(media))
            .await
    }

    /// Uninstall the service `app_id` of `package_name`.
    pub async fn uninstall(&self, package_name: &str, app_id: &str) -> Result<(), ClientError> {
        let url = self.client.url(&["package", "uninstall"])?;
        let media = MediaType::cosmos("package", "uninstall", "v1", "v1");
        let body = PackageUninstall {
            package_name,
            app_id,
        };
        self.client
            .send(Method::POST, url, Some(&body), Some(media))
            .await
            .map(drop)
    }

    /// Describe the running service `app_id`.
    pub async fn describe_service(&self, app_id: &str) -> Result<ServiceDescription, ClientError> {
        let url = self.client.url(&["cosmos", "service", "describe"])?;
        let media = MediaType::cosmos("service", "describe", "v1", "v1");
        self.client
            .send_json(Method::POST, url, &ServiceDescribe { app_id }, Some(media))
            .await
    }

    /// Reconfigure or upgrade a running service.
    pub async fn update_service(&self, update: &ServiceUpdate) -> Result<(), ClientError> {
        let url = self.client.url(&["cosmos", "service", "update"])?;
        let media = MediaType::cosmos("service", "update", "v1", "v1");
        self.client
            .send(Method::POST, url, Some(update), Some(media))
            .await
            .map(drop)
    }

    /// Describe a catalog package; latest version when `version` is `None`.
    pub async fn describe_package(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageDefinition, ClientError> {
        let url = self.client.url(&["package", "describe"])?;
        let media = MediaType::cosmos("package", "describe", "v1", "v3");
        let body = PackageDescribe {
            package_name: name,
            package_version: version,
        };
        let described: PackageDescribeResponse = self
            .client
            .send_json(Method::POST, url, &body, Some(media))
            .await?;
        Ok(described.package)
    }

    /// All catalog versions of a package.
    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>, ClientError> {
        let url = self.client.url(&["package", "list-versions"])?;
        let media = MediaType::cosmos("package", "list-versions", "v1", "v1");
        let body = ListVersions {
            package_name: name,
            include_package_versions: true,
        };
        let versions: ListVersionsResponse = self
            .client
            .send_json(Method::POST, url, &body, Some(media))
            .await?;
        Ok(versions.results.into_keys().collect())
    }

    /// Register a package repository.
    pub async fn add_repository(
        &self,
        name: &str,
        uri: &str,
        index: Option<i64>,
    ) -> Result<(), ClientError> {
        let url = self.client.url(&["package", "repository", "add"])?;
        let media = MediaType::cosmos("package", "repository.add", "v1", "v1");
        let body = RepositoryAdd { name, uri, index };
        self.client
            .send(Method::POST, url, Some(&body), Some(media))
            .await
            .map(drop)
    }

    /// List package repositories in priority order.
    pub async fn list_repositories(&self) -> Result<Vec<PackageRepository>, ClientError> {
        let url = self.client.url(&["package", "repository", "list"])?;
        let media = MediaType::cosmos("package", "repository.list", "v1", "v1");
        let list: RepositoryList = self
            .client
            .send_json(Method::POST, url, &serde_json::json!({}), Some(media))
            .await?;
        Ok(list.repositories)
    }

    /// Remove a package repository.
    pub async fn delete_repository(&self, name: &str) -> Result<(), ClientError> {
        let url = self.client.url(&["package", "repository", "delete"])?;
        let media = MediaType::cosmos("package", "repository.delete", "v1", "v1");
        self.client
            .send(Method::POST, url, Some(&RepositoryDelete { name }), Some(media))
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::testing::FakeCluster;
    use std::sync::Arc;

    fn client() -> (Arc<FakeCluster>, DcosClient) {
        let fake = Arc::new(FakeCluster::new().with_package("hello-world", &["2.1.0", "2.2.0"]));
        let client =
            DcosClient::with_transport(ClusterConfig::new("https://cluster"), fake.clone())
                .unwrap();
        (fake, client)
    }

    #[tokio::test]
    async fn test_install_uses_cosmos_media_types() {
        let (fake, client) = client();
        let result = client
            .packages()
            .install(&PackageInstall {
                package_name: "hello-world".into(),
                app_id: Some("/hello".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.package_version, "2.2.0");

        let requests = fake.requests();
        assert_eq!(
            requests[0].header("content-type"),
            Some("application/vnd.dcos.package.install-request+json;charset=utf-8;version=v1")
        );
        assert_eq!(
            requests[0].header("accept"),
            Some("application/vnd.dcos.package.install-response+json;charset=utf-8;version=v2")
        );
    }

    #[tokio::test]
    async fn test_describe_unknown_service_is_absent() {
        let (_, client) = client();
        let err = client
            .packages()
            .describe_service("/missing")
            .await
            .unwrap_err();
        assert!(err.is_absent());
    }

    #[tokio::test]
    async fn test_list_versions() {
        let (_, client) = client();
        let versions = client.packages().list_versions("hello-world").await.unwrap();
        assert_eq!(versions, vec!["2.1.0".to_string(), "2.2.0".to_string()]);
    }

    #[tokio::test]
    async fn test_repositories() {
        let (_, client) = client();
        let packages = client.packages();
        packages
            .add_repository("universe", "https://universe.example/repo", None)
            .await
            .unwrap();
        assert_eq!(packages.list_repositories().await.unwrap().len(), 1);
        packages.delete_repository("universe").await.unwrap();
        assert!(packages.list_repositories().await.unwrap().is_empty());
    }
}
