//! Provider configuration and the local DC/OS CLI cluster store.
//!
//! The host sends the provider block as JSON; [`ProviderConfig`] decodes it
//! and decides whether a login is needed. When no `dcos_url` is given the
//! cluster attached in the local DC/OS CLI configuration is used instead
//! (see [`ClusterStore`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ProviderError;

/// Environment variable overriding the DC/OS CLI configuration directory.
pub const DCOS_DIR_ENV: &str = "DCOS_DIR";

/// Name of the marker file flagging the attached cluster.
const ATTACHED_MARKER: &str = "attached";

/// Name of the per-cluster configuration file.
const CLUSTER_CONFIG_FILE: &str = "dcos.toml";

/// How the client verifies the cluster's TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Verify against the system roots.
    #[default]
    Verify,
    /// Accept any certificate.
    Insecure,
    /// Verify against the CA bundle at this path.
    CaFile(PathBuf),
}

impl TlsMode {
    /// Interpret the CLI's `core.ssl_verify` setting.
    pub fn from_cli_setting(value: &str) -> Self {
        match value.trim() {
            "" | "true" | "True" => Self::Verify,
            "false" | "False" => Self::Insecure,
            path => Self::CaFile(PathBuf::from(path)),
        }
    }

    /// Render back into the CLI's `core.ssl_verify` setting.
    pub fn to_cli_setting(&self) -> String {
        match self {
            Self::Verify => "true".to_string(),
            Self::Insecure => "false".to_string(),
            Self::CaFile(path) => path.display().to_string(),
        }
    }
}

/// Everything the client needs to reach a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Cluster display name.
    pub name: Option<String>,
    /// Base URL of the cluster, e.g. `https://dcos.example.com`.
    pub url: String,
    /// ACS token used for authenticated calls.
    pub acs_token: Option<String>,
    /// TLS verification mode.
    pub tls: TlsMode,
}

impl ClusterConfig {
    /// A configuration for the given URL with verification on and no token.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            acs_token: None,
            tls: TlsMode::Verify,
        }
    }

    /// Set the ACS token.
    pub fn with_acs_token(mut self, token: impl Into<String>) -> Self {
        self.acs_token = Some(token.into());
        self
    }

    /// Set the cluster name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The provider block as sent by the host.
///
/// Empty strings count as unset: hosts commonly send declared defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// ACS token to log in with.
    pub dcos_acs_token: Option<String>,
    /// Verify the cluster's TLS certificate.
    pub ssl_verify: Option<bool>,
    /// URL of the cluster.
    pub dcos_url: Option<String>,
    /// Cluster name override.
    pub cluster: Option<String>,
    /// User to log in as.
    pub user: Option<String>,
    /// Password to log in with.
    pub password: Option<String>,
    /// DC/OS CLI version for the sandbox.
    pub cli_version: Option<String>,
}

/// Secret presented at login.
#[derive(Clone, PartialEq, Eq)]
pub enum LoginSecret {
    /// Log in with a password.
    Password(String),
    /// Exchange an existing ACS token.
    Token(String),
}

impl std::fmt::Debug for LoginSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
        }
    }
}

/// A login the configurator must perform before the client is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    /// Login user id.
    pub uid: String,
    /// Password or token.
    pub secret: LoginSecret,
}

/// Where the cluster connection comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterSource {
    /// Explicit URL with the login to perform.
    Explicit {
        /// Cluster URL.
        url: String,
        /// Credentials for the login call.
        login: LoginCredentials,
    },
    /// Whatever cluster the local CLI configuration has attached.
    LocalDefault,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ProviderConfig {
    /// Decode the provider block; `null` yields the default configuration.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Configuration(format!("invalid provider block: {}", e)))
    }

    /// Decide where the cluster comes from, enforcing the credential rules.
    ///
    /// This never touches the network.
    pub fn source(&self) -> Result<ClusterSource, ProviderError> {
        let Some(url) = non_empty(&self.dcos_url) else {
            return Ok(ClusterSource::LocalDefault);
        };

        let uid = non_empty(&self.user)
            .ok_or_else(|| ProviderError::Configuration("Missing required 'user' field".into()))?;

        let secret = match (non_empty(&self.dcos_acs_token), non_empty(&self.password)) {
            (Some(token), _) => LoginSecret::Token(token.to_string()),
            (None, Some(password)) => LoginSecret::Password(password.to_string()),
            (None, None) => {
                return Err(ProviderError::Configuration(
                    "You must either provide a 'dcos_acs_token' or a 'password' field".into(),
                ))
            },
        };

        Ok(ClusterSource::Explicit {
            url: url.to_string(),
            login: LoginCredentials {
                uid: uid.to_string(),
                secret,
            },
        })
    }

    /// TLS verification is on unless `ssl_verify` is explicitly false.
    pub fn verify_tls(&self) -> bool {
        self.ssl_verify.unwrap_or(true)
    }

    /// Cluster name override.
    pub fn cluster_name(&self) -> Option<&str> {
        non_empty(&self.cluster)
    }

    /// Requested CLI version.
    pub fn cli_version(&self) -> Option<&str> {
        non_empty(&self.cli_version)
    }
}

/// Errors reading or writing the local DC/OS CLI configuration.
#[derive(Debug, Error)]
pub enum ClusterConfigError {
    /// Neither `DCOS_DIR` nor a home directory is available.
    #[error("no DC/OS configuration directory (set DCOS_DIR or HOME)")]
    NoConfigDir,

    /// No cluster is attached.
    #[error("no cluster is attached in {0}")]
    NoAttachedCluster(PathBuf),

    /// The attached cluster has no `core.dcos_url`.
    #[error("{0} has no core.dcos_url")]
    MissingUrl(PathBuf),

    /// Filesystem failure.
    #[error("{path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("{path}: {source}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// The configuration could not be rendered.
    #[error("unable to render cluster configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CliConfigFile {
    #[serde(default)]
    core: CoreSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterSection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CoreSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dcos_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dcos_acs_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ssl_verify: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClusterSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

/// The DC/OS CLI configuration directory (`~/.dcos` by default).
///
/// Layout: `clusters/<id>/dcos.toml`, with an empty `attached` file next to
/// the configuration of the current cluster. A top-level `dcos.toml` from
/// older CLI versions is used when no cluster directory is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStore {
    dir: PathBuf,
}

impl ClusterStore {
    /// Open the store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open the store from `DCOS_DIR`, falling back to `~/.dcos`.
    pub fn from_env() -> Result<Self, ClusterConfigError> {
        if let Some(dir) = std::env::var_os(DCOS_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(dir));
        }
        dirs::home_dir()
            .map(|home| Self::new(home.join(".dcos")))
            .ok_or(ClusterConfigError::NoConfigDir)
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the attached cluster.
    pub fn current(&self) -> Result<ClusterConfig, ClusterConfigError> {
        if let Some(cluster_dir) = self.attached_cluster_dir()? {
            return load_cluster_file(&cluster_dir.join(CLUSTER_CONFIG_FILE));
        }

        let legacy = self.dir.join(CLUSTER_CONFIG_FILE);
        if legacy.is_file() {
            return load_cluster_file(&legacy);
        }

        Err(ClusterConfigError::NoAttachedCluster(self.dir.clone()))
    }

    /// Write `config` as cluster `id` and mark it attached, detaching others.
    pub fn attach(&self, id: &str, config: &ClusterConfig) -> Result<PathBuf, ClusterConfigError> {
        let clusters = self.dir.join("clusters");
        if clusters.is_dir() {
            for entry in read_dir(&clusters)? {
                let marker = entry.join(ATTACHED_MARKER);
                if marker.exists() {
                    std::fs::remove_file(&marker).map_err(|source| ClusterConfigError::Io {
                        path: marker.clone(),
                        source,
                    })?;
                }
            }
        }

        let cluster_dir = clusters.join(id);
        std::fs::create_dir_all(&cluster_dir).map_err(|source| ClusterConfigError::Io {
            path: cluster_dir.clone(),
            source,
        })?;

        let file = CliConfigFile {
            core: CoreSection {
                dcos_url: Some(config.url.clone()),
                dcos_acs_token: config.acs_token.clone(),
                ssl_verify: Some(config.tls.to_cli_setting()),
            },
            cluster: config.name.clone().map(|name| ClusterSection { name: Some(name) }),
        };
        let path = cluster_dir.join(CLUSTER_CONFIG_FILE);
        write_file(&path, toml::to_string(&file)?.as_bytes())?;
        write_file(&cluster_dir.join(ATTACHED_MARKER), b"")?;

        Ok(path)
    }

    fn attached_cluster_dir(&self) -> Result<Option<PathBuf>, ClusterConfigError> {
        let clusters = self.dir.join("clusters");
        if !clusters.is_dir() {
            return Ok(None);
        }
        Ok(read_dir(&clusters)?
            .into_iter()
            .find(|dir| dir.join(ATTACHED_MARKER).is_file()))
    }
}

fn read_dir(path: &Path) -> Result<Vec<PathBuf>, ClusterConfigError> {
    let io_err = |source| ClusterConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ClusterConfigError> {
    std::fs::write(path, contents).map_err(|source| ClusterConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_cluster_file(path: &Path) -> Result<ClusterConfig, ClusterConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ClusterConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: CliConfigFile = toml::from_str(&raw).map_err(|source| ClusterConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let url = file
        .core
        .dcos_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ClusterConfigError::MissingUrl(path.to_path_buf()))?;

    Ok(ClusterConfig {
        name: file.cluster.and_then(|c| c.name),
        url,
        acs_token: file.core.dcos_acs_token.filter(|t| !t.is_empty()),
        tls: file
            .core
            .ssl_verify
            .as_deref()
            .map(TlsMode::from_cli_setting)
            .unwrap_or_default(),
    })
}
