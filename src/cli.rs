//! Sandboxed DC/OS CLI.
//!
//! The provider keeps a private CLI configuration so commands run by
//! `dcos_cli` resources talk to the configured cluster with the configured
//! token, regardless of what the user's own `~/.dcos` points at.
//!
//! Layout under the sandbox root:
//!
//! ```text
//! <root>/bin/dcos                              CLI binary, fetched on first use
//! <root>/dcos_dir/clusters/<id>/dcos.toml      cluster configuration
//! <root>/dcos_dir/clusters/<id>/attached       marks the cluster as current
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{ClusterConfig, ClusterConfigError, ClusterStore, DCOS_DIR_ENV};

/// Sandbox location, relative to the host's working directory.
pub const SANDBOX_DIR: &str = ".terraform/dcos/sandbox";

/// Release channel used when no CLI version is configured.
pub const LATEST_VERSION: &str = "latest";

const DOWNLOAD_BASE: &str = "https://downloads.dcos.io/cli/releases/binaries/dcos";

/// Errors from provisioning or running the sandboxed CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// No CLI build exists for this machine.
    #[error("no DC/OS CLI build for {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system.
        os: String,
        /// CPU architecture.
        arch: String,
    },

    /// A sandbox file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The sandbox cluster configuration could not be written.
    #[error("unable to configure sandbox cluster: {0}")]
    Config(#[from] ClusterConfigError),

    /// Fetching the CLI binary failed.
    #[error("unable to download the DC/OS CLI from {url}: {message}")]
    Download {
        /// Source URL.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// The command ran and exited unsuccessfully.
    #[error("command `{command}` failed with exit code {code}: {stderr}")]
    Failed {
        /// The command that ran.
        command: String,
        /// Exit code, `-1` when killed by a signal.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },
}

impl CliError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Handle on a provisioned CLI sandbox.
#[derive(Debug, Clone)]
pub struct CliWrapper {
    root: PathBuf,
    version: String,
    binary: PathBuf,
}

impl CliWrapper {
    /// Write the sandbox configuration for `cluster` under `root`.
    ///
    /// Only local files are touched; the binary is fetched on first use.
    pub fn provision(
        root: impl Into<PathBuf>,
        cluster: &ClusterConfig,
        version: Option<&str>,
    ) -> Result<Self, CliError> {
        let root = root.into();
        let bin_dir = root.join("bin");
        std::fs::create_dir_all(&bin_dir).map_err(|e| CliError::io(&bin_dir, e))?;

        let store = ClusterStore::new(root.join("dcos_dir"));
        let id = cluster_id(cluster);
        let config_path = store.attach(&id, cluster)?;
        debug!(path = %config_path.display(), "CLI sandbox configured");

        Ok(Self {
            binary: bin_dir.join(binary_name()),
            version: version
                .filter(|v| !v.is_empty())
                .unwrap_or(LATEST_VERSION)
                .to_string(),
            root,
        })
    }

    /// Use an existing binary instead of downloading one.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `DCOS_DIR` handed to the CLI.
    pub fn dcos_dir(&self) -> PathBuf {
        self.root.join("dcos_dir")
    }

    /// Path of the CLI binary.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Configured CLI version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Where the binary for this machine and version is published.
    pub fn download_url(&self) -> Result<String, CliError> {
        Ok(format!(
            "{}/{}/x86-64/{}/{}",
            DOWNLOAD_BASE,
            platform()?,
            self.version,
            binary_name()
        ))
    }

    /// Run the CLI binary with `args`.
    pub async fn exec(
        &self,
        args: &[&str],
        env: &BTreeMap<String, String>,
    ) -> Result<String, CliError> {
        self.ensure_binary().await?;
        let mut command = Command::new(&self.binary);
        command.args(args);
        self.run(command, format!("dcos {}", args.join(" ")), env)
            .await
    }

    /// Run `script` with `sh -c`, the CLI on `PATH` and the sandbox active.
    pub async fn run_shell(
        &self,
        script: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<String, CliError> {
        self.ensure_binary().await?;

        let mut paths = Vec::new();
        if let Some(dir) = self.binary.parent() {
            paths.push(dir.to_path_buf());
        }
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let path = std::env::join_paths(paths).map_err(|e| CliError::Io {
            path: self.binary.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;

        let mut command = Command::new("sh");
        command.arg("-c").arg(script).env("PATH", path);
        self.run(command, script.to_string(), env).await
    }

    async fn run(
        &self,
        mut command: Command,
        display: String,
        env: &BTreeMap<String, String>,
    ) -> Result<String, CliError> {
        command
            .env(DCOS_DIR_ENV, self.dcos_dir())
            .envs(env)
            .current_dir(&self.root)
            .kill_on_drop(true);

        debug!(root = %self.root.display(), "running sandboxed command");
        let output = command
            .output()
            .await
            .map_err(|e| CliError::io(&self.binary, e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(CliError::Failed {
                command: display,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn ensure_binary(&self) -> Result<(), CliError> {
        if self.binary.is_file() {
            return Ok(());
        }

        let url = self.download_url()?;
        info!(url = %url, "downloading DC/OS CLI");
        let download_err = |message: String| CliError::Download {
            url: url.clone(),
            message,
        };

        let response = reqwest::get(&url)
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_err(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        if let Some(dir) = self.binary.parent() {
            std::fs::create_dir_all(dir).map_err(|e| CliError::io(dir, e))?;
        }
        std::fs::write(&self.binary, &bytes).map_err(|e| CliError::io(&self.binary, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = std::fs::metadata(&self.binary)
                .map_err(|e| CliError::io(&self.binary, e))?
                .permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&self.binary, perms)
                .map_err(|e| CliError::io(&self.binary, e))?;
        }

        Ok(())
    }
}

/// Directory name for the sandboxed cluster: its name, else its host.
fn cluster_id(cluster: &ClusterConfig) -> String {
    let source = cluster.name.clone().unwrap_or_else(|| {
        reqwest::Url::parse(&cluster.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| cluster.url.clone())
    });

    let id: String = source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if id.is_empty() {
        "default".to_string()
    } else {
        id
    }
}

fn platform() -> Result<&'static str, CliError> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Ok("linux"),
        ("macos", "x86_64") | ("macos", "aarch64") => Ok("darwin"),
        ("windows", "x86_64") => Ok("windows"),
        (os, arch) => Err(CliError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

fn binary_name() -> &'static str {
    if cfg!(windows) {
        "dcos.exe"
    } else {
        "dcos"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsMode;

    fn cluster() -> ClusterConfig {
        ClusterConfig::new("https://cluster.example:8443")
            .with_acs_token("token-for-alice")
    }

    #[test]
    fn test_provision_attaches_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliWrapper::provision(dir.path(), &cluster(), None).unwrap();

        assert_eq!(cli.version(), LATEST_VERSION);
        let store = ClusterStore::new(cli.dcos_dir());
        let current = store.current().unwrap();
        assert_eq!(current.url, "https://cluster.example:8443");
        assert_eq!(current.acs_token.as_deref(), Some("token-for-alice"));
        assert_eq!(current.tls, TlsMode::Verify);
        assert!(cli
            .dcos_dir()
            .join("clusters/cluster.example/attached")
            .is_file());
    }

    #[test]
    fn test_cluster_name_selects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = cluster().with_name("prod west");
        let cli = CliWrapper::provision(dir.path(), &config, Some("1.13")).unwrap();

        assert_eq!(cli.version(), "1.13");
        assert!(cli.dcos_dir().join("clusters/prod-west/dcos.toml").is_file());
    }

    #[test]
    fn test_download_url() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliWrapper::provision(dir.path(), &cluster(), Some("2.0")).unwrap();
        if let Ok(url) = cli.download_url() {
            assert!(url.starts_with("https://downloads.dcos.io/cli/releases/binaries/dcos/"));
            assert!(url.contains("/x86-64/2.0/dcos"));
        }
    }

    #[cfg(unix)]
    fn fake_binary(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-dcos");
        std::fs::write(&path, "#!/bin/sh\necho \"dcos $* in $DCOS_DIR\"\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_sets_dcos_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliWrapper::provision(dir.path(), &cluster(), None).unwrap();
        let cli = cli.clone().with_binary(fake_binary(dir.path()));

        let out = cli
            .exec(&["package", "list"], &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(
            out,
            format!("dcos package list in {}", cli.dcos_dir().display())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_shell_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliWrapper::provision(dir.path(), &cluster(), None)
            .unwrap()
            .with_binary(fake_binary(dir.path()));

        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hello".to_string());
        let out = cli.run_shell("echo $GREETING", &env).await.unwrap();
        assert_eq!(out, "hello");

        let err = cli
            .run_shell("echo broken >&2; exit 3", &env)
            .await
            .unwrap_err();
        match err {
            CliError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
