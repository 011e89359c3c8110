//! `dcos_cli`: shell commands run against the cluster through the sandboxed
//! DC/OS CLI.
//!
//! The commands run with `sh -c`, the sandbox's `dcos` binary first on
//! `PATH` and `DCOS_DIR` pointing at the sandbox configuration, so a plain
//! `dcos ...` inside a command always targets the configured cluster.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::{decode, encode, gone, present, resource_schema, Resource};
use crate::cli::CliError;
use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};

const KIND: &str = "dcos_cli";

/// Handler for `dcos_cli`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliCommand;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CommandState {
    id: Option<String>,
    create_command: String,
    read_command: Option<String>,
    update_command: Option<String>,
    delete_command: Option<String>,
    env: Option<BTreeMap<String, String>>,
    output: Option<String>,
}

impl CommandState {
    fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn env(&self) -> BTreeMap<String, String> {
        self.env.clone().unwrap_or_default()
    }
}

fn command(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|c| !c.trim().is_empty())
}

#[async_trait]
impl Resource for CliCommand {
    fn name(&self) -> &'static str {
        KIND
    }

    fn schema(&self) -> Schema {
        resource_schema(0, "Commands run with the sandboxed DC/OS CLI")
            .with_attribute(
                "create_command",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Run once on create"),
            )
            .with_attribute(
                "read_command",
                Attribute::optional_string()
                    .with_description("Run on every refresh; a failure means the entity is gone"),
            )
            .with_attribute(
                "update_command",
                Attribute::optional_string().with_description("Run when the resource changes"),
            )
            .with_attribute(
                "delete_command",
                Attribute::optional_string().with_description("Run on destroy"),
            )
            .with_attribute("env", Attribute::optional_string_map())
            .with_attribute(
                "output",
                Attribute::computed_string()
                    .with_description("Standard output of the last command that ran"),
            )
    }

    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let mut state: CommandState = decode(KIND, planned)?;
        let output = ctx.cli.run_shell(&state.create_command, &state.env()).await?;

        state.id = Some(Uuid::new_v4().to_string());
        state.output = Some(output);
        if command(&state.read_command).is_none() {
            return encode(&state);
        }
        let id = state.identity().to_string();
        present(KIND, &id, self.read(ctx, encode(&state)?).await?)
    }

    async fn read(&self, ctx: &ProviderContext, current: Value) -> Result<Value, ProviderError> {
        let mut state: CommandState = decode(KIND, current)?;
        let Some(read) = command(&state.read_command) else {
            return encode(&state);
        };

        match ctx.cli.run_shell(read, &state.env()).await {
            Ok(output) => {
                state.output = Some(output);
                encode(&state)
            },
            Err(CliError::Failed { code, .. }) => {
                info!(code, "read command failed");
                Ok(gone(KIND, state.identity()))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: CommandState = decode(KIND, prior)?;
        let mut state: CommandState = decode(KIND, planned)?;
        state.id = prior.id.clone();
        state.output = prior.output.clone();

        if let Some(update) = command(&state.update_command) {
            state.output = Some(ctx.cli.run_shell(update, &state.env()).await?);
        }
        self.read(ctx, encode(&state)?).await
    }

    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let state: CommandState = decode(KIND, current)?;
        if let Some(delete) = command(&state.delete_command) {
            ctx.cli.run_shell(delete, &state.env()).await?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::resources::test_support::context;
    use crate::testing::{assert_gone, FakeCluster};
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    fn sandboxed(dir: &std::path::Path) -> ProviderContext {
        let ctx = context(Arc::new(FakeCluster::new()), dir);
        let binary = ctx.cli.binary().to_path_buf();
        std::fs::write(&binary, "#!/bin/sh\necho \"dcos $*\"\n").unwrap();
        let mut perms = std::fs::metadata(&binary).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&binary, perms).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_create_runs_command_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = sandboxed(dir.path());

        let state = CliCommand
            .create(
                &ctx,
                json!({
                    "create_command": "dcos package install $PKG --yes",
                    "env": {"PKG": "kafka"}
                }),
            )
            .await
            .unwrap();

        assert_eq!(state["output"], "dcos package install kafka --yes");
        assert!(Uuid::parse_str(state["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_failing_read_command_clears_identity() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = sandboxed(dir.path());

        let state = CliCommand
            .create(
                &ctx,
                json!({
                    "create_command": "touch marker",
                    "read_command": "test -f marker && echo present",
                    "delete_command": "rm marker"
                }),
            )
            .await
            .unwrap();
        assert_eq!(state["output"], "present");

        CliCommand.delete(&ctx, state.clone()).await.unwrap();
        assert_gone(&CliCommand.read(&ctx, state).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_runs_update_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = sandboxed(dir.path());

        let state = CliCommand
            .create(&ctx, json!({"create_command": "echo created"}))
            .await
            .unwrap();
        let mut planned = state.clone();
        planned["update_command"] = json!("echo updated $MODE");
        planned["env"] = json!({"MODE": "fast"});

        let updated = CliCommand.update(&ctx, state.clone(), planned).await.unwrap();
        assert_eq!(updated["output"], "updated fast");
        assert_eq!(updated["id"], state["id"]);
    }

    #[tokio::test]
    async fn test_import_is_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = sandboxed(dir.path());
        let err = CliCommand.import(&ctx, "anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
    }
}
