//! External tools: `kubectl` and `docker`.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

use anyhow::{bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::FleetError;

/// `kubectl` bound to one context and namespace.
#[derive(Debug, Clone)]
pub struct Kubectl {
    context: Option<String>,
    namespace: String,
}

impl Kubectl {
    pub fn new(context: Option<String>, namespace: impl Into<String>) -> Self {
        Self {
            context,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new("kubectl");
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        cmd.arg("--namespace").arg(&self.namespace);
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run to completion and return stdout; non-zero exit is an error
    /// carrying stderr.
    pub async fn output<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args);
        debug!(command = ?cmd.as_std(), "running kubectl");
        let output = cmd.output().await.context("Failed to run kubectl")?;
        check_output("kubectl", output)
    }

    /// `kubectl apply` with the manifest on stdin.
    pub async fn apply(&self, manifest: &str) -> Result<String> {
        let mut cmd = self.command(["apply", "-f", "-"]);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to run kubectl")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(manifest.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        check_output("kubectl apply", output)
    }

    /// Run attached to the terminal (logs, exec).
    pub async fn attached<I, S>(&self, args: I) -> Result<ExitStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args);
        debug!(command = ?cmd.as_std(), "running kubectl attached");
        cmd.status().await.context("Failed to run kubectl")
    }

    /// The tool is installed and the cluster answers.
    pub async fn check_prerequisites(&self) -> Result<(), FleetError> {
        require_tool("kubectl", &["version", "--client"]).await?;

        let mut cmd = Command::new("kubectl");
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        cmd.args(["cluster-info", "--request-timeout=10s"]);

        match cmd.output().await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(FleetError::Environment(format!(
                "cluster unreachable{}: {}",
                self.context
                    .as_deref()
                    .map(|c| format!(" (context '{c}')"))
                    .unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) => Err(FleetError::Environment(format!("kubectl failed: {e}"))),
        }
    }

    /// Create the namespace unless it exists.
    pub async fn ensure_namespace(&self) -> Result<()> {
        let existing = self
            .output([
                "get",
                "namespace",
                self.namespace.as_str(),
                "--ignore-not-found",
                "-o",
                "name",
            ])
            .await?;
        if existing.trim().is_empty() {
            self.output(["create", "namespace", self.namespace.as_str()])
                .await?;
            debug!(namespace = %self.namespace, "namespace created");
        }
        Ok(())
    }
}

fn check_output(tool: &str, output: std::process::Output) -> Result<String> {
    if !output.status.success() {
        bail!(
            "{tool} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Fail with an environment error when `tool` is not runnable.
pub async fn require_tool(tool: &str, probe_args: &[&str]) -> Result<(), FleetError> {
    let status = Command::new(tool)
        .args(probe_args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(FleetError::Environment(format!(
            "`{tool} {}` exited with {status}",
            probe_args.join(" ")
        ))),
        Err(e) => Err(FleetError::Environment(format!(
            "required tool `{tool}` not available: {e}"
        ))),
    }
}

/// Run a tool attached to the terminal; non-zero exit is an error.
pub async fn run_tool<I, S>(tool: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(tool);
    cmd.args(args);
    debug!(command = ?cmd.as_std(), "running");
    let status = cmd
        .status()
        .await
        .with_context(|| format!("Failed to run {tool}"))?;
    if !status.success() {
        bail!("{tool} exited with {status}");
    }
    Ok(())
}
