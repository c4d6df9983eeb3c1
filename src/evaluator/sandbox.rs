//! Single-use sandbox for template evaluation.
//!
//! Each [`EvalSandbox`] owns a private temporary directory and, when running
//! under Docker, a uniquely named container. It executes exactly one entry
//! script and is torn down afterwards.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EvaluationError;

/// File name of the rendered entry script inside the sandbox directory.
pub const ENTRY_FILE: &str = "entry.tsx";

/// Mount point of the sandbox directory inside a Docker container.
const CONTAINER_WORKDIR: &str = "/sandbox";

/// Where the evaluation command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxRuntime {
    /// A local child process confined to the sandbox directory.
    Process,
    /// A throwaway container from the given image.
    Docker { image: String },
}

/// Configuration for evaluation sandboxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Command that evaluates the entry file and prints circuit JSON on stdout.
    /// The entry file path is appended as the final argument.
    pub command: Vec<String>,
    pub runtime: SandboxRuntime,
    /// Timeout for a single evaluation.
    pub timeout: Duration,
    /// Memory limit in MB (Docker only).
    pub memory_limit_mb: u64,
    /// Network mode (Docker only). Template imports are usually fetched from a
    /// registry, so the default keeps networking on.
    pub network_mode: String,
    /// Extra environment variables.
    pub env_vars: Vec<(String, String)>,
}

impl SandboxConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            runtime: SandboxRuntime::Process,
            timeout: Duration::from_secs(120),
            memory_limit_mb: 2048,
            network_mode: "bridge".to_string(),
            env_vars: Vec::new(),
        }
    }

    /// Runs evaluations inside containers built from `image`.
    pub fn with_docker_image(mut self, image: impl Into<String>) -> Self {
        self.runtime = SandboxRuntime::Docker {
            image: image.into(),
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Disables network access (Docker only).
    pub fn without_network(mut self) -> Self {
        self.network_mode = "none".to_string();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new(vec!["circuit-eval".to_string()])
    }
}

/// Captured output of a sandboxed evaluation.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A disposable execution context for one evaluation.
pub struct EvalSandbox {
    id: String,
    config: SandboxConfig,
    dir: Option<TempDir>,
    container_started: bool,
}

impl EvalSandbox {
    /// Provisions a new sandbox with its own temporary directory.
    pub fn provision(config: SandboxConfig) -> Result<Self, EvaluationError> {
        if config.command.is_empty() {
            return Err(EvaluationError::SandboxProvision(
                "evaluation command is empty".to_string(),
            ));
        }

        let dir = tempfile::Builder::new()
            .prefix("circuit-eval-")
            .tempdir()
            .map_err(|e| {
                EvaluationError::SandboxProvision(format!("failed to create sandbox dir: {}", e))
            })?;

        let id = format!("circuit-eval-{}", Uuid::new_v4());
        debug!(sandbox = %id, dir = %dir.path().display(), "Sandbox provisioned");

        Ok(Self {
            id,
            config,
            dir: Some(dir),
            container_started: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host path of the sandbox directory, while the sandbox is alive.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Writes the entry script and runs the evaluation command once.
    pub async fn execute(
        &mut self,
        script: &str,
        sample_number: u32,
    ) -> Result<SandboxOutput, EvaluationError> {
        let dir = self
            .path()
            .ok_or_else(|| {
                EvaluationError::SandboxProvision(format!("sandbox {} already torn down", self.id))
            })?
            .to_path_buf();

        let entry = dir.join(ENTRY_FILE);
        tokio::fs::write(&entry, script).await?;

        let mut cmd = self.build_command(&dir, &entry, sample_number);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            EvaluationError::SandboxProvision(format!(
                "failed to spawn '{}': {}",
                self.program(),
                e
            ))
        })?;
        if matches!(self.config.runtime, SandboxRuntime::Docker { .. }) {
            self.container_started = true;
        }

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(SandboxOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(EvaluationError::Io(e)),
            Err(_) => Err(EvaluationError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }),
        }
    }

    /// Builds the process invocation for the configured runtime.
    pub fn build_command(&self, dir: &Path, entry: &Path, sample_number: u32) -> Command {
        match &self.config.runtime {
            SandboxRuntime::Process => {
                let mut cmd = Command::new(&self.config.command[0]);
                cmd.args(&self.config.command[1..])
                    .arg(entry)
                    .current_dir(dir)
                    .env("SAMPLE_NUMBER", sample_number.to_string());
                for (key, value) in &self.config.env_vars {
                    cmd.env(key, value);
                }
                cmd
            }
            SandboxRuntime::Docker { .. } => {
                let mut cmd = Command::new("docker");
                cmd.args(self.docker_run_args(dir, sample_number));
                cmd
            }
        }
    }

    /// Arguments for `docker run` under the Docker runtime.
    pub fn docker_run_args(&self, dir: &Path, sample_number: u32) -> Vec<String> {
        let image = match &self.config.runtime {
            SandboxRuntime::Docker { image } => image.clone(),
            SandboxRuntime::Process => String::new(),
        };

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.id.clone(),
            format!("--memory={}m", self.config.memory_limit_mb),
            format!("--network={}", self.config.network_mode),
            "-v".to_string(),
            format!("{}:{}", dir.display(), CONTAINER_WORKDIR),
            "-w".to_string(),
            CONTAINER_WORKDIR.to_string(),
            "-e".to_string(),
            format!("SAMPLE_NUMBER={}", sample_number),
        ];

        for (key, value) in &self.config.env_vars {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(image);
        args.extend(self.config.command.iter().cloned());
        args.push(
            PathBuf::from(CONTAINER_WORKDIR)
                .join(ENTRY_FILE)
                .to_string_lossy()
                .to_string(),
        );
        args
    }

    fn program(&self) -> &str {
        match self.config.runtime {
            SandboxRuntime::Process => &self.config.command[0],
            SandboxRuntime::Docker { .. } => "docker",
        }
    }

    /// Releases the container (if any) and removes the sandbox directory.
    pub async fn teardown(&mut self) {
        if self.container_started {
            let rm = Command::new("docker")
                .args(self.removal_args())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = rm {
                warn!(sandbox = %self.id, error = %e, "Failed to remove container");
            }
            self.container_started = false;
        }

        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(sandbox = %self.id, error = %e, "Failed to remove sandbox dir");
            }
        }
        debug!(sandbox = %self.id, "Sandbox torn down");
    }

    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Docker arguments that force-remove this sandbox's container.
    pub fn removal_args(&self) -> [&str; 3] {
        ["rm", "-f", self.id.as_str()]
    }
}

/// Best-effort container removal when `teardown` never ran, e.g. when the
/// evaluation future is dropped mid-run. The TempDir removes itself.
impl Drop for EvalSandbox {
    fn drop(&mut self) {
        if !self.container_started {
            return;
        }
        warn!(sandbox = %self.id, "Sandbox dropped without teardown, removing container");
        let args = self.removal_args().map(str::to_string);
        // Fire-and-forget so Drop never blocks on docker.
        std::thread::spawn(move || {
            let _ = std::process::Command::new("docker")
                .args(&args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        });
    }
}
