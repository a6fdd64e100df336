//! `codex exec` process spawning and control.
//!
//! [`ExecArgs`] builds the command line for one turn, [`CodexExec`] holds
//! the binary and environment shared by every turn, and [`ExecProcess`]
//! wraps the running child with terminate/kill controls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::{ApprovalPolicy, CodexOptions, ReasoningEffort, SandboxMode, ThreadOptions};

/// Environment variable identifying the embedding client to `codex`.
pub const INTERNAL_ORIGINATOR_ENV: &str = "CODEX_INTERNAL_ORIGINATOR_OVERRIDE";

/// Originator reported when the caller has not set one.
pub const RUST_SDK_ORIGINATOR: &str = "codex_sdk_rs";

/// Binary looked up on `PATH` when no override is configured.
pub const DEFAULT_CODEX_BINARY: &str = "codex";

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("codex binary not found: {0}")]
    NotFound(PathBuf),
    /// Permission denied when spawning.
    #[error("Permission denied spawning {0}")]
    PermissionDenied(PathBuf),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error, binary: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(binary.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(binary.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for the `codex exec` arguments of a single turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecArgs {
    thread_id: Option<String>,
    images: Vec<PathBuf>,
    model: Option<String>,
    sandbox_mode: Option<SandboxMode>,
    working_directory: Option<PathBuf>,
    additional_directories: Vec<PathBuf>,
    skip_git_repo_check: bool,
    output_schema_file: Option<PathBuf>,
    model_reasoning_effort: Option<ReasoningEffort>,
    network_access_enabled: Option<bool>,
    web_search_enabled: Option<bool>,
    approval_policy: Option<ApprovalPolicy>,
}

impl ExecArgs {
    /// Create an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the arguments from a thread's options.
    #[must_use]
    pub fn from_thread_options(options: &ThreadOptions) -> Self {
        Self {
            model: options.model.clone(),
            sandbox_mode: options.sandbox_mode,
            working_directory: options.working_directory.clone(),
            additional_directories: options.additional_directories.clone(),
            skip_git_repo_check: options.skip_git_repo_check,
            model_reasoning_effort: options.model_reasoning_effort,
            network_access_enabled: options.network_access_enabled,
            web_search_enabled: options.web_search_enabled,
            approval_policy: options.approval_policy,
            ..Self::default()
        }
    }

    /// Resume an existing thread instead of starting a new one.
    #[must_use]
    pub fn resume(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Attach local images to the prompt.
    #[must_use]
    pub fn images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }

    /// Set the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sandbox mode.
    #[must_use]
    pub fn sandbox_mode(mut self, mode: SandboxMode) -> Self {
        self.sandbox_mode = Some(mode);
        self
    }

    /// Set the agent's working directory (`--cd`).
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Grant access to an extra directory.
    #[must_use]
    pub fn add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.additional_directories.push(dir.into());
        self
    }

    /// Skip the git repository check.
    #[must_use]
    pub fn skip_git_repo_check(mut self, skip: bool) -> Self {
        self.skip_git_repo_check = skip;
        self
    }

    /// Constrain the final response to the schema stored at `path`.
    #[must_use]
    pub fn output_schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_schema_file = Some(path.into());
        self
    }

    /// Set the reasoning effort.
    #[must_use]
    pub fn reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.model_reasoning_effort = Some(effort);
        self
    }

    /// Allow or forbid network access inside the workspace-write sandbox.
    #[must_use]
    pub fn network_access(mut self, enabled: bool) -> Self {
        self.network_access_enabled = Some(enabled);
        self
    }

    /// Enable or disable the web search tool.
    #[must_use]
    pub fn web_search(mut self, enabled: bool) -> Self {
        self.web_search_enabled = Some(enabled);
        self
    }

    /// Set the approval policy.
    #[must_use]
    pub fn approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = Some(policy);
        self
    }

    /// Get the thread being resumed, if any.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["exec".to_string(), "--experimental-json".to_string()];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(mode) = self.sandbox_mode {
            args.push("--sandbox".to_string());
            args.push(mode.to_string());
        }

        if let Some(dir) = &self.working_directory {
            args.push("--cd".to_string());
            args.push(dir.display().to_string());
        }

        for dir in &self.additional_directories {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }

        if self.skip_git_repo_check {
            args.push("--skip-git-repo-check".to_string());
        }

        if let Some(path) = &self.output_schema_file {
            args.push("--output-schema".to_string());
            args.push(path.display().to_string());
        }

        if let Some(effort) = self.model_reasoning_effort {
            args.push("--config".to_string());
            args.push(format!("model_reasoning_effort=\"{effort}\""));
        }

        if let Some(enabled) = self.network_access_enabled {
            args.push("--config".to_string());
            args.push(format!("sandbox_workspace_write.network_access={enabled}"));
        }

        if let Some(enabled) = self.web_search_enabled {
            args.push("--config".to_string());
            args.push(format!("features.web_search_request={enabled}"));
        }

        if let Some(policy) = self.approval_policy {
            args.push("--config".to_string());
            args.push(format!("approval_policy=\"{policy}\""));
        }

        for image in &self.images {
            args.push("--image".to_string());
            args.push(image.display().to_string());
        }

        // Subcommand must come last.
        if let Some(thread_id) = &self.thread_id {
            args.push("resume".to_string());
            args.push(thread_id.clone());
        }

        args
    }
}

/// Launcher for `codex exec` carrying the binary path and environment.
#[derive(Debug, Clone)]
pub struct CodexExec {
    binary: PathBuf,
    env: Option<HashMap<String, String>>,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl CodexExec {
    /// Create a launcher from client options.
    #[must_use]
    pub fn new(options: &CodexOptions) -> Self {
        Self {
            binary: options
                .codex_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CODEX_BINARY)),
            env: options.env.clone(),
            base_url: options.base_url.clone(),
            api_key: options.api_key.clone(),
        }
    }

    /// Get the binary that will be spawned.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Build the variables set on the child.
    ///
    /// With an explicit `env` map this is the child's whole environment.
    /// Otherwise the child inherits this process's environment and only
    /// these overrides are applied on top.
    #[must_use]
    pub fn build_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone().unwrap_or_default();

        let caller_set_originator = match &self.env {
            Some(explicit) => explicit.contains_key(INTERNAL_ORIGINATOR_ENV),
            None => std::env::var_os(INTERNAL_ORIGINATOR_ENV).is_some(),
        };
        if !caller_set_originator {
            env.insert(
                INTERNAL_ORIGINATOR_ENV.to_string(),
                RUST_SDK_ORIGINATOR.to_string(),
            );
        }

        if let Some(base_url) = &self.base_url {
            env.insert("OPENAI_BASE_URL".to_string(), base_url.clone());
        }

        if let Some(api_key) = &self.api_key {
            env.insert("CODEX_API_KEY".to_string(), api_key.clone());
        }

        env
    }

    /// Spawn `codex exec` with piped stdio.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(&self, args: &ExecArgs) -> Result<ExecProcess, SpawnError> {
        let mut cmd = Command::new(&self.binary);
        if self.env.is_some() {
            cmd.env_clear();
        }
        cmd.args(args.build_args())
            .envs(self.build_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(e, &self.binary))?;

        tracing::debug!(
            binary = %self.binary.display(),
            pid = ?child.id(),
            resume = ?args.thread_id(),
            "Spawned codex exec"
        );

        Ok(ExecProcess { child })
    }
}

/// A running `codex exec` process.
#[derive(Debug)]
pub struct ExecProcess {
    child: Child,
}

impl ExecProcess {
    /// Take ownership of the stdin handle.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Write the prompt to stdin and close it.
    ///
    /// A child that exits without reading its input surfaces through its
    /// exit status, so a broken pipe here is not reported.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin was already taken or the write fails.
    pub async fn write_input(&mut self, input: &str) -> std::io::Result<()> {
        let mut stdin = self.take_stdin().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin not available")
        })?;

        let written = async {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        }
        .await;

        match written {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("codex exec closed stdin before reading the prompt");
                Ok(())
            }
            other => other,
        }
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        let Some(pid) = self.id() else {
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(errno) = kill(nix_pid, Signal::SIGTERM) {
            tracing::debug!(pid, %errno, "SIGTERM failed, killing");
            return self.child.kill().await;
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid, code = ?status.code(), "codex exec terminated");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(pid, ?timeout, "codex exec ignored SIGTERM, killing");
                self.child.kill().await
            }
        }
    }
}
