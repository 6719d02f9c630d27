#![allow(clippy::result_large_err)] // Engine returns AppError so stderr and exit codes travel with the failure.

//! Invocation of the external registration engine.
//!
//! [`RegistrationEngine`] turns one parent -> child transition into a process
//! run and resolves the result file. Spawning is behind [`ProcessRunner`] so
//! tests can stand in for the real binary.

use crate::core::config::EngineConfig;
use crate::core::error::{AppError, EXIT_CODE_CONTEXT_KEY, STDERR_CONTEXT_KEY};
use crate::core::strategy::cancel::CancelToken;
use crate::core::strategy::transformation::Transformation;
use crate::core::types::ErrorCategory;
use crate::utils::ensure_dir;
use async_trait::async_trait;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;

const OUTPUT_CAPTURE_LIMIT_BYTES: usize = 1_048_576;

/// Inputs for one registration run.
#[derive(Clone, Debug)]
pub struct RegistrationRequest<'a> {
    pub fixed: &'a Path,
    pub moving: &'a Path,
    pub transformation: &'a Transformation,
    pub output_folder: &'a Path,
}

/// Process to spawn, fully resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    async fn run(
        &self,
        request: &ProcessRequest,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, AppError>;
}

/// Runs processes with `tokio::process`, killing them on timeout or cancel.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        request: &ProcessRequest,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, AppError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|err| {
            AppError::new(
                ErrorCategory::RegistrationEngineError,
                format!("failed to start {}: {}", request.program, err),
            )
            .with_code("RS-ENGINE-002")
        })?;

        // Dropping the wait future drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = tokio::select! {
            result = with_optional_timeout(request.timeout, wait) => match result {
                Some(output) => output.map_err(|err| {
                    AppError::new(
                        ErrorCategory::RegistrationEngineError,
                        format!("failed to wait for {}: {}", request.program, err),
                    )
                    .with_code("RS-ENGINE-002")
                })?,
                None => {
                    return Err(AppError::new(
                        ErrorCategory::TimeoutError,
                        format!(
                            "{} exceeded timeout of {}s",
                            request.program,
                            request.timeout.map(|t| t.as_secs()).unwrap_or_default()
                        ),
                    )
                    .with_code("RS-ENGINE-004"));
                }
            },
            _ = cancel.cancelled() => {
                return Err(AppError::new(
                    ErrorCategory::Cancelled,
                    format!("{} cancelled", request.program),
                )
                .with_code("RS-ENGINE-005"));
            }
        };

        Ok(ProcessOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

async fn with_optional_timeout<F: std::future::Future>(
    limit: Option<Duration>,
    future: F,
) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

/// External registration engine bound to its configuration.
#[derive(Clone)]
pub struct RegistrationEngine {
    config: EngineConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl RegistrationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            runner: Arc::new(TokioProcessRunner),
        }
    }

    pub fn with_runner(config: EngineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Path the engine writes its registered volume to for `transformation`.
    ///
    /// The format token must be a plain extension so the result stays inside
    /// `output_folder`.
    pub fn result_path(
        &self,
        output_folder: &Path,
        transformation: &Transformation,
    ) -> Result<PathBuf, AppError> {
        let format = transformation
            .result_image_format()
            .unwrap_or_else(|| self.config.default_result_format.clone());
        if format.is_empty() || format.contains(['/', '\\']) || format.contains("..") {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("result image format '{}' is not a plain file extension", format),
            )
            .with_code("RS-ENGINE-006")
            .with_context("format", &format));
        }
        Ok(output_folder.join(self.config.result_file_name(&format)))
    }

    pub fn parameter_file_path(&self, output_folder: &Path) -> PathBuf {
        output_folder.join(&self.config.parameter_file_name)
    }

    /// Build the command line for one run.
    pub fn build_process_request(
        &self,
        request: &RegistrationRequest<'_>,
        parameter_file: &Path,
    ) -> ProcessRequest {
        let mut args: Vec<OsString> = self.config.extra_args.iter().map(OsString::from).collect();
        args.push(OsString::from(&self.config.fixed_flag));
        args.push(request.fixed.as_os_str().to_owned());
        args.push(OsString::from(&self.config.moving_flag));
        args.push(request.moving.as_os_str().to_owned());
        args.push(OsString::from(&self.config.parameter_flag));
        args.push(parameter_file.as_os_str().to_owned());
        args.push(OsString::from(&self.config.output_flag));
        args.push(request.output_folder.as_os_str().to_owned());

        ProcessRequest {
            program: self.config.binary.clone(),
            args,
            timeout: match self.config.timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Run the engine and return the produced dataset path.
    ///
    /// The output folder is created when missing and a stale result from an
    /// earlier run is removed first, so a failed run never leaves an old
    /// result looking fresh.
    pub async fn register(
        &self,
        request: RegistrationRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf, AppError> {
        ensure_dir(request.output_folder)?;

        let result_path = self.result_path(request.output_folder, request.transformation)?;
        remove_stale(&result_path)?;

        let parameter_file = self.parameter_file_path(request.output_folder);
        request.transformation.save_to_file(&parameter_file)?;

        let process = self.build_process_request(&request, &parameter_file);
        tracing::debug!(
            program = %process.program,
            fixed = %request.fixed.display(),
            moving = %request.moving.display(),
            output = %request.output_folder.display(),
            "invoking registration engine"
        );

        let start = Instant::now();
        let output = match self.runner.run(&process, cancel).await {
            Ok(output) => output,
            Err(err) => {
                if matches!(
                    err.category,
                    ErrorCategory::Cancelled | ErrorCategory::TimeoutError
                ) {
                    discard_partial(&result_path);
                }
                return Err(err);
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(exit_code = output.exit_code, duration_ms, "registration engine exited");

        if output.exit_code != 0 {
            discard_partial(&result_path);
            return Err(AppError::new(
                ErrorCategory::RegistrationEngineError,
                format!(
                    "{} failed with exit code {}",
                    process.program, output.exit_code
                ),
            )
            .with_code("RS-ENGINE-001")
            .with_context(EXIT_CODE_CONTEXT_KEY, output.exit_code.to_string())
            .with_context(STDERR_CONTEXT_KEY, limit_bytes(&output.stderr)));
        }

        if !result_path.is_file() {
            return Err(AppError::new(
                ErrorCategory::RegistrationEngineError,
                format!(
                    "{} exited successfully but did not produce {}",
                    process.program,
                    result_path.display()
                ),
            )
            .with_code("RS-ENGINE-003")
            .with_context("stdout", limit_bytes(&output.stdout))
            .with_context(STDERR_CONTEXT_KEY, limit_bytes(&output.stderr)));
        }

        Ok(result_path)
    }
}

fn remove_stale(path: &Path) -> Result<(), AppError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale result");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::new(
            ErrorCategory::IoError,
            format!("failed to remove stale result {}: {}", path.display(), err),
        )
        .with_code("RS-IO-003")),
    }
}

fn discard_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "could not discard partial result: {}", err);
        }
    }
}

fn limit_bytes(bytes: &[u8]) -> String {
    let limit = OUTPUT_CAPTURE_LIMIT_BYTES.min(bytes.len());
    String::from_utf8_lossy(&bytes[..limit]).into_owned()
}
