//! Tiling tool executor.
//!
//! `ToolInvoker` runs the external tiling tool for one image through the
//! configured [`Transport`] and reports the outcome as data. A failing tool
//! never turns into an `Err` here: the dispatcher decides what a failure
//! means for the batch.

mod transport;

pub use transport::{CommandSpec, ContainerSpec, Transport};

use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

use crate::config::TilingParams;
use crate::locator::{self, OutputLayout};
use crate::log::Logger;
use crate::task::ImageTask;
use crate::{tlog, tlog_debug, tlog_error, tlog_trace, Error, Result};

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationStatus {
    Succeeded,
    /// Non-zero exit, or the process could not be started.
    Failed { code: Option<i32> },
    TimedOut(Duration),
}

/// Outcome of running the tool for one task.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub task: ImageTask,
    pub status: InvocationStatus,
    /// Captured stderr (or the spawn error).
    pub diagnostics: String,
    /// Where the tiles should be, per the output layout.
    pub output_dir: PathBuf,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Succeeded
    }

    /// The failure as an [`Error`], if any.
    pub fn check(&self) -> Result<()> {
        match &self.status {
            InvocationStatus::Succeeded => Ok(()),
            InvocationStatus::Failed { code } => Err(Error::ToolFailed {
                image: self.task.source().to_path_buf(),
                code: *code,
                stderr: self.diagnostics.clone(),
            }),
            InvocationStatus::TimedOut(d) => Err(Error::Timeout(*d)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolInvoker {
    transport: Transport,
    params: TilingParams,
    layout: OutputLayout,
    timeout: Option<Duration>,
    logger: Logger,
}

impl ToolInvoker {
    pub fn new(transport: Transport, params: TilingParams, logger: Logger) -> Self {
        Self {
            transport,
            params,
            layout: OutputLayout::default(),
            timeout: None,
            logger,
        }
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    /// Run the tool for `task`, creating its output root first.
    pub async fn invoke(&self, task: &ImageTask) -> InvocationResult {
        let output_dir = locator::expected_dir(self.layout, task);
        let failed = |diagnostics: String| InvocationResult {
            task: task.clone(),
            status: InvocationStatus::Failed { code: None },
            diagnostics,
            output_dir: output_dir.clone(),
        };

        if let Err(e) = tokio::fs::create_dir_all(task.output_root()).await {
            tlog_error!(
                self.logger,
                "Cannot create output directory {}: {}",
                task.output_root().display(),
                e
            );
            return failed(e.to_string());
        }

        let spec = match self.transport.command(task, &self.params) {
            Ok(spec) => spec,
            Err(e) => {
                tlog_error!(
                    self.logger,
                    "Cannot build command for {}: {}",
                    task.source().display(),
                    e
                );
                return failed(e.to_string());
            }
        };

        tlog!(
            self.logger,
            "Running tiling tool ({}): {}",
            self.transport.name(),
            spec.display()
        );

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    tlog_error!(
                        self.logger,
                        "Tiling tool timed out after {:?} for {}",
                        limit,
                        task.source().display()
                    );
                    return InvocationResult {
                        task: task.clone(),
                        status: InvocationStatus::TimedOut(limit),
                        diagnostics: String::new(),
                        output_dir: output_dir.clone(),
                    };
                }
            },
            None => command.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                tlog_error!(
                    self.logger,
                    "Failed to start {} for {}: {}",
                    spec.program,
                    task.source().display(),
                    e
                );
                return failed(e.to_string());
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tlog_trace!(
            self.logger,
            "Tool stdout for {}: {}",
            task.source().display(),
            String::from_utf8_lossy(&output.stdout).trim()
        );

        if output.status.success() {
            tlog!(self.logger, "Tiling tool succeeded for {}", task.source().display());
            tlog_debug!(self.logger, "Expecting tiles in {}", output_dir.display());
            InvocationResult {
                task: task.clone(),
                status: InvocationStatus::Succeeded,
                diagnostics: stderr,
                output_dir,
            }
        } else {
            tlog_error!(
                self.logger,
                "Tiling tool failed for {} (exit code {:?}): {}",
                task.source().display(),
                output.status.code(),
                stderr
            );
            InvocationResult {
                task: task.clone(),
                status: InvocationStatus::Failed {
                    code: output.status.code(),
                },
                diagnostics: stderr,
                output_dir,
            }
        }
    }
}
