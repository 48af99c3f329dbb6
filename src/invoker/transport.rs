//! How the tiling tool is launched: a local script or a container runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::TilingParams;
use crate::task::{ImageTask, OUTPUT_DIR_NAME};
use crate::{Error, Result};

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_script() -> PathBuf {
    PathBuf::from("pyhist.py")
}

fn default_container_image() -> String {
    "mmunozag/pyhist".to_string()
}

fn default_mount_point() -> String {
    "/pyhist/images".to_string()
}

fn default_container_command() -> Vec<String> {
    vec!["python".to_string(), "pyhist.py".to_string()]
}

/// Settings shared by the Docker and Podman transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Image reference, e.g. `mmunozag/pyhist`.
    #[serde(default = "default_container_image")]
    pub image: String,
    /// Where the source image's parent directory is mounted.
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    /// Command run inside the container before the tool arguments.
    #[serde(default = "default_container_command")]
    pub command: Vec<String>,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            image: default_container_image(),
            mount_point: default_mount_point(),
            command: default_container_command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transport {
    /// `<interpreter> <script> ...` on the host.
    Local {
        #[serde(default = "default_interpreter")]
        interpreter: String,
        #[serde(default = "default_script")]
        script: PathBuf,
    },
    Docker(ContainerSpec),
    Podman(ContainerSpec),
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Local {
            interpreter: default_interpreter(),
            script: default_script(),
        }
    }
}

/// A fully built command line, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child only; the parent's never changes.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Space-joined rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|s| s.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Local { .. } => "local",
            Transport::Docker(_) => "docker",
            Transport::Podman(_) => "podman",
        }
    }

    /// Executable that must be on PATH for this transport.
    pub fn program(&self) -> &str {
        match self {
            Transport::Local { interpreter, .. } => interpreter,
            Transport::Docker(_) => "docker",
            Transport::Podman(_) => "podman",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Transport::Local {
                interpreter,
                script,
            } => {
                if interpreter.trim().is_empty() {
                    return Err(Error::Validation("interpreter cannot be empty".to_string()));
                }
                if script.as_os_str().is_empty() {
                    return Err(Error::Validation("script path cannot be empty".to_string()));
                }
            }
            Transport::Docker(spec) | Transport::Podman(spec) => {
                if spec.image.trim().is_empty() {
                    return Err(Error::Validation(
                        "container image cannot be empty".to_string(),
                    ));
                }
                if !spec.mount_point.starts_with('/') {
                    return Err(Error::Validation(format!(
                        "container mount point must be absolute, got {:?}",
                        spec.mount_point
                    )));
                }
            }
        }
        Ok(())
    }

    /// Make the local script path absolute against `base`.
    ///
    /// The child runs with the script's directory as its working directory,
    /// so a relative path would otherwise resolve twice.
    pub fn resolved_against(&self, base: &Path) -> Self {
        match self {
            Transport::Local {
                interpreter,
                script,
            } if script.is_relative() => Transport::Local {
                interpreter: interpreter.clone(),
                script: base.join(script),
            },
            other => other.clone(),
        }
    }

    /// Locate the transport's executable on PATH.
    pub fn locate_program(&self) -> Result<PathBuf> {
        which::which(self.program()).map_err(|_| Error::ToolNotFound(self.program().to_string()))
    }

    /// Build the command line that tiles `task` into its output root.
    pub fn command(&self, task: &ImageTask, params: &TilingParams) -> Result<CommandSpec> {
        match self {
            Transport::Local {
                interpreter,
                script,
            } => {
                let mut args = vec![script.display().to_string()];
                args.extend(params.to_args());
                args.push("--output".to_string());
                args.push(task.output_root().display().to_string());
                args.push(task.source().display().to_string());
                Ok(CommandSpec {
                    program: interpreter.clone(),
                    args,
                    cwd: script
                        .parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .map(Path::to_path_buf),
                })
            }
            Transport::Docker(spec) => container_command("docker", spec, task, params),
            Transport::Podman(spec) => container_command("podman", spec, task, params),
        }
    }
}

fn container_command(
    runtime: &str,
    spec: &ContainerSpec,
    task: &ImageTask,
    params: &TilingParams,
) -> Result<CommandSpec> {
    let source = task.source();
    let parent = source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            Error::Validation(format!("{} has no parent directory", source.display()))
        })?;
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::Validation(format!("{} has no file name", source.display())))?
        .to_string_lossy();
    let mount = spec.mount_point.trim_end_matches('/');
    let output = task
        .output_root()
        .strip_prefix(parent)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_else(|_| OUTPUT_DIR_NAME.to_string());

    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{}:{}", parent.display(), mount),
        spec.image.clone(),
    ];
    args.extend(spec.command.iter().cloned());
    args.extend(params.to_args());
    args.push("--output".to_string());
    args.push(format!("{}/{}", mount, output));
    args.push(format!("{}/{}", mount, file_name));

    Ok(CommandSpec {
        program: runtime.to_string(),
        args,
        cwd: None,
    })
}
