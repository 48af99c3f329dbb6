//! Turns caller-supplied paths into image tasks.
//!
//! A path is either a single image or a zip bundle of images. Bundles are
//! extracted into a [`Workspace`] that is deleted when it is dropped, so the
//! caller keeps [`Resolved`] alive for the whole run.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::filter;
use crate::log::Logger;
use crate::task::{file_stem, ImageTask};
use crate::{tlog, tlog_debug, tlog_error, tlog_warn, Error, Result};

/// One `--input`, optionally with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub path: PathBuf,
    pub name: Option<String>,
}

impl InputSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    pub fn named(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: Some(name.into()),
        }
    }

    /// Pair paths with names positionally. Names may be omitted entirely,
    /// but if given there must be one per path.
    pub fn pair(paths: Vec<PathBuf>, names: Vec<String>) -> Result<Vec<Self>> {
        if names.is_empty() {
            return Ok(paths.into_iter().map(Self::new).collect());
        }
        if names.len() != paths.len() {
            return Err(Error::Validation(format!(
                "got {} inputs but {} original names",
                paths.len(),
                names.len()
            )));
        }
        Ok(paths
            .into_iter()
            .zip(names)
            .map(|(p, n)| Self::named(p, n))
            .collect())
    }

    /// Stem of the display name, if it has a usable one.
    fn display_stem(&self) -> Option<String> {
        self.name
            .as_deref()
            .map(|name| file_stem(Path::new(name)))
            .filter(|stem| !stem.is_empty())
    }

    /// Namespace for this input's tiles. A blank display name (`""`, `..`)
    /// falls back to the file's own stem.
    fn logical_name(&self) -> String {
        self.display_stem().unwrap_or_else(|| file_stem(&self.path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedExtension,
    Missing,
    /// Bundle entry whose path escapes the extraction directory.
    UnsafeEntryPath,
    CorruptBundle(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Scratch directory for extracted bundle entries. Removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("slidetiler-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Tasks ready for dispatch plus everything that was skipped.
#[derive(Debug, Default)]
pub struct Resolved {
    pub tasks: Vec<ImageTask>,
    pub skipped: Vec<SkippedInput>,
    pub workspace: Option<Workspace>,
}

pub struct InputResolver {
    logger: Logger,
}

impl InputResolver {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Resolve every input. Only a corrupt bundle that is the sole input is
    /// an error; every other problem is recorded as a skip.
    pub fn resolve(&self, inputs: &[InputSpec]) -> Result<Resolved> {
        let mut resolved = Resolved::default();
        let mut images: Vec<(PathBuf, String)> = Vec::new();
        let sole = inputs.len() == 1;

        for (index, input) in inputs.iter().enumerate() {
            if filter::is_bundle(&input.path) {
                match self.expand_bundle(index, &input.path, &mut resolved) {
                    Ok(entries) => images.extend(entries),
                    Err(e) if sole => {
                        return Err(Error::InvalidBundle {
                            path: input.path.clone(),
                            reason: e.to_string(),
                        })
                    }
                    Err(e) => {
                        tlog_error!(
                            self.logger,
                            "Skipping unreadable bundle {}: {}",
                            input.path.display(),
                            e
                        );
                        resolved.skipped.push(SkippedInput {
                            path: input.path.clone(),
                            reason: SkipReason::CorruptBundle(e.to_string()),
                        });
                    }
                }
                continue;
            }

            if let Some(path) = self.accept_image(&input.path, &mut resolved) {
                if input.name.is_some() && input.display_stem().is_none() {
                    tlog_warn!(
                        self.logger,
                        "Original name {:?} for {} is blank, using the file name",
                        input.name.as_deref().unwrap_or_default(),
                        input.path.display()
                    );
                }
                images.push((path, input.logical_name()));
            }
        }

        resolved.tasks = unique_names(images)
            .into_iter()
            .map(|(path, name)| ImageTask::new(path, name))
            .collect();
        tlog!(
            self.logger,
            "Resolved {} image(s), skipped {}",
            resolved.tasks.len(),
            resolved.skipped.len()
        );
        Ok(resolved)
    }

    /// Check a single image path; returns its absolute path when accepted.
    fn accept_image(&self, path: &Path, resolved: &mut Resolved) -> Option<PathBuf> {
        if !filter::is_accepted(path) {
            tlog!(self.logger, "Skipping unsupported file: {}", path.display());
            resolved.skipped.push(SkippedInput {
                path: path.to_path_buf(),
                reason: SkipReason::UnsupportedExtension,
            });
            return None;
        }
        match fs::canonicalize(path) {
            Ok(abs) if abs.is_file() => Some(abs),
            _ => {
                tlog_warn!(self.logger, "Skipping missing file: {}", path.display());
                resolved.skipped.push(SkippedInput {
                    path: path.to_path_buf(),
                    reason: SkipReason::Missing,
                });
                None
            }
        }
    }

    /// Extract accepted entries of `bundle`, one subdirectory per entry so
    /// each image gets its own output root.
    fn expand_bundle(
        &self,
        bundle_index: usize,
        bundle: &Path,
        resolved: &mut Resolved,
    ) -> Result<Vec<(PathBuf, String)>> {
        let mut archive = ZipArchive::new(File::open(bundle)?)?;
        if resolved.workspace.is_none() {
            let workspace = Workspace::create()?;
            tlog_debug!(
                self.logger,
                "Created workspace {}",
                workspace.path().display()
            );
            resolved.workspace = Some(workspace);
        }
        let root = match &resolved.workspace {
            Some(ws) => ws.path().to_path_buf(),
            None => return Err(Error::Validation("workspace unavailable".to_string())),
        };

        tlog!(
            self.logger,
            "Expanding bundle {} ({} entries)",
            bundle.display(),
            archive.len()
        );

        let mut images = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let entry_label = bundle.join(entry.name());
            let Some(relative) = entry.enclosed_name() else {
                tlog_warn!(
                    self.logger,
                    "Skipping bundle entry with unsafe path: {}",
                    entry.name()
                );
                resolved.skipped.push(SkippedInput {
                    path: entry_label,
                    reason: SkipReason::UnsafeEntryPath,
                });
                continue;
            };
            let Some(file_name) = relative.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            if !filter::is_accepted(Path::new(&file_name)) {
                tlog!(
                    self.logger,
                    "Skipping unsupported bundle entry: {}",
                    entry.name()
                );
                resolved.skipped.push(SkippedInput {
                    path: entry_label,
                    reason: SkipReason::UnsupportedExtension,
                });
                continue;
            }

            let dir = root.join(format!("{}-{}", bundle_index, i));
            fs::create_dir_all(&dir)?;
            let dest = dir.join(&file_name);
            let mut out = File::create(&dest)?;
            io::copy(&mut entry, &mut out)?;
            tlog_debug!(self.logger, "Extracted {} to {}", entry.name(), dest.display());

            let name = file_stem(Path::new(&file_name));
            images.push((dest, name));
        }
        Ok(images)
    }
}

/// Suffix repeated logical names with `_2`, `_3`, ... so namespaces never merge.
fn unique_names(images: Vec<(PathBuf, String)>) -> Vec<(PathBuf, String)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    images
        .into_iter()
        .map(|(path, name)| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                (path, name)
            } else {
                let mut n = *count;
                let mut candidate = format!("{}_{}", name, n);
                while seen.contains_key(&candidate) {
                    n += 1;
                    candidate = format!("{}_{}", name, n);
                }
                seen.insert(candidate.clone(), 1);
                (path, candidate)
            }
        })
        .collect()
}
