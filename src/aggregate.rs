//! Folds task outcomes into the shared archive.

use std::sync::Arc;

use serde::Serialize;

use crate::archive::TileArchive;
use crate::dispatch::TaskOutcome;
use crate::log::Logger;
use crate::util::blocking;
use crate::{tlog_error, Result};

/// Per-outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub without_tiles: usize,
    pub entries: usize,
}

/// Consumes [`TaskOutcome`]s in completion order and appends tiles.
///
/// Any archive write failure is returned and must end the run.
pub struct Aggregator {
    archive: Arc<TileArchive>,
    logger: Logger,
    counts: AggregateCounts,
}

impl Aggregator {
    pub fn new(archive: Arc<TileArchive>, logger: Logger) -> Self {
        Self {
            archive,
            logger,
            counts: AggregateCounts::default(),
        }
    }

    pub fn counts(&self) -> AggregateCounts {
        self.counts
    }

    pub async fn accept(&mut self, outcome: TaskOutcome) -> Result<()> {
        match outcome {
            TaskOutcome::Tiled { task, tiles } => {
                let archive = Arc::clone(&self.archive);
                let name = task.logical_name().to_string();
                let written = blocking(move || archive.append_tiles(&name, &tiles))
                    .await
                    .inspect_err(|e| {
                        tlog_error!(
                            self.logger,
                            "Failed to add tiles for {} to archive: {}",
                            task.logical_name(),
                            e
                        )
                    })?;
                self.counts.succeeded += 1;
                self.counts.entries += written.len();
            }
            // Already logged by the dispatcher.
            TaskOutcome::NoTiles { .. } => self.counts.without_tiles += 1,
            TaskOutcome::Failed { task, error } => {
                tlog_error!(
                    self.logger,
                    "Failed processing {}: {}",
                    task.source().display(),
                    error
                );
                self.counts.failed += 1;
            }
        }
        Ok(())
    }

    /// Hand the archive back once every outcome has been accepted.
    pub fn into_archive(self) -> Arc<TileArchive> {
        self.archive
    }
}
