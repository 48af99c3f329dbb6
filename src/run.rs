//! One end-to-end tiling run: resolve inputs, dispatch, aggregate, finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::aggregate::{AggregateCounts, Aggregator};
use crate::archive::{ArchiveMode, TileArchive};
use crate::config::Config;
use crate::dispatch::{BatchDispatcher, DispatchStats};
use crate::invoker::ToolInvoker;
use crate::log::Logger;
use crate::resolver::{InputResolver, InputSpec};
use crate::task::RunId;
use crate::util::blocking;
use crate::{tlog, tlog_debug, tlog_error, Error, Result};

/// What a finished run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub archive: PathBuf,
    pub tasks: usize,
    pub skipped_inputs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub without_tiles: usize,
    pub entries_written: usize,
    pub archive_entries: usize,
    pub peak_in_flight: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct TilingRun {
    config: Config,
    logger: Logger,
    /// Base for relative script paths; the process working directory is never changed.
    base_dir: PathBuf,
    check_program: bool,
}

impl TilingRun {
    pub fn new(config: Config, logger: Logger, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            logger,
            base_dir: base_dir.into(),
            check_program: true,
        }
    }

    /// Skip the PATH lookup of the transport's executable.
    pub fn without_program_check(mut self) -> Self {
        self.check_program = false;
        self
    }

    pub async fn execute(&self, inputs: Vec<InputSpec>, output_zip: &Path) -> Result<RunSummary> {
        self.config.validate()?;
        let run_id = RunId::new();
        let transport = self.config.transport.resolved_against(&self.base_dir);
        tlog!(
            self.logger,
            "Run {} starting: {} input(s), transport={}, output={}",
            run_id.short(),
            inputs.len(),
            transport.name(),
            output_zip.display()
        );

        if self.check_program {
            let program = transport.locate_program()?;
            tlog_debug!(self.logger, "Using {}", program.display());
        }

        let resolver = InputResolver::new(self.logger.clone());
        // Owns the bundle workspace until the end of this function.
        let resolved = blocking(move || resolver.resolve(&inputs)).await?;

        let mode = if self.config.fresh_archive {
            ArchiveMode::Fresh
        } else {
            ArchiveMode::Append
        };
        let archive = {
            let target = output_zip.to_path_buf();
            let logger = self.logger.clone();
            Arc::new(blocking(move || TileArchive::create(&target, mode, logger)).await?)
        };

        let invoker = Arc::new(
            ToolInvoker::new(transport, self.config.tiling.clone(), self.logger.clone())
                .with_layout(self.config.layout)
                .with_timeout(self.config.timeout()),
        );
        let dispatcher = BatchDispatcher::new(self.config.effective_workers(), self.logger.clone());
        tlog!(
            self.logger,
            "Dispatching {} task(s) across {} worker(s)",
            resolved.tasks.len(),
            dispatcher.workers()
        );

        let (tx, mut rx) = mpsc::channel(dispatcher.workers() * 2);
        let tasks = resolved.tasks.clone();
        let dispatch = tokio::spawn(async move { dispatcher.dispatch(invoker, tasks, tx).await });

        let mut aggregator = Aggregator::new(archive, self.logger.clone());
        while let Some(outcome) = rx.recv().await {
            if let Err(e) = aggregator.accept(outcome).await {
                tlog_error!(self.logger, "Aborting run {}: {}", run_id.short(), e);
                dispatch.abort();
                return Err(e);
            }
        }
        let stats: DispatchStats = dispatch
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?;

        let counts: AggregateCounts = aggregator.counts();
        let archive = Arc::try_unwrap(aggregator.into_archive())
            .map_err(|_| Error::Archive("archive still shared after dispatch".to_string()))?;
        let written = blocking(move || archive.finish()).await?;

        let summary = RunSummary {
            run_id,
            archive: written.path,
            tasks: resolved.tasks.len(),
            skipped_inputs: resolved.skipped.len(),
            succeeded: counts.succeeded,
            failed: counts.failed + stats.panicked,
            without_tiles: counts.without_tiles,
            entries_written: written.written,
            archive_entries: written.total,
            peak_in_flight: stats.peak_in_flight,
        };
        tlog!(
            self.logger,
            "Run {} finished: {} succeeded, {} failed, {} without tiles, {} entries written",
            run_id.short(),
            summary.succeeded,
            summary.failed,
            summary.without_tiles,
            summary.entries_written
        );
        Ok(summary)
    }
}
