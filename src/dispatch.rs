//! Bounded fan-out of image tasks.
//!
//! The `BatchDispatcher` runs one pipeline per [`ImageTask`] (invoke the
//! tool, then locate its tiles) with at most `workers` pipelines in flight.
//! Outcomes are sent over a channel as they complete, in no particular
//! order. A failing or panicking task never cancels its siblings.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::invoker::ToolInvoker;
use crate::locator::{self, Located};
use crate::log::Logger;
use crate::task::ImageTask;
use crate::util::blocking;
use crate::{tlog_error, tlog_warn};

/// What happened to one image.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The tool succeeded and left tiles.
    Tiled {
        task: ImageTask,
        /// Tile files, sorted by path.
        tiles: Vec<PathBuf>,
    },
    /// The tool succeeded but the tile directory is missing or empty.
    NoTiles {
        task: ImageTask,
        dir: PathBuf,
    },
    /// The tool failed, timed out, or the tiles could not be listed.
    Failed {
        task: ImageTask,
        error: String,
    },
}

impl TaskOutcome {
    pub fn task(&self) -> &ImageTask {
        match self {
            TaskOutcome::Tiled { task, .. }
            | TaskOutcome::NoTiles { task, .. }
            | TaskOutcome::Failed { task, .. } => task,
        }
    }
}

/// Counters collected while dispatching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Pipelines started (one per task).
    pub invocations: usize,
    /// Highest number of pipelines running at the same time.
    pub peak_in_flight: usize,
    /// Pipelines that panicked and produced no outcome.
    pub panicked: usize,
}

#[derive(Default)]
struct Gauge {
    started: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the in-flight gauge even if the pipeline panics.
struct InFlight(Arc<Gauge>);

impl InFlight {
    fn enter(gauge: &Arc<Gauge>) -> Self {
        gauge.enter();
        Self(Arc::clone(gauge))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.exit();
    }
}

pub struct BatchDispatcher {
    workers: usize,
    logger: Logger,
}

impl BatchDispatcher {
    /// Create a dispatcher allowing `workers` concurrent pipelines (at least one).
    pub fn new(workers: usize, logger: Logger) -> Self {
        Self {
            workers: workers.max(1),
            logger,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Invoke the tool and locate tiles for every task.
    pub async fn dispatch(
        &self,
        invoker: Arc<ToolInvoker>,
        tasks: Vec<ImageTask>,
        outcomes: mpsc::Sender<TaskOutcome>,
    ) -> DispatchStats {
        let logger = self.logger.clone();
        self.dispatch_with(tasks, outcomes, move |task| {
            let invoker = Arc::clone(&invoker);
            let logger = logger.clone();
            async move { tile_one(&invoker, &logger, task).await }
        })
        .await
    }

    /// Run `pipeline` for every task under the worker bound.
    pub async fn dispatch_with<F, Fut>(
        &self,
        tasks: Vec<ImageTask>,
        outcomes: mpsc::Sender<TaskOutcome>,
        pipeline: F,
    ) -> DispatchStats
    where
        F: Fn(ImageTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.workers));
        let gauge = Arc::new(Gauge::default());
        let pipeline = Arc::new(pipeline);
        let mut set = JoinSet::new();

        for task in tasks {
            let permits = Arc::clone(&permits);
            let gauge = Arc::clone(&gauge);
            let pipeline = Arc::clone(&pipeline);
            let outcomes = outcomes.clone();
            set.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let outcome = {
                    let _running = InFlight::enter(&gauge);
                    pipeline(task).await
                };
                // The receiver may be gone after a fatal aggregation error.
                let _ = outcomes.send(outcome).await;
            });
        }
        drop(outcomes);

        let mut panicked = 0;
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                panicked += 1;
                tlog_error!(self.logger, "Unhandled error in worker: {}", e);
            }
        }

        DispatchStats {
            invocations: gauge.started.load(Ordering::SeqCst),
            peak_in_flight: gauge.peak.load(Ordering::SeqCst),
            panicked,
        }
    }
}

/// Invoke the tool for one task and look for its tiles.
pub async fn tile_one(invoker: &ToolInvoker, logger: &Logger, task: ImageTask) -> TaskOutcome {
    let result = invoker.invoke(&task).await;
    if let Err(e) = result.check() {
        return TaskOutcome::Failed {
            task,
            error: e.to_string(),
        };
    }

    let dir = result.output_dir.clone();
    match blocking(move || locator::locate(&dir)).await {
        Ok(Located::Tiles { tiles, .. }) => TaskOutcome::Tiled { task, tiles },
        Ok(Located::NoTiles { dir }) => {
            tlog_warn!(
                logger,
                "No tiles found for {} in {}",
                task.source().display(),
                dir.display()
            );
            TaskOutcome::NoTiles { task, dir }
        }
        Err(e) => {
            tlog_error!(
                logger,
                "Cannot list tiles for {}: {}",
                task.source().display(),
                e
            );
            TaskOutcome::Failed {
                task,
                error: e.to_string(),
            }
        }
    }
}
