// Dispatcher owns every pipeline and runs each one as its own tokio task.
// A pipeline that fails or closes ends alone; the others keep running.

use std::future::Future;
use std::sync::Arc;

use ahash::AHashMap;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::market_data::adapters::{build_adapter, FeedAdapter};
use crate::market_data::pipeline::{Pipeline, PipelineExit, PipelineReport, PipelineSettings, PipelineSpec, PipelineView};
use crate::market_data::transport::Connector;
use crate::persist::Sink;

/// Final word from one pipeline task.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub spec: PipelineSpec,
    pub exit: PipelineExit,
    pub report: PipelineReport,
}

pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn Sink>,
    settings: PipelineSettings,
    stop_tx: watch::Sender<bool>,
    tasks: JoinSet<PipelineOutcome>,
    views: AHashMap<PipelineSpec, PipelineView>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn Connector>, sink: Arc<dyn Sink>, settings: PipelineSettings) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            connector,
            sink,
            settings,
            stop_tx,
            tasks: JoinSet::new(),
            views: AHashMap::new(),
        }
    }

    pub fn spawn(&mut self, spec: &PipelineSpec) -> PipelineView {
        let adapter = build_adapter(spec.venue, &spec.symbol, spec.stream, self.settings.depth);
        self.spawn_adapter(adapter)
    }

    /// Start a pipeline for an already-built adapter.
    pub fn spawn_adapter(&mut self, adapter: Box<dyn FeedAdapter>) -> PipelineView {
        let (mut pipeline, view) = Pipeline::new(adapter, self.settings, Arc::clone(&self.sink));
        let spec = pipeline.spec().clone();
        if self.views.contains_key(&spec) {
            warn!(pipeline = %spec, "Pipeline already running, starting another for the same target");
        }
        self.views.insert(spec.clone(), view.clone());

        let connector = Arc::clone(&self.connector);
        let mut stop = self.stop_tx.subscribe();
        self.tasks.spawn(async move {
            let (endpoint, subscribe) = pipeline.open();
            info!(pipeline = %spec, %endpoint, "Connecting");
            let source = tokio::select! {
                res = connector.connect(&endpoint, subscribe) => res,
                _ = stop.changed() => {
                    let report = pipeline.report().clone();
                    return PipelineOutcome { spec, exit: PipelineExit::Stopped, report };
                }
            };
            match source {
                Ok(source) => {
                    let (exit, report) = pipeline.run(source, stop).await;
                    PipelineOutcome { spec, exit, report }
                }
                Err(e) => {
                    error!(pipeline = %spec, error = %e, "Connect failed");
                    let report = pipeline.report().clone();
                    PipelineOutcome { spec, exit: PipelineExit::Failed(e), report }
                }
            }
        });
        view
    }

    pub fn view(&self, spec: &PipelineSpec) -> Option<PipelineView> {
        self.views.get(spec).cloned()
    }

    /// Number of pipeline tasks still running.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the next pipeline to end. `None` once none are left.
    pub async fn join_next(&mut self) -> Option<PipelineOutcome> {
        loop {
            match self.tasks.join_next().await? {
                Ok(outcome) => {
                    match &outcome.exit {
                        PipelineExit::Failed(e) => warn!(pipeline = %outcome.spec, error = %e, "Pipeline failed"),
                        other => info!(pipeline = %outcome.spec, exit = ?other, "Pipeline ended"),
                    }
                    return Some(outcome);
                }
                Err(e) => error!(error = %e, "Pipeline task panicked or was aborted"),
            }
        }
    }

    /// Collect outcomes until `stop` resolves or every pipeline has ended,
    /// then shut the rest down. Pipelines that ended early stay in the result.
    pub async fn run_until<F>(mut self, stop: F) -> Vec<PipelineOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut outcomes = Vec::new();
        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("Stop requested");
                    break;
                }
                outcome = self.join_next() => match outcome {
                    Some(outcome) => outcomes.push(outcome),
                    None => {
                        warn!("Every pipeline has ended");
                        break;
                    }
                },
            }
        }
        outcomes.extend(self.shutdown().await);
        outcomes
    }

    /// Signal every pipeline to stop and collect their outcomes.
    pub async fn shutdown(mut self) -> Vec<PipelineOutcome> {
        info!(running = self.tasks.len(), "Stopping pipelines");
        self.stop_tx.send_replace(true);
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.join_next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}
