//! Analysis completion pipeline.
//!
//! Dispatches analysis runs to the external job runner and learns their
//! outcome through two unreliable channels, a signed webhook and a polling
//! loop, converging on one compare-and-set in the [`StateReconciler`]:
//!
//! - [`WorkflowDispatcher`] starts a run and flips submitted -> running.
//! - [`CompletionReceiver`] authenticates webhook notifications.
//! - [`PollingScheduler`] periodically queries running requests.
//! - [`ArtifactResolver`] downloads and normalizes job output.
//! - [`StateReconciler`] applies the first terminal outcome, exactly once.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod poller;
pub mod receiver;
pub mod reconciler;
pub mod resolver;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

use ideaforge_runner::JobRunner;

pub use config::{ConfigError, PipelineConfig};
pub use dispatcher::WorkflowDispatcher;
pub use error::PipelineError;
pub use poller::{PollerHandle, PollingScheduler, TickSummary};
pub use receiver::{CompletionReceiver, Receipt, ReceiptOutcome};
pub use reconciler::{CompletionSource, StateReconciler};
pub use resolver::{ArtifactResolver, ResolveError};
pub use store::{AnalysisStore, PgAnalysisStore, StoreError};

/// The wired set of pipeline services sharing one store and runner.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn AnalysisStore>,
    pub dispatcher: Arc<WorkflowDispatcher>,
    pub receiver: Arc<CompletionReceiver>,
    pub scheduler: Arc<PollingScheduler>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        runner: Arc<dyn JobRunner>,
        config: &PipelineConfig,
    ) -> Self {
        let resolver = Arc::new(ArtifactResolver::new(Arc::clone(&runner)));
        let reconciler = Arc::new(StateReconciler::new(Arc::clone(&store)));

        let dispatcher = Arc::new(WorkflowDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&runner),
            config.callback_url(),
        ));
        let receiver = Arc::new(CompletionReceiver::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::clone(&reconciler),
            config.webhook_secret.clone(),
        ));
        let scheduler = Arc::new(PollingScheduler::new(
            Arc::clone(&store),
            runner,
            resolver,
            reconciler,
            config,
        ));

        Self {
            store,
            dispatcher,
            receiver,
            scheduler,
        }
    }
}
