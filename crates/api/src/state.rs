use ideaforge_pipeline::Pipeline;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: the pipeline services sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher, webhook receiver and scheduler over one store.
    pub pipeline: Pipeline,
}
