use std::sync::Arc;

use crate::config::Config;
use crate::ranking::pipeline::RankingPipeline;
use crate::report::ReportExporter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RankingPipeline>,
    /// Pluggable report renderer. Default: MarkdownReport.
    pub exporter: Arc<dyn ReportExporter>,
    pub config: Config,
}
