use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthGateway;
use crate::ingest::IngestService;
use crate::poll::PollTracker;
use crate::store::ResultStore;

/// HTTP surface options that do not belong to any one component.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    pub allow_cors: bool,
    pub static_dir: Option<PathBuf>,
}

/// Shared by every request handler.
pub struct AppState {
    pub auth: AuthGateway,
    pub ingest: IngestService,
    pub store: ResultStore,
    pub polls: Arc<PollTracker>,
    pub options: HttpOptions,
}
