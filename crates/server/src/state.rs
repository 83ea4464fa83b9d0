//! Shared application state

use std::sync::Arc;

use tokio::sync::Semaphore;

use babelroom_cache::RoomCache;
use babelroom_config::Settings;
use babelroom_pipeline::{AsyncBridge, Engines, RoomProcessorManager};

use crate::session::SessionRegistry;

/// Process-wide shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<RoomCache>,
    pub processors: Arc<RoomProcessorManager>,
    pub sessions: Arc<SessionRegistry>,
    pub engines: Engines,
    /// Caps concurrent chat streams at `server.max_workers`
    pub stream_permits: Arc<Semaphore>,
    /// Keeps the bridge runtime alive for the process lifetime
    _bridge: Arc<AsyncBridge>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        cache: Arc<RoomCache>,
        processors: Arc<RoomProcessorManager>,
        sessions: Arc<SessionRegistry>,
        engines: Engines,
        bridge: Arc<AsyncBridge>,
    ) -> Self {
        let stream_permits = Arc::new(Semaphore::new(settings.server.max_workers));
        Self {
            settings,
            cache,
            processors,
            sessions,
            engines,
            stream_permits,
            _bridge: bridge,
        }
    }
}
