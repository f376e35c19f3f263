//! Application state for the pdfedit server

use std::sync::Arc;

use pdfedit_core::{LopdfEngine, MemorySessionStore, PdfEditError, SessionStore};

use crate::config::Config;
use crate::error::ApiError;
use crate::storage::FileStore;

pub struct AppState {
    pub sessions: MemorySessionStore,
    pub engine: LopdfEngine,
    pub files: FileStore,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let files = FileStore::new(&config.upload_dir, &config.edited_dir)?;
        tracing::info!(
            upload_dir = %config.upload_dir.display(),
            edited_dir = %config.edited_dir.display(),
            "storage ready"
        );
        Ok(Self {
            sessions: MemorySessionStore::new(config.session()),
            engine: LopdfEngine::new(),
            files,
        })
    }

    /// Drop idle sessions along with their files.
    pub async fn sweep(&self) -> usize {
        let expired = self.sessions.evict_expired();
        self.files.discard_sessions(&expired).await;
        expired.len()
    }

    /// Convert a session lookup result, cleaning up right away when the
    /// session turned out to be expired.
    pub async fn settle<T>(&self, result: Result<T, PdfEditError>) -> Result<T, ApiError> {
        if let Err(PdfEditError::SessionExpired(_)) = &result {
            self.sweep().await;
        }
        result.map_err(ApiError::from)
    }
}

/// Periodically remove expired sessions until the runtime shuts down.
pub fn spawn_sweeper(state: Arc<AppState>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = state.sweep().await;
            if removed > 0 {
                tracing::debug!(removed, "session sweep");
            }
        }
    });
}
