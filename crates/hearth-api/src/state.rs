use std::sync::Arc;

use hearth_db::Database;
use hearth_gateway::hub::Broadcaster;

use crate::error::ApiResult;
use crate::notify::AlertNotifier;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs. The broadcaster and notifier are injected at
/// startup; nothing reaches the realtime layer through a global.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub notifier: Arc<dyn AlertNotifier>,
    /// Mark the session cookie `Secure` (HTTPS deployments)
    pub cookie_secure: bool,
}

impl AppStateInner {
    /// Run blocking store work off the async runtime. The closure may raise
    /// domain errors directly; store errors convert through `?`.
    pub async fn db<T, F>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}
