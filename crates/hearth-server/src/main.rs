use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use hearth_api::notify::{AlertNotifier, DisabledNotifier, TwilioNotifier};
use hearth_api::state::AppStateInner;
use hearth_db::Database;
use hearth_gateway::hub::RoomHub;
use hearth_gateway::presence::PresenceTracker;
use hearth_server::build_app;
use hearth_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let notifier: Arc<dyn AlertNotifier> = match config.twilio.clone() {
        Some(t) => Arc::new(TwilioNotifier::new(t.account_sid, t.auth_token, t.from)),
        None => {
            warn!("HEARTH_TWILIO_* not fully set, SMS/voice alerts are disabled");
            Arc::new(DisabledNotifier)
        }
    };

    // Shared state
    let hub = RoomHub::new();
    let presence = PresenceTracker::new(db.clone(), hub.clone(), config.presence_policy);
    let api = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        broadcaster: Arc::new(hub),
        notifier,
        cookie_secure: config.cookie_secure,
    });

    let app = build_app(api, presence);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Hearth server listening on {} (presence: {:?})", addr, config.presence_policy);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
