use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tradewire::TradewireError;
use tradewire::api::ApiClient;
use tradewire::config::fetch_config;
use tradewire::credentials::{self, Credential};
use tradewire::event::SyncEvent;
use tradewire::models::NoticeLevel;
use tradewire::websocket::{ConnectionSupervisor, StompConnector};

#[tokio::main]
async fn main() -> Result<(), TradewireError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app_config = fetch_config()?;

    let from_keychain = app_config.token.is_none();
    let credential = match app_config.token.as_deref() {
        Some(token) => Credential::new(token),
        None => credentials::load_token().ok_or_else(|| {
            TradewireError::Config(
                "no credential: set TRADEWIRE_TOKEN or store a token in the keychain".to_string(),
            )
        })?,
    };

    if !from_keychain && std::env::args().any(|arg| arg == "--save-token") {
        match credentials::save_token(&credential) {
            Ok(()) => info!("Stored bearer token in the keychain"),
            Err(e) => warn!("{e}"),
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let connector = StompConnector::new(&app_config.server.websocket_url);
    let api = ApiClient::new(&app_config.server.api_url)?;
    let (supervisor, handle) = ConnectionSupervisor::new(connector, app_config.sync, tx);
    let task = tokio::spawn(supervisor.with_api(api).run());

    handle.start(credential);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SyncEvent::StateChanged(state) => info!(?state, "Connection state"),
                    SyncEvent::Price(update) => info!(
                        symbol = %update.symbol,
                        price = %update.price,
                        delta = %update.delta,
                        direction = ?update.direction,
                        "Price"
                    ),
                    SyncEvent::Feed(feed) => {
                        if let Some(print) = feed.first() {
                            info!(
                                symbol = %print.stock_symbol,
                                price = %print.price,
                                quantity = print.quantity,
                                "Trade"
                            );
                        }
                    }
                    SyncEvent::Orders(view) => info!(
                        orders = view.orders.len(),
                        active = view.active_count,
                        "Orders"
                    ),
                    SyncEvent::Balance(balance) => info!(%balance, "Balance"),
                    SyncEvent::Notice(notice) => match notice.level {
                        NoticeLevel::Info => info!("{}", notice.message),
                        NoticeLevel::Error => warn!("{}", notice.message),
                    },
                    SyncEvent::ReauthRequired { reason } => {
                        error!(%reason, "Credential rejected; supply a new TRADEWIRE_TOKEN");
                        if from_keychain {
                            credentials::forget_token();
                        }
                        break;
                    }
                    SyncEvent::SessionReset => info!("Session reset"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    handle.stop();
    handle.reset_session();
    drop(handle);
    if let Err(e) = task.await {
        error!("Supervisor task failed: {e}");
    }

    Ok(())
}
