use std::sync::Arc;

use mkutils_presence::config::Config;
use mkutils_presence::relay::DispatchOptions;
use mkutils_presence::{
    AppState, Dispatcher, KeySpace, PresenceDirectory, Relay, SidecarHost, create_app,
};
use mkutils_store::StoreManager;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging, RUST_LOG overrides the default level
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting mkUtils presence sidecar...");

    let config = Config::from_env();
    tracing::info!(
        "Configuration: role={}, server={}, namespace={}, port={}, redis={}:{}, sync={}",
        config.role,
        config.server_name,
        config.namespace,
        config.port,
        config.redis.host,
        config.redis.port,
        config.redis.sync_bungee_data_using_redis
    );

    let manager = match StoreManager::initialize(config.redis.clone()).await {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            tracing::error!("Store could not be initialized: {}", err);
            return Err(err.into());
        }
    };
    let liveness = manager.spawn_liveness();

    let keys = KeySpace::new(config.namespace.clone());
    let store = manager.store();
    let directory = Arc::new(PresenceDirectory::new(store.clone(), keys.clone()));
    let host = Arc::new(SidecarHost::new(config.outbox_capacity));
    let owns_presence = config.owns_presence();

    let cancel = manager.cancellation().child_token();
    let resync = if owns_presence {
        directory
            .announce_server_online(&config.server_name)
            .await?;
        Some(directory.spawn_resync(manager.watch_status(), cancel.clone()))
    } else {
        None
    };

    let dispatcher = Dispatcher::for_role(
        config.role,
        host.clone(),
        owns_presence.then(|| directory.clone()),
        DispatchOptions {
            keys: keys.clone(),
            log_power_actions: config.log_power_actions,
        },
    );
    let relay_listener = dispatcher.listen(store.clone(), cancel.clone()).await?;

    let state = AppState {
        role: config.role,
        server_name: config.server_name.clone(),
        owns_presence,
        manager: manager.clone(),
        directory: directory.clone(),
        relay: Relay::new(store, keys),
        host,
    };
    let app = create_app(state, config.request_body_limit, config.request_timeout);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;
    if let Err(e) = &served {
        tracing::error!("Axum server error: {}", e);
    }

    tracing::info!("Shutting down...");
    if owns_presence {
        if let Err(e) = directory.announce_server_offline(&config.server_name).await {
            tracing::warn!("Could not announce server offline: {}", e);
        }
    }
    cancel.cancel();
    manager.shutdown().await;
    let _ = relay_listener.await;
    let _ = liveness.await;
    if let Some(resync) = resync {
        let _ = resync.await;
    }

    served.map_err(Into::into)
}
