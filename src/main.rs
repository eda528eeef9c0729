// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keycloak_guard::api::router;
use keycloak_guard::auth::{KeycloakGuard, RetrieverRegistry};
use keycloak_guard::config::{
    KeycloakConfig, DEFAULT_LOG_FILTER, HOST_ENV, LOG_FORMAT_ENV, PORT_ENV,
};
use keycloak_guard::providers::ServiceTokenCache;
use keycloak_guard::state::AppState;
use keycloak_guard::store::{ClaimsEmailLookup, InMemoryUserStore};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => builder.json().init(),
        Ok("pretty") => builder.pretty().init(),
        _ => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Arc::new(KeycloakConfig::from_env().expect("Invalid KEYCLOAK_* configuration"));
    info!(config = ?config, "Loaded Keycloak configuration");
    if config.realm_public_key.is_none() && config.realm_address.is_none() {
        warn!("Neither KEYCLOAK_REALM_PUBLIC_KEY nor KEYCLOAK_REALM_ADDRESS is set; all tokens will be refused");
    }

    // Initialize application state
    let users = Arc::new(InMemoryUserStore::new());
    if let Ok(username) = env::var("SEED_USERNAME") {
        let email = env::var("SEED_EMAIL").ok();
        let user = users.insert_user(&username, email.as_deref()).await;
        info!(id = ?user.id, username = %username, "Seeded user");
    }

    let registry = RetrieverRegistry::new().register(
        ClaimsEmailLookup::NAME,
        Arc::new(ClaimsEmailLookup::new(Arc::clone(&users))),
    );
    let keycloak = KeycloakGuard::from_config(Arc::clone(&config), Arc::clone(&users), &registry)
        .expect("Failed to initialize Keycloak guard");

    let mut state = AppState::new(keycloak, users);
    if config.auth_url.is_some() {
        let cache =
            ServiceTokenCache::from_config(&config).expect("Invalid service credential settings");
        state = state.with_service_tokens(cache);
    }

    let app = router(state);

    // Parse bind address
    let host = env::var(HOST_ENV).unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var(PORT_ENV)
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Keycloak guard listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}
