//! Shared runtime state for ogw-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything inside is
//! request-scoped or immutable; there is no process-wide mutable session.

use std::sync::Arc;

use chrono::Duration;
use ogw_auth::TokenService;
use ogw_orders::OrderOrchestrator;
use ogw_store::EntityStore;
use serde::Serialize;

/// Static build metadata included in the health response.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The entity store every request operates against.
    pub store: Arc<dyn EntityStore>,
    /// Token issue/validate service.
    pub tokens: TokenService,
    /// Create-order workflow driver.
    pub orchestrator: OrderOrchestrator,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, token_ttl: Option<Duration>) -> Self {
        let tokens = match token_ttl {
            Some(ttl) => TokenService::with_ttl(Arc::clone(&store), ttl),
            None => TokenService::new(Arc::clone(&store)),
        };
        let orchestrator = OrderOrchestrator::new(Arc::clone(&store));

        Self {
            store,
            tokens,
            orchestrator,
            build: BuildInfo {
                service: "ogw-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

/// Optional time-based token expiry from `OGW_TOKEN_TTL_SECS`.
/// Unset means most-recent-wins invalidation only.
pub fn token_ttl_from_env() -> Option<Duration> {
    let secs: i64 = std::env::var("OGW_TOKEN_TTL_SECS").ok()?.parse().ok()?;
    (secs > 0).then(|| Duration::seconds(secs))
}
