//! HTTP route definitions.

use axum::{Router, http::HeaderValue, routing::get};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::CorsConfig;
use crate::handlers::health;
use crate::hub::Hub;
use crate::ws::ws_handler;

/// Creates the hub router: `/ws` plus the operational endpoints.
pub fn create_router(hub: Arc<Hub>, cors: &CorsConfig) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics));

    Router::new()
        .route("/ws", get(ws_handler))
        .nest("/api/v1", api_routes)
        .layer(build_cors_layer(cors))
        .with_state(hub)
}

/// Builds the CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }

    let origins: Vec<_> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    let mut cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };
    cors = cors.allow_methods(Any).allow_headers(Any);

    // Credentials cannot be combined with a wildcard origin.
    if config.allow_credentials && !config.allowed_origins.is_empty() {
        cors = cors.allow_credentials(true);
    }

    cors.max_age(std::time::Duration::from_secs(config.max_age_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtManager;
    use crate::config::JwtConfig;
    use crate::store::InMemoryStore;
    use crate::testing::CountingFeed;
    use crate::ws::WsConfig;

    fn hub() -> Arc<Hub> {
        Hub::new(
            WsConfig::default(),
            Arc::new(JwtManager::new(&JwtConfig::default())),
            Arc::new(CountingFeed::new()),
            Arc::new(InMemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_create_router() {
        let _router = create_router(hub(), &CorsConfig::default());
    }

    #[test]
    fn test_build_cors_layer_disabled() {
        let config = CorsConfig {
            enabled: false,
            ..Default::default()
        };
        let _cors = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_with_origins() {
        let config = CorsConfig {
            enabled: true,
            allowed_origins: vec!["https://dash.example.com".into(), "not a header\n".into()],
            allow_credentials: true,
            max_age_secs: 7200,
        };
        let _cors = build_cors_layer(&config);
    }
}
