//! HTTP server facade for the catalog service: Axum, error handling, and
//! OpenAPI support.

use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};

use stacks_authz::AccessPolicy;
use stacks_kernel::ModuleRegistry;

pub mod error;
pub mod router;

use router::RouterBuilder;

/// Start the HTTP server with the given module registry.
///
/// Callers run the startup sequence (store connect, container bootstrap,
/// module init) before this point; binding the listener is the last step.
pub async fn start_server(
    registry: &ModuleRegistry,
    settings: &stacks_kernel::settings::Settings,
) -> anyhow::Result<()> {
    tracing::info!(
        "starting HTTP server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    let app = build_router(registry, settings);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", settings.server.host, settings.server.port))
            .await
            .context("failed to bind to address")?;

    tracing::info!(
        "HTTP server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// Build the main HTTP router with all module routes merged.
pub fn build_router(
    registry: &ModuleRegistry,
    settings: &stacks_kernel::settings::Settings,
) -> Router {
    let policy = Arc::new(AccessPolicy::from_key(settings.auth.api_key.clone()));

    // Routes first: axum layers only wrap routes that are already present.
    let mut router_builder = RouterBuilder::new().route("/healthz", get(health_check));

    for module in registry.modules() {
        tracing::info!(module = module.name(), "merging module routes");
        router_builder = router_builder.merge_module(module.routes());
    }

    router_builder
        .with_guard(policy)
        .with_tracing()
        .with_cors()
        .with_request_id()
        .with_timeout(settings.server.request_timeout_ms)
        .with_openapi(registry)
        .build()
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}
