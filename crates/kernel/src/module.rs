use async_trait::async_trait;
use axum::Router;

/// Context provided to modules during initialization.
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// Lifecycle trait implemented by every service module.
///
/// Modules are constructed with their dependencies (store and storage
/// clients) at bootstrap and registered with the [`crate::ModuleRegistry`];
/// nothing is reached through ambient global state.
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name for this module.
    fn name(&self) -> &'static str;

    /// Initialize the module with the provided context.
    /// Called during application startup, before the server binds.
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return the Axum router for this module's routes.
    /// Routers are merged at the root of the main router, so paths here are
    /// the final public paths.
    fn routes(&self) -> Router {
        Router::new()
    }

    /// Return an OpenAPI specification fragment for this module as JSON.
    /// Fragments are merged into the service-wide document.
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Start background tasks for this module.
    /// Called after all modules are initialized.
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop the module and clean up resources.
    /// Called during application shutdown.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
