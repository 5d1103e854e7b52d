mod modules;

use std::sync::Arc;

use anyhow::Context;

use stacks_blob::BlobClient;
use stacks_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use stacks_store::CosmosBookStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Startup is one explicit sequence: settings, telemetry, store
    // handshake (fatal), container bootstrap (module init, non-fatal),
    // then bind.
    let settings = Settings::load().with_context(|| "failed to load settings")?;
    stacks_telemetry::init(&settings.telemetry);

    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.endpoint,
        "stacks-app bootstrap starting"
    );

    let store = CosmosBookStore::connect(
        &settings.database.endpoint,
        &settings.database.key,
        &settings.database.database,
        &settings.database.collection,
    )
    .await
    .with_context(|| "document store handshake failed; refusing to serve")?;

    let blob = BlobClient::new(
        &settings.storage.account,
        &settings.storage.access_key,
        &settings.storage.container,
        settings.storage.endpoint.as_deref(),
    )
    .with_context(|| "invalid storage credentials")?;

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, Arc::new(store), Arc::new(blob));

    let ctx = InitCtx {
        settings: &settings,
    };
    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    stacks_http::start_server(&registry, &settings).await?;

    registry.stop_all().await?;
    Ok(())
}
