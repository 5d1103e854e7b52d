pub mod books;
pub mod covers;

use std::sync::Arc;

use stacks_blob::BlobClient;
use stacks_kernel::ModuleRegistry;
use stacks_store::BookStore;

/// Register all service modules with the registry, handing each its
/// dependencies. Registration order is the init order.
pub fn register_all(
    registry: &mut ModuleRegistry,
    store: Arc<dyn BookStore>,
    blob: Arc<BlobClient>,
) {
    registry.register(books::create_module(store));
    registry.register(covers::create_module(blob));
}
