//! Test helpers shared across LSP unit tests.

use std::sync::{Arc, OnceLock};
use tower_lsp::{Client, LspService};

use crate::ComlinkLanguageServer;

/// Client handle of a server that never went through `initialize`.
///
/// Notifications sent through it are dropped and requests such as
/// `workspace/applyEdit` fail, so handlers run without an editor attached.
pub(crate) fn test_client() -> Client {
    let slot: Arc<OnceLock<Client>> = Arc::default();
    let (_service, socket) = LspService::new({
        let slot = Arc::clone(&slot);
        move |client| {
            let _ = slot.set(client.clone());
            ComlinkLanguageServer::new(client)
        }
    });
    drop(socket);
    slot.get().cloned().expect("client captured by service factory")
}
