//! Comment store process launch and output forwarding.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_lsp::lsp_types::MessageType;
use tower_lsp::Client;
use tracing::{error, info, warn};

use comlink_core::{select_root, ProcessChannel, StoreError, StoreOutput};

use crate::config::ProjectConfig;
use crate::state::ServerState;

/// Launches the comment store for the primary workspace root, once.
pub async fn launch_store(client: &Client, state: &Arc<ServerState>) {
    if state.has_store() {
        return;
    }
    let root = match select_root(&state.workspace_paths()) {
        Ok(root) => root,
        Err(err) => {
            info!("comment store not launched: {err}");
            return;
        }
    };
    let config = state.project_config_for(&root.path);

    match spawn_store(&config, &root.path) {
        Ok((channel, events)) => {
            state.set_store(Arc::new(channel));
            tokio::spawn(forward_store_output(client.clone(), events));
            client
                .log_message(
                    MessageType::INFO,
                    format!("Comment store running for {}", root.path.display()),
                )
                .await;
        }
        Err(err) => {
            error!("failed to launch comment store: {err:#}");
            report_store_error(client, state, &StoreError::ProcessUnavailable).await;
            client
                .log_message(MessageType::ERROR, format!("{err:#}"))
                .await;
        }
    }
}

fn spawn_store(
    config: &ProjectConfig,
    root: &Path,
) -> anyhow::Result<(ProcessChannel, UnboundedReceiver<StoreOutput>)> {
    let Some((program, args)) = config.store.program() else {
        anyhow::bail!("no comment store command configured");
    };
    ProcessChannel::spawn(program, args, root, config.store.channel_config())
        .with_context(|| format!("failed to launch comment store `{program}`"))
}

/// Mirrors store output into the client's log until the process goes away.
pub(crate) async fn forward_store_output(
    client: Client,
    mut events: UnboundedReceiver<StoreOutput>,
) {
    while let Some(event) = events.recv().await {
        let kind = match event {
            StoreOutput::Stdout(_) => MessageType::LOG,
            StoreOutput::Stderr(_) => MessageType::WARNING,
            StoreOutput::Exited => MessageType::ERROR,
        };
        client.log_message(kind, event.render()).await;
    }
}

/// Surfaces a failed round-trip as a non-blocking notification.
///
/// Unavailability is shown once per store; other failures each time.
pub(crate) async fn report_store_error(client: &Client, state: &ServerState, err: &StoreError) {
    if matches!(err, StoreError::ProcessUnavailable) {
        if !state.claim_unavailable_report() {
            warn!("comment store unavailable (already reported)");
            return;
        }
        client
            .show_message(
                MessageType::ERROR,
                "Comment store is unavailable; comments cannot be stored or shown until it is restarted.",
            )
            .await;
        return;
    }
    warn!("comment store request failed: {err}");
    client
        .show_message(MessageType::WARNING, format!("Comment store: {err}"))
        .await;
}
