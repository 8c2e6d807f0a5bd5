//! Document synchronization handlers.

use std::sync::Arc;

use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tracing::{debug, info, warn};

use comlink_core::{AuthoringError, CommitRequest, TextChange};

use crate::state::ServerState;

use super::lsp_utils::{to_core_change, versioned_edit};
use super::store::report_store_error;

pub fn did_open(state: &ServerState, params: DidOpenTextDocumentParams) {
    let doc = params.text_document;
    info!("Document opened: {} ({})", doc.uri, doc.language_id);
    state.open_document(doc.uri, doc.version, doc.language_id, doc.text);
}

/// Applies the change batch before returning; a captured commit continues
/// on its own task.
pub fn did_change(
    client: &Client,
    state: &Arc<ServerState>,
    params: DidChangeTextDocumentParams,
) {
    let uri = params.text_document.uri;
    let version = params.text_document.version;
    debug!("Document changed: {}", uri);

    if params.content_changes.is_empty() {
        return;
    }

    let changes: Vec<TextChange> = params
        .content_changes
        .into_iter()
        .map(to_core_change)
        .collect();
    let commit = match state.apply_changes(&uri, version, &changes) {
        None => {
            warn!("Received change for unknown document: {}", uri);
            return;
        }
        Some(Err(err)) => {
            warn!("Failed to apply incremental changes for {}: {err}", uri);
            return;
        }
        Some(Ok(commit)) => commit,
    };

    if let Some(request) = commit {
        info!(%uri, ticket = request.ticket.get(), "comment captured");
        tokio::spawn(run_commit(client.clone(), Arc::clone(state), uri, request));
    }
}

/// Sends a captured body to the store and splices the returned reference.
pub(crate) async fn run_commit(
    client: Client,
    state: Arc<ServerState>,
    uri: Url,
    request: CommitRequest,
) {
    let outcome = match state.store() {
        Ok(store) => store.create(&request.body).await,
        Err(err) => Err(err),
    };

    let (splice, version) = match state.finish_commit(&uri, request.ticket, outcome) {
        Ok(done) => done,
        Err(AuthoringError::Store(err)) => {
            report_store_error(&client, &state, &err).await;
            return;
        }
        Err(AuthoringError::SpliceStale) => {
            warn!(%uri, ticket = request.ticket.get(), "document changed; reference discarded");
            client
                .log_message(
                    MessageType::WARNING,
                    format!("{uri} changed before the comment reference could be inserted"),
                )
                .await;
            return;
        }
    };

    let edit = versioned_edit(uri.clone(), version, splice.range, splice.new_text);
    match client.apply_edit(edit).await {
        Ok(response) if response.applied => {
            info!(%uri, ticket = request.ticket.get(), "comment reference inserted");
        }
        Ok(response) => {
            let reason = response.failure_reason.unwrap_or_default();
            warn!(%uri, "client rejected reference splice: {reason}");
            client
                .log_message(
                    MessageType::WARNING,
                    format!("Comment reference for {uri} was not applied: {reason}"),
                )
                .await;
        }
        Err(err) => warn!(%uri, "workspace/applyEdit failed: {err}"),
    }
}

pub fn did_close(state: &ServerState, params: DidCloseTextDocumentParams) {
    let uri = params.text_document.uri;
    info!("Document closed: {}", uri);
    state.close_document(&uri);
}
