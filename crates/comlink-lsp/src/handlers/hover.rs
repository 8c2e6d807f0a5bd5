//! Hover over embedded comment references.

use tower_lsp::lsp_types::*;
use tracing::debug;

use comlink_core::resolve_hover;

use crate::state::ServerState;

pub async fn hover(state: &ServerState, params: HoverParams) -> Option<Hover> {
    let position = params.text_document_position_params.position;
    let uri = params.text_document_position_params.text_document.uri;
    let doc = state.get_document(&uri)?;
    let line = doc.text.line(position.line)?.to_string();

    let store = match state.store() {
        Ok(store) => store,
        Err(err) => {
            debug!(%uri, "hover skipped: {err}");
            return None;
        }
    };
    let languages = state.languages();
    let text = resolve_hover(&line, &doc.language_id, &languages, store.as_ref()).await?;

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::PlainText,
            value: text,
        }),
        range: None,
    })
}
