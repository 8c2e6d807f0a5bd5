//! LSP conversion helpers.

use tower_lsp::lsp_types::{
    DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier, Position, Range,
    TextDocumentContentChangeEvent, TextDocumentEdit, TextEdit, Url, WorkspaceEdit,
};

use comlink_core::TextChange;

pub(crate) fn to_core_position(position: Position) -> comlink_core::Position {
    comlink_core::Position::new(position.line, position.character)
}

pub(crate) fn to_lsp_position(position: comlink_core::Position) -> Position {
    Position::new(position.line, position.character)
}

pub(crate) fn to_core_range(range: Range) -> comlink_core::Range {
    comlink_core::Range::new(to_core_position(range.start), to_core_position(range.end))
}

pub(crate) fn to_lsp_range(range: comlink_core::Range) -> Range {
    Range::new(to_lsp_position(range.start), to_lsp_position(range.end))
}

pub(crate) fn to_core_change(change: TextDocumentContentChangeEvent) -> TextChange {
    match change.range {
        Some(range) => TextChange::replace(to_core_range(range), change.text),
        None => TextChange::full(change.text),
    }
}

/// Single-edit workspace edit pinned to `version`, so the client rejects it
/// if the document moved on.
pub(crate) fn versioned_edit(
    uri: Url,
    version: i32,
    range: comlink_core::Range,
    new_text: String,
) -> WorkspaceEdit {
    WorkspaceEdit {
        document_changes: Some(DocumentChanges::Edits(vec![TextDocumentEdit {
            text_document: OptionalVersionedTextDocumentIdentifier {
                uri,
                version: Some(version),
            },
            edits: vec![OneOf::Left(TextEdit {
                range: to_lsp_range(range),
                new_text,
            })],
        }])),
        ..Default::default()
    }
}
