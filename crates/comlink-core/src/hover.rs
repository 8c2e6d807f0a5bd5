//! Hover resolution for embedded comment references.

use tracing::warn;

use crate::languages::LanguageTable;
use crate::reference;
use crate::store::CommentStore;

/// Looks up the comment text behind the reference on `line_text`.
///
/// Returns `None` without touching the store when the language is unknown or
/// the line carries no reference. Store failures and empty answers also yield
/// `None`.
pub async fn resolve_hover(
    line_text: &str,
    language_id: &str,
    languages: &LanguageTable,
    store: &dyn CommentStore,
) -> Option<String> {
    let syntax = languages.get(language_id)?;
    let id = reference::extract(line_text, syntax)?;
    match store.fetch(id).await {
        Ok(text) => text.filter(|text| !text.trim().is_empty()),
        Err(err) => {
            warn!(id, error = %err, "failed to fetch comment for hover");
            None
        }
    }
}
