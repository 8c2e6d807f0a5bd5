//! Comment-authoring state machine.
//!
//! Watches the change sets of one document. Typing the marker opens a
//! declaration, typing body text arms it, and typing the marker again commits
//! the span between the two markers. A commit is sent to the comment store and
//! the span is later replaced by the minted reference.
//!
//! ```text
//! Idle --marker--> DeclarationStarted { creating: false }
//!   --text-->   DeclarationStarted { creating: true }
//!   --marker--> Committing --response--> Idle
//! DeclarationStarted { creating: false } --marker--> Idle   (empty declaration)
//! ```
//!
//! While a commit is in flight every further change is ignored by the state
//! machine; the pending commit keeps the exact text it captured and only
//! splices if the document still holds that text at that range.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::{AuthoringError, StoreError};
use crate::languages::CommentSyntax;
use crate::reference;
use crate::text::{
    line_offset, utf16_len, utf16_width, Applied, DocumentText, Position, Range, TextChange,
    TextError,
};

/// Default declaration-begin / commit marker.
pub const DEFAULT_MARKER: char = '~';

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

/// Identifies one commit round-trip. Unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitTicket(u64);

impl CommitTicket {
    fn next() -> Self {
        Self(NEXT_TICKET.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A commit waiting for its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    pub ticket: CommitTicket,
    /// Range the reference will replace.
    pub range: Range,
    /// Document text at `range` when the commit was captured.
    pub captured: String,
}

/// Where a document is in the authoring cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A marker was typed at `anchor`; `creating` once body text followed it.
    DeclarationStarted { anchor: Position, creating: bool },
    /// The body was captured and sent to the store.
    Committing {
        anchor: Position,
        pending: PendingCommit,
    },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::DeclarationStarted { .. } => "declaration_started",
            Phase::Committing { .. } => "committing",
        }
    }
}

/// A captured comment body to send to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub ticket: CommitTicket,
    pub range: Range,
    pub body: String,
}

/// Document edit replacing a captured span with its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub range: Range,
    pub new_text: String,
}

/// Authoring state of a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoringState {
    phase: Phase,
    marker: char,
}

impl Default for AuthoringState {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl AuthoringState {
    pub fn new(marker: char) -> Self {
        Self {
            phase: Phase::Idle,
            marker,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    /// Start of the open declaration, if any.
    pub fn anchor(&self) -> Option<Position> {
        match &self.phase {
            Phase::Idle => None,
            Phase::DeclarationStarted { anchor, .. } | Phase::Committing { anchor, .. } => {
                Some(*anchor)
            }
        }
    }

    /// Whether body text has been typed since the marker.
    pub fn is_creating(&self) -> bool {
        matches!(self.phase, Phase::DeclarationStarted { creating: true, .. })
    }

    /// Applies a change-set batch to `doc` and advances the state machine.
    ///
    /// Returns the commit captured by this batch, if any. On a change that
    /// doesn't fit the document, the changes before it stay applied, an open
    /// declaration is abandoned, and the error is returned.
    pub fn on_change(
        &mut self,
        doc: &mut DocumentText,
        changes: &[TextChange],
        syntax: &CommentSyntax,
    ) -> Result<Option<CommitRequest>, TextError> {
        let mut commit = None;
        for change in changes {
            let applied = match doc.apply(change) {
                Ok(applied) => applied,
                Err(err) => {
                    self.abandon("change could not be applied");
                    return Err(err);
                }
            };
            if let Some(request) = self.step(doc, &change.text, &applied, syntax) {
                commit = Some(request);
            }
        }
        Ok(commit)
    }

    /// Finishes the commit identified by `ticket` with the store's answer.
    ///
    /// The state returns to idle whatever the outcome. A ticket that isn't the
    /// pending one, or a document that no longer holds the captured text,
    /// yields [`AuthoringError::SpliceStale`].
    pub fn complete(
        &mut self,
        doc: &DocumentText,
        ticket: CommitTicket,
        outcome: Result<String, StoreError>,
        syntax: &CommentSyntax,
    ) -> Result<Splice, AuthoringError> {
        let pending = match &self.phase {
            Phase::Committing { pending, .. } if pending.ticket == ticket => pending.clone(),
            _ => return Err(AuthoringError::SpliceStale),
        };
        self.phase = Phase::Idle;

        let id = outcome?;
        match doc.slice(pending.range) {
            Ok(current) if current == pending.captured => Ok(Splice {
                range: pending.range,
                new_text: reference::render(syntax, &id),
            }),
            _ => Err(AuthoringError::SpliceStale),
        }
    }

    fn step(
        &mut self,
        doc: &DocumentText,
        text: &str,
        applied: &Applied,
        syntax: &CommentSyntax,
    ) -> Option<CommitRequest> {
        if matches!(self.phase, Phase::Committing { .. }) {
            trace!("change ignored while a commit is in flight");
            return None;
        }

        if applied.range.is_none() {
            self.abandon("document replaced");
            return None;
        }

        if applied.removed.contains(self.marker) {
            self.abandon("marker deleted");
        }

        let last = text.chars().last()?;
        let head = &text[..text.len() - last.len_utf8()];

        if let Phase::DeclarationStarted { .. } = self.phase {
            if text.contains('\n') {
                self.abandon("line break in declaration");
            }
        }

        match self.phase {
            Phase::Idle => {
                if last == self.marker {
                    let anchor = Position::new(
                        applied.end.line,
                        applied.end.character.saturating_sub(utf16_width(last)),
                    );
                    debug!(%anchor, "declaration started");
                    self.phase = Phase::DeclarationStarted {
                        anchor,
                        creating: false,
                    };
                }
                None
            }
            Phase::DeclarationStarted { anchor, creating } => {
                if last != self.marker {
                    self.phase = Phase::DeclarationStarted {
                        anchor,
                        creating: true,
                    };
                    return None;
                }
                if creating || head.chars().any(|c| c != self.marker) {
                    self.capture(doc, anchor, applied.end, syntax)
                } else {
                    self.abandon("empty declaration");
                    None
                }
            }
            Phase::Committing { .. } => None,
        }
    }

    fn capture(
        &mut self,
        doc: &DocumentText,
        anchor: Position,
        end: Position,
        syntax: &CommentSyntax,
    ) -> Option<CommitRequest> {
        let declared = Range::new(anchor, end);
        let body = doc.slice(declared).ok().and_then(|span| {
            span.strip_prefix(self.marker)
                .and_then(|rest| rest.strip_suffix(self.marker))
                .map(str::to_string)
        });
        let Some(body) = body else {
            self.abandon("anchor no longer on a marker");
            return None;
        };

        let range = Range::new(widen_to_comment_prefix(doc, anchor, syntax), end);
        let Ok(captured) = doc.slice(range).map(str::to_string) else {
            self.abandon("capture range outside document");
            return None;
        };

        let ticket = CommitTicket::next();
        debug!(ticket = ticket.get(), %range, "declaration committed");
        self.phase = Phase::Committing {
            anchor,
            pending: PendingCommit {
                ticket,
                range,
                captured,
            },
        };
        Some(CommitRequest {
            ticket,
            range,
            body,
        })
    }

    fn abandon(&mut self, reason: &str) {
        if let Phase::DeclarationStarted { anchor, .. } = self.phase {
            debug!(%anchor, reason, "declaration abandoned");
            self.phase = Phase::Idle;
        }
    }
}

/// Moves `anchor` back over the comment prefix (and spacing) that precedes it.
fn widen_to_comment_prefix(
    doc: &DocumentText,
    anchor: Position,
    syntax: &CommentSyntax,
) -> Position {
    let Some(line) = doc.line(anchor.line) else {
        return anchor;
    };
    let before = &line[..line_offset(line, anchor.character)];
    let trimmed = before.trim_end();
    if trimmed.is_empty() || !trimmed.ends_with(syntax.prefix.as_str()) {
        return anchor;
    }
    let start = utf16_len(trimmed) - utf16_len(&syntax.prefix);
    Position::new(anchor.line, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slashes() -> CommentSyntax {
        CommentSyntax::line("//")
    }

    /// Types `text` one character at a time starting at `at`.
    fn type_chars(
        state: &mut AuthoringState,
        doc: &mut DocumentText,
        at: Position,
        text: &str,
    ) -> Option<CommitRequest> {
        let mut position = at;
        let mut commit = None;
        for c in text.chars() {
            let change = TextChange::insert(position, c.to_string());
            if let Some(request) = state
                .on_change(doc, &[change], &slashes())
                .expect("apply keystroke")
            {
                commit = Some(request);
            }
            position = crate::text::advance(position, &c.to_string());
        }
        commit
    }

    #[test]
    fn marker_starts_declaration_at_its_own_position() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("// ");
        type_chars(&mut state, &mut doc, Position::new(0, 3), "~");
        assert_eq!(
            state.phase(),
            &Phase::DeclarationStarted {
                anchor: Position::new(0, 3),
                creating: false
            }
        );
        assert_eq!(state.anchor(), Some(Position::new(0, 3)));
    }

    #[test]
    fn body_text_arms_the_declaration() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~a");
        assert!(state.is_creating());
    }

    #[test]
    fn double_marker_cancels_without_capture() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        let commit = type_chars(&mut state, &mut doc, Position::new(0, 0), "~~");
        assert_eq!(commit, None);
        assert_eq!(state.phase(), &Phase::Idle);
        assert_eq!(doc.as_str(), "~~");
    }

    #[test]
    fn commit_captures_body_between_markers() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("let a = 1; ");
        let commit = type_chars(&mut state, &mut doc, Position::new(0, 11), "~fix this~")
            .expect("commit");
        assert_eq!(commit.body, "fix this");
        assert_eq!(
            commit.range,
            Range::new(Position::new(0, 11), Position::new(0, 21))
        );
        assert_eq!(state.phase().name(), "committing");
    }

    #[test]
    fn commit_range_swallows_comment_prefix() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("x(); // ");
        let commit =
            type_chars(&mut state, &mut doc, Position::new(0, 8), "~note~").expect("commit");
        assert_eq!(commit.body, "note");
        assert_eq!(
            commit.range,
            Range::new(Position::new(0, 5), Position::new(0, 14))
        );
    }

    #[test]
    fn commit_after_astral_character_uses_utf16_columns() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("😀 // ");
        let commit =
            type_chars(&mut state, &mut doc, Position::new(0, 6), "~note~").expect("commit");
        assert_eq!(doc.as_str(), "😀 // ~note~");
        assert_eq!(commit.body, "note");
        assert_eq!(
            commit.range,
            Range::new(Position::new(0, 3), Position::new(0, 12))
        );
    }

    #[test]
    fn deleting_marker_resets_to_idle() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~ab");
        let delete = TextChange::delete(Range::new(Position::new(0, 0), Position::new(0, 1)));
        state
            .on_change(&mut doc, &[delete], &slashes())
            .expect("apply delete");
        assert_eq!(state.phase(), &Phase::Idle);
        assert!(!state.is_creating());

        type_chars(&mut state, &mut doc, Position::new(0, 2), "~");
        assert_eq!(state.anchor(), Some(Position::new(0, 2)));
        assert!(!state.is_creating());
    }

    #[test]
    fn deleting_body_text_keeps_declaration() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~abc");
        let backspace = TextChange::delete(Range::new(Position::new(0, 3), Position::new(0, 4)));
        state
            .on_change(&mut doc, &[backspace], &slashes())
            .expect("apply delete");
        assert!(state.is_creating());
        assert_eq!(state.anchor(), Some(Position::new(0, 0)));
    }

    #[test]
    fn pasted_text_ending_in_marker_commits() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~");
        let paste = TextChange::insert(Position::new(0, 1), "pasted body~");
        let commit = state
            .on_change(&mut doc, &[paste], &slashes())
            .expect("apply paste")
            .expect("commit");
        assert_eq!(commit.body, "pasted body");
        assert_eq!(commit.range.end, Position::new(0, 13));
    }

    #[test]
    fn pasted_text_ending_in_marker_opens_at_marker() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        let paste = TextChange::insert(Position::new(0, 0), "prefix ~");
        state
            .on_change(&mut doc, &[paste], &slashes())
            .expect("apply paste");
        assert_eq!(state.anchor(), Some(Position::new(0, 7)));
    }

    #[test]
    fn line_break_abandons_declaration() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~abc\n");
        assert_eq!(state.phase(), &Phase::Idle);
        let commit = type_chars(&mut state, &mut doc, Position::new(1, 0), "d~");
        assert_eq!(commit, None);
        assert_eq!(state.anchor(), Some(Position::new(1, 1)));
    }

    #[test]
    fn full_replacement_abandons_declaration() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~abc");
        state
            .on_change(&mut doc, &[TextChange::full("reloaded")], &slashes())
            .expect("apply full sync");
        assert_eq!(state.phase(), &Phase::Idle);
    }

    #[test]
    fn new_marker_is_ignored_while_committing() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        let commit = type_chars(&mut state, &mut doc, Position::new(0, 0), "~one~").expect("commit");
        let later = type_chars(&mut state, &mut doc, Position::new(0, 5), " ~two~");
        assert_eq!(later, None);
        assert!(matches!(state.phase(), Phase::Committing { .. }));

        let splice = state
            .complete(&doc, commit.ticket, Ok("7".to_string()), &slashes())
            .expect("splice");
        assert_eq!(
            splice,
            Splice {
                range: Range::new(Position::new(0, 0), Position::new(0, 5)),
                new_text: "//ID:7".to_string(),
            }
        );
        assert_eq!(state.phase(), &Phase::Idle);
    }

    #[test]
    fn store_failure_returns_to_idle_without_splice() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        let commit = type_chars(&mut state, &mut doc, Position::new(0, 0), "~one~").expect("commit");
        let result = state.complete(
            &doc,
            commit.ticket,
            Err(StoreError::ProcessUnavailable),
            &slashes(),
        );
        assert_eq!(
            result,
            Err(AuthoringError::Store(StoreError::ProcessUnavailable))
        );
        assert_eq!(state.phase(), &Phase::Idle);
        assert_eq!(doc.as_str(), "~one~");
    }

    #[test]
    fn edited_capture_is_stale() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        let commit = type_chars(&mut state, &mut doc, Position::new(0, 0), "~one~").expect("commit");
        let edit = TextChange::replace(Range::new(Position::new(0, 1), Position::new(0, 4)), "two");
        state
            .on_change(&mut doc, &[edit], &slashes())
            .expect("apply edit");
        let result = state.complete(&doc, commit.ticket, Ok("1".to_string()), &slashes());
        assert_eq!(result, Err(AuthoringError::SpliceStale));
        assert_eq!(state.phase(), &Phase::Idle);
    }

    #[test]
    fn unknown_ticket_is_stale_and_keeps_pending_commit() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        let commit = type_chars(&mut state, &mut doc, Position::new(0, 0), "~one~").expect("commit");
        let other = CommitTicket(commit.ticket.get() + 1_000_000);
        let result = state.complete(&doc, other, Ok("1".to_string()), &slashes());
        assert_eq!(result, Err(AuthoringError::SpliceStale));
        assert!(matches!(state.phase(), Phase::Committing { .. }));
    }

    #[test]
    fn invalid_change_abandons_declaration() {
        let mut state = AuthoringState::default();
        let mut doc = DocumentText::new("");
        type_chars(&mut state, &mut doc, Position::new(0, 0), "~a");
        let bad = TextChange::insert(Position::new(9, 0), "x");
        assert!(state.on_change(&mut doc, &[bad], &slashes()).is_err());
        assert_eq!(state.phase(), &Phase::Idle);
    }
}
