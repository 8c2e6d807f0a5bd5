//! `comlink-core` - inline comment authoring backed by an external comment store.
//!
//! Typing `~some text~` in a document captures `some text`, sends it to the
//! comment store, and replaces the span with a reference such as `//ID:42`.
//! Hovering a reference fetches the stored text back.
//!
//! - **text**: document model and incremental change application
//! - **authoring**: per-document trigger state machine
//! - **protocol** / **channel**: line protocol and the process channel
//! - **store**: the [`CommentStore`] capability and [`MemoryStore`]
//! - **hover**: reference lookup for hover tooltips
//! - **workspace**: root selection and storage directory provisioning
//!
//! The state machine and hover resolution only see the [`CommentStore`]
//! trait, so they run against [`MemoryStore`] in tests and against
//! [`ProcessChannel`] in the server.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod authoring;
pub mod channel;
pub mod error;
pub mod hover;
pub mod languages;
pub mod protocol;
pub mod reference;
pub mod store;
pub mod text;
pub mod workspace;

pub use authoring::{AuthoringState, CommitRequest, CommitTicket, Phase, Splice, DEFAULT_MARKER};
pub use channel::{ChannelConfig, ProcessChannel, StoreOutput};
pub use error::{AuthoringError, StoreError, WorkspaceError};
pub use hover::resolve_hover;
pub use languages::{CommentSyntax, LanguageTable};
pub use protocol::{parse_response, Command, Response};
pub use store::{CommentStore, MemoryStore};
pub use text::{DocumentText, Position, Range, TextChange, TextError};
pub use workspace::{provision_directory, select_root, WorkspaceRoot};
