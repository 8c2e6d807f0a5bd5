//! Server state management.
//!
//! Holds open documents with their authoring state, the project
//! configuration and the handle to the comment store.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info};

use comlink_core::{
    AuthoringError, AuthoringState, CommentStore, CommitRequest, CommitTicket, DocumentText,
    LanguageTable, Splice, StoreError, TextChange, TextError,
};

use crate::config::ProjectConfig;

mod path;

pub(crate) use path::uri_to_path;

/// A document managed by the server.
#[derive(Debug, Clone)]
pub struct Document {
    /// The document URI.
    pub uri: Url,
    /// The document version.
    pub version: i32,
    /// Editor language id.
    pub language_id: String,
    /// The document content.
    pub text: DocumentText,
    /// Where the document is in the comment authoring cycle.
    pub authoring: AuthoringState,
}

/// The server state.
pub struct ServerState {
    /// Open documents.
    documents: RwLock<FxHashMap<Url, Document>>,
    /// Current client configuration settings.
    config: RwLock<Value>,
    /// Workspace folders.
    workspace_folders: RwLock<Vec<Url>>,
    /// Configuration of the primary workspace root.
    project: RwLock<Option<ProjectConfig>>,
    /// Comment syntax per language, with project overrides.
    languages: RwLock<Arc<LanguageTable>>,
    /// The launched comment store, if any.
    store: RwLock<Option<Arc<dyn CommentStore>>>,
    /// Whether the store has been initialized this session.
    store_initialized: AtomicBool,
    /// Whether store unavailability was already shown to the user.
    unavailable_reported: AtomicBool,
}

impl ServerState {
    /// Creates a new server state.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(FxHashMap::default()),
            config: RwLock::new(Value::Null),
            workspace_folders: RwLock::new(Vec::new()),
            project: RwLock::new(None),
            languages: RwLock::new(Arc::new(LanguageTable::builtin())),
            store: RwLock::new(None),
            store_initialized: AtomicBool::new(false),
            unavailable_reported: AtomicBool::new(false),
        }
    }

    /// Stores the workspace folders.
    pub fn set_workspace_folders(&self, folders: Vec<Url>) {
        *self.workspace_folders.write() = folders;
    }

    /// Returns the current workspace folders.
    pub fn workspace_folders(&self) -> Vec<Url> {
        self.workspace_folders.read().clone()
    }

    /// Workspace folders that map to local paths.
    pub fn workspace_paths(&self) -> Vec<PathBuf> {
        self.workspace_folders()
            .iter()
            .filter_map(uri_to_path)
            .collect()
    }

    /// Installs the project configuration and the language table it implies.
    pub fn set_project_config(&self, config: ProjectConfig) {
        *self.languages.write() = Arc::new(config.language_table());
        *self.project.write() = Some(config);
    }

    /// Returns the project configuration, if a workspace root was configured.
    pub fn project_config(&self) -> Option<ProjectConfig> {
        self.project.read().clone()
    }

    /// Configuration for `root`: the loaded one when it matches, else a fresh load.
    pub fn project_config_for(&self, root: &std::path::Path) -> ProjectConfig {
        match self.project_config() {
            Some(config) if config.root == root => config,
            _ => ProjectConfig::load(root),
        }
    }

    pub fn languages(&self) -> Arc<LanguageTable> {
        Arc::clone(&self.languages.read())
    }

    /// Stores updated client configuration settings.
    pub fn set_config(&self, config: Value) {
        *self.config.write() = config;
    }

    /// Returns the current configuration snapshot.
    pub fn config(&self) -> Value {
        self.config.read().clone()
    }

    pub fn set_store(&self, store: Arc<dyn CommentStore>) {
        *self.store.write() = Some(store);
        self.unavailable_reported.store(false, Ordering::Release);
    }

    /// Drops the store handle, which terminates a launched process.
    pub fn clear_store(&self) -> bool {
        self.store.write().take().is_some()
    }

    pub fn has_store(&self) -> bool {
        self.store.read().is_some()
    }

    /// The comment store, if it can currently serve round-trips.
    pub fn store(&self) -> Result<Arc<dyn CommentStore>, StoreError> {
        match self.store.read().as_ref() {
            Some(store) if store.is_available() => Ok(Arc::clone(store)),
            _ => Err(StoreError::ProcessUnavailable),
        }
    }

    pub fn mark_store_initialized(&self) {
        self.store_initialized.store(true, Ordering::Release);
    }

    pub fn store_initialized(&self) -> bool {
        self.store_initialized.load(Ordering::Acquire)
    }

    /// Returns true exactly once until a new store is installed.
    pub fn claim_unavailable_report(&self) -> bool {
        !self.unavailable_reported.swap(true, Ordering::AcqRel)
    }

    /// Tracks a newly opened document.
    pub fn open_document(&self, uri: Url, version: i32, language_id: String, content: String) {
        let marker = self
            .project
            .read()
            .as_ref()
            .map(|config| config.authoring.marker)
            .unwrap_or(comlink_core::DEFAULT_MARKER);
        let doc = Document {
            uri: uri.clone(),
            version,
            language_id,
            text: DocumentText::new(content),
            authoring: AuthoringState::new(marker),
        };
        self.documents.write().insert(uri, doc);
    }

    /// Applies a change batch and advances the document's authoring state.
    ///
    /// Returns `None` for unknown documents. Documents whose language has no
    /// comment syntax get their text updated without authoring.
    pub fn apply_changes(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextChange],
    ) -> Option<Result<Option<CommitRequest>, TextError>> {
        let languages = self.languages();
        let mut documents = self.documents.write();
        let doc = documents.get_mut(uri)?;
        doc.version = version;
        let result = match languages.get(&doc.language_id) {
            Some(syntax) => doc.authoring.on_change(&mut doc.text, changes, syntax),
            None => changes
                .iter()
                .try_for_each(|change| doc.text.apply(change).map(|_| ()))
                .map(|()| None),
        };
        Some(result)
    }

    /// Resolves the pending commit `ticket` of `uri` with the store's answer.
    ///
    /// Returns the splice and the document version it was computed against.
    pub fn finish_commit(
        &self,
        uri: &Url,
        ticket: CommitTicket,
        outcome: Result<String, StoreError>,
    ) -> Result<(Splice, i32), AuthoringError> {
        let languages = self.languages();
        let mut documents = self.documents.write();
        let Some(doc) = documents.get_mut(uri) else {
            debug!(%uri, ticket = ticket.get(), "commit finished for a closed document");
            return match outcome {
                Ok(_) => Err(AuthoringError::SpliceStale),
                Err(err) => Err(err.into()),
            };
        };
        let Some(syntax) = languages.get(&doc.language_id) else {
            return Err(AuthoringError::SpliceStale);
        };
        let splice = doc.authoring.complete(&doc.text, ticket, outcome, syntax)?;
        Ok((splice, doc.version))
    }

    /// Stops tracking a document; a commit still in flight for it goes stale.
    pub fn close_document(&self, uri: &Url) {
        if let Some(doc) = self.documents.write().remove(uri) {
            if doc.authoring.anchor().is_some() {
                info!(
                    %uri,
                    phase = doc.authoring.phase().name(),
                    "closed document had an open declaration"
                );
            }
        }
    }

    pub fn get_document(&self, uri: &Url) -> Option<Document> {
        self.documents.read().get(uri).cloned()
    }

    /// Returns all open documents.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().values().cloned().collect()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
