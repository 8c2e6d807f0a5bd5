//! LSP workspace/executeCommand handlers.

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use tower_lsp::lsp_types::{
    ExecuteCommandParams, MessageType, Position, TextDocumentIdentifier, Url, WorkspaceEdit,
};
use tower_lsp::Client;
use tracing::{info, warn};

use comlink_core::text::utf16_len;
use comlink_core::{
    provision_directory, reference, select_root, DocumentText, Range, StoreError, WorkspaceError,
};

use crate::handlers::lsp_utils::versioned_edit;
use crate::handlers::store::report_store_error;
use crate::state::ServerState;

pub const INIT_COMMAND: &str = "comlink.init";
pub const DELETE_COMMAND: &str = "comlink.delete";
pub const STATUS_COMMAND: &str = "comlink.status";

/// Commands advertised in the server capabilities.
pub const COMMANDS: &[&str] = &[INIT_COMMAND, DELETE_COMMAND, STATUS_COMMAND];

#[derive(Debug, Deserialize)]
pub struct DeleteCommandArgs {
    #[serde(alias = "textDocument")]
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

/// Why a command did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandError {
    AlreadyInitialized,
    Workspace(WorkspaceError),
    Store(StoreError),
    UnknownDocument(Url),
    NoReference { line: u32 },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::AlreadyInitialized => f.write_str("comment store already initialized"),
            CommandError::Workspace(err) => write!(f, "{err}"),
            CommandError::Store(err) => write!(f, "{err}"),
            CommandError::UnknownDocument(uri) => write!(f, "{uri} is not open"),
            CommandError::NoReference { line } => {
                write!(f, "no comment reference on line {}", line + 1)
            }
        }
    }
}

impl From<WorkspaceError> for CommandError {
    fn from(err: WorkspaceError) -> Self {
        CommandError::Workspace(err)
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        CommandError::Store(err)
    }
}

impl CommandError {
    fn message_type(&self) -> MessageType {
        match self {
            CommandError::AlreadyInitialized => MessageType::INFO,
            CommandError::Workspace(WorkspaceError::WorkspaceUnavailable) => MessageType::ERROR,
            _ => MessageType::WARNING,
        }
    }
}

pub async fn execute_command(
    client: &Client,
    state: &ServerState,
    params: ExecuteCommandParams,
) -> Option<Value> {
    match params.command.as_str() {
        INIT_COMMAND => Some(run_init(client, state).await),
        DELETE_COMMAND => {
            let Some(args) = parse_delete_args(params.arguments) else {
                warn!("{DELETE_COMMAND} called without a document position");
                return None;
            };
            Some(run_delete(client, state, args).await)
        }
        STATUS_COMMAND => Some(status_value(state)),
        _ => None,
    }
}

fn parse_delete_args(args: Vec<Value>) -> Option<DeleteCommandArgs> {
    if args.len() != 1 {
        return None;
    }
    serde_json::from_value(args.into_iter().next()?).ok()
}

async fn notify_failure(client: &Client, state: &ServerState, err: &CommandError) {
    match err {
        CommandError::Store(err) => report_store_error(client, state, err).await,
        err => client.show_message(err.message_type(), err.to_string()).await,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InitReport {
    pub root: PathBuf,
    pub ignored_roots: usize,
    pub directory: PathBuf,
}

/// Provisions the storage directory and asks the store to initialize.
pub(crate) async fn init_project(state: &ServerState) -> Result<InitReport, CommandError> {
    if state.store_initialized() {
        return Err(CommandError::AlreadyInitialized);
    }
    let root = select_root(&state.workspace_paths())?;
    let store = state.store()?;
    let directory = state.project_config_for(&root.path).storage_dir();
    provision_directory(&directory)?;
    store.init().await?;
    state.mark_store_initialized();
    info!(directory = %directory.display(), "project initialized");
    Ok(InitReport {
        root: root.path,
        ignored_roots: root.ignored,
        directory,
    })
}

async fn run_init(client: &Client, state: &ServerState) -> Value {
    match init_project(state).await {
        Ok(report) => {
            if report.ignored_roots > 0 {
                client
                    .show_message(
                        MessageType::WARNING,
                        format!(
                            "Multiple workspace folders are open; initialized {}",
                            report.root.display()
                        ),
                    )
                    .await;
            }
            client
                .show_message(
                    MessageType::INFO,
                    format!("Comment storage created at {}", report.directory.display()),
                )
                .await;
            json!({
                "initialized": true,
                "root": report.root.display().to_string(),
                "directory": report.directory.display().to_string(),
            })
        }
        Err(err) => {
            notify_failure(client, state, &err).await;
            json!({ "initialized": false, "error": err.to_string() })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Deletion {
    pub id: String,
    pub edit: WorkspaceEdit,
}

/// Deletes the comment referenced on the given line and builds the edit
/// removing that line.
pub(crate) async fn delete_reference(
    state: &ServerState,
    args: &DeleteCommandArgs,
) -> Result<Deletion, CommandError> {
    let uri = &args.text_document.uri;
    let line = args.position.line;
    let doc = state
        .get_document(uri)
        .ok_or_else(|| CommandError::UnknownDocument(uri.clone()))?;
    let languages = state.languages();
    let id = languages
        .get(&doc.language_id)
        .zip(doc.text.line(line))
        .and_then(|(syntax, text)| reference::extract(text, syntax))
        .ok_or(CommandError::NoReference { line })?
        .to_string();
    let range = line_removal_range(&doc.text, line).ok_or(CommandError::NoReference { line })?;

    let store = state.store()?;
    store.delete(&id).await?;
    info!(%uri, id = %id, "comment deleted");
    Ok(Deletion {
        id,
        edit: versioned_edit(uri.clone(), doc.version, range, String::new()),
    })
}

async fn run_delete(client: &Client, state: &ServerState, args: DeleteCommandArgs) -> Value {
    match delete_reference(state, &args).await {
        Ok(deletion) => {
            let applied = match client.apply_edit(deletion.edit).await {
                Ok(response) => response.applied,
                Err(err) => {
                    warn!("workspace/applyEdit failed: {err}");
                    false
                }
            };
            json!({ "deleted": deletion.id, "applied": applied })
        }
        Err(err) => {
            notify_failure(client, state, &err).await;
            json!({ "deleted": Value::Null, "error": err.to_string() })
        }
    }
}

/// Range covering `line` and one adjacent line break.
///
/// The last line of a document takes the break before it, so no empty
/// line is left behind.
pub(crate) fn line_removal_range(text: &DocumentText, line: u32) -> Option<Range> {
    let range = text.line_range(line)?;
    if range.end.line > line || line == 0 {
        return Some(range);
    }
    let previous_end = utf16_len(text.line(line - 1)?);
    Some(Range::new(
        comlink_core::Position::new(line - 1, previous_end),
        range.end,
    ))
}

pub(crate) fn status_value(state: &ServerState) -> Value {
    let mut documents = state.documents();
    documents.sort_by(|left, right| left.uri.as_str().cmp(right.uri.as_str()));
    let documents: Vec<Value> = documents
        .iter()
        .map(|doc| {
            json!({
                "uri": doc.uri.as_str(),
                "languageId": doc.language_id,
                "version": doc.version,
                "phase": doc.authoring.phase().name(),
                "anchor": doc.authoring.anchor().map(|anchor| anchor.to_string()),
            })
        })
        .collect();

    json!({
        "root": state
            .workspace_paths()
            .first()
            .map(|root| root.display().to_string()),
        "store": {
            "running": state.store().is_ok(),
            "initialized": state.store_initialized(),
        },
        "settings": state.config(),
        "documents": documents,
    })
}
