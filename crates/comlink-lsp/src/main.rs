//! `comlink-lsp` - language server that turns inline `~comments~` into
//! references to an external comment store.
//!
//! This is the main entry point for the server.

mod config;
mod handlers;
mod state;
#[cfg(test)]
mod test_support;

use serde_json::Value;
use std::sync::Arc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::info;

use crate::handlers::COMMANDS;
use crate::state::ServerState;

/// The main language server struct.
pub struct ComlinkLanguageServer {
    /// LSP client for sending notifications.
    client: Client,
    /// Server state.
    state: Arc<ServerState>,
}

impl ComlinkLanguageServer {
    /// Creates a new language server instance.
    fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(ServerState::new()),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for ComlinkLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!("Comlink language server initializing");

        let mut workspace_folders = Vec::new();
        if let Some(folders) = params.workspace_folders {
            workspace_folders.extend(folders.into_iter().map(|folder| folder.uri));
        } else if let Some(root_uri) = params.root_uri {
            workspace_folders.push(root_uri);
        }

        if !workspace_folders.is_empty() {
            info!("Workspace folders: {:?}", workspace_folders);
            self.state.set_workspace_folders(workspace_folders);
        }
        if let Some(options) = params.initialization_options {
            self.state.set_config(options);
        }
        handlers::load_project_config(&self.state);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(PositionEncodingKind::UTF16),

                // Incremental sync: the trigger state machine needs every change range.
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),

                hover_provider: Some(HoverProviderCapability::Simple(true)),

                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: COMMANDS.iter().map(|command| (*command).to_string()).collect(),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),

                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "comlink-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("Comlink language server initialized");
        handlers::launch_store(&self.client, &self.state).await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Comlink language server shutting down");
        if self.state.clear_store() {
            info!("comment store stopped");
        }
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        handlers::did_change_configuration(&self.state, params);
    }

    // =========================================================================
    // Document Synchronization
    // =========================================================================

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        handlers::did_open(&self.state, params);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        handlers::did_change(&self.client, &self.state, params);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        handlers::did_close(&self.state, params);
    }

    // =========================================================================
    // Language Features
    // =========================================================================

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        Ok(handlers::hover(&self.state, params).await)
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        Ok(handlers::execute_command(&self.client, &self.state, params).await)
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting comlink language server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(ComlinkLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
