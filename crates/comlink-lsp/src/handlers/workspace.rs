//! Workspace-level notifications.

use tower_lsp::lsp_types::DidChangeConfigurationParams;
use tracing::info;

use comlink_core::select_root;

use crate::config::ProjectConfig;
use crate::state::ServerState;

pub fn did_change_configuration(state: &ServerState, params: DidChangeConfigurationParams) {
    state.set_config(params.settings);
    info!("Updated workspace configuration");
}

/// Loads `comlink.toml` from the primary workspace root, if there is one.
pub fn load_project_config(state: &ServerState) {
    let Ok(root) = select_root(&state.workspace_paths()) else {
        return;
    };
    let config = ProjectConfig::load(&root.path);
    if let Some(path) = &config.config_path {
        info!("Loaded comlink config from {}", path.display());
    }
    state.set_project_config(config);
}
