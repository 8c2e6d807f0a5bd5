//! LSP request handlers.
//!
//! This module wires handler submodules together.

mod commands;
mod hover;
mod lsp_utils;
mod store;
mod sync;
mod workspace;

pub use commands::{execute_command, COMMANDS};
pub use hover::hover;
pub use store::launch_store;
pub use sync::{did_change, did_close, did_open};
pub use workspace::{did_change_configuration, load_project_config};

#[cfg(test)]
mod tests;
