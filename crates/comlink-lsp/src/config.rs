//! Workspace/project configuration for comlink-lsp.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use comlink_core::{ChannelConfig, CommentSyntax, LanguageTable, DEFAULT_MARKER};

pub(crate) const CONFIG_FILES: &[&str] = &["comlink.toml", ".comlink.toml"];

const DEFAULT_COMMAND: &str = "comlink";
const DEFAULT_DIRECTORY: &str = "com-link";

/// Project configuration loaded from `comlink.toml`.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Root directory for the workspace.
    pub root: PathBuf,
    /// Config file path (if found).
    pub config_path: Option<PathBuf>,
    /// Comment store process settings.
    pub store: StoreSettings,
    /// Trigger settings.
    pub authoring: AuthoringSettings,
    /// Comment syntax added to or overriding the builtin table.
    pub languages: BTreeMap<String, CommentSyntax>,
}

impl ProjectConfig {
    /// Load configuration for a workspace root.
    pub fn load(root: &Path) -> Self {
        let config_path = find_config_file(root);
        let Some(path) = config_path.clone() else {
            return ProjectConfig::base(root, None);
        };
        let Ok(contents) = std::fs::read_to_string(&path) else {
            warn!("Failed to read comlink config at {}", path.display());
            return ProjectConfig::base(root, config_path);
        };
        ProjectConfig::from_contents(root, config_path, &contents)
    }

    pub fn from_contents(root: &Path, config_path: Option<PathBuf>, contents: &str) -> Self {
        let mut config = ProjectConfig::base(root, config_path);
        let parsed: ConfigFile = match toml::from_str(contents) {
            Ok(parsed) => parsed,
            Err(err) => {
                if let Some(path) = &config.config_path {
                    warn!("Failed to parse comlink config at {}: {err}", path.display());
                } else {
                    warn!("Failed to parse comlink config: {err}");
                }
                return config;
            }
        };

        config.store = StoreSettings::from(parsed.store);
        config.authoring = AuthoringSettings::from(parsed.authoring);
        for (language_id, section) in parsed.languages {
            if section.prefix.trim().is_empty() {
                warn!(language = %language_id, "ignoring comment syntax with an empty prefix");
                continue;
            }
            let syntax = match section.suffix.filter(|suffix| !suffix.is_empty()) {
                Some(suffix) => CommentSyntax::block(section.prefix, suffix),
                None => CommentSyntax::line(section.prefix),
            };
            config.languages.insert(language_id, syntax);
        }
        config
    }

    /// Defaults used when no config file exists or it can't be read.
    pub(crate) fn base(root: &Path, config_path: Option<PathBuf>) -> Self {
        ProjectConfig {
            root: root.to_path_buf(),
            config_path,
            store: StoreSettings::default(),
            authoring: AuthoringSettings::default(),
            languages: BTreeMap::new(),
        }
    }

    /// Builtin comment syntax with this project's overrides applied.
    pub fn language_table(&self) -> LanguageTable {
        let mut table = LanguageTable::builtin();
        for (language_id, syntax) in &self.languages {
            table.insert(language_id.clone(), syntax.clone());
        }
        table
    }

    /// Where `comlink.init` provisions the project's comment storage.
    pub fn storage_dir(&self) -> PathBuf {
        resolve_path(&self.root, &self.store.directory)
    }
}

/// Comment store process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Program followed by its leading arguments; the workspace root is appended.
    pub command: Vec<String>,
    /// Storage directory, relative to the workspace root unless absolute.
    pub directory: String,
    pub request_timeout_ms: u64,
    pub max_queued: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            command: vec![DEFAULT_COMMAND.to_string()],
            directory: DEFAULT_DIRECTORY.to_string(),
            request_timeout_ms: u64::try_from(channel.request_timeout.as_millis())
                .unwrap_or(u64::MAX),
            max_queued: channel.max_queued,
        }
    }
}

impl StoreSettings {
    /// Program and leading arguments, if a command is configured.
    pub fn program(&self) -> Option<(&str, &[String])> {
        let (program, args) = self.command.split_first()?;
        Some((program.as_str(), args))
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_queued: self.max_queued,
        }
    }
}

impl From<StoreSection> for StoreSettings {
    fn from(section: StoreSection) -> Self {
        let defaults = StoreSettings::default();
        let command = match section.command {
            Some(command) if command.iter().any(|part| part.trim().is_empty()) => {
                warn!("ignoring store command with empty parts: {command:?}");
                defaults.command
            }
            Some(command) if !command.is_empty() => command,
            _ => defaults.command,
        };
        let max_queued = match section.max_queued {
            Some(0) => {
                warn!("store.max_queued must be at least 1; using 1");
                1
            }
            Some(max_queued) => max_queued,
            None => defaults.max_queued,
        };
        StoreSettings {
            command,
            directory: section
                .directory
                .filter(|dir| !dir.trim().is_empty())
                .unwrap_or(defaults.directory),
            request_timeout_ms: section
                .request_timeout_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.request_timeout_ms),
            max_queued,
        }
    }
}

/// Trigger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthoringSettings {
    /// Declaration-begin and commit marker.
    pub marker: char,
}

impl Default for AuthoringSettings {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER,
        }
    }
}

impl From<AuthoringSection> for AuthoringSettings {
    fn from(section: AuthoringSection) -> Self {
        let Some(raw) = section.marker else {
            return AuthoringSettings::default();
        };
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(marker), None) if !marker.is_whitespace() && !marker.is_alphanumeric() => {
                AuthoringSettings { marker }
            }
            _ => {
                warn!("authoring.marker must be a single symbol, got {raw:?}; using '{DEFAULT_MARKER}'");
                AuthoringSettings::default()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    authoring: AuthoringSection,
    #[serde(default)]
    languages: BTreeMap<String, LanguageSection>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    command: Option<Vec<String>>,
    directory: Option<String>,
    request_timeout_ms: Option<u64>,
    max_queued: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthoringSection {
    marker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageSection {
    prefix: String,
    suffix: Option<String>,
}

pub(crate) fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

fn resolve_path(root: &Path, entry: &str) -> PathBuf {
    let path = PathBuf::from(entry);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
