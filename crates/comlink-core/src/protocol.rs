//! Line protocol spoken with the comment store process.
//!
//! One command per line on the process's stdin; every command except
//! [`Command::ConfirmDirectory`] is answered by exactly one line on stdout.

use std::fmt;

use crate::error::StoreError;

/// Leading character of a response announcing a freshly minted identifier.
pub const CREATED_MARKER: char = '~';

/// A request written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `>init`: initialize the project store.
    Init,
    /// `*`: the storage directory is ready.
    ConfirmDirectory,
    /// `~<body>`: store a new comment.
    Create(String),
    /// `@<id>`: fetch a comment.
    Fetch(String),
    /// `&<id>`: delete a comment.
    Delete(String),
}

/// Request kinds, used for logging and for matching responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Init,
    ConfirmDirectory,
    Create,
    Fetch,
    Delete,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Init => "init",
            CommandKind::ConfirmDirectory => "confirm_directory",
            CommandKind::Create => "create",
            CommandKind::Fetch => "fetch",
            CommandKind::Delete => "delete",
        }
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Init => CommandKind::Init,
            Command::ConfirmDirectory => CommandKind::ConfirmDirectory,
            Command::Create(_) => CommandKind::Create,
            Command::Fetch(_) => CommandKind::Fetch,
            Command::Delete(_) => CommandKind::Delete,
        }
    }

    /// Whether the store answers this command with a line.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::ConfirmDirectory)
    }

    /// Serializes the command, newline included.
    pub fn to_line(&self) -> Result<String, StoreError> {
        let (prefix, payload) = match self {
            Command::Init => (">init", ""),
            Command::ConfirmDirectory => ("*", ""),
            Command::Create(body) => ("~", body.as_str()),
            Command::Fetch(id) => ("@", id.as_str()),
            Command::Delete(id) => ("&", id.as_str()),
        };
        if payload.contains(['\n', '\r']) {
            return Err(StoreError::MultilinePayload);
        }
        Ok(format!("{prefix}{payload}\n"))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Init => f.write_str(">init"),
            Command::ConfirmDirectory => f.write_str("*"),
            Command::Create(body) => write!(f, "~{body}"),
            Command::Fetch(id) => write!(f, "@{id}"),
            Command::Delete(id) => write!(f, "&{id}"),
        }
    }
}

/// A response line from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A new reference was minted.
    Created(String),
    /// Anything else: fetched text or a status line, verbatim.
    Text(String),
}

impl Response {
    /// Restores the line as it was received.
    pub fn into_line(self) -> String {
        match self {
            Response::Created(id) => format!("{CREATED_MARKER}{id}"),
            Response::Text(text) => text,
        }
    }
}

/// Classifies one stdout line (terminator already stripped).
pub fn parse_response(line: &str) -> Response {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.strip_prefix(CREATED_MARKER) {
        Some(id) => Response::Created(id.trim().to_string()),
        None => Response::Text(line.to_string()),
    }
}
