use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use tower_lsp::lsp_types::Url;

fn path_debug_enabled() -> bool {
    std::env::var_os("COMLINK_LSP_PATH_DEBUG").is_some()
}

/// Converts a `file:` URI to a filesystem path.
///
/// Falls back to percent-decoding the raw URI path when the platform
/// conversion refuses it (e.g. a drive-less path on Windows).
pub(crate) fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    if path_debug_enabled() {
        tracing::info!(target: "comlink_lsp::path", "uri_to_path input: {}", uri);
    }
    if let Ok(path) = uri.to_file_path() {
        return Some(path);
    }
    if uri.scheme() != "file" {
        return None;
    }
    let raw_path = uri.path();
    if raw_path.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(raw_path).decode_utf8_lossy();
    if path_debug_enabled() {
        tracing::info!(target: "comlink_lsp::path", "uri_to_path decoded path: {}", decoded);
    }

    #[cfg(windows)]
    {
        if let Some(stripped) = decoded.strip_prefix('/') {
            if stripped.len() >= 2 && stripped.as_bytes()[1] == b':' {
                return Some(PathBuf::from(stripped));
            }
        }
    }

    Some(PathBuf::from(decoded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_file_scheme_has_no_path() {
        let uri = Url::parse("untitled:Untitled-1").unwrap();
        assert_eq!(uri_to_path(&uri), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_uri_is_decoded() {
        let uri = Url::parse("file:///home/dev/my%20project").unwrap();
        assert_eq!(uri_to_path(&uri), Some(PathBuf::from("/home/dev/my project")));
    }
}
