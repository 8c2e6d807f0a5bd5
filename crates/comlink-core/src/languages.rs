//! Comment syntax per editor language id.

use rustc_hash::FxHashMap;

/// How a language spells a line-embeddable comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommentSyntax {
    /// Text that opens the comment (`//`, `#`, `<!--`).
    pub prefix: String,
    /// Closing fence for languages whose comments are not line-terminated.
    pub suffix: Option<String>,
}

impl CommentSyntax {
    /// A comment that runs to the end of the line.
    pub fn line(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: None,
        }
    }

    /// A comment closed by `suffix`.
    pub fn block(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: Some(suffix.into()),
        }
    }
}

const LINE_COMMENTS: &[(&str, &str)] = &[
    ("javascript", "//"),
    ("javascriptreact", "//"),
    ("typescript", "//"),
    ("typescriptreact", "//"),
    ("c", "//"),
    ("cpp", "//"),
    ("csharp", "//"),
    ("java", "//"),
    ("go", "//"),
    ("php", "//"),
    ("rust", "//"),
    ("python", "#"),
    ("ruby", "#"),
    ("shellscript", "#"),
    ("yaml", "#"),
    ("toml", "#"),
    ("lua", "--"),
    ("sql", "--"),
];

const BLOCK_COMMENTS: &[(&str, &str, &str)] = &[
    ("html", "<!--", "-->"),
    ("xml", "<!--", "-->"),
    ("markdown", "<!--", "-->"),
    ("css", "/*", "*/"),
];

/// Language id to comment syntax lookup.
#[derive(Debug, Clone)]
pub struct LanguageTable {
    entries: FxHashMap<String, CommentSyntax>,
}

impl LanguageTable {
    /// Table with the built-in languages.
    pub fn builtin() -> Self {
        let mut entries = FxHashMap::default();
        for (language, prefix) in LINE_COMMENTS {
            entries.insert((*language).to_string(), CommentSyntax::line(*prefix));
        }
        for (language, prefix, suffix) in BLOCK_COMMENTS {
            entries.insert(
                (*language).to_string(),
                CommentSyntax::block(*prefix, *suffix),
            );
        }
        Self { entries }
    }

    /// Adds or replaces the syntax for `language_id`.
    pub fn insert(&mut self, language_id: impl Into<String>, syntax: CommentSyntax) {
        self.entries.insert(language_id.into(), syntax);
    }

    /// Looks up `language_id`.
    pub fn get(&self, language_id: &str) -> Option<&CommentSyntax> {
        self.entries.get(language_id)
    }
}

impl Default for LanguageTable {
    fn default() -> Self {
        Self::builtin()
    }
}
