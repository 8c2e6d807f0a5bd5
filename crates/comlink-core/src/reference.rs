//! In-document reference embedding: `<prefix>ID:<id>[<suffix>]`.

use crate::languages::CommentSyntax;

/// Tag between the comment prefix and the identifier.
pub const ID_TAG: &str = "ID:";

/// Renders the reference text spliced into the document.
pub fn render(syntax: &CommentSyntax, id: &str) -> String {
    let suffix_len = syntax.suffix.as_ref().map_or(0, String::len);
    let mut text =
        String::with_capacity(syntax.prefix.len() + ID_TAG.len() + id.len() + suffix_len);
    text.push_str(&syntax.prefix);
    text.push_str(ID_TAG);
    text.push_str(id);
    if let Some(suffix) = &syntax.suffix {
        text.push_str(suffix);
    }
    text
}

/// Finds the identifier embedded in `line`, if any.
pub fn extract<'a>(line: &'a str, syntax: &CommentSyntax) -> Option<&'a str> {
    let marker = format!("{}{ID_TAG}", syntax.prefix);
    let start = line.find(&marker)? + marker.len();
    let mut rest = &line[start..];
    if let Some(suffix) = &syntax.suffix {
        if let Some(end) = rest.find(suffix.as_str()) {
            rest = &rest[..end];
        }
    }
    let id = rest.trim();
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_line_and_block_references() {
        assert_eq!(render(&CommentSyntax::line("//"), "42"), "//ID:42");
        assert_eq!(render(&CommentSyntax::line("#"), "7"), "#ID:7");
        assert_eq!(
            render(&CommentSyntax::block("<!--", "-->"), "9"),
            "<!--ID:9-->"
        );
        assert_eq!(render(&CommentSyntax::block("/*", "*/"), "a1"), "/*ID:a1*/");
    }

    #[test]
    fn extract_reads_to_end_of_line() {
        let syntax = CommentSyntax::line("//");
        assert_eq!(extract("//ID:42", &syntax), Some("42"));
        assert_eq!(extract("let x = 1; //ID: 17  ", &syntax), Some("17"));
        assert_eq!(extract("// plain comment", &syntax), None);
        assert_eq!(extract("//ID:   ", &syntax), None);
    }

    #[test]
    fn extract_strips_closing_fence() {
        let syntax = CommentSyntax::block("<!--", "-->");
        assert_eq!(extract("<p></p> <!--ID:9--> <b>", &syntax), Some("9"));
        assert_eq!(extract("<!--ID:9", &syntax), Some("9"));
    }

    #[test]
    fn extract_requires_matching_prefix() {
        assert_eq!(extract("//ID:42", &CommentSyntax::line("#")), None);
    }
}
