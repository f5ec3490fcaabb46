use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

/// A begin/end pattern located in a document.
///
/// Built from pattern text in which a line consisting of exactly `...` elides
/// the middle of the span: the text before it is the begin fragment, the text
/// after it the end fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchBlock {
    pub begin: String,
    pub end: String,
}

fn ellipsis_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\.\.\.\r?$").expect("static regex"))
}

impl SearchBlock {
    pub fn new(begin: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// Split `pattern` on its first standalone `...` line.
    pub fn parse(pattern: &str) -> Self {
        match ellipsis_line().find(pattern) {
            None => Self::new(pattern, ""),
            Some(m) => {
                let begin = &pattern[..m.start()];
                let end = &pattern[m.end()..];
                Self::new(
                    begin.strip_suffix('\n').unwrap_or(begin),
                    end.strip_prefix('\n').unwrap_or(end),
                )
            }
        }
    }

    /// Byte range of the matched span in `content`.
    pub fn find(&self, content: &str) -> Option<Range<usize>> {
        if self.begin.is_empty() && self.end.is_empty() {
            return None;
        }
        let start = content.find(&self.begin)?;
        let after_begin = start + self.begin.len();
        if self.end.is_empty() {
            return Some(start..after_begin);
        }
        let end_at = after_begin + content[after_begin..].find(&self.end)?;
        Some(start..end_at + self.end.len())
    }

    /// The matched text, or an empty string when nothing matches.
    pub fn match_string<'a>(&self, content: &'a str) -> &'a str {
        self.find(content).map_or("", |r| &content[r])
    }

    pub fn is_match(&self, content: &str) -> bool {
        self.find(content).is_some()
    }

    /// Replace the matched span with `new`.
    pub fn replace(&self, content: &str, new: &str) -> String {
        self.splice(content, new, |r| r)
    }

    /// Insert `new` right before the matched span.
    pub fn insert(&self, content: &str, new: &str) -> String {
        self.splice(content, new, |r| r.start..r.start)
    }

    /// Insert `new` right after the matched span.
    pub fn append(&self, content: &str, new: &str) -> String {
        self.splice(content, new, |r| r.end..r.end)
    }

    /// Remove the matched span.
    pub fn delete(&self, content: &str) -> String {
        self.replace(content, "")
    }

    fn splice(&self, content: &str, new: &str, at: impl FnOnce(Range<usize>) -> Range<usize>) -> String {
        let Some(span) = self.find(content) else {
            return content.to_string();
        };
        let r = at(span);
        let mut out = String::with_capacity(content.len() + new.len());
        out.push_str(&content[..r.start]);
        out.push_str(new);
        out.push_str(&content[r.end..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "line0\nline1\nline2\nline3\nline4\nline5";

    #[test]
    fn begin_end_span() {
        let sb = SearchBlock::new("line1", "line4");
        assert_eq!(sb.match_string(DOC), "line1\nline2\nline3\nline4");
        assert_eq!(sb.replace(DOC, "X"), "line0\nX\nline5");
    }

    #[test]
    fn single_fragment() {
        let sb = SearchBlock::parse("line2\nline3");
        assert_eq!(sb.end, "");
        assert_eq!(sb.match_string(DOC), "line2\nline3");
        assert_eq!(sb.delete(DOC), "line0\nline1\n\nline4\nline5");
    }

    #[test]
    fn parse_splits_on_ellipsis_line() {
        let sb = SearchBlock::parse("fn main() {\n    let a = 1;\n...\n}\n");
        assert_eq!(sb.begin, "fn main() {\n    let a = 1;");
        assert_eq!(sb.end, "}\n");

        // Only a line made of exactly three dots counts.
        let sb = SearchBlock::parse("a ...\n ...\n....");
        assert_eq!(sb.begin, "a ...\n ...\n....");
        assert_eq!(sb.end, "");

        let sb = SearchBlock::parse("...\ntail");
        assert_eq!(sb.begin, "");
        assert_eq!(sb.end, "tail");

        let sb = SearchBlock::parse("head\r\n...\r\ntail");
        assert_eq!(sb.begin, "head\r");
        assert_eq!(sb.end, "tail");
    }

    #[test]
    fn end_is_searched_after_begin() {
        let sb = SearchBlock::new("b", "a");
        assert_eq!(sb.match_string("a b c a"), "b c a");
        let sb = SearchBlock::new("c", "b");
        assert_eq!(sb.match_string("a b c"), "");
    }

    #[test]
    fn smallest_span_from_first_begin() {
        let sb = SearchBlock::new("{", "}");
        assert_eq!(sb.match_string("x { a } { b }"), "{ a }");
    }

    #[test]
    fn no_match_is_a_no_op() {
        let sb = SearchBlock::new("missing", "");
        assert_eq!(sb.match_string(DOC), "");
        assert_eq!(sb.replace(DOC, "X"), DOC);
        assert_eq!(sb.insert(DOC, "X"), DOC);
        assert_eq!(sb.append(DOC, "X"), DOC);
        assert_eq!(sb.delete(DOC), DOC);

        let sb = SearchBlock::new("line1", "nope");
        assert!(!sb.is_match(DOC));

        assert!(!SearchBlock::default().is_match(DOC));
    }

    #[test]
    fn insert_and_append_keep_span() {
        let sb = SearchBlock::new("line1", "line2");
        assert_eq!(
            sb.insert("line0\nline1\nline2", "new\n"),
            "line0\nnew\nline1\nline2"
        );
        assert_eq!(
            sb.append("line0\nline1\nline2\nline3", "\nnew"),
            "line0\nline1\nline2\nnew\nline3"
        );
    }

    #[test]
    fn empty_begin_with_end() {
        let sb = SearchBlock::new("", "line2");
        assert_eq!(sb.match_string(DOC), "line0\nline1\nline2");
    }
}
