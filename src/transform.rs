use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hooks::STATEFUL_BINDING_NAMES;

/// Name the wrapped render function is bound to.
pub const RENDER_BINDING: &str = "FormRender";
/// Special names a whole-form source assigns at its top level.
pub const WHOLE_FORM_RENDER: &str = "render";
pub const WHOLE_FORM_DATA: &str = "initialData";

lazy_static! {
    static ref WHOLE_FORM_LINE_RE: Regex =
        Regex::new(r"^\s*(?:render|initialData)\s*=(?:[^=>]|$)").unwrap();
    static ref DEFAULT_STATEFUL_RE: Option<Regex> = stateful_pattern(STATEFUL_BINDING_NAMES);
    static ref STATEMENT_START_RE: Regex =
        Regex::new(r"^(?:const|let|var|function|if|for|try|throw|export)\b").unwrap();
    static ref CONTROL_HEADER_RE: Regex =
        Regex::new(r"^\s*(?:\}\s*)?(?:if|for|while|else\s+if)\s*\(").unwrap();
    static ref BARE_CONTROL_RE: Regex = Regex::new(r"^\s*(?:\}\s*)?(?:else|do)\s*$").unwrap();
}

/// `\b(?:a|b)\s*\(` over the escaped names; `None` for an empty list.
fn stateful_pattern(names: &[&str]) -> Option<Regex> {
    if names.is_empty() {
        return None;
    }
    let alternatives = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{})\s*\(", alternatives)).ok()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFICATION TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceShape {
    /// Assigns `render` and/or `initialData` at top level; compiled as-is.
    WholeForm,
    /// Markup only.
    Markup,
    /// Statements followed by a markup region.
    StatementsThenMarkup,
    /// Statements with a top-level `return`.
    FunctionBody,
    /// A single expression.
    Expression,
    /// Statements with neither markup nor `return`.
    Statements,
    /// Empty or non-code text, rendered as inert text.
    LiteralText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WrapperKind {
    /// `function FormRender(props) { ... }`, required by stateful bindings.
    Named,
    /// `const FormRender = (props) => (() => { ... })();`
    Immediate,
    /// Compiled exactly as written.
    Verbatim,
    /// Never compiled.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub shape: SourceShape,
    pub wrapper: WrapperKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedSource {
    pub shape: SourceShape,
    pub wrapper: WrapperKind,
    /// Source handed to the compiler, or the literal text for `LiteralText`.
    pub body: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINE SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracks nesting across lines while skipping strings, comments and the
/// contents of template literals.
#[derive(Debug, Default, Clone)]
struct LineScanner {
    depth: i32,
    in_template: bool,
    in_block_comment: bool,
}

impl LineScanner {
    fn at_top_level(&self) -> bool {
        self.depth <= 0 && !self.in_template && !self.in_block_comment
    }

    fn scan_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        let mut quote: Option<char> = None;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.in_block_comment {
                if c == '*' && next == Some('/') {
                    self.in_block_comment = false;
                    i += 1;
                }
            } else if self.in_template {
                if c == '\\' {
                    i += 1;
                } else if c == '`' {
                    self.in_template = false;
                }
            } else if let Some(q) = quote {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            } else {
                match c {
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        self.in_block_comment = true;
                        i += 1;
                    }
                    '"' | '\'' => quote = Some(c),
                    '`' => self.in_template = true,
                    '{' | '(' | '[' => self.depth += 1,
                    '}' | ')' | ']' => self.depth -= 1,
                    _ => {}
                }
            }
            i += 1;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DETECTION HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Empty text, or text without any markup opener or code punctuation.
pub fn is_literal_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    let has_code = trimmed
        .chars()
        .any(|c| matches!(c, '<' | '(' | ')' | '{' | '}' | '[' | ']' | '=' | ';' | '`'));
    !has_code && !contains_word(trimmed, "return")
}

/// Text with no markup opener and none of the shapes that only code has:
/// braces, brackets, template quotes or arrows. Prose with parentheses or
/// an `=` still qualifies; an expression of this kind that fails to parse
/// is shown as text.
pub fn reads_as_prose(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.contains("=>")
        && !trimmed
            .chars()
            .any(|c| matches!(c, '<' | '{' | '}' | '[' | ']' | '`'))
}

/// Top-level assignment to `render` or `initialData`.
pub fn is_whole_form(text: &str) -> bool {
    let mut scanner = LineScanner::default();
    for line in text.lines() {
        if scanner.at_top_level() && WHOLE_FORM_LINE_RE.is_match(line) {
            return true;
        }
        scanner.scan_line(line);
    }
    false
}

/// Does the text call any of `names`?
pub fn uses_stateful_bindings(text: &str, names: &[&str]) -> bool {
    if names == STATEFUL_BINDING_NAMES {
        DEFAULT_STATEFUL_RE
            .as_ref()
            .is_some_and(|re| re.is_match(text))
    } else {
        stateful_pattern(names).is_some_and(|re| re.is_match(text))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + word.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

/// Finds a `return` at brace depth zero that starts a statement.
pub fn has_top_level_return(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut depth = 0i32;
    let mut i = 0;
    // Last significant character outside strings and comments.
    let mut previous: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '"' | '\'' | '`' => {
                i += 1;
                // Plain quotes end at the line break, so an apostrophe in
                // markup text stays local to its line.
                while i < chars.len() && chars[i] != c && (c == '`' || chars[i] != '\n') {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                previous = Some(c);
                i += 1;
                continue;
            }
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }

        if depth == 0 && c == 'r' && chars[i..].starts_with(&['r', 'e', 't', 'u', 'r', 'n']) {
            let before_ok = i == 0 || !is_ident_char(chars[i - 1]);
            let after_ok = chars.get(i + 6).map_or(true, |c| !is_ident_char(*c));
            let starts_statement = matches!(previous, None | Some(';') | Some('{') | Some('}'))
                || line_starts_with_return(&chars, i);
            if before_ok && after_ok && starts_statement {
                return true;
            }
        }

        if !c.is_whitespace() {
            previous = Some(c);
        }
        i += 1;
    }
    false
}

fn line_starts_with_return(chars: &[char], at: usize) -> bool {
    chars[..at]
        .iter()
        .rev()
        .take_while(|c| **c != '\n')
        .all(|c| c.is_whitespace())
}

/// Drop leading `//` and `/* */` comments.
pub fn strip_leading_comments(text: &str) -> &str {
    let mut rest = text.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("//") {
            rest = match after.find('\n') {
                Some(end) => after[end + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(end) => after[end + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Split into `(prologue, markup)` at the first top-level line that starts
/// with `<`. `None` when there is no markup region.
pub fn split_prologue(text: &str) -> Option<(String, String)> {
    let lines: Vec<&str> = text.lines().collect();
    let mut scanner = LineScanner::default();
    for (index, line) in lines.iter().enumerate() {
        if scanner.at_top_level() && line.trim_start().starts_with('<') {
            return Some((lines[..index].join("\n"), lines[index..].join("\n")));
        }
        scanner.scan_line(line);
    }
    None
}

/// Number of sibling roots in a markup region. Open, close and self-closing
/// tags are counted at element depth zero outside `{...}` groups; a
/// top-level `{...}` group counts as one root.
pub fn count_root_elements(markup: &str) -> usize {
    let chars: Vec<char> = markup.chars().collect();
    let mut roots = 0;
    let mut depth = 0i32;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '<' if chars.get(i + 1) == Some(&'/') => {
                i = skip_tag(&chars, i);
                depth -= 1;
                continue;
            }
            '<' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_alphabetic() || *n == '>') =>
            {
                if depth == 0 {
                    roots += 1;
                }
                let end = skip_tag(&chars, i);
                let self_closing = end >= 2 && chars[end - 2] == '/';
                if !self_closing {
                    depth += 1;
                }
                i = end;
                continue;
            }
            '{' => {
                if depth == 0 {
                    roots += 1;
                }
                i = skip_braces(&chars, i);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    roots
}

/// Index just past the `>` closing the tag that starts at `start`.
fn skip_tag(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' => {
                    i = skip_braces(chars, i);
                    continue;
                }
                '>' => return i + 1,
                _ => {}
            },
        }
        i += 1;
    }
    chars.len()
}

/// Index just past the `}` matching the `{` at `start`.
fn skip_braces(chars: &[char], start: usize) -> usize {
    let mut depth = 0;
    let mut i = start;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(_) if c == '\\' => i += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    chars.len()
}

/// Characters after which a line continues onto the next one.
const CONTINUATION_ENDINGS: &[char] = &[
    ';', ',', '{', '(', '[', '=', '+', '-', '*', '/', '%', '&', '|', '?', ':', '.', '<', '>',
];

/// Starts of a line that continue the previous statement.
const CONTINUATION_STARTS: &[&str] = &[
    "else", "catch", "finally", ".", "?", ":", ")", "]", "}", ",", "&&", "||", "+", "*", "/",
    "=",
];

/// Append `;` to top-level lines that end a statement without one.
/// Lines inside template literals and comment-only lines are untouched.
pub fn terminate_prologue(prologue: &str) -> String {
    let lines: Vec<&str> = prologue.lines().collect();
    let mut scanner = LineScanner::default();
    let mut out = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let started_in_template = scanner.in_template || scanner.in_block_comment;
        scanner.scan_line(line);

        let trimmed = line.trim();
        let skip = started_in_template
            || !scanner.at_top_level()
            || trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with("/*")
            || trimmed.ends_with(CONTINUATION_ENDINGS)
            || is_control_header(line)
            || next_line_continues(&lines[index + 1..]);

        if skip {
            out.push(line.to_string());
        } else {
            out.push(format!("{};", line.trim_end()));
        }
    }
    out.join("\n")
}

/// `if (...)`, `for (...)`, `while (...)`, `else` or `do` with its body on
/// the following line. Terminating such a line would detach the body.
pub fn is_control_header(line: &str) -> bool {
    if BARE_CONTROL_RE.is_match(line) {
        return true;
    }
    let Some(header) = CONTROL_HEADER_RE.find(line) else {
        return false;
    };
    let chars: Vec<char> = line[header.end() - 1..].chars().collect();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(_) if c == '\\' => i += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let rest: String = chars[i + 1..].iter().collect();
                        let rest = rest.trim();
                        return rest.is_empty() || rest.starts_with("//");
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    false
}

fn next_line_continues(rest: &[&str]) -> bool {
    rest.iter()
        .map(|line| line.trim_start())
        .find(|line| !line.is_empty() && !line.starts_with("//"))
        .is_some_and(|line| {
            CONTINUATION_STARTS.iter().any(|start| {
                line.starts_with(start)
                    && (!start.chars().all(char::is_alphabetic)
                        || !line[start.len()..].starts_with(is_ident_char))
            })
        })
}

fn looks_like_statements(text: &str) -> bool {
    let trimmed = text.trim();
    STATEMENT_START_RE.is_match(trimmed) || trimmed.ends_with(';')
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFY & TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

/// Decide the shape of `text` and the wrapper it needs. Deterministic.
pub fn classify_source(text: &str, stateful_names: &[&str]) -> Classification {
    if is_literal_text(text) {
        return Classification {
            shape: SourceShape::LiteralText,
            wrapper: WrapperKind::None,
        };
    }
    if is_whole_form(text) {
        return Classification {
            shape: SourceShape::WholeForm,
            wrapper: WrapperKind::Verbatim,
        };
    }

    let stripped = strip_leading_comments(text);
    let shape = if has_top_level_return(stripped) {
        SourceShape::FunctionBody
    } else {
        match split_prologue(stripped) {
            Some((prologue, _)) if prologue.trim().is_empty() => SourceShape::Markup,
            Some(_) => SourceShape::StatementsThenMarkup,
            None if looks_like_statements(stripped) => SourceShape::Statements,
            None => SourceShape::Expression,
        }
    };

    let wrapper = if uses_stateful_bindings(text, stateful_names) {
        WrapperKind::Named
    } else {
        WrapperKind::Immediate
    };

    Classification { shape, wrapper }
}

/// Rewrite `text` into a compilable unit using the default stateful-binding
/// names.
pub fn transform_source(text: &str) -> TransformedSource {
    transform_source_with(text, STATEFUL_BINDING_NAMES)
}

pub fn transform_source_with(text: &str, stateful_names: &[&str]) -> TransformedSource {
    let Classification { shape, wrapper } = classify_source(text, stateful_names);
    debug!(?shape, ?wrapper, "classified source");

    let inner = match shape {
        SourceShape::LiteralText => {
            return TransformedSource {
                shape,
                wrapper,
                body: text.trim().to_string(),
            }
        }
        SourceShape::WholeForm => {
            return TransformedSource {
                shape,
                wrapper,
                body: text.to_string(),
            }
        }
        SourceShape::FunctionBody | SourceShape::Statements => {
            strip_leading_comments(text).to_string()
        }
        SourceShape::Markup | SourceShape::StatementsThenMarkup => {
            let stripped = strip_leading_comments(text);
            let (prologue, markup) =
                split_prologue(stripped).unwrap_or_else(|| (String::new(), stripped.to_string()));
            let markup = group_roots(markup_region(&markup));
            if prologue.trim().is_empty() {
                format!("return (\n{}\n);", markup)
            } else {
                format!("{}\nreturn (\n{}\n);", terminate_prologue(&prologue), markup)
            }
        }
        SourceShape::Expression => {
            let expr = strip_leading_comments(text).trim();
            format!("return (\n{}\n);", expr.trim_end_matches(';').trim_end())
        }
    };

    let body = match wrapper {
        WrapperKind::Named => format!("function {}(props) {{\n{}\n}}", RENDER_BINDING, inner),
        _ => format!(
            "const {} = (props) => (() => {{\n{}\n}})();",
            RENDER_BINDING, inner
        ),
    };

    TransformedSource {
        shape,
        wrapper,
        body,
    }
}

fn markup_region(markup: &str) -> &str {
    let trimmed = markup.trim_end();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

fn group_roots(markup: &str) -> String {
    if count_root_elements(markup) > 1 {
        format!("<>\n{}\n</>", markup)
    } else {
        markup.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_ignores_strings_and_comments() {
        let mut scanner = LineScanner::default();
        scanner.scan_line(r#"const a = "{"; // {"#);
        assert_eq!(scanner.depth, 0);
        scanner.scan_line("const t = `start");
        assert!(scanner.in_template);
        scanner.scan_line("{ still text }`;");
        assert!(scanner.at_top_level());
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("return x", "return"));
        assert!(!contains_word("returned", "return"));
        assert!(!contains_word("noreturn", "return"));
    }

    #[test]
    fn test_skip_tag_handles_arrow_attributes() {
        let chars: Vec<char> = "<a onClick={() => go()}>x</a>".chars().collect();
        assert_eq!(chars[skip_tag(&chars, 0) - 1], '>');
        assert_eq!(skip_tag(&chars, 0), 24);
    }
}
