//! Static specifier extraction.
//!
//! Finds the modules a piece of code depends on by tokenizing it, never by
//! evaluating it. The tokenizer only knows enough syntax to avoid false
//! positives: comments, string and template literals, and regular expression
//! literals are skipped as opaque tokens.
//!
//! Recognized forms, each requiring a string-literal specifier:
//!
//! - `require("x")`
//! - `import("x")`
//! - `import "x"`
//! - `import ... from "x"` and `export ... from "x"`
//!
//! Member calls such as `loader.require("x")` are ignored.
//!
//! [`tokenize`] is public so that later passes can rewrite module syntax
//! using the same view of the source.

/// Keywords after which a `/` starts a regular expression literal.
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

/// A lexical token of module source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// An identifier or keyword.
    Ident(&'a str),
    /// A quoted string literal, unescaped.
    Str(String),
    /// A single punctuation byte.
    Punct(u8),
    /// Numbers, regex and template literals.
    Opaque,
}

/// A token with the byte range it occupies in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<'a> {
    /// The token.
    pub token: Token<'a>,
    /// Offset of the first byte.
    pub start: usize,
    /// Offset one past the last byte.
    pub end: usize,
}

/// Returns the specifiers imported or required by `code`, in order of first
/// appearance, without duplicates.
pub fn scan_specifiers(code: &str) -> Vec<String> {
    let tokens: Vec<Token<'_>> = tokenize(code).into_iter().map(|t| t.token).collect();
    let mut found: Vec<String> = Vec::new();
    let mut push = |spec: &str| {
        if !found.iter().any(|s| s == spec) {
            found.push(spec.to_string());
        }
    };

    for (i, token) in tokens.iter().enumerate() {
        let after_dot = i > 0 && tokens[i - 1] == Token::Punct(b'.');
        if after_dot {
            continue;
        }
        let next = tokens.get(i + 1);
        match token {
            Token::Ident("require") | Token::Ident("import") => {
                if let (Some(Token::Punct(b'(')), Some(Token::Str(spec)), Some(Token::Punct(b')'))) =
                    (next, tokens.get(i + 2), tokens.get(i + 3))
                {
                    push(spec.as_str());
                } else if *token == Token::Ident("import") {
                    if let Some(Token::Str(spec)) = next {
                        push(spec.as_str());
                    }
                }
            }
            Token::Ident("from") => {
                if let Some(Token::Str(spec)) = next {
                    push(spec.as_str());
                }
            }
            _ => {}
        }
    }

    found
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Whether a `/` after `prev` begins a regex literal rather than a division.
fn regex_allowed(prev: Option<&Spanned<'_>>) -> bool {
    match prev.map(|t| &t.token) {
        None => true,
        Some(Token::Punct(p)) => !matches!(*p, b')' | b']'),
        Some(Token::Ident(word)) => REGEX_PRECEDING_KEYWORDS.contains(word),
        Some(Token::Str(_)) | Some(Token::Opaque) => false,
    }
}

/// Splits `code` into tokens, dropping whitespace and comments.
pub fn tokenize(code: &str) -> Vec<Spanned<'_>> {
    let bytes = code.as_bytes();
    let mut tokens: Vec<Spanned<'_>> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        let token = match b {
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
                continue;
            }
            b'/' if regex_allowed(tokens.last()) => {
                i = skip_regex(bytes, i);
                Token::Opaque
            }
            b'\'' | b'"' => {
                let (value, end) = read_string(code, i);
                i = end;
                Token::Str(value)
            }
            b'`' => {
                i = skip_template(bytes, i);
                Token::Opaque
            }
            b if b.is_ascii_digit() => {
                while i < bytes.len() && (is_ident_byte(bytes[i]) || bytes[i] == b'.') {
                    i += 1;
                }
                Token::Opaque
            }
            b if is_ident_byte(b) => {
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                Token::Ident(&code[start..i])
            }
            _ => {
                i += 1;
                Token::Punct(b)
            }
        };
        tokens.push(Spanned {
            token,
            start,
            end: i.min(bytes.len()),
        });
    }

    tokens
}

/// Reads a quoted string starting at `start`; returns its value and the
/// index after the closing quote. Unterminated strings end at the newline.
fn read_string(code: &str, start: usize) -> (String, usize) {
    let bytes = code.as_bytes();
    let quote = bytes[start];
    let mut value = Vec::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                value.push(bytes[i + 1]);
                i += 2;
            }
            b'\n' => break,
            b if b == quote => {
                i += 1;
                break;
            }
            b => {
                value.push(b);
                i += 1;
            }
        }
    }
    (String::from_utf8_lossy(&value).into_owned(), i)
}

/// Skips a template literal starting at `start`, including `${...}`
/// substitutions with nested braces and strings.
fn skip_template(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return i + 1,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i += 2;
                let mut depth = 1usize;
                while i < bytes.len() && depth > 0 {
                    match bytes[i] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        b'`' => {
                            i = skip_template(bytes, i);
                            continue;
                        }
                        b'\'' | b'"' => {
                            let quote = bytes[i];
                            i += 1;
                            while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                                if bytes[i] == b'\\' {
                                    i += 1;
                                }
                                i += 1;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skips a regex literal (body, classes and flags) starting at `start`.
fn skip_regex(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'\n' => return i,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                return i;
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}
