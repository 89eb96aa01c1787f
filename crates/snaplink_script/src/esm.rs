//! Lowering of ES module syntax to the loader's calling convention.
//!
//! Module bodies run inside `function (exports, module, __filename,
//! __dirname, require)`, where `import` and `export` declarations are syntax
//! errors. [`lower_module_syntax`] rewrites top-level declarations in place:
//!
//! | Source                            | Lowered                                                    |
//! |-----------------------------------|------------------------------------------------------------|
//! | `import "m"`                      | `require("m");`                                            |
//! | `import d, {a, b as c} from "m"`  | `const d = __snaplinkDefault(require("m")), {"a": a, "b": c} = require("m");` |
//! | `import * as ns from "m"`         | `const ns = require("m");`                                 |
//! | `export const x = 1`              | `const x = 1`, `x` published as a getter                   |
//! | `export default expr`             | `exports.default = expr`                                   |
//! | `export {a as b}`                 | removed, `b` published as a getter                         |
//! | `export {a} from "m"`             | `require("m");`, `a` published as a getter                 |
//! | `export * from "m"`               | `__snaplinkExportStar(exports, require("m"));`             |
//!
//! Getters for exported bindings are installed by a header at the start of
//! the first line, so exports stay live and a circular importer sees each
//! binding once it is initialized. Dynamic `import("m")` calls with a literal
//! specifier become `Promise.resolve().then(() => require("m"))` at any depth.
//!
//! Every rewrite keeps the line breaks of the text it replaces: the lowered
//! code has as many lines as the input and each line holds the code of the
//! same input line. Imported bindings are read once, when the import runs.

use std::borrow::Cow;

use serde_json::Value;
use snaplink_graph::{tokenize, Spanned, Token};

use crate::error::ModuleSyntaxError;

/// Runtime helper resolving the default export of a loaded module.
pub(crate) const DEFAULT_HELPER: &str = "__snaplinkDefault";
/// Runtime helper publishing export getters on `exports`.
pub(crate) const EXPORT_HELPER: &str = "__snaplinkExport";
/// Runtime helper re-exporting every named export of another module.
pub(crate) const EXPORT_STAR_HELPER: &str = "__snaplinkExportStar";

/// Keywords that neither end nor start an expression operand.
const OPERATOR_KEYWORDS: &[&str] = &[
    "in",
    "instanceof",
    "of",
    "typeof",
    "void",
    "delete",
    "new",
    "await",
    "yield",
];

/// Rewrites `import`/`export` syntax in `code`.
///
/// Code without module syntax is returned unchanged.
pub fn lower_module_syntax(code: &str) -> Result<Cow<'_, str>, ModuleSyntaxError> {
    let mut lowering = Lowering {
        code,
        tokens: tokenize(code),
        edits: Vec::new(),
        exports: Vec::new(),
        is_module: false,
    };
    lowering.run()?;
    Ok(lowering.finish())
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Lowering<'a> {
    code: &'a str,
    tokens: Vec<Spanned<'a>>,
    edits: Vec<Edit>,
    /// Exported name and the expression its getter returns.
    exports: Vec<(String, String)>,
    is_module: bool,
}

impl<'a> Lowering<'a> {
    fn run(&mut self) -> Result<(), ModuleSyntaxError> {
        let mut depth = 0usize;
        let mut i = 0;
        while i < self.tokens.len() {
            let after_dot = i > 0 && self.is_punct(i - 1, b'.');
            match self.tokens[i].token {
                Token::Punct(b'(' | b'[' | b'{') => depth += 1,
                Token::Punct(b')' | b']' | b'}') => depth = depth.saturating_sub(1),
                Token::Ident("import") if !after_dot => {
                    if self.is_punct(i + 1, b'(') {
                        i = self.dynamic_import(i);
                        continue;
                    }
                    if self.is_punct(i + 1, b'.') {
                        return Err(self.error(i, "`import.meta` is not supported"));
                    }
                    if depth == 0 {
                        i = self.import_declaration(i)?;
                        continue;
                    }
                }
                Token::Ident("export") if !after_dot && depth == 0 => {
                    i = self.export_declaration(i)?;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    fn finish(mut self) -> Cow<'a, str> {
        if self.is_module {
            let getters: Vec<String> = self
                .exports
                .iter()
                .map(|(name, expr)| format!("{}: () => {expr}", quote(name)))
                .collect();
            self.edits.push(Edit {
                start: 0,
                end: 0,
                text: format!(
                    "\"use strict\"; {EXPORT_HELPER}(exports, {{{}}}); ",
                    getters.join(", ")
                ),
            });
        }
        if self.edits.is_empty() {
            return Cow::Borrowed(self.code);
        }

        self.edits.sort_by_key(|e| (e.start, e.end));
        let mut out = String::with_capacity(self.code.len() + 128);
        let mut pos = 0;
        for edit in &self.edits {
            out.push_str(&self.code[pos..edit.start]);
            out.push_str(&edit.text);
            let breaks = self.code[edit.start..edit.end].matches('\n').count();
            out.extend(std::iter::repeat('\n').take(breaks));
            pos = edit.end;
        }
        out.push_str(&self.code[pos..]);
        Cow::Owned(out)
    }

    /// `import("m")` with a literal specifier; returns the next token index.
    fn dynamic_import(&mut self, i: usize) -> usize {
        if let (Some(Token::Str(spec)), true) = (self.token(i + 2), self.is_punct(i + 3, b')')) {
            let text = format!("Promise.resolve().then(() => require({}))", quote(spec));
            self.replace_tokens(i, i + 4, text);
            return i + 4;
        }
        i + 1
    }

    fn import_declaration(&mut self, i: usize) -> Result<usize, ModuleSyntaxError> {
        self.is_module = true;
        let mut j = i + 1;
        let mut default = None;
        let mut namespace = None;
        let mut named = Vec::new();

        let spec = if let Some(Token::Str(spec)) = self.token(j) {
            j += 1;
            spec.clone()
        } else {
            let mut clause_open = true;
            if let Some(name) = self.ident(j) {
                default = Some(name);
                j += 1;
                if self.is_punct(j, b',') {
                    j += 1;
                } else {
                    clause_open = false;
                }
            }
            if clause_open {
                if self.is_punct(j, b'*') {
                    if self.ident(j + 1) != Some("as") {
                        return Err(self.error(j + 1, "expected `as` after `*`"));
                    }
                    namespace = Some(self.expect_ident(j + 2)?);
                    j += 3;
                } else if self.is_punct(j, b'{') {
                    let (specifiers, next) = self.specifier_list(j)?;
                    for (imported, local) in specifiers {
                        if !is_identifier(&local) {
                            return Err(self.error(j, format!("`{local}` is not a valid binding")));
                        }
                        named.push((imported, local));
                    }
                    j = next;
                } else {
                    return Err(self.error(j, "expected an import clause"));
                }
            }
            if self.ident(j) != Some("from") {
                return Err(self.error(j, "expected `from`"));
            }
            let spec = self.expect_string(j + 1)?;
            j += 2;
            spec
        };
        let end = self.statement_tail(j);

        let module = format!("require({})", quote(&spec));
        let mut declarators = Vec::new();
        if let Some(name) = default {
            declarators.push(format!("{name} = {DEFAULT_HELPER}({module})"));
        }
        if let Some(name) = namespace {
            declarators.push(format!("{name} = {module}"));
        }
        let mut properties = Vec::new();
        for (imported, local) in named {
            if imported == "default" {
                declarators.push(format!("{local} = {DEFAULT_HELPER}({module})"));
            } else {
                properties.push(format!("{}: {local}", quote(&imported)));
            }
        }
        if !properties.is_empty() {
            declarators.push(format!("{{{}}} = {module}", properties.join(", ")));
        }

        let text = if declarators.is_empty() {
            format!("{module};")
        } else {
            format!("const {};", declarators.join(", "))
        };
        self.replace_tokens(i, end, text);
        Ok(end)
    }

    fn export_declaration(&mut self, i: usize) -> Result<usize, ModuleSyntaxError> {
        self.is_module = true;
        let j = i + 1;
        match self.token(j) {
            Some(Token::Punct(b'*')) => {
                let (alias, k) = if self.ident(j + 1) == Some("as") {
                    (Some(self.expect_name(j + 2)?), j + 3)
                } else {
                    (None, j + 1)
                };
                if self.ident(k) != Some("from") {
                    return Err(self.error(k, "expected `from`"));
                }
                let module = format!("require({})", quote(&self.expect_string(k + 1)?));
                let end = self.statement_tail(k + 2);
                match alias {
                    Some(name) => {
                        self.exports.push((name, module.clone()));
                        self.replace_tokens(i, end, format!("{module};"));
                    }
                    None => {
                        let text = format!("{EXPORT_STAR_HELPER}(exports, {module});");
                        self.replace_tokens(i, end, text);
                    }
                }
                Ok(end)
            }
            Some(Token::Punct(b'{')) => {
                let (specifiers, k) = self.specifier_list(j)?;
                if self.ident(k) == Some("from") {
                    let module = format!("require({})", quote(&self.expect_string(k + 1)?));
                    let end = self.statement_tail(k + 2);
                    for (local, exported) in specifiers {
                        let getter = if local == "default" {
                            format!("{DEFAULT_HELPER}({module})")
                        } else {
                            format!("{module}[{}]", quote(&local))
                        };
                        self.exports.push((exported, getter));
                    }
                    self.replace_tokens(i, end, format!("{module};"));
                    Ok(end)
                } else {
                    let end = if self.is_punct(k, b';') { k + 1 } else { k };
                    for (local, exported) in specifiers {
                        if !is_identifier(&local) {
                            return Err(self.error(j, format!("`{local}` is not a local binding")));
                        }
                        self.exports.push((exported, local));
                    }
                    self.replace_tokens(i, end, String::new());
                    Ok(end)
                }
            }
            Some(Token::Ident("default")) => {
                let k = j + 1;
                match self.declaration_name(k) {
                    Some(name) => {
                        self.exports.push(("default".to_string(), name.to_string()));
                        self.remove_prefix(i, k);
                    }
                    None => {
                        let (start, end) = (self.tokens[i].start, self.tokens[j].end);
                        self.replace_span(start, end, "exports.default =".to_string());
                    }
                }
                Ok(k)
            }
            Some(Token::Ident("function" | "async" | "class")) => {
                let name = self
                    .declaration_name(j)
                    .ok_or_else(|| self.error(j, "exported declaration needs a name"))?;
                self.exports.push((name.to_string(), name.to_string()));
                self.remove_prefix(i, j);
                Ok(j)
            }
            Some(Token::Ident("const" | "let" | "var")) => {
                for name in self.declared_names(j + 1)? {
                    self.exports.push((name.clone(), name));
                }
                self.remove_prefix(i, j);
                Ok(j)
            }
            _ => Err(self.error(j, "unsupported export form")),
        }
    }

    /// Name of the function or class declaration starting at `k`, if any.
    fn declaration_name(&self, k: usize) -> Option<&'a str> {
        let mut k = k;
        if self.ident(k) == Some("async") && self.ident(k + 1) == Some("function") {
            k += 1;
        }
        match self.ident(k) {
            Some("function") => {
                k += 1;
                if self.is_punct(k, b'*') {
                    k += 1;
                }
                self.ident(k)
            }
            Some("class") => self.ident(k + 1).filter(|name| *name != "extends"),
            _ => None,
        }
    }

    /// `{a, b as c, "d" as e}`; returns `(name, alias)` pairs and the index
    /// after the closing brace.
    fn specifier_list(&self, j: usize) -> Result<(Vec<(String, String)>, usize), ModuleSyntaxError> {
        let mut out = Vec::new();
        let mut k = j + 1;
        loop {
            if self.is_punct(k, b'}') {
                return Ok((out, k + 1));
            }
            let name = self.expect_name(k)?;
            k += 1;
            let alias = if self.ident(k) == Some("as") {
                k += 2;
                self.expect_name(k - 1)?
            } else {
                name.clone()
            };
            out.push((name, alias));
            if self.is_punct(k, b',') {
                k += 1;
            } else if !self.is_punct(k, b'}') {
                return Err(self.error(k, "expected `,` or `}`"));
            }
        }
    }

    /// Names bound by the declarator list starting at `k`.
    fn declared_names(&self, k: usize) -> Result<Vec<String>, ModuleSyntaxError> {
        let mut names = Vec::new();
        let mut k = k;
        loop {
            k = self.binding_target(k, &mut names)?;
            if self.is_punct(k, b'=') {
                k = self.skip_expression(k + 1, true);
            }
            if self.is_punct(k, b',') {
                k += 1;
            } else {
                return Ok(names);
            }
        }
    }

    fn binding_target(&self, k: usize, names: &mut Vec<String>) -> Result<usize, ModuleSyntaxError> {
        match self.token(k) {
            Some(Token::Ident(name)) => {
                names.push(name.to_string());
                Ok(k + 1)
            }
            Some(Token::Punct(b'{')) => self.pattern_names(k, b'}', names),
            Some(Token::Punct(b'[')) => self.pattern_names(k, b']', names),
            _ => Err(self.error(k, "expected a binding name or pattern")),
        }
    }

    /// Collects the names bound by a destructuring pattern opening at `k`.
    fn pattern_names(
        &self,
        k: usize,
        close: u8,
        names: &mut Vec<String>,
    ) -> Result<usize, ModuleSyntaxError> {
        let object = close == b'}';
        let mut k = k + 1;
        loop {
            if k >= self.tokens.len() {
                return Err(self.error(k, "unterminated pattern"));
            }
            if self.is_punct(k, close) {
                return Ok(k + 1);
            }
            if self.is_punct(k, b',') {
                k += 1;
                continue;
            }
            if self.is_punct(k, b'.') && self.is_punct(k + 1, b'.') && self.is_punct(k + 2, b'.') {
                k = self.binding_target(k + 3, names)?;
            } else if object {
                let shorthand = self.ident(k);
                k = if self.is_punct(k, b'[') {
                    self.skip_balanced(k)
                } else {
                    k + 1
                };
                if self.is_punct(k, b':') {
                    k = self.binding_target(k + 1, names)?;
                } else {
                    let name = shorthand.ok_or_else(|| self.error(k, "expected `:` in pattern"))?;
                    names.push(name.to_string());
                }
            } else {
                k = self.binding_target(k, names)?;
            }
            if self.is_punct(k, b'=') {
                k = self.skip_expression(k + 1, false);
            }
        }
    }

    /// Index of the token ending the expression starting at `k`: a `,` or
    /// `;` at its own nesting level, an unmatched closer, or with `asi` a
    /// line break between two operands.
    fn skip_expression(&self, k: usize, asi: bool) -> usize {
        let mut depth = 0usize;
        let mut k = k;
        while let Some(token) = self.token(k) {
            match token {
                Token::Punct(b'(' | b'[' | b'{') => depth += 1,
                Token::Punct(b')' | b']' | b'}') => {
                    if depth == 0 {
                        return k;
                    }
                    depth -= 1;
                }
                Token::Punct(b',' | b';') if depth == 0 => return k,
                _ if asi && depth == 0 && self.ends_statement(k) => return k,
                _ => {}
            }
            k += 1;
        }
        k
    }

    /// Whether automatic semicolon insertion ends a statement before `k`.
    fn ends_statement(&self, k: usize) -> bool {
        if k == 0 {
            return false;
        }
        let (prev, cur) = (&self.tokens[k - 1], &self.tokens[k]);
        if !self.code[prev.end..cur.start].contains('\n') {
            return false;
        }
        let operand = |token: &Token<'_>| match token {
            Token::Ident(word) => !OPERATOR_KEYWORDS.contains(word),
            Token::Str(_) | Token::Opaque => true,
            Token::Punct(_) => false,
        };
        let prev_ends = operand(&prev.token) || matches!(prev.token, Token::Punct(b')' | b']' | b'}'));
        prev_ends && operand(&cur.token)
    }

    /// Index after the bracket matching the opener at `k`.
    fn skip_balanced(&self, k: usize) -> usize {
        let mut depth = 0usize;
        let mut k = k;
        while let Some(token) = self.token(k) {
            match token {
                Token::Punct(b'(' | b'[' | b'{') => depth += 1,
                Token::Punct(b')' | b']' | b'}') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return k + 1;
                    }
                }
                _ => {}
            }
            k += 1;
        }
        k
    }

    /// Skips import attributes and a terminating `;` after a specifier.
    fn statement_tail(&self, j: usize) -> usize {
        let mut j = j;
        if matches!(self.ident(j), Some("with" | "assert")) && self.is_punct(j + 1, b'{') {
            j = self.skip_balanced(j + 1);
        }
        if self.is_punct(j, b';') {
            j += 1;
        }
        j
    }

    fn replace_tokens(&mut self, first: usize, end: usize, text: String) {
        let (start, stop) = (self.tokens[first].start, self.tokens[end - 1].end);
        self.replace_span(start, stop, text);
    }

    /// Removes the tokens before `k`, starting at `first`, with the
    /// whitespace that follows them.
    fn remove_prefix(&mut self, first: usize, k: usize) {
        let (start, stop) = (self.tokens[first].start, self.tokens[k].start);
        self.replace_span(start, stop, String::new());
    }

    fn replace_span(&mut self, start: usize, end: usize, text: String) {
        self.edits.push(Edit { start, end, text });
    }

    fn token(&self, i: usize) -> Option<&Token<'a>> {
        self.tokens.get(i).map(|t| &t.token)
    }

    fn is_punct(&self, i: usize, p: u8) -> bool {
        self.token(i) == Some(&Token::Punct(p))
    }

    fn ident(&self, i: usize) -> Option<&'a str> {
        match self.token(i) {
            Some(Token::Ident(word)) => Some(*word),
            _ => None,
        }
    }

    fn expect_ident(&self, i: usize) -> Result<&'a str, ModuleSyntaxError> {
        self.ident(i)
            .ok_or_else(|| self.error(i, "expected an identifier"))
    }

    /// An identifier or string-literal export name.
    fn expect_name(&self, i: usize) -> Result<String, ModuleSyntaxError> {
        match self.token(i) {
            Some(Token::Ident(word)) => Ok(word.to_string()),
            Some(Token::Str(value)) => Ok(value.clone()),
            _ => Err(self.error(i, "expected a binding name")),
        }
    }

    fn expect_string(&self, i: usize) -> Result<String, ModuleSyntaxError> {
        match self.token(i) {
            Some(Token::Str(value)) => Ok(value.clone()),
            _ => Err(self.error(i, "expected a module specifier string")),
        }
    }

    fn error(&self, i: usize, reason: impl Into<String>) -> ModuleSyntaxError {
        let offset = self.tokens.get(i).map_or(self.code.len(), |t| t.start);
        ModuleSyntaxError {
            line: self.code[..offset].matches('\n').count(),
            reason: reason.into(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if !first.is_ascii_digit() => {
            std::iter::once(first)
                .chain(bytes)
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80)
        }
        _ => false,
    }
}

/// A JS string literal for `value`.
fn quote(value: &str) -> String {
    Value::String(value.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
