//! Node definition parser.
//!
//! A node is authored as a single Rhai function whose signature carries type
//! annotations and literal defaults:
//!
//! ```rhai
//! fn divide(a: number, b: number = 1.0) -> number {
//!     if b == 0.0 { throw "division by zero"; }
//!     a / b
//! }
//! ```
//!
//! Rhai itself has no annotation syntax, so the signature is scanned here and
//! rewritten to plain `fn divide(a, b)` before the body ever reaches the
//! engine. Each parameter becomes an input socket; the return annotation
//! becomes the single [`OUTPUT_SOCKET`] output.

use crate::pipeline::port::SocketDef;
use crate::types::{Value, ValueType};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

/// Reserved name of the single output socket every definition exposes.
pub const OUTPUT_SOCKET: &str = "result";

/// Errors produced while deriving a definition from source text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("No function definition found in code block")]
    NoFunction,

    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Duplicate parameter `{0}`")]
    DuplicateParameter(String),
}

/// Typed schema of a node: name, sockets and implementing code.
///
/// Produced only by [`parse_function`]; there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDefinition {
    name: String,
    inputs: Vec<SocketDef>,
    outputs: Vec<SocketDef>,
    code: String,
}

impl NodeDefinition {
    /// Parse `code` into a definition. Alias of [`parse_function`].
    pub fn from_code(code: &str) -> Result<Self, ParseError> {
        parse_function(code)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[SocketDef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SocketDef] {
        &self.outputs
    }

    /// Cleaned (dedented, trimmed) source text.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn input(&self, name: &str) -> Option<&SocketDef> {
        self.inputs.iter().find(|s| s.name == name)
    }
}

/// One parameter of the node function as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParam {
    pub name: String,
    pub annotation: Option<String>,
    pub default_expr: Option<String>,
}

impl ParsedParam {
    fn socket(&self) -> SocketDef {
        let value_type = self
            .annotation
            .as_deref()
            .map(ValueType::from_annotation)
            .unwrap_or(ValueType::Any);
        let default = self
            .default_expr
            .as_deref()
            .and_then(eval_literal)
            .unwrap_or_else(|| value_type.default_value());
        SocketDef::new(self.name.clone(), value_type, default)
    }
}

/// The scanned signature of the first top-level function in a source text,
/// with the byte spans needed to rewrite it.
#[derive(Debug, Clone)]
pub struct ParsedFunction {
    pub name: String,
    pub params: Vec<ParsedParam>,
    pub return_annotation: Option<String>,
    source: String,
    /// `private` modifier before `fn`, dropped by the rewrite
    private_span: Option<Range<usize>>,
    name_span: Range<usize>,
    params_span: Range<usize>,
    return_span: Option<Range<usize>>,
}

impl ParsedFunction {
    /// Scan `source` (used verbatim, no cleaning) for the node function.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut scanner = Scanner::new(source);
        let fn_pos = scanner.find_top_level_fn().ok_or(ParseError::NoFunction)?;
        let private_span = private_modifier(source, fn_pos);
        scanner.pos = fn_pos + 2;

        scanner.skip_trivia();
        let name_span = scanner
            .read_ident()
            .ok_or_else(|| scanner.error("expected function name after `fn`"))?;
        let name = source[name_span.clone()].to_string();

        scanner.skip_trivia();
        if !scanner.eat(b'(') {
            return Err(scanner.error("expected `(` after function name"));
        }
        let params_start = scanner.pos - 1;

        let mut params = Vec::new();
        let mut seen = HashSet::new();
        loop {
            scanner.skip_trivia();
            if scanner.eat(b')') {
                break;
            }
            let param_span = scanner
                .read_ident()
                .ok_or_else(|| scanner.error("expected parameter name"))?;
            let param_name = source[param_span].to_string();
            if !seen.insert(param_name.clone()) {
                return Err(ParseError::DuplicateParameter(param_name));
            }

            scanner.skip_trivia();
            let annotation = if scanner.peek() == Some(b':') && scanner.peek_at(1) != Some(b':') {
                scanner.pos += 1;
                scanner.skip_trivia();
                let span = scanner
                    .read_type_path()
                    .ok_or_else(|| scanner.error("expected type after `:`"))?;
                Some(source[span].to_string())
            } else {
                None
            };

            scanner.skip_trivia();
            let default_expr = if scanner.peek() == Some(b'=') && scanner.peek_at(1) != Some(b'=') {
                scanner.pos += 1;
                let span = scanner.read_default_expr()?;
                let text = source[span].trim().to_string();
                if text.is_empty() {
                    return Err(scanner.error("expected default value after `=`"));
                }
                Some(text)
            } else {
                None
            };

            params.push(ParsedParam {
                name: param_name,
                annotation,
                default_expr,
            });

            scanner.skip_trivia();
            if scanner.eat(b',') {
                continue;
            }
            if scanner.eat(b')') {
                break;
            }
            return Err(scanner.error("expected `,` or `)` in parameter list"));
        }
        let params_span = params_start..scanner.pos;

        scanner.skip_trivia();
        let (return_annotation, return_span) = if scanner.starts_with("->") {
            let arrow = scanner.pos;
            scanner.pos += 2;
            scanner.skip_trivia();
            let span = scanner
                .read_type_path()
                .ok_or_else(|| scanner.error("expected return type after `->`"))?;
            let annotation = source[span.clone()].to_string();
            (Some(annotation), Some(arrow..span.end))
        } else {
            (None, None)
        };

        scanner.skip_trivia();
        if scanner.peek() != Some(b'{') {
            return Err(scanner.error("expected `{` to open the function body"));
        }

        Ok(Self {
            name,
            params,
            return_annotation,
            source: source.to_string(),
            private_span,
            name_span,
            params_span,
            return_span,
        })
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    /// Plain Rhai source with annotations and defaults removed.
    pub fn to_rhai(&self) -> String {
        let src = &self.source;
        let mut out = String::with_capacity(src.len());
        match &self.private_span {
            Some(private) => {
                out.push_str(&src[..private.start]);
                out.push_str(&src[private.end..self.name_span.start]);
            }
            None => out.push_str(&src[..self.name_span.start]),
        }
        out.push_str(&self.name);
        out.push_str(&src[self.name_span.end..self.params_span.start]);
        out.push('(');
        let names: Vec<&str> = self.param_names().collect();
        out.push_str(&names.join(", "));
        out.push(')');
        match &self.return_span {
            Some(ret) => {
                out.push_str(src[self.params_span.end..ret.start].trim_end());
                out.push_str(&src[ret.end..]);
            }
            None => out.push_str(&src[self.params_span.end..]),
        }
        out
    }

    /// Like [`to_rhai`](Self::to_rhai), but with `prefix` put in front of
    /// every top-level function the source declares, at its declaration and
    /// at each call. The entry function becomes `{prefix}{name}`.
    pub fn to_rhai_prefixed(&self, prefix: &str) -> String {
        let plain = self.to_rhai();
        let names = top_level_functions(&plain);
        Scanner::new(&plain).prefix_calls(&names, prefix)
    }

    /// Socket schema for this signature.
    pub fn to_definition(&self) -> NodeDefinition {
        let output_type = self
            .return_annotation
            .as_deref()
            .map(ValueType::from_annotation)
            .unwrap_or(ValueType::Any);
        NodeDefinition {
            name: self.name.clone(),
            inputs: self.params.iter().map(ParsedParam::socket).collect(),
            outputs: vec![SocketDef::new(
                OUTPUT_SOCKET,
                output_type,
                output_type.default_value(),
            )],
            code: self.source.clone(),
        }
    }
}

/// Names of every function declared at the top level of `source`.
pub fn top_level_functions(source: &str) -> HashSet<String> {
    let mut scanner = Scanner::new(source);
    let mut names = HashSet::new();
    while scanner.find_top_level_fn().is_some() {
        scanner.skip_trivia();
        if let Some(span) = scanner.read_ident() {
            names.insert(source[span].to_string());
        }
    }
    names
}

/// Span of a `private` keyword directly before the `fn` at `fn_pos`.
fn private_modifier(source: &str, fn_pos: usize) -> Option<Range<usize>> {
    let before = source[..fn_pos].trim_end();
    let start = before.strip_suffix("private").map(str::len)?;
    let boundary = source[..start]
        .bytes()
        .last()
        .map_or(true, |b| !(b.is_ascii_alphanumeric() || b == b'_'));
    boundary.then_some(start..fn_pos)
}

/// Interpret a function's source text into a [`NodeDefinition`].
///
/// The text is dedented and trimmed first; the cleaned text becomes the
/// definition's code. The body must compile as Rhai once the signature is
/// stripped of annotations.
pub fn parse_function(code: &str) -> Result<NodeDefinition, ParseError> {
    let cleaned = clean_source(code);
    let parsed = ParsedFunction::parse(&cleaned)?;
    check_compiles(&parsed.to_rhai())?;
    Ok(parsed.to_definition())
}

/// Dedent by the common run of leading spaces and tabs shared by non-blank
/// lines, then trim.
pub fn clean_source(code: &str) -> String {
    let margin = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_indent)
        .reduce(|common, indent| {
            let shared = common
                .bytes()
                .zip(indent.bytes())
                .take_while(|(a, b)| a == b)
                .count();
            &common[..shared]
        })
        .unwrap_or("");

    let dedented: Vec<&str> = code
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect();
    dedented.join("\n").trim().to_string()
}

fn leading_indent(line: &str) -> &str {
    let end = line
        .bytes()
        .position(|b| b != b' ' && b != b'\t')
        .unwrap_or(line.len());
    &line[..end]
}

fn check_compiles(rhai_source: &str) -> Result<(), ParseError> {
    rhai::Engine::new_raw()
        .compile(rhai_source)
        .map(|_| ())
        .map_err(|e| syntax_error(&e))
}

pub(crate) fn syntax_error(err: &rhai::ParseError) -> ParseError {
    ParseError::Syntax {
        line: err.position().line().unwrap_or(0),
        message: err.err_type().to_string(),
    }
}

/// Statically evaluate a literal default expression.
///
/// Supports numbers (with `_` separators and hex), strings, characters,
/// booleans, `()` and arrays of those. Returns `None` for anything else.
pub fn eval_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    match text {
        "true" => return Some(Value::Boolean(true)),
        "false" => return Some(Value::Boolean(false)),
        "()" => return Some(Value::Null),
        _ => {}
    }

    let first = text.chars().next()?;
    match first {
        '"' => unquote(text, '"').map(Value::String),
        '\'' => unquote(text, '\'').map(Value::String),
        '`' => text
            .strip_prefix('`')
            .and_then(|t| t.strip_suffix('`'))
            .filter(|t| !t.contains('`'))
            .map(|t| Value::String(t.to_string())),
        '[' => {
            let inner = text.strip_prefix('[')?.strip_suffix(']')?;
            let items = split_top_level(inner)?;
            items
                .into_iter()
                .filter(|item| !item.trim().is_empty())
                .map(eval_literal)
                .collect::<Option<Vec<_>>>()
                .map(Value::List)
        }
        _ => parse_number(text).map(Value::Number),
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text.strip_prefix('+').unwrap_or(text).trim_start()),
    };
    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() || !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let value = if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()? as f64
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()? as f64
    } else if digits
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        digits.parse::<f64>().ok()?
    } else {
        return None;
    };

    Some(if negative { -value } else { value })
}

fn unquote(text: &str, quote: char) -> Option<String> {
    let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                other => out.push(other),
            },
            c if c == quote => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Split on commas that are not nested in brackets or strings.
fn split_top_level(text: &str) -> Option<Vec<&str>> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'[' | b'(' | b'{' => depth += 1,
            b']' | b')' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

/// Byte scanner over Rhai source that understands comments and string
/// literals well enough to locate signature tokens.
struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s.as_bytes()))
    }

    /// Advance past the whole character at `pos`.
    fn bump_char(&mut self) {
        let width = match self.peek() {
            Some(b) if b < 0x80 => 1,
            Some(b) if b >= 0xF0 => 4,
            Some(b) if b >= 0xE0 => 3,
            Some(_) => 2,
            None => 0,
        };
        self.pos = (self.pos + width).min(self.bytes.len());
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn line(&self) -> usize {
        self.bytes[..self.pos.min(self.bytes.len())]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::Syntax {
            line: self.line(),
            message: message.to_string(),
        }
    }

    /// Skip whitespace, `//` comments and (nested) `/* */` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    let mut depth = 1;
                    while depth > 0 && self.pos < self.bytes.len() {
                        if self.starts_with("/*") {
                            depth += 1;
                            self.pos += 2;
                        } else if self.starts_with("*/") {
                            depth -= 1;
                            self.pos += 2;
                        } else {
                            self.pos += 1;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Skip a string, character or backtick literal starting at `pos`.
    fn skip_string(&mut self) {
        let Some(quote) = self.peek() else { return };
        self.pos += 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\\' && quote != b'`' {
                self.pos += 1;
            } else if b == quote {
                return;
            }
        }
    }

    fn read_ident(&mut self) -> Option<Range<usize>> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
            _ => return None,
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Some(start..self.pos)
    }

    /// `ident ((. | ::) ident)*`
    fn read_type_path(&mut self) -> Option<Range<usize>> {
        let start = self.pos;
        self.read_ident()?;
        loop {
            let save = self.pos;
            if self.starts_with("::") {
                self.pos += 2;
            } else if !self.eat(b'.') {
                break;
            }
            if self.read_ident().is_none() {
                self.pos = save;
                break;
            }
        }
        Some(start..self.pos)
    }

    /// Read up to (not including) the `,` or `)` that ends a default value.
    fn read_default_expr(&mut self) -> Result<Range<usize>, ParseError> {
        let start = self.pos;
        let mut depth = 0i32;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated parameter list")),
                Some(b'"') | Some(b'\'') | Some(b'`') => self.skip_string(),
                Some(b'(') | Some(b'[') | Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b')') if depth == 0 => return Ok(start..self.pos),
                Some(b',') if depth == 0 => return Ok(start..self.pos),
                Some(b')') | Some(b']') | Some(b'}') => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Copy the source, prefixing each identifier in `names` that is followed
    /// by `(`. Comments and string literals are copied untouched.
    fn prefix_calls(&mut self, names: &HashSet<String>, prefix: &str) -> String {
        let src = self.src;
        let mut out = String::with_capacity(src.len() + names.len() * prefix.len());
        loop {
            let start = self.pos;
            self.skip_trivia();
            out.push_str(&src[start..self.pos]);

            let Some(b) = self.peek() else { break };
            let start = self.pos;
            match b {
                b'"' | b'\'' | b'`' => {
                    self.skip_string();
                    self.pos = self.pos.min(self.bytes.len());
                    out.push_str(&src[start..self.pos]);
                }
                b if b.is_ascii_alphabetic() || b == b'_' => {
                    let Some(span) = self.read_ident() else { break };
                    let ident = &src[span];
                    let after = self.pos;
                    self.skip_trivia();
                    let is_call = self.peek() == Some(b'(');
                    self.pos = after;
                    if is_call && names.contains(ident) {
                        out.push_str(prefix);
                    }
                    out.push_str(ident);
                }
                _ => {
                    self.bump_char();
                    out.push_str(&src[start..self.pos]);
                }
            }
        }
        out
    }

    /// Position of the first `fn` keyword outside any block, string or comment.
    fn find_top_level_fn(&mut self) -> Option<usize> {
        let mut depth = 0i32;
        loop {
            self.skip_trivia();
            let b = self.peek()?;
            match b {
                b'"' | b'\'' | b'`' => self.skip_string(),
                b'{' | b'(' | b'[' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' | b')' | b']' => {
                    depth -= 1;
                    self.pos += 1;
                }
                b if b.is_ascii_alphabetic() || b == b'_' => {
                    let span = self.read_ident()?;
                    if depth == 0 && &self.src[span.clone()] == "fn" {
                        return Some(span.start);
                    }
                }
                b'#' if self.peek_at(1) == Some(b'{') => {
                    depth += 1;
                    self.pos += 2;
                }
                _ => self.pos += 1,
            }
        }
    }
}
