//! Portfolio Template Engine
//!
//! A Django-flavoured template engine used by the page renderer and the admin
//! console.
//!
//! Workflow:
//! 1. `render_template` loads the child template from the template directory.
//! 2. `tokenize_template` splits content into Text, Variable, and Tag tokens.
//! 3. `parse_tokens` and `parse_nodes` build an AST of `Node`.
//! 4. Child `Block` definitions and `Extends` tag are collected.
//! 5. `merge_blocks` merges child blocks into the base template, replacing all matching blocks by name.
//! 6. `render_nodes` walks the merged AST and outputs HTML, resolving variables and filters,
//!    `if`/`if not` conditions, `for` loops with `empty`, and `{% livereload %}`.
//!
//! Variables are HTML-escaped unless piped through `safe`.
//! Runtime logging is controlled via `set_display_logs`.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::router::Response;

/// Global switch for enabling/disabling internal template logs
static DISPLAY_LOGS: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(\{\{.*?\}\}|\{%.*?%\})").expect("template token pattern is valid")
});

/// Enable or disable internal debug logs for the template engine
pub fn set_display_logs(enabled: bool) {
    DISPLAY_LOGS.store(enabled, Ordering::Relaxed);
}

/// Internal debug: logs only if DISPLAY_LOGS is true
macro_rules! tdebug {
    ($($arg:tt)+) => {
        if DISPLAY_LOGS.load(Ordering::Relaxed) {
            debug!($($arg)+);
        }
    }
}

pub type Context = HashMap<String, TemplateValue>;

/// Supported value types for template context
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateValue {
    Null,
    String(String),
    Bool(bool),
    Number(f64),
    List(Vec<TemplateValue>),
    Object(HashMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Convert the value to a string for rendering
    pub fn as_string(&self) -> String {
        match self {
            TemplateValue::Null => String::new(),
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Number(n) => n.to_string(),
            TemplateValue::List(_) | TemplateValue::Object(_) => String::new(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Bool(b) => *b,
            TemplateValue::Number(n) => *n != 0.0,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Object(map) => !map.is_empty(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(b),
            serde_json::Value::Number(n) => TemplateValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => TemplateValue::String(s),
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.into_iter().map(TemplateValue::from_json).collect())
            }
            serde_json::Value::Object(map) => TemplateValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, TemplateValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert any serializable value, e.g. a model row.
    pub fn from_serialize<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => TemplateValue::from_json(json),
            Err(e) => {
                log::error!("Failed to convert value for template context: {}", e);
                TemplateValue::Null
            }
        }
    }

    /// Add a key to an object value; other variants are left untouched.
    pub fn with(mut self, key: &str, value: impl Into<TemplateValue>) -> Self {
        if let TemplateValue::Object(map) = &mut self {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::String(s)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl From<i64> for TemplateValue {
    fn from(n: i64) -> Self {
        TemplateValue::Number(n as f64)
    }
}

impl<T: Into<TemplateValue>> From<Vec<T>> for TemplateValue {
    fn from(items: Vec<T>) -> Self {
        TemplateValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TemplateValue::Null)
    }
}

/// Token types extracted from the template
#[derive(Debug, Clone)]
pub enum Token {
    Text(String),     // Plain text
    Variable(String), // {{ variable }}
    Tag(String),      // {% tag %}
}

/// AST node types for the template engine
#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Variable(String),
    If {
        condition: String,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    For {
        var_name: String,
        list_name: String,
        body: Vec<Node>,
        empty_body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Extends(String), // {% extends "base.html" %}
    LiveReload,      // {% livereload %}
}

/// Tokenizes the template content into a Vec<Token>
pub fn tokenize_template(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last_end = 0;
    for mat in TOKEN_RE.find_iter(content) {
        let start = mat.start();
        let end = mat.end();
        if start > last_end {
            tokens.push(Token::Text(content[last_end..start].to_string()));
        }
        let m = mat.as_str().trim();
        if m.starts_with("{{") {
            let inner = m
                .trim_start_matches("{{")
                .trim_end_matches("}}")
                .trim()
                .to_string();
            tdebug!("tokenize: Variable '{{ {{ {} }} }}'", inner);
            tokens.push(Token::Variable(inner));
        } else {
            let inner = m
                .trim_start_matches("{%")
                .trim_end_matches("%}")
                .trim()
                .to_string();
            tdebug!("tokenize: Tag '{{% {} %}}'", inner);
            tokens.push(Token::Tag(inner));
        }
        last_end = end;
    }
    if last_end < content.len() {
        tokens.push(Token::Text(content[last_end..].to_string()));
    }
    tokens
}

/// Parses a sequence of Token into an AST of Node
pub fn parse_tokens(tokens: &[Token]) -> Vec<Node> {
    let mut idx = 0;
    parse_nodes(tokens, &mut idx, &[])
}

fn at_tag(tokens: &[Token], idx: usize, name: &str) -> bool {
    matches!(tokens.get(idx), Some(Token::Tag(t)) if t.trim() == name)
}

/// Recursive parser: consumes tokens until an `end_tag` is found
fn parse_nodes(tokens: &[Token], idx: &mut usize, end_tags: &[&str]) -> Vec<Node> {
    let mut nodes = Vec::new();
    while *idx < tokens.len() {
        match &tokens[*idx] {
            Token::Text(t) => {
                nodes.push(Node::Text(t.clone()));
                *idx += 1;
            }
            Token::Variable(v) => {
                nodes.push(Node::Variable(v.clone()));
                *idx += 1;
            }
            Token::Tag(tag) => {
                let t = tag.trim();
                if end_tags.contains(&t) {
                    break;
                }
                // Handle extends
                if let Some(rest) = t.strip_prefix("extends ") {
                    nodes.push(Node::Extends(rest.trim().trim_matches('"').to_string()));
                    *idx += 1;
                    continue;
                }
                // Handle block
                if let Some(name) = t.strip_prefix("block ") {
                    *idx += 1;
                    let body = parse_nodes(tokens, idx, &["endblock"]);
                    *idx += 1; // skip endblock
                    nodes.push(Node::Block {
                        name: name.trim().to_string(),
                        body,
                    });
                    continue;
                }
                // Handle if/else/endif
                if let Some(cond) = t.strip_prefix("if ") {
                    *idx += 1;
                    let then_body = parse_nodes(tokens, idx, &["else", "endif"]);
                    let mut else_body = Vec::new();
                    if at_tag(tokens, *idx, "else") {
                        *idx += 1;
                        else_body = parse_nodes(tokens, idx, &["endif"]);
                    }
                    *idx += 1; // skip endif
                    nodes.push(Node::If {
                        condition: cond.trim().to_string(),
                        then_body,
                        else_body,
                    });
                    continue;
                }
                // Handle for/empty/endfor
                if let Some(rest) = t.strip_prefix("for ") {
                    let parts: Vec<&str> = rest.split_whitespace().collect();
                    if parts.len() == 3 && parts[1] == "in" {
                        *idx += 1;
                        let body = parse_nodes(tokens, idx, &["empty", "endfor"]);
                        let mut empty_body = Vec::new();
                        if at_tag(tokens, *idx, "empty") {
                            *idx += 1;
                            empty_body = parse_nodes(tokens, idx, &["endfor"]);
                        }
                        *idx += 1; // skip endfor
                        nodes.push(Node::For {
                            var_name: parts[0].to_string(),
                            list_name: parts[2].to_string(),
                            body,
                            empty_body,
                        });
                        continue;
                    }
                }
                if t == "livereload" {
                    nodes.push(Node::LiveReload);
                    *idx += 1;
                    continue;
                }
                // Unknown tag: skip
                tdebug!("parse: skipping unknown tag '{}'", t);
                *idx += 1;
            }
        }
    }
    nodes
}

/// Resolves a dotted variable path 'a.b.c' within the context
fn resolve_variable<'a>(name: &str, context: &'a Context) -> Option<&'a TemplateValue> {
    let mut current: Option<&TemplateValue> = None;
    for (i, key) in name.split('.').enumerate() {
        if i == 0 {
            current = context.get(key);
        } else if let Some(TemplateValue::Object(map)) = current {
            current = map.get(key);
        } else {
            return None;
        }
    }
    current
}

fn evaluate_condition(condition: &str, context: &Context) -> bool {
    match condition.strip_prefix("not ") {
        Some(inner) => !evaluate_condition(inner.trim(), context),
        None => resolve_variable(condition, context)
            .map(TemplateValue::is_truthy)
            .unwrap_or(false),
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render `{{ name|filter|filter:"arg" }}`.
fn render_variable(expr: &str, context: &Context) -> String {
    let mut parts = expr.split('|');
    let name = parts.next().unwrap_or_default().trim();
    let mut value = resolve_variable(name, context)
        .map(TemplateValue::as_string)
        .unwrap_or_default();
    let mut escaped = false;
    let mut safe = false;
    for filter in parts {
        let (filter_name, arg) = match filter.split_once(':') {
            Some((f, a)) => (f.trim(), Some(a.trim().trim_matches('"'))),
            None => (filter.trim(), None),
        };
        match filter_name {
            "safe" => safe = true,
            "default" => {
                if value.is_empty() {
                    value = arg.unwrap_or_default().to_string();
                }
            }
            "linebreaksbr" => {
                if !escaped && !safe {
                    value = escape_html(&value);
                    escaped = true;
                }
                value = value.replace("\r\n", "\n").replace('\n', "<br>");
            }
            other => tdebug!("render: unknown filter '{}'", other),
        }
    }
    if safe || escaped {
        value
    } else {
        escape_html(&value)
    }
}

/// Merges child blocks into base AST by matching block names
fn merge_blocks(nodes: &[Node], child_blocks: &HashMap<String, Vec<Node>>) -> Vec<Node> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Block { name, body } => {
                if let Some(child) = child_blocks.get(name) {
                    Node::Block {
                        name: name.clone(),
                        body: child.clone(),
                    }
                } else {
                    Node::Block {
                        name: name.clone(),
                        body: merge_blocks(body, child_blocks),
                    }
                }
            }
            Node::If {
                condition,
                then_body,
                else_body,
            } => Node::If {
                condition: condition.clone(),
                then_body: merge_blocks(then_body, child_blocks),
                else_body: merge_blocks(else_body, child_blocks),
            },
            Node::For {
                var_name,
                list_name,
                body,
                empty_body,
            } => Node::For {
                var_name: var_name.clone(),
                list_name: list_name.clone(),
                body: merge_blocks(body, child_blocks),
                empty_body: merge_blocks(empty_body, child_blocks),
            },
            other => other.clone(),
        })
        .collect()
}

/// Renders the AST into HTML string using the context
pub fn render_nodes(nodes: &[Node], context: &Context) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Variable(expr) => out.push_str(&render_variable(expr, context)),
            Node::If {
                condition,
                then_body,
                else_body,
            } => {
                if evaluate_condition(condition, context) {
                    out.push_str(&render_nodes(then_body, context));
                } else {
                    out.push_str(&render_nodes(else_body, context));
                }
            }
            Node::For {
                var_name,
                list_name,
                body,
                empty_body,
            } => match resolve_variable(list_name, context) {
                Some(TemplateValue::List(items)) if !items.is_empty() => {
                    let mut local = context.clone();
                    for item in items {
                        local.insert(var_name.clone(), item.clone());
                        out.push_str(&render_nodes(body, &local));
                    }
                }
                _ => out.push_str(&render_nodes(empty_body, context)),
            },
            Node::Block { body, .. } => {
                out.push_str(&render_nodes(body, context));
            }
            Node::Extends(_) => {}
            Node::LiveReload => {
                if let Some(TemplateValue::String(url)) = context.get("livereload_url") {
                    tdebug!("Inserting live reload client for {}", url);
                    out.push_str(&format!(
                        "<script>new WebSocket(\"{}\").onmessage = (m) => {{ if (m.data === \"reload\") location.reload(); }};</script>",
                        escape_html(url)
                    ));
                }
            }
        }
    }
    out
}

/// Load, merge with its base if it extends one, and render a template file.
pub fn render_file(dir: &Path, template_name: &str, context: &Context) -> std::io::Result<String> {
    let child = std::fs::read_to_string(dir.join(template_name))?;
    let child_nodes = parse_tokens(&tokenize_template(&child));
    tdebug!("Child AST: {:?}", child_nodes);

    // Collect child blocks and detect base
    let mut child_blocks = HashMap::new();
    let mut base_t: Option<String> = None;
    for node in &child_nodes {
        if let Node::Extends(b) = node {
            base_t = Some(b.clone());
        }
        if let Node::Block { name, body } = node {
            child_blocks.insert(name.clone(), body.clone());
        }
    }

    let html = match base_t {
        Some(base) => {
            let base_content = std::fs::read_to_string(dir.join(&base))?;
            let base_nodes = parse_tokens(&tokenize_template(&base_content));
            tdebug!("Base AST: {:?}", base_nodes);
            let merged = merge_blocks(&base_nodes, &child_blocks);
            render_nodes(&merged, context)
        }
        None => render_nodes(&child_nodes, context),
    };
    Ok(html)
}

/// Main entry: renders a template from `dir` into an HTML response
pub fn render_template(dir: impl AsRef<Path>, template_name: &str, context: &Context) -> Response {
    match render_file(dir.as_ref(), template_name, context) {
        Ok(html) => Response::html(html),
        Err(e) => {
            log::error!("Template '{}' could not be rendered: {}", template_name, e);
            Response::server_error(format!("Template '{}' not found", template_name))
        }
    }
}
