//! Sandboxed template engine.
//!
//! One engine serves both sides of the pipeline: request templates render
//! the canonical store-request encoding from user parameters, response
//! templates render the HTTP body from user parameters plus the store's
//! native result. Evaluation is single-pass, side-effect-free, performs no
//! I/O, and its only loop bound is the length of the bound sequence.

mod parser;

use std::collections::BTreeSet;

use serde_json::Value;

pub use parser::{Cond, Expr, Node, Transform};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("malformed directive: {0}")]
    MalformedDirective(String),

    #[error("unresolved reference '{0}'")]
    UnresolvedReference(String),

    #[error("type mismatch at '{0}': {1}")]
    TypeMismatch(String, String),

    #[error("invalid JSON at '{0}': {1}")]
    JsonParse(String, String),
}

/// Read-only name -> value mapping a template renders against.
///
/// Assembled per request from path and query parameters, then extended with
/// the store's native result before response rendering. Never mutated while
/// a render is in progress.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: std::collections::BTreeMap<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn insert_str(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), Value::String(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// A parsed template program.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        Ok(Self { nodes: parser::parse(src)? })
    }

    /// Render deterministically against `ctx`. The same template, context,
    /// and store result always produce byte-identical output.
    pub fn render(&self, ctx: &TemplateContext) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut scope = Scope { ctx, locals: Vec::new() };
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }

    /// Context roots this template reads, for registration-time validation.
    /// Loop variables and the implicit `loop` binding are excluded.
    pub fn referenced_roots(&self) -> BTreeSet<String> {
        let mut roots = BTreeSet::new();
        let mut bound: Vec<String> = vec!["loop".to_string()];
        collect_roots(&self.nodes, &mut bound, &mut roots);
        roots
    }
}

fn collect_roots(nodes: &[Node], bound: &mut Vec<String>, roots: &mut BTreeSet<String>) {
    let note = |expr: &Expr, bound: &[String], roots: &mut BTreeSet<String>| {
        if let Some(root) = expr.root() {
            if !bound.iter().any(|b| b == root) {
                roots.insert(root.to_string());
            }
        }
    };

    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Subst { expr, .. } => note(expr, bound, roots),
            Node::If { cond, body } => {
                match cond {
                    Cond::NonEmpty(e) => note(e, bound, roots),
                    Cond::Equals(l, r) => {
                        note(l, bound, roots);
                        note(r, bound, roots);
                    }
                }
                collect_roots(body, bound, roots);
            }
            Node::For { var, seq, body } => {
                note(seq, bound, roots);
                bound.push(var.clone());
                collect_roots(body, bound, roots);
                bound.pop();
            }
        }
    }
}

struct Scope<'a> {
    ctx: &'a TemplateContext,
    /// Loop bindings, innermost last. Includes the per-iteration `loop`
    /// pseudo-object carrying `has_next`.
    locals: Vec<(String, Value)>,
}

impl Scope<'_> {
    fn lookup(&self, root: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(name, _)| name == root)
            .map(|(_, v)| v)
            .or_else(|| self.ctx.get(root))
    }
}

fn render_nodes(nodes: &[Node], scope: &mut Scope, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Subst { expr, transforms } => {
                let value = eval_expr(expr, scope)?
                    .ok_or_else(|| TemplateError::UnresolvedReference(expr_name(expr)))?;
                let mut s = value_to_string(&value, &expr_name(expr))?;
                for t in transforms {
                    s = apply_transform(*t, s);
                }
                out.push_str(&s);
            }
            Node::If { cond, body } => {
                if eval_cond(cond, scope)? {
                    render_nodes(body, scope, out)?;
                }
            }
            Node::For { var, seq, body } => {
                let elements = eval_sequence(seq, scope)?;
                let len = elements.len();
                for (i, element) in elements.into_iter().enumerate() {
                    let has_next = if i + 1 < len { "true" } else { "" };
                    scope.locals.push((var.clone(), element));
                    scope
                        .locals
                        .push(("loop".to_string(), serde_json::json!({ "has_next": has_next })));
                    let result = render_nodes(body, scope, out);
                    scope.locals.pop();
                    scope.locals.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Evaluate an expression. `Ok(None)` means the reference did not resolve;
/// substitution treats that as an error, conditions treat it as empty.
fn eval_expr(expr: &Expr, scope: &Scope) -> Result<Option<Value>, TemplateError> {
    match expr {
        Expr::Literal(s) => Ok(Some(Value::String(s.clone()))),
        Expr::Path(segs) => walk(scope.lookup(&segs[0]), &segs[1..], &expr_name(expr)),
        Expr::Json { source, trail } => {
            let name = expr_name(expr);
            let raw = match walk(scope.lookup(&source[0]), &source[1..], &name)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let text = match raw {
                Value::String(s) => s,
                other => {
                    return Err(TemplateError::TypeMismatch(
                        name,
                        format!("json() needs a string, found {}", kind_of(&other)),
                    ))
                }
            };
            let parsed: Value = serde_json::from_str(&text)
                .map_err(|e| TemplateError::JsonParse(name.clone(), e.to_string()))?;
            walk(Some(&parsed), trail, &name)
        }
    }
}

/// Traverse `segments` down from `value`, indexing arrays by numeric
/// segments. A missing key resolves to `None`; traversing into a scalar is
/// a type mismatch.
fn walk(
    value: Option<&Value>,
    segments: &[String],
    name: &str,
) -> Result<Option<Value>, TemplateError> {
    let mut current = match value {
        Some(v) => v.clone(),
        None => return Ok(None),
    };
    for seg in segments {
        current = match &current {
            Value::Object(map) => match map.get(seg) {
                Some(v) => v.clone(),
                None => return Ok(None),
            },
            Value::Array(items) => {
                let idx: usize = seg.parse().map_err(|_| {
                    TemplateError::TypeMismatch(
                        name.to_string(),
                        format!("'{}' is not an array index", seg),
                    )
                })?;
                match items.get(idx) {
                    Some(v) => v.clone(),
                    None => return Ok(None),
                }
            }
            other => {
                return Err(TemplateError::TypeMismatch(
                    name.to_string(),
                    format!("cannot traverse '{}' inside {}", seg, kind_of(other)),
                ))
            }
        };
    }
    Ok(Some(current))
}

fn eval_cond(cond: &Cond, scope: &Scope) -> Result<bool, TemplateError> {
    match cond {
        Cond::NonEmpty(expr) => Ok(match eval_expr(expr, scope)? {
            None => false,
            Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }),
        Cond::Equals(left, right) => {
            let l = cond_string(eval_expr(left, scope)?, &expr_name(left))?;
            let r = cond_string(eval_expr(right, scope)?, &expr_name(right))?;
            Ok(l == r)
        }
    }
}

/// Loose string form for equality tests; missing references compare as "".
fn cond_string(value: Option<Value>, name: &str) -> Result<String, TemplateError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(TemplateError::TypeMismatch(
            name.to_string(),
            format!("cannot compare {}", kind_of(&other)),
        )),
    }
}

fn eval_sequence(expr: &Expr, scope: &Scope) -> Result<Vec<Value>, TemplateError> {
    match eval_expr(expr, scope)? {
        None => Err(TemplateError::UnresolvedReference(expr_name(expr))),
        Some(Value::Array(items)) => Ok(items),
        // A string parameter iterates as a comma-split list.
        Some(Value::String(s)) => {
            if s.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(s.split(',').map(|p| Value::String(p.to_string())).collect())
            }
        }
        Some(other) => Err(TemplateError::TypeMismatch(
            expr_name(expr),
            format!("cannot iterate {}", kind_of(&other)),
        )),
    }
}

fn value_to_string(value: &Value, name: &str) -> Result<String, TemplateError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(TemplateError::TypeMismatch(
            name.to_string(),
            format!("cannot substitute {}", kind_of(other)),
        )),
    }
}

fn apply_transform(transform: Transform, s: String) -> String {
    match transform {
        Transform::EscapeQuotes => s.replace('"', "&quot;"),
        Transform::Lower => s.to_lowercase(),
        Transform::Upper => s.to_uppercase(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn expr_name(expr: &Expr) -> String {
    match expr {
        Expr::Path(segs) => segs.join("."),
        Expr::Json { source, trail } => {
            if trail.is_empty() {
                format!("json({})", source.join("."))
            } else {
                format!("json({}).{}", source.join("."), trail.join("."))
            }
        }
        Expr::Literal(s) => format!("\"{}\"", s),
    }
}
