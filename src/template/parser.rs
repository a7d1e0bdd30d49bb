//! Directive-language parser.
//!
//! Templates are plain text with two directive forms:
//!
//! - `${expr}` substitution, optionally piped through transforms:
//!   `${item.reference.S}`, `${part.t:escape_quotes}`, `${language:upper}`
//! - `{% ... %}` blocks: `{%for part in json(item.data.S)%}`,
//!   `{%if after%}`, `{%if expr == "lit"%}`, closed by `{%end%}`
//!
//! Expressions are dotted paths rooted in the render context, string
//! literals (conditions only), or `json(path)` which parses a string value
//! as JSON and allows further traversal: `json(item.data.S).0.t`.
//!
//! The language is deliberately not Turing-complete: no user-defined
//! functions, no recursion, no boolean connectives, no counters. The only
//! loop-scoped binding besides the loop variable is `loop.has_next`, which
//! is a non-empty string on every iteration except the last.

use super::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Subst {
        expr: Expr,
        transforms: Vec<Transform>,
    },
    For {
        var: String,
        seq: Expr,
        body: Vec<Node>,
    },
    If {
        cond: Cond,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted path; numeric segments index into arrays.
    Path(Vec<String>),
    /// `json(source)` followed by an optional traversal trail.
    Json {
        source: Vec<String>,
        trail: Vec<String>,
    },
    /// Quoted string literal (conditions only in practice).
    Literal(String),
}

impl Expr {
    /// The context root this expression reads from, if any.
    pub fn root(&self) -> Option<&str> {
        match self {
            Expr::Path(segs) => segs.first().map(String::as_str),
            Expr::Json { source, .. } => source.first().map(String::as_str),
            Expr::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// Truthy test: non-empty string, non-zero-length array, etc.
    NonEmpty(Expr),
    Equals(Expr, Expr),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// Replace `"` with `&quot;` (the only escaping the share template does).
    EscapeQuotes,
    Lower,
    Upper,
}

enum FrameKind {
    Root,
    For { var: String, seq: Expr },
    If { cond: Cond },
}

struct Frame {
    kind: FrameKind,
    nodes: Vec<Node>,
}

/// Parse template source into an AST. Structural errors (unclosed blocks,
/// stray `{%end%}`, bad expressions) surface here, at registration time.
pub fn parse(src: &str) -> Result<Vec<Node>, TemplateError> {
    let mut frames = vec![Frame { kind: FrameKind::Root, nodes: Vec::new() }];
    let mut rest = src;

    while !rest.is_empty() {
        let subst_at = rest.find("${");
        let block_at = rest.find("{%");

        let (at, is_subst) = match (subst_at, block_at) {
            (None, None) => {
                frames.last_mut().unwrap().nodes.push(Node::Text(rest.to_string()));
                break;
            }
            (Some(s), None) => (s, true),
            (None, Some(b)) => (b, false),
            (Some(s), Some(b)) => {
                if s < b {
                    (s, true)
                } else {
                    (b, false)
                }
            }
        };

        if at > 0 {
            frames
                .last_mut()
                .unwrap()
                .nodes
                .push(Node::Text(rest[..at].to_string()));
        }
        rest = &rest[at..];

        if is_subst {
            let close = rest
                .find('}')
                .ok_or_else(|| TemplateError::MalformedDirective("unterminated '${'".into()))?;
            let inner = &rest[2..close];
            frames.last_mut().unwrap().nodes.push(parse_substitution(inner)?);
            rest = &rest[close + 1..];
        } else {
            let close = rest
                .find("%}")
                .ok_or_else(|| TemplateError::MalformedDirective("unterminated '{%'".into()))?;
            let inner = rest[2..close].trim();
            rest = &rest[close + 2..];

            if inner == "end" {
                let frame = frames.pop().unwrap();
                let node = match frame.kind {
                    FrameKind::Root => {
                        return Err(TemplateError::MalformedDirective(
                            "'end' with no open block".into(),
                        ))
                    }
                    FrameKind::For { var, seq } => Node::For { var, seq, body: frame.nodes },
                    FrameKind::If { cond } => Node::If { cond, body: frame.nodes },
                };
                frames.last_mut().unwrap().nodes.push(node);
            } else if let Some(spec) = inner.strip_prefix("for ") {
                let (var, seq) = parse_for_spec(spec)?;
                frames.push(Frame { kind: FrameKind::For { var, seq }, nodes: Vec::new() });
            } else if let Some(spec) = inner.strip_prefix("if ") {
                let cond = parse_cond(spec)?;
                frames.push(Frame { kind: FrameKind::If { cond }, nodes: Vec::new() });
            } else {
                return Err(TemplateError::MalformedDirective(format!(
                    "unrecognized directive '{}'",
                    inner
                )));
            }
        }
    }

    if frames.len() != 1 {
        return Err(TemplateError::MalformedDirective("unclosed block".into()));
    }
    Ok(frames.pop().unwrap().nodes)
}

fn parse_substitution(inner: &str) -> Result<Node, TemplateError> {
    let inner = inner.trim();
    if inner.is_empty() {
        return Err(TemplateError::MalformedDirective("empty substitution".into()));
    }

    // Literals carry no transforms; everything else splits on ':'.
    if inner.starts_with('"') {
        return Ok(Node::Subst { expr: parse_expr(inner)?, transforms: Vec::new() });
    }

    let mut parts = inner.split(':');
    let expr = parse_expr(parts.next().unwrap())?;
    let mut transforms = Vec::new();
    for name in parts {
        transforms.push(match name.trim() {
            "escape_quotes" => Transform::EscapeQuotes,
            "lower" => Transform::Lower,
            "upper" => Transform::Upper,
            other => {
                return Err(TemplateError::MalformedDirective(format!(
                    "unknown transform '{}'",
                    other
                )))
            }
        });
    }
    Ok(Node::Subst { expr, transforms })
}

fn parse_for_spec(spec: &str) -> Result<(String, Expr), TemplateError> {
    let mut tokens = spec.trim().splitn(3, char::is_whitespace);
    let var = tokens
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TemplateError::MalformedDirective("for: missing variable".into()))?;
    if tokens.next() != Some("in") {
        return Err(TemplateError::MalformedDirective(
            "for: expected 'for <var> in <expr>'".into(),
        ));
    }
    let seq = tokens
        .next()
        .ok_or_else(|| TemplateError::MalformedDirective("for: missing sequence".into()))?;
    validate_ident(var)?;
    Ok((var.to_string(), parse_expr(seq)?))
}

fn parse_cond(spec: &str) -> Result<Cond, TemplateError> {
    if let Some(at) = spec.find("==") {
        let left = parse_expr(&spec[..at])?;
        let right = parse_expr(&spec[at + 2..])?;
        Ok(Cond::Equals(left, right))
    } else {
        Ok(Cond::NonEmpty(parse_expr(spec)?))
    }
}

fn parse_expr(s: &str) -> Result<Expr, TemplateError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(TemplateError::MalformedDirective("empty expression".into()));
    }

    if let Some(body) = s.strip_prefix('"') {
        let body = body
            .strip_suffix('"')
            .ok_or_else(|| TemplateError::MalformedDirective("unterminated string literal".into()))?;
        return Ok(Expr::Literal(body.to_string()));
    }

    if let Some(rest) = s.strip_prefix("json(") {
        let close = rest
            .find(')')
            .ok_or_else(|| TemplateError::MalformedDirective("unterminated 'json('".into()))?;
        let source = parse_path(&rest[..close])?;
        let after = &rest[close + 1..];
        let trail = if after.is_empty() {
            Vec::new()
        } else if let Some(t) = after.strip_prefix('.') {
            parse_path(t)?
        } else {
            return Err(TemplateError::MalformedDirective(format!(
                "unexpected '{}' after json()",
                after
            )));
        };
        return Ok(Expr::Json { source, trail });
    }

    Ok(Expr::Path(parse_path(s)?))
}

fn parse_path(s: &str) -> Result<Vec<String>, TemplateError> {
    let segs: Vec<String> = s.trim().split('.').map(str::to_string).collect();
    for seg in &segs {
        validate_ident(seg)?;
    }
    Ok(segs)
}

fn validate_ident(seg: &str) -> Result<(), TemplateError> {
    if seg.is_empty()
        || !seg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(TemplateError::MalformedDirective(format!(
            "invalid identifier '{}'",
            seg
        )));
    }
    Ok(())
}
