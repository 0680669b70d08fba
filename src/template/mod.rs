//! Minimal mustache-compatible renderer.
//!
//! Supports `{{name}}` / `{{{name}}}` substitution (dotted lookup),
//! `{{#name}}…{{/name}}` sections, and `{{^name}}…{{/name}}` inverted
//! sections. Templates are static strings: no filesystem access, no
//! partial inclusion. Undefined variables render to an empty string.
//! Rendering is a pure function of `(template, context)` — it never
//! mutates the context and never performs I/O.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed tag starting at byte {1}: {0}")]
    UnclosedTag(String, usize),
    #[error("section `{0}` is missing its closing tag")]
    UnclosedSection(String),
    #[error("closing tag for `{found}` does not match open section `{expected}`")]
    MismatchedSection { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var { path: String, escape: bool },
    Section { path: String, invert: bool, body: Vec<Node> },
}

/// Renders `template` against `context`. Pure: identical inputs always
/// yield identical output.
pub fn render(template: &str, context: &Value) -> Result<String, TemplateError> {
    // At the top level (`open_section: None`) `parse_nodes` either
    // consumes the whole input or returns an `Err` for an unmatched
    // closing tag — it never returns leftover input here.
    let (nodes, _) = parse_nodes(template, None)?;
    let mut out = String::new();
    render_nodes(&nodes, context, &mut out);
    Ok(out)
}

fn render_nodes(nodes: &[Node], context: &Value, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { path, escape } => {
                let value = lookup(context, path);
                let rendered = value.map(stringify).unwrap_or_default();
                if *escape {
                    out.push_str(&html_escape(&rendered));
                } else {
                    out.push_str(&rendered);
                }
            }
            Node::Section { path, invert, body } => {
                let truthy = lookup(context, path).map(is_truthy).unwrap_or(false);
                if truthy != *invert {
                    render_nodes(body, context, out);
                }
            }
        }
    }
}

/// Dotted lookup against a JSON object context: `a.b.c` walks nested
/// objects. Missing path segments, or lookups against a non-object,
/// resolve to `None` (which callers treat as undefined/falsy).
fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) | Value::Number(_) => true,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Parses a run of nodes until either the input is exhausted or we
/// hit a closing tag for `open_section` (in which case it returns the
/// remaining input starting at that closing tag, unconsumed, so the
/// caller can verify it matches). At the top level `open_section` is
/// `None`; an unmatched closing tag bubbles back up to [`render`].
fn parse_nodes<'a>(
    input: &'a str,
    open_section: Option<&str>,
) -> Result<(Vec<Node>, &'a str), TemplateError> {
    let mut nodes = Vec::new();
    let mut rest = input;

    loop {
        match rest.find("{{") {
            None => {
                if !rest.is_empty() {
                    nodes.push(Node::Text(rest.to_string()));
                }
                if let Some(name) = open_section {
                    return Err(TemplateError::UnclosedSection(name.to_string()));
                }
                return Ok((nodes, ""));
            }
            Some(tag_start) => {
                if tag_start > 0 {
                    nodes.push(Node::Text(rest[..tag_start].to_string()));
                }
                let after_open = &rest[tag_start + 2..];

                if let Some(stripped) = after_open.strip_prefix('{') {
                    let close_at = stripped.find("}}}").ok_or_else(|| {
                        TemplateError::UnclosedTag("{".to_string(), tag_start)
                    })?;
                    let name = stripped[..close_at].trim().to_string();
                    nodes.push(Node::Var {
                        path: name,
                        escape: false,
                    });
                    rest = &stripped[close_at + 3..];
                    continue;
                }

                let close_at = after_open
                    .find("}}")
                    .ok_or_else(|| TemplateError::UnclosedTag(String::new(), tag_start))?;
                let raw_tag = after_open[..close_at].trim();
                let remainder = &after_open[close_at + 2..];

                if let Some(name) = raw_tag.strip_prefix('#') {
                    let name = name.trim().to_string();
                    let (body, after_body) = parse_nodes(remainder, Some(&name))?;
                    let closed = consume_matching_close(after_body, &name)?;
                    nodes.push(Node::Section {
                        path: name,
                        invert: false,
                        body,
                    });
                    rest = closed;
                    continue;
                }

                if let Some(name) = raw_tag.strip_prefix('^') {
                    let name = name.trim().to_string();
                    let (body, after_body) = parse_nodes(remainder, Some(&name))?;
                    let closed = consume_matching_close(after_body, &name)?;
                    nodes.push(Node::Section {
                        path: name,
                        invert: true,
                        body,
                    });
                    rest = closed;
                    continue;
                }

                if let Some(name) = raw_tag.strip_prefix('/') {
                    let name = name.trim().to_string();
                    match open_section {
                        Some(expected) if expected == name => {
                            // Leave the closing tag itself (including its
                            // `{{`) in the remainder for the caller (the
                            // `#`/`^` branch above) to consume via
                            // `consume_matching_close`.
                            return Ok((nodes, &rest[tag_start..]));
                        }
                        Some(expected) => {
                            return Err(TemplateError::MismatchedSection {
                                expected: expected.to_string(),
                                found: name,
                            });
                        }
                        None => {
                            return Err(TemplateError::MismatchedSection {
                                expected: String::new(),
                                found: name,
                            });
                        }
                    }
                }

                nodes.push(Node::Var {
                    path: raw_tag.to_string(),
                    escape: true,
                });
                rest = remainder;
            }
        }
    }
}

/// Consumes the `{{/name}}` tag that `parse_nodes` left unconsumed at
/// the front of `input` when it returned because it found a matching
/// close tag for the currently-open section.
fn consume_matching_close<'a>(input: &'a str, name: &str) -> Result<&'a str, TemplateError> {
    debug_assert!(input.starts_with("{{/"));
    let close_at = input
        .find("}}")
        .ok_or_else(|| TemplateError::UnclosedSection(name.to_string()))?;
    Ok(&input[close_at + 2..])
}
