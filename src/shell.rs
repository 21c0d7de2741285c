//! Shell helpers for remote tool invocations.
//!
//! Remote-shell agents describe their tool call as a `minijinja` template.
//! Every value substituted into the template is shell-escaped first, so a
//! payload can never break out of its argument position.

use minijinja::Environment;
use serde_json::{Map, Value};
use thiserror::Error;

/// Escapes a value for safe inclusion in a POSIX shell command.
///
/// Uses single-quote wrapping and the standard `'\''` sequence for embedded
/// quotes.
#[must_use]
pub fn shell_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

/// Values available to a tool invocation template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationVars<'a> {
    /// Task payload flattened to text.
    pub payload: &'a str,
    /// Model name configured on the agent.
    pub model: &'a str,
    /// Task identifier.
    pub task_id: &'a str,
    /// Capability tag the task was routed by.
    pub capability: &'a str,
}

/// Error returned when an invocation template cannot be rendered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invocation template rendering failed: {0}")]
pub struct TemplateRenderError(pub String);

/// Renders a tool invocation template into a shell command line.
///
/// The template sees `payload`, `model`, `task_id`, and `capability`, each
/// already shell-escaped.
///
/// # Errors
///
/// Returns [`TemplateRenderError`] when the template has a syntax error or
/// references an unknown filter.
pub fn render_invocation(
    template: &str,
    vars: &InvocationVars<'_>,
) -> Result<String, TemplateRenderError> {
    let environment = Environment::new();
    let mut context = Map::new();
    for (key, value) in [
        ("payload", vars.payload),
        ("model", vars.model),
        ("task_id", vars.task_id),
        ("capability", vars.capability),
    ] {
        context.insert(key.to_owned(), Value::String(shell_escape(value)));
    }
    environment
        .render_str(template, context)
        .map_err(|error| TemplateRenderError(error.to_string()))
}

/// Flattens a task payload into the text handed to a command-line tool.
///
/// String payloads are passed through verbatim; any other JSON value is
/// serialized compactly.
#[must_use]
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{InvocationVars, payload_text, render_invocation, shell_escape};
    use serde_json::json;

    fn vars<'a>(payload: &'a str) -> InvocationVars<'a> {
        InvocationVars {
            payload,
            model: "sonnet",
            task_id: "t-1",
            capability: "review",
        }
    }

    #[test]
    fn shell_escape_handles_empty_string() {
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn shell_escape_preserves_whitespace() {
        assert_eq!(shell_escape("a b"), "'a b'");
    }

    #[test]
    fn shell_escape_escapes_single_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn shell_escape_preserves_unicode() {
        assert_eq!(shell_escape("éß漢"), "'éß漢'");
    }

    #[test]
    fn render_substitutes_escaped_values() {
        let rendered = render_invocation("claude -p {{ payload }} --model {{ model }}", &vars("fix it"))
            .expect("template should render");
        assert_eq!(rendered, "claude -p 'fix it' --model 'sonnet'");
    }

    #[test]
    fn render_keeps_injection_inside_quotes() {
        let rendered = render_invocation("tool {{ payload }}", &vars("x'; rm -rf / #"))
            .expect("template should render");
        assert_eq!(rendered, "tool 'x'\\''; rm -rf / #'");
    }

    #[test]
    fn render_reports_syntax_errors() {
        let result = render_invocation("tool {{ payload", &vars("x"));
        assert!(result.is_err());
    }

    #[test]
    fn payload_text_passes_strings_through() {
        assert_eq!(payload_text(&json!("hello")), "hello");
        assert_eq!(payload_text(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
