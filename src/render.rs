// Textual renderings of a Value: compact JSON, indented JSON, and a YAML-like form

use crate::value::Value;

/// Output format for [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Single-line JSON.
    #[default]
    Compact,
    /// Multi-line JSON indented by `indent` spaces per level.
    Pretty { indent: usize },
    /// YAML-like block form.
    Yaml,
}

/// Render a value. `Empty` renders as the empty string in every format, and
/// composites skip `Empty` children without leaving separators behind.
pub fn render(value: &Value, format: Format) -> String {
    let mut out = String::new();
    match format {
        Format::Compact => write_compact(value, &mut out),
        Format::Pretty { indent } => write_pretty(value, indent, 0, &mut out),
        Format::Yaml => out = yaml_lines(value).join("\n"),
    }
    out
}

pub(crate) fn escape_json_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", escape_json_string(s))
}

/// Scalar text shared by the JSON forms. `None` for composites.
fn json_scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.render(),
        Value::String(s) => quoted(s),
        Value::Raw(bytes) => format!("`{}`", String::from_utf8_lossy(bytes)),
        Value::Stream(_) => quoted("<stream>"),
        Value::Error(e) => e.to_string(),
        Value::Empty => String::new(),
        Value::End => "end".to_string(),
        Value::Path(p) => quoted(&p.to_string()),
        Value::Array(_) | Value::Object(_) => return None,
    };
    Some(text)
}

// ── Compact ──────────────────────────────────────────────────────────────────

fn write_compact(value: &Value, out: &mut String) {
    match value {
        Value::Array(arr) => {
            out.push('[');
            let mut first = true;
            for v in arr.iter().filter(|v| !v.is_empty()) {
                if !first {
                    out.push(',');
                }
                first = false;
                write_compact(v, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            out.push('{');
            let mut first = true;
            for (k, v) in obj.iter().filter(|(_, v)| !v.is_empty()) {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&quoted(k));
                out.push(':');
                write_compact(v, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&json_scalar(scalar).unwrap_or_default()),
    }
}

// ── Pretty ───────────────────────────────────────────────────────────────────

fn write_pretty(value: &Value, indent: usize, depth: usize, out: &mut String) {
    let pad = |out: &mut String, depth: usize| {
        out.extend(std::iter::repeat(' ').take(indent * depth));
    };
    match value {
        Value::Array(arr) => {
            let items: Vec<&Value> = arr.iter().filter(|v| !v.is_empty()).collect();
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for (i, v) in items.iter().enumerate() {
                pad(out, depth + 1);
                write_pretty(v, indent, depth + 1, out);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            pad(out, depth);
            out.push(']');
        }
        Value::Object(obj) => {
            let pairs: Vec<(&String, &Value)> =
                obj.iter().filter(|(_, v)| !v.is_empty()).collect();
            if pairs.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            for (i, (k, v)) in pairs.iter().enumerate() {
                pad(out, depth + 1);
                out.push_str(&quoted(k));
                out.push_str(": ");
                write_pretty(v, indent, depth + 1, out);
                if i + 1 < pairs.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            pad(out, depth);
            out.push('}');
        }
        scalar => out.push_str(&json_scalar(scalar).unwrap_or_default()),
    }
}

// ── YAML-like ────────────────────────────────────────────────────────────────

const YAML_INDENT: &str = "  ";

/// Lines of the YAML-like form at zero indentation.
fn yaml_lines(value: &Value) -> Vec<String> {
    match value {
        Value::Empty => Vec::new(),
        Value::Array(arr) => {
            let items: Vec<&Value> = arr.iter().filter(|v| !v.is_empty()).collect();
            if items.is_empty() {
                return vec!["[]".to_string()];
            }
            let mut lines = Vec::new();
            for item in items {
                let child = yaml_lines(item);
                let mut child = child.into_iter();
                if let Some(first) = child.next() {
                    lines.push(format!("- {}", first));
                }
                lines.extend(child.map(|l| format!("{}{}", YAML_INDENT, l)));
            }
            lines
        }
        Value::Object(obj) => {
            let pairs: Vec<(&String, &Value)> =
                obj.iter().filter(|(_, v)| !v.is_empty()).collect();
            if pairs.is_empty() {
                return vec!["{}".to_string()];
            }
            let mut lines = Vec::new();
            for (k, v) in pairs {
                let key = yaml_string(k);
                if is_block(v) {
                    lines.push(format!("{}:", key));
                    let child = yaml_lines(v);
                    lines.extend(child.into_iter().map(|l| format!("{}{}", YAML_INDENT, l)));
                } else {
                    lines.push(format!("{}: {}", key, yaml_scalar(v)));
                }
            }
            lines
        }
        scalar => vec![yaml_scalar(scalar)],
    }
}

/// Non-empty composites render as indented blocks; everything else inline.
fn is_block(value: &Value) -> bool {
    match value {
        Value::Array(arr) => arr.iter().any(|v| !v.is_empty()),
        Value::Object(obj) => obj.iter().any(|(_, v)| !v.is_empty()),
        _ => false,
    }
}

fn yaml_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => yaml_string(s),
        Value::Path(p) => p.to_string(),
        Value::Array(_) | Value::Object(_) => yaml_lines(value).join("\n"),
        other => json_scalar(other).unwrap_or_default(),
    }
}

/// Plain strings lose their quotes; strings that would read back as another
/// type (nested JSON, numbers, literals) or that YAML would mangle keep them.
fn yaml_string(s: &str) -> String {
    if needs_yaml_quotes(s) {
        quoted(s)
    } else {
        s.to_string()
    }
}

fn needs_yaml_quotes(s: &str) -> bool {
    let trimmed = s.trim();
    s.is_empty()
        || trimmed.len() != s.len()
        || s.starts_with('[')
        || s.starts_with('{')
        || s.starts_with('"')
        || s.starts_with('-')
        || s.parse::<f64>().is_ok()
        || matches!(s, "true" | "false" | "null" | "~")
        || s.contains(": ")
        || s.contains(" #")
        || s.contains(['\n', '\r', '\t'])
}
