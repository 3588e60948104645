// Field resolution against entity snapshots

use serde_json::Value as JsonValue;

/// Resolve a dotted field path against a snapshot root.
///
/// Walks one segment at a time; returns `None` if any intermediate value is
/// not an object or a key is absent. Custom attributes need no special
/// casing: `customFields.priority` is ordinary path walking once the snapshot
/// carries the `customFields` key.
pub fn resolve<'a>(path: &str, root: &'a JsonValue) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in path.split('.') {
        match current {
            JsonValue::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Render a `{{path}}` template against a snapshot, supporting a
/// `{{path || 'fallback'}}` form for missing values. A placeholder that
/// resolves to nothing and carries no fallback renders as the empty string.
pub fn render_template(template: &str, root: &JsonValue) -> String {
    let re = regex::Regex::new(r"\{\{([^}]+)\}\}").unwrap();
    let mut result = template.to_string();

    for cap in re.captures_iter(template) {
        let expr = &cap[1];
        let (path, fallback) = split_fallback(expr);
        let replacement = resolve(path, root)
            .and_then(display_value)
            .or_else(|| fallback.map(str::to_string))
            .unwrap_or_default();
        result = result.replace(&cap[0], &replacement);
    }

    result
}

fn split_fallback(expr: &str) -> (&str, Option<&str>) {
    match expr.split_once("||") {
        Some((path, fallback)) => {
            let fallback = fallback.trim();
            let fallback = fallback
                .strip_prefix('\'')
                .and_then(|f| f.strip_suffix('\''))
                .or_else(|| fallback.strip_prefix('"').and_then(|f| f.strip_suffix('"')))
                .unwrap_or(fallback);
            (path.trim(), Some(fallback))
        }
        None => (expr.trim(), None),
    }
}

fn display_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
