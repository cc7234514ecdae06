use serde::Serialize;
use serde_json::Value;

/// Render a serializable response either as pretty JSON or as plain lines.
pub fn render<T: Serialize>(value: &T, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(value)?);
    }
    Ok(match serde_json::to_value(value)? {
        Value::Array(items) if items.is_empty() => "(none)".to_string(),
        Value::Array(items) => items.iter().map(summary_line).collect::<Vec<_>>().join("\n"),
        Value::Object(map) => map
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| format!("{key}: {}", cell(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        scalar => cell(&scalar),
    })
}

/// Print a serializable response in the requested format.
pub fn output<T: Serialize>(value: &T, json: bool) -> anyhow::Result<()> {
    println!("{}", render(value, json)?);
    Ok(())
}

/// One line per record: scalar fields only, nulls skipped.
fn summary_line(item: &Value) -> String {
    match item {
        Value::Object(map) => map
            .iter()
            .filter(|(_, value)| !value.is_null() && !value.is_array() && !value.is_object())
            .map(|(key, value)| format!("{key}={}", cell(value)))
            .collect::<Vec<_>>()
            .join(" "),
        other => cell(other),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "-".to_string(),
        Value::Array(items) => format!("[{} items]", items.len()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::render;

    #[test]
    fn objects_render_as_key_value_lines() {
        let text = render(&json!({ "id": 3, "status": "allocated", "driver_id": null }), false).unwrap();
        assert_eq!(text, "id: 3\nstatus: allocated");
    }

    #[test]
    fn arrays_render_one_line_per_record() {
        let text = render(
            &json!([{ "id": 1, "photos": ["a"] }, { "id": 2, "photos": [] }]),
            false,
        )
        .unwrap();
        assert_eq!(text, "id=1\nid=2");
        assert_eq!(render(&json!([]), false).unwrap(), "(none)");
    }

    #[test]
    fn json_mode_is_pretty_json() {
        let text = render(&json!({ "id": 1 }), true).unwrap();
        assert_eq!(text, "{\n  \"id\": 1\n}");
    }
}
