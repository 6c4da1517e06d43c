use serde_json::Value;

/// Key answers, in order of priority. Searched at any depth of the result.
const PRIORITY_KEYS: [&str; 4] = [
    "levered_irr",
    "base_irr",
    "amortizing_monthly_payment",
    "purchase_price",
];

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields in priority order, falling back to the
/// first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    println!("{}", minimal_answer(result_obj));
}

fn minimal_answer(result: &Value) -> String {
    for key in PRIORITY_KEYS {
        if let Some(val) = find_key(result, key) {
            if !val.is_null() {
                return format_minimal(val);
            }
        }
    }

    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }

    format_minimal(result)
}

/// Depth-first search through nested objects (arrays are not entered).
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let map = value.as_object()?;
    if let Some(found) = map.get(key) {
        return Some(found);
    }
    map.values().find_map(|v| find_key(v, key))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_priority_key() {
        let result = json!({
            "acquisition": {"loan_amount": "11250000"},
            "returns": {"equity_multiple": "2.4", "levered_irr": "0.2105"}
        });
        assert_eq!(minimal_answer(&result), "0.2105");
    }

    #[test]
    fn test_fallback_to_first_field() {
        let result = json!({"alpha": 1});
        assert_eq!(minimal_answer(&result), "alpha: 1");
    }
}
