use colored::Colorize;
use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate.
///
/// Scalar result fields share one Field/Value table; each nested object and
/// each array of rows gets its own titled table.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => print_result(result, map),
            _ => print_fields(map),
        },
        Value::Array(arr) => print_rows(arr),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Map<String, Value>, envelope: &Map<String, Value>) {
    print_fields(result);

    for (key, val) in result {
        match val {
            Value::Object(section) => {
                print_title(key);
                print_fields(section);
            }
            Value::Array(rows) if rows.iter().all(Value::is_object) => {
                print_title(key);
                print_rows(rows);
            }
            _ => {}
        }
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\n{}", "Warnings:".yellow().bold());
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_title(key: &str) {
    println!("\n{}", key.replace('_', " ").to_uppercase().bold());
}

/// Field/Value table of the scalar (and scalar-array) entries of `map`.
fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut any = false;
    for (key, val) in map {
        let nested = match val {
            Value::Object(_) => true,
            Value::Array(rows) => !rows.is_empty() && rows.iter().all(Value::is_object),
            _ => false,
        };
        if !nested {
            builder.push_record([key.as_str(), &format_value(val)]);
            any = true;
        }
    }
    if any {
        println!("{}", Table::from(builder));
    }
}

fn print_rows(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => round_decimal_string(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Decimals serialise as full-precision strings; trim them for display.
fn round_decimal_string(s: &str) -> String {
    match s.parse::<rust_decimal::Decimal>() {
        Ok(d) => d.round_dp(4).normalize().to_string(),
        Err(_) => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_strings_are_rounded() {
        assert_eq!(round_decimal_string("0.2123456789"), "0.2123");
        assert_eq!(round_decimal_string("11250000.00"), "11250000");
        assert_eq!(round_decimal_string("Agency"), "Agency");
    }
}
