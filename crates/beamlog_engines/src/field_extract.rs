#![forbid(unsafe_code)]

use std::collections::VecDeque;

use beamlog_kernel_contracts::signal::{SignalKind, SignalReadings};
use serde_json::Value;

/// Breadth-first search for the first key matching `kind` whose value coerces to a finite
/// number.
///
/// Object entries are visited in document order (`serde_json` is built with
/// `preserve_order`), so when several keys match, whichever the source lists first at the
/// shallowest depth wins. Arrays are not matched themselves; their object and array
/// children are queued for traversal like any other composite value.
pub fn extract(document: &Value, kind: SignalKind) -> Option<f64> {
    let mut queue: VecDeque<&Value> = VecDeque::from([document]);
    while let Some(node) = queue.pop_front() {
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    if key_matches(kind, key) {
                        if let Some(number) = resolve_match(value) {
                            return Some(number);
                        }
                    }
                    if is_composite(value) {
                        queue.push_back(value);
                    }
                }
            }
            Value::Array(items) => {
                queue.extend(items.iter().filter(|item| is_composite(item)));
            }
            _ => {}
        }
    }
    None
}

/// Runs [`extract`] for every signal kind against the same document.
pub fn extract_all(document: &Value) -> SignalReadings {
    let mut readings = SignalReadings::default();
    for kind in SignalKind::ALL {
        readings.set(kind, extract(document, kind));
    }
    readings
}

/// Case-insensitive key pattern for one signal. Separators are ignored, so
/// `beam-1 intensity`, `beam_1_intensity` and `beam1Intensity` are equivalent.
pub fn key_matches(kind: SignalKind, key: &str) -> bool {
    let norm: String = key
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match kind {
        SignalKind::Energy => norm.contains("energy"),
        SignalKind::BeamIntensity1 => has_beam_tag(&norm, '1') && is_intensity_like(&norm),
        SignalKind::BeamIntensity2 => has_beam_tag(&norm, '2') && is_intensity_like(&norm),
        SignalKind::Luminosity => norm.contains("lumi"),
    }
}

fn has_beam_tag(norm: &str, beam: char) -> bool {
    norm.contains(&format!("beam{beam}")) || norm.contains(&format!("b{beam}"))
}

fn is_intensity_like(norm: &str) -> bool {
    norm.contains("intens") || norm.contains("current")
}

fn is_composite(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn resolve_match(value: &Value) -> Option<f64> {
    if value.is_number() {
        return to_number(value);
    }
    value
        .get("value")
        .and_then(to_number)
        .or_else(|| to_number(value))
}

/// Lenient numeric coercion. Numbers pass through when finite. Every other value is
/// stringified, its decimal comma turned into a period, and its leading float literal
/// parsed (`"6800 GeV"` reads as 6800, `[2.5]` as 2.5). Booleans and objects stringify to
/// text that never parses.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        other => parse_float_prefix(&coercion_text(other).replace(',', ".")),
    }
}

/// Text form used for coercion. Array elements are joined with commas and nested arrays
/// flatten; null elements become empty.
fn coercion_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(coercion_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object]".to_string(),
    }
}

fn parse_float_prefix(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}
