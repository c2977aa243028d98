//! Overall score derivation from a scorer result
//!
//! Results carrying an `Evaluacion` breakdown are scored from their
//! dimensions: each dimension averages its numeric fields, and the overall
//! score averages the dimensions present. Otherwise the flat `score` field
//! is used.

use serde_json::Value;

/// Breakdown object inside a scorer result
pub const BREAKDOWN_KEY: &str = "Evaluacion";

/// Dimensions contributing to the overall score
pub const DIMENSIONS: [&str; 4] = ["Claridad", "Estructura", "Alineacion_Emocional", "Influencia"];

/// Dimension fields that are not sub-scores
const NON_SCORE_FIELDS: [&str; 2] = ["Puntuacion_Total", "Comentarios"];

/// Score to store for a completed result
///
/// A positive breakdown score takes precedence over `result.score`.
pub fn derive_score(result: &Value) -> i64 {
    let flat = result.get("score").and_then(numeric).map(round).unwrap_or(0);

    match result.get(BREAKDOWN_KEY) {
        Some(breakdown) if is_present(breakdown) => {
            let overall = overall_score(breakdown);
            if overall > 0 {
                overall
            } else {
                flat
            }
        }
        _ => flat,
    }
}

/// Rounded mean of the present dimension averages (0 if none)
pub fn overall_score(breakdown: &Value) -> i64 {
    let averages: Vec<f64> = DIMENSIONS
        .iter()
        .filter_map(|name| breakdown.get(*name))
        .filter(|dimension| is_present(dimension))
        .map(|dimension| dimension_average(dimension) as f64)
        .collect();

    mean(&averages).map(round).unwrap_or(0)
}

/// Rounded mean of a dimension's numeric fields (0 if none)
pub fn dimension_average(dimension: &Value) -> i64 {
    let Some(fields) = dimension.as_object() else {
        return 0;
    };

    let scores: Vec<f64> = fields
        .iter()
        .filter(|(key, _)| !NON_SCORE_FIELDS.contains(&key.as_str()))
        .filter_map(|(_, value)| numeric(value))
        .collect();

    mean(&scores).map(round).unwrap_or(0)
}

pub fn is_passing(score: i64, threshold: i64) -> bool {
    score >= threshold
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Half-up rounding
fn round(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Numbers as-is; strings by their leading integer ("8/10" → 8)
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => leading_integer(s).map(|n| n as f64),
        _ => None,
    }
}

fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Null, false, zero and empty strings count as absent
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
