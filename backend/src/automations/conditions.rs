// Condition evaluation
//
// Pure predicate logic over resolved field values. Evaluation never fails:
// unresolvable fields behave as null and unknown operators evaluate to false.

use cadence_shared::{Condition, ConditionLogic, ConditionOperator};
use serde_json::Value as JsonValue;

use super::fields;

/// Evaluate a single condition against a snapshot root.
pub fn evaluate(condition: &Condition, root: &JsonValue) -> bool {
    let resolved = fields::resolve(&condition.field, root);

    match condition.operator {
        ConditionOperator::Equals => loose_eq(resolved, &condition.value),
        ConditionOperator::NotEquals => !loose_eq(resolved, &condition.value),
        ConditionOperator::Contains => contains(resolved, &condition.value),
        ConditionOperator::NotContains => !contains(resolved, &condition.value),
        ConditionOperator::IsEmpty => is_empty(resolved),
        ConditionOperator::IsNotEmpty => !is_empty(resolved),
        ConditionOperator::GreaterThan => compare(resolved, &condition.value, |a, b| a > b),
        ConditionOperator::LessThan => compare(resolved, &condition.value, |a, b| a < b),
        ConditionOperator::HasTag => has_tag(resolved, &condition.value),
        ConditionOperator::NotHasTag => !has_tag(resolved, &condition.value),
        ConditionOperator::Unknown => false,
    }
}

/// Combine a condition list left to right. The default accumulation is AND;
/// a condition carrying explicit OR logic switches the accumulation for that
/// step. An empty list holds trivially.
pub fn evaluate_all(conditions: &[Condition], root: &JsonValue) -> bool {
    let mut iter = conditions.iter();
    let Some(first) = iter.next() else {
        return true;
    };

    let mut result = evaluate(first, root);
    for condition in iter {
        let step = evaluate(condition, root);
        result = match condition.logic {
            ConditionLogic::And => result && step,
            ConditionLogic::Or => result || step,
        };
    }
    result
}

/// Loose equality: exact JSON equality, then numeric comparison after
/// coercion, then string-form comparison. `null` only equals `null`.
fn loose_eq(resolved: Option<&JsonValue>, expected: &JsonValue) -> bool {
    let resolved = resolved.unwrap_or(&JsonValue::Null);

    if resolved == expected {
        return true;
    }
    if resolved.is_null() || expected.is_null() {
        return false;
    }
    if let (Some(a), Some(b)) = (as_number(resolved), as_number(expected)) {
        return a == b;
    }
    match (scalar_text(resolved), scalar_text(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn contains(resolved: Option<&JsonValue>, target: &JsonValue) -> bool {
    let Some(resolved) = resolved.filter(|v| !v.is_null()) else {
        return false;
    };
    let Some(target) = scalar_text(target) else {
        return false;
    };
    let haystack = match scalar_text(resolved) {
        Some(s) => s,
        None => resolved.to_string(),
    };
    haystack.to_lowercase().contains(&target.to_lowercase())
}

fn is_empty(resolved: Option<&JsonValue>) -> bool {
    match resolved {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn compare(resolved: Option<&JsonValue>, expected: &JsonValue, cmp: fn(f64, f64) -> bool) -> bool {
    match (resolved.and_then(as_number), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn has_tag(resolved: Option<&JsonValue>, tag: &JsonValue) -> bool {
    match resolved {
        Some(JsonValue::Array(items)) => items.iter().any(|item| loose_eq(Some(item), tag)),
        _ => false,
    }
}

/// Numeric coercion: JSON numbers and numeric strings compare as numbers;
/// everything else is non-numeric.
fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
