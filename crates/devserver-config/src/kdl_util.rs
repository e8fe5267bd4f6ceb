// Helper functions for extracting values from KDL nodes

use kdl::{KdlNode, KdlValue};

use crate::{ConfigError, ConfigResult};

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

pub(crate) fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_integer_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}

/// Scalar value as text. Numbers and booleans are accepted where strings are
/// expected so that `port 5000` inside an env block works.
pub(crate) fn scalar_to_string(value: &KdlValue) -> Option<String> {
    if let Some(s) = value.as_string() {
        return Some(s.to_string());
    }
    if let Some(i) = value.as_integer() {
        return Some(i.to_string());
    }
    if let Some(f) = value.as_float() {
        return Some(f.to_string());
    }
    value.as_bool().map(|b| b.to_string())
}

/// Read `key "value"` children of a block node, in document order.
pub(crate) fn get_child_pairs(node: &KdlNode, block: &str) -> ConfigResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let Some(children) = node.children() else {
        return Ok(pairs);
    };

    for child in children.nodes() {
        let key = child.name().value().to_string();
        let value = child
            .entries()
            .iter()
            .find(|e| e.name().is_none())
            .and_then(|e| scalar_to_string(e.value()))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{}.{}", block, key),
                message: "expected a single scalar value".to_string(),
            })?;
        pairs.push((key, value));
    }

    Ok(pairs)
}

pub(crate) fn require_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}
