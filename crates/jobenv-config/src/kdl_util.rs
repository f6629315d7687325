//! Helpers for extracting values from KDL nodes.

use kdl::KdlNode;

use crate::{ConfigError, ConfigResult};

pub(crate) fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Every positional argument of `node`, which must all be strings, at least one.
pub(crate) fn required_string_args(node: &KdlNode, field: &str) -> ConfigResult<Vec<String>> {
    let values = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| {
            e.value()
                .as_string()
                .map(|s| s.to_string())
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("{} is not a string", e.value()),
                })
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    if values.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected at least one value".to_string(),
        });
    }
    Ok(values)
}

pub(crate) fn first_string_arg(node: &KdlNode) -> Option<String> {
    string_args(node).into_iter().next()
}

pub(crate) fn first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

pub(crate) fn string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn bool_prop(node: &KdlNode, name: &str) -> bool {
    node.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub(crate) fn integer_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}

/// Read a non-negative integer that must fit the target type.
pub(crate) fn unsigned<T: TryFrom<i128>>(value: i128, field: &str) -> ConfigResult<T> {
    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{value} is out of range"),
    })
}

/// The children of `node`, or nothing.
pub(crate) fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes().iter())
}
