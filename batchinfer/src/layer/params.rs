//! Typed lookups over a node's parameter and attribute maps.
use crate::graph::desc::Parameter;
use crate::graph::OperatorNode;

pub(crate) fn int(node: &OperatorNode, key: &str) -> Option<i64> {
    match node.param(key)? {
        Parameter::Int(value) => Some(*value),
        Parameter::IntArray(values) if values.len() == 1 => Some(values[0]),
        _ => None,
    }
}

pub(crate) fn usize_param(node: &OperatorNode, key: &str) -> Option<usize> {
    int(node, key).and_then(|value| usize::try_from(value).ok())
}

pub(crate) fn bool_param(node: &OperatorNode, key: &str) -> Option<bool> {
    node.param(key)?.as_bool()
}

pub(crate) fn str_param<'a>(node: &'a OperatorNode, key: &str) -> Option<&'a str> {
    node.param(key)?.as_str()
}

/// `(h, w)` pair; a scalar or one-element array applies to both axes.
pub(crate) fn pair(node: &OperatorNode, key: &str) -> Option<[usize; 2]> {
    let values = match node.param(key)? {
        Parameter::Int(value) => vec![*value, *value],
        Parameter::IntArray(values) => match values.len() {
            1 => vec![values[0], values[0]],
            2 => values.clone(),
            _ => return None,
        },
        _ => return None,
    };
    let h = usize::try_from(values[0]).ok()?;
    let w = usize::try_from(values[1]).ok()?;
    Some([h, w])
}

/// Float `(h, w)` pair, accepting integer spellings.
pub(crate) fn float_pair(node: &OperatorNode, key: &str) -> Option<[f32; 2]> {
    let values = match node.param(key)? {
        Parameter::Float(value) => vec![*value, *value],
        Parameter::Int(value) => vec![*value as f32, *value as f32],
        other => other.as_float_array()?,
    };
    match values.len() {
        1 => Some([values[0], values[0]]),
        2 => Some([values[0], values[1]]),
        _ => None,
    }
}

/// Decoded `f32` attribute values and shape.
pub(crate) fn attr_f32(node: &OperatorNode, key: &str) -> Option<(Vec<usize>, Vec<f32>)> {
    let attr = node.attr(key)?;
    let values = attr.get_f32().ok()?;
    if values.len() != attr.numel() {
        return None;
    }
    Some((attr.shape.clone(), values))
}
