//! Render tree produced by executing form markup.
//!
//! Components are expanded eagerly while markup is evaluated, so a finished
//! tree only contains intrinsic elements, text, fragments, placeholders and
//! error-display units.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::{ObjectMap, Value, MAX_NESTING};

#[derive(Debug, Clone)]
pub enum RenderNode {
    Element {
        tag: String,
        props: ObjectMap,
        children: Vec<RenderNode>,
    },
    Text(String),
    Fragment(Vec<RenderNode>),
    /// Inert stand-in for an unresolved name; children pass through unchanged.
    Placeholder {
        name: String,
        children: Vec<RenderNode>,
    },
    /// Inert error-display unit produced at the executor boundary.
    Error { message: String },
}

impl RenderNode {
    pub fn element(tag: &str, props: ObjectMap, children: Vec<RenderNode>) -> Self {
        RenderNode::Element {
            tag: tag.to_string(),
            props,
            children,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RenderNode::Error {
            message: message.into(),
        }
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Element { children, .. }
            | RenderNode::Fragment(children)
            | RenderNode::Placeholder { children, .. } => children,
            RenderNode::Text(_) | RenderNode::Error { .. } => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RenderNode::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RenderNode::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            RenderNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        match self {
            RenderNode::Element { props, .. } => props.get(name),
            _ => None,
        }
    }

    /// Concatenated text of the subtree, ignoring markup.
    pub fn text_content(&self) -> String {
        match self {
            RenderNode::Text(text) => text.clone(),
            RenderNode::Error { message } => message.clone(),
            _ => self.children().iter().map(RenderNode::text_content).collect(),
        }
    }

    /// Names of every placeholder in the subtree, in document order.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_placeholders(&mut names);
        names
    }

    fn collect_placeholders(&self, names: &mut Vec<String>) {
        if let RenderNode::Placeholder { name, .. } = self {
            names.push(name.clone());
        }
        for child in self.children() {
            child.collect_placeholders(names);
        }
    }

    /// First element with the given tag, depth first.
    pub fn find_element(&self, wanted: &str) -> Option<&RenderNode> {
        if self.tag() == Some(wanted) {
            return Some(self);
        }
        self.children()
            .iter()
            .find_map(|child| child.find_element(wanted))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RenderNode::Element {
                tag,
                props,
                children,
            } => serde_json::json!({
                "type": "element",
                "tag": tag,
                "props": props
                    .iter()
                    .map(|(k, v)| (k.clone(), prop_json(v)))
                    .collect::<serde_json::Map<_, _>>(),
                "children": children.iter().map(RenderNode::to_json).collect::<Vec<_>>(),
            }),
            RenderNode::Text(text) => serde_json::json!({ "type": "text", "value": text }),
            RenderNode::Fragment(children) => serde_json::json!({
                "type": "fragment",
                "children": children.iter().map(RenderNode::to_json).collect::<Vec<_>>(),
            }),
            RenderNode::Placeholder { name, children } => serde_json::json!({
                "type": "placeholder",
                "name": name,
                "children": children.iter().map(RenderNode::to_json).collect::<Vec<_>>(),
            }),
            RenderNode::Error { message } => {
                serde_json::json!({ "type": "error", "message": message })
            }
        }
    }
}

// Event handlers have no JSON form, but hosts still want to know they exist.
fn prop_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Function(_) | Value::Native(_) => serde_json::Value::String("[function]".into()),
        Value::Placeholder(name) => serde_json::Value::String(format!("[placeholder {}]", name)),
        other => other.to_json(),
    }
}

/// Flatten child values into render nodes. Nullish values and booleans
/// render nothing; nested arrays flatten.
pub fn collect_children(values: &[Value]) -> Result<Vec<RenderNode>, RuntimeError> {
    let mut out = Vec::new();
    let mut open_arrays = Vec::new();
    for value in values {
        append_child(value, &mut open_arrays, &mut out)?;
    }
    Ok(out)
}

fn append_child(
    value: &Value,
    open_arrays: &mut Vec<*const ()>,
    out: &mut Vec<RenderNode>,
) -> Result<(), RuntimeError> {
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) => {}
        Value::Number(_) | Value::String(_) => out.push(RenderNode::Text(value.to_display_string())),
        Value::Array(items) => {
            let id = Rc::as_ptr(items) as *const ();
            if open_arrays.contains(&id) {
                return Err(RuntimeError::type_error("An array cannot contain itself as a child"));
            }
            if open_arrays.len() >= MAX_NESTING {
                return Err(RuntimeError::range_error(format!(
                    "Children nested deeper than {} arrays",
                    MAX_NESTING
                )));
            }
            open_arrays.push(id);
            for item in items.borrow().iter() {
                append_child(item, open_arrays, out)?;
            }
            open_arrays.pop();
        }
        Value::Node(node) => out.push((**node).clone()),
        Value::Placeholder(name) => out.push(RenderNode::Placeholder {
            name: name.to_string(),
            children: Vec::new(),
        }),
        Value::Object(_) => {
            return Err(RuntimeError::type_error(
                "Objects are not valid as a child; render a field of the object instead",
            ))
        }
        Value::Function(_) | Value::Native(_) => {
            return Err(RuntimeError::type_error(
                "Functions are not valid as a child; call it or render it as a tag",
            ))
        }
    }
    Ok(())
}

/// Convert the value returned by a render function into the unit handed to
/// the host. `None` means the form rendered nothing.
pub fn to_render_node(value: &Value) -> Result<Option<RenderNode>, RuntimeError> {
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) => Ok(None),
        Value::Node(node) => Ok(Some((**node).clone())),
        _ => {
            let mut children = collect_children(std::slice::from_ref(value))?;
            match children.len() {
                0 => Ok(None),
                1 if !matches!(value, Value::Array(_)) => Ok(children.pop()),
                _ => Ok(Some(RenderNode::Fragment(children))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_children_flattens_and_skips() {
        let values = vec![
            Value::string("a"),
            Value::Null,
            Value::Bool(false),
            Value::array(vec![Value::Number(1.0), Value::array(vec![Value::string("b")])]),
        ];
        let nodes = collect_children(&values).unwrap();
        let texts: Vec<String> = nodes.iter().map(RenderNode::text_content).collect();
        assert_eq!(texts, vec!["a", "1", "b"]);
    }

    #[test]
    fn test_self_containing_array_is_not_a_child() {
        let items = Value::array(vec![Value::string("a")]);
        items.set_property("1", items.clone()).unwrap();
        let err = collect_children(&[items]).unwrap_err();
        assert!(matches!(err, RuntimeError::Type(_)));

        let shared = Value::array(vec![Value::string("b")]);
        let nodes = collect_children(&[shared.clone(), shared]).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_objects_are_not_children() {
        let values = vec![Value::object(ObjectMap::new())];
        assert!(collect_children(&values).is_err());
    }

    #[test]
    fn test_placeholder_collection() {
        let node = RenderNode::element(
            "div",
            ObjectMap::new(),
            vec![RenderNode::Placeholder {
                name: "Allergies".into(),
                children: vec![RenderNode::Placeholder {
                    name: "Inner".into(),
                    children: vec![],
                }],
            }],
        );
        assert_eq!(node.placeholders(), vec!["Allergies", "Inner"]);
    }

    #[test]
    fn test_render_node_json_shape() {
        let node = RenderNode::element("span", ObjectMap::new(), vec![RenderNode::Text("hi".into())]);
        let json = node.to_json();
        assert_eq!(json["tag"], "span");
        assert_eq!(json["children"][0]["value"], "hi");
    }
}
