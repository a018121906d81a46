use crate::environment::{primitive, standard_primitives, Environment, EnvironmentBuilder};
use crate::hooks::STATEFUL_BINDING_NAMES;
use crate::interpreter::Interpreter;
use crate::value::{ObjectMap, Value};
use pretty_assertions::assert_eq;

fn entry(name: &str, value: &str) -> (String, Value) {
    (name.to_string(), Value::string(value))
}

fn text_of(env: &Environment, name: &str) -> Option<String> {
    env.get(name).and_then(|v| v.as_str().map(String::from))
}

#[test]
fn test_later_layers_win() {
    let env = EnvironmentBuilder::new()
        .with_primitives([entry("Field", "primitive"), entry("Only", "primitive")])
        .with_stateful_bindings([entry("Field", "stateful")])
        .with_components([entry("Field", "component"), entry("Card", "component")])
        .with_globals([entry("Card", "global")])
        .build_scope();

    assert_eq!(text_of(&env, "Field"), Some("component".to_string()));
    assert_eq!(text_of(&env, "Card"), Some("global".to_string()));
    assert_eq!(text_of(&env, "Only"), Some("primitive".to_string()));
}

#[test]
fn test_namespace_overrides_stateful_binding() {
    let env = EnvironmentBuilder::new()
        .with_stateful_bindings([entry("forms", "stateful")])
        .with_namespace("forms", [entry("version", "2")])
        .build_scope();
    let forms = env.get("forms").unwrap();
    assert_eq!(forms.type_of(), "object");
    assert_eq!(forms.get_property("version").unwrap().as_str(), Some("2"));
}

#[test]
fn test_builtin_globals_cannot_be_replaced() {
    let env = EnvironmentBuilder::new()
        .with_globals([entry("Math", "shadowed"), entry("apiBase", "/api")])
        .build_scope();
    assert_eq!(env.get("Math").map(Value::type_of), Some("object"));
    assert_eq!(text_of(&env, "apiBase"), Some("/api".to_string()));
}

#[test]
fn test_insertion_order_follows_layers() {
    let env = EnvironmentBuilder::new()
        .with_primitives([entry("B", "1"), entry("A", "1")])
        .with_components([entry("C", "1")])
        .build_scope();
    let names: Vec<&str> = env.names().take(3).collect();
    assert_eq!(names, vec!["B", "A", "C"]);
}

#[test]
fn test_stateful_table_is_replaced() {
    let standard = EnvironmentBuilder::standard().build_scope();
    for name in STATEFUL_BINDING_NAMES {
        assert!(standard.contains(name), "missing {}", name);
    }

    let custom = EnvironmentBuilder::standard()
        .with_stateful_bindings([entry("useThing", "x")])
        .build_scope();
    assert!(custom.contains("useThing"));
    assert!(!custom.contains("useState"));
}

#[test]
fn test_namespace_tables_merge() {
    let env = EnvironmentBuilder::new()
        .with_namespace("ui", [entry("a", "first"), entry("b", "kept")])
        .with_namespace("ui", [entry("a", "second"), entry("c", "added")])
        .build_scope();
    let ui = env.get("ui").unwrap();
    assert_eq!(
        ui.to_json(),
        serde_json::json!({ "a": "second", "b": "kept", "c": "added" })
    );
}

#[test]
fn test_aliases_point_at_primitives() {
    let env = EnvironmentBuilder::new()
        .with_primitives(standard_primitives())
        .with_aliases([("Field", "Input"), ("Ghost", "NotAPrimitive")])
        .build_scope();
    assert!(env.get("Field").is_some_and(Value::is_callable));
    assert!(!env.contains("Ghost"));
}

#[test]
fn test_extend_leaves_original_untouched() {
    let base = Environment::from_iter([entry("a", "1")]);
    let extended = base.extend([entry("b", "2"), entry("a", "3")]);
    assert_eq!(base.len(), 1);
    assert_eq!(text_of(&extended, "a"), Some("3".to_string()));
    assert_eq!(extended.len(), 2);
    assert_eq!(base.lookup_or_placeholder("b").placeholder_name(), Some("b"));
}

#[test]
fn test_primitive_builds_element() {
    let mut props = ObjectMap::new();
    props.insert("id".to_string(), Value::string("dose"));
    props.insert(
        "children".to_string(),
        Value::array(vec![Value::string("5"), Value::string(" mg")]),
    );
    let value = Interpreter::default()
        .call_function(&primitive("Text", "span"), &Value::Undefined, &[Value::object(props)])
        .unwrap();
    let Value::Node(node) = value else {
        panic!("expected a render node");
    };
    assert_eq!(node.tag(), Some("span"));
    assert_eq!(node.prop("id").and_then(Value::as_str), Some("dose"));
    assert!(node.prop("children").is_none());
    assert_eq!(node.text_content(), "5 mg");
}
