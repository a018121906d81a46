use crate::environment::{Environment, EnvironmentBuilder};
use crate::executor::{RenderFunction, RenderOptions};
use crate::hooks::MemoryStateStore;
use crate::interpreter::Interpreter;
use crate::registry::{ComponentGroup, LoaderOptions, Registry, RegistryLoader};
use crate::render::RenderNode;
use crate::value::{ObjectMap, Value};
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn env() -> Environment {
    EnvironmentBuilder::standard().build_scope()
}

fn load(groups: &[ComponentGroup]) -> Registry {
    RegistryLoader::new(env(), LoaderOptions::default()).load(groups)
}

fn load_with_passes(groups: &[ComponentGroup], passes: usize) -> Registry {
    let options = LoaderOptions {
        passes,
        ..LoaderOptions::default()
    };
    RegistryLoader::new(env(), options).load(groups)
}

fn render(registry: &Registry, name: &str) -> RenderNode {
    registry
        .render_export(name, ObjectMap::new(), &RenderOptions::default())
        .expect("export rendered nothing")
}

fn export_names(registry: &Registry, group: &str) -> Vec<String> {
    registry
        .group_exports(group)
        .map(|exports| exports.keys().cloned().collect())
        .unwrap_or_default()
}

fn fields_and_form() -> (ComponentGroup, ComponentGroup) {
    (
        ComponentGroup::new("Fields", "const Field = ({ label }) => <Label>{label}</Label>;"),
        ComponentGroup::new(
            "Form",
            "const Form = () => <Stack><Field label=\"Dose\" /><Field label=\"Route\" /></Stack>;",
        ),
    )
}

#[test]
fn test_forward_reference_alone_yields_placeholder() {
    let registry = load(&[ComponentGroup::new("X", "const Y = () => Z();")]);
    assert_eq!(export_names(&registry, "X"), vec!["Y"]);

    let y = registry.get("Y").unwrap();
    assert!(y.is_callable());
    let result = Interpreter::default()
        .call_function(y, &Value::Undefined, &[])
        .unwrap();
    assert_eq!(result.placeholder_name(), Some("Z"));
}

#[test]
fn test_two_passes_converge_in_either_order() {
    let (fields, form) = fields_and_form();
    for groups in [
        vec![fields.clone(), form.clone()],
        vec![form.clone(), fields.clone()],
    ] {
        let registry = load(&groups);
        let node = render(&registry, "Form");
        assert_eq!(node.placeholders(), Vec::<String>::new());
        assert_eq!(node.text_content(), "DoseRoute");
    }
}

#[test]
fn test_first_pass_runs_without_injection() {
    let (fields, form) = fields_and_form();
    let registry = load(&[form, fields]);

    let first = registry.first_pass_exports("Form").unwrap()["Form"].clone();
    let node = RenderFunction::new(first, Rc::new(MemoryStateStore::new()), RenderOptions::default())
        .render(ObjectMap::new())
        .unwrap()
        .unwrap();
    assert_eq!(node.placeholders(), vec!["Field", "Field"]);
}

fn chain() -> Vec<ComponentGroup> {
    vec![
        ComponentGroup::new("A", "const A1 = () => <B1 />;"),
        ComponentGroup::new("B", "const B1 = () => <C1 />;"),
        ComponentGroup::new("C", "const C1 = () => <p>deep</p>;"),
    ]
}

#[test]
fn test_three_hop_chain_stays_partial_without_failing() {
    let registry = load(&chain());
    assert!(registry.failures().is_empty());
    for (group, export) in [("A", "A1"), ("B", "B1"), ("C", "C1")] {
        assert_eq!(export_names(&registry, group), vec![export]);
    }

    let node = render(&registry, "A1");
    assert!(!node.is_error());
    assert_eq!(node.placeholders(), vec!["C1"]);
    assert_eq!(render(&registry, "B1").text_content(), "deep");
}

#[test]
fn test_extra_pass_resolves_longer_chain() {
    let registry = load_with_passes(&chain(), 3);
    let node = render(&registry, "A1");
    assert_eq!(node.placeholders(), Vec::<String>::new());
    assert_eq!(node.text_content(), "deep");
}

#[test]
fn test_chain_listed_dependency_first_resolves_in_two_passes() {
    let mut groups = chain();
    groups.reverse();
    let registry = load(&groups);
    assert_eq!(render(&registry, "A1").text_content(), "deep");
}

#[test]
fn test_pass_count_is_clamped() {
    let (fields, form) = fields_and_form();
    let registry = load_with_passes(&[form, fields], 0);
    assert_eq!(render(&registry, "Form").text_content(), "DoseRoute");

    let registry = load_with_passes(&chain(), 50);
    assert_eq!(render(&registry, "A1").text_content(), "deep");
}

#[test]
fn test_loading_twice_is_idempotent() {
    let (fields, form) = fields_and_form();
    let groups = vec![form, fields];
    let first = load(&groups);
    let second = load(&groups);

    assert_eq!(first.names(), second.names());
    assert_eq!(first.to_json(), second.to_json());
    assert_eq!(
        render(&first, "Form").to_json(),
        render(&second, "Form").to_json()
    );
}

#[test]
fn test_failing_groups_are_isolated() {
    let registry = load(&[
        ComponentGroup::new("Good", "const Good = () => <p>ok</p>;"),
        ComponentGroup::new("Broken", "const = ;"),
        ComponentGroup::new("Throws", "throw new Error('nope');"),
    ]);

    assert_eq!(render(&registry, "Good").text_content(), "ok");
    assert_eq!(export_names(&registry, "Broken"), Vec::<String>::new());
    let failed: Vec<&String> = registry.failures().keys().collect();
    assert_eq!(failed, vec!["Broken", "Throws"]);
    assert!(registry.failures()["Throws"].contains("nope"));
}

#[test]
fn test_local_declaration_wins_over_pooled_export() {
    let registry = load(&[
        ComponentGroup::new("Base", "const Title = () => <h1>base</h1>;"),
        ComponentGroup::new(
            "Page",
            "const Title = () => <h2>local</h2>;\nconst Page = () => <Title />;",
        ),
    ]);
    assert_eq!(render(&registry, "Page").tag(), Some("h2"));
    assert_eq!(export_names(&registry, "Page"), vec!["Page", "Title"]);
}

#[test]
fn test_catalogue_and_group_name_exports() {
    let registry = load(&[
        ComponentGroup::new("Intake", "function Intake() { return <p>intake</p>; }"),
        ComponentGroup::new("Anon", "export default () => <p>anon</p>;"),
        ComponentGroup::new("Layouts", "const Layout = ({ children }) => <main>{children}</main>;"),
    ]);
    assert_eq!(render(&registry, "Intake").text_content(), "intake");
    assert_eq!(export_names(&registry, "Anon"), vec!["default"]);
    assert_eq!(export_names(&registry, "Layouts"), vec!["Layout"]);
}

#[test]
fn test_placeholder_exports_are_dropped() {
    let registry = load(&[ComponentGroup::new("P", "const Form = Missing;\nconst real = 1;")]);
    assert_eq!(export_names(&registry, "P"), vec!["real"]);
    assert!(!registry.contains("Form"));
}

#[test]
fn test_missing_export_renders_error() {
    let registry = load(&[]);
    assert!(registry.is_empty());
    assert!(render(&registry, "Nope").is_error());
}

#[test]
fn test_summary_json() {
    let (fields, form) = fields_and_form();
    let registry = load(&[fields, form]);
    assert_eq!(
        registry.to_json(),
        serde_json::json!({
            "exports": ["Field", "Form"],
            "groups": { "Fields": ["Field"], "Form": ["Form"] },
            "failures": {},
        })
    );
}

#[test]
fn test_options_from_json() {
    let options: LoaderOptions =
        serde_json::from_str(r#"{"passes": 3, "render": {"maxSteps": 5000}}"#).unwrap();
    assert_eq!(options.passes, 3);
    assert_eq!(options.render.max_steps, 5000);
    assert_eq!(options.render.cache_capacity, 64);
}
