use crate::hooks::STATEFUL_BINDING_NAMES;
use crate::transform::*;
use pretty_assertions::assert_eq;

fn shape_of(text: &str) -> SourceShape {
    classify_source(text, STATEFUL_BINDING_NAMES).shape
}

#[test]
fn test_classification_is_deterministic() {
    let samples = [
        "<div>Hello</div>",
        "const a = 1\n<p>{a}</p>",
        "return <p/>;",
        "render = () => <p/>",
        "Plain words",
        "[1, 2].join('-')",
    ];
    for text in samples {
        let first = classify_source(text, STATEFUL_BINDING_NAMES);
        for _ in 0..3 {
            assert_eq!(classify_source(text, STATEFUL_BINDING_NAMES), first);
        }
    }
}

#[test]
fn test_markup_only() {
    let out = transform_source("<div>Hello</div>");
    assert_eq!(out.shape, SourceShape::Markup);
    assert_eq!(out.wrapper, WrapperKind::Immediate);
    assert_eq!(
        out.body,
        "const FormRender = (props) => (() => {\nreturn (\n<div>Hello</div>\n);\n})();"
    );
}

#[test]
fn test_sibling_roots_are_grouped() {
    let out = transform_source("<h1>A</h1>\n<p>B</p>;");
    assert_eq!(out.shape, SourceShape::Markup);
    assert!(out.body.contains("return (\n<>\n<h1>A</h1>\n<p>B</p>\n</>\n);"));
}

#[test]
fn test_count_root_elements() {
    assert_eq!(count_root_elements("<div><span/></div>"), 1);
    assert_eq!(count_root_elements("<div><span/></div>\n{extra}"), 2);
    assert_eq!(count_root_elements("<Field name=\"a\" />\n<Field name=\"b\" />"), 2);
    assert_eq!(count_root_elements("<p title={a > b ? 'x' : 'y'}>t</p>"), 1);
    assert_eq!(count_root_elements("<>\n<a/>\n<b/>\n</>"), 1);
}

#[test]
fn test_statements_then_markup_terminates_prologue() {
    let text = "const name = 'Ada'\nconst greeting = `Hi ${name}`\n<p>{greeting}</p>";
    let out = transform_source(text);
    assert_eq!(out.shape, SourceShape::StatementsThenMarkup);
    assert_eq!(
        out.body,
        "const FormRender = (props) => (() => {\n\
         const name = 'Ada';\n\
         const greeting = `Hi ${name}`;\n\
         return (\n<p>{greeting}</p>\n);\n\
         })();"
    );
}

#[test]
fn test_continued_lines_are_not_terminated() {
    assert_eq!(terminate_prologue("const total = 1\n  + 2"), "const total = 1\n  + 2;");
    assert_eq!(
        terminate_prologue("if (a) {\n  b()\n}\nelse {\n  c()\n}"),
        "if (a) {\n  b()\n}\nelse {\n  c()\n};"
    );
    assert_eq!(
        terminate_prologue("const list = [\n  1,\n  2\n]"),
        "const list = [\n  1,\n  2\n];"
    );
    assert_eq!(terminate_prologue("// note\nconst a = 1"), "// note\nconst a = 1;");
}

#[test]
fn test_template_literal_lines_are_untouched() {
    let prologue = "const text = `first\nsecond`\nconst b = 2";
    assert_eq!(
        terminate_prologue(prologue),
        "const text = `first\nsecond`\nconst b = 2;"
    );
}

#[test]
fn test_braceless_control_headers_keep_their_body() {
    assert_eq!(
        terminate_prologue("let label = 'normal'\nif (false)\n  label = 'CRITICAL'"),
        "let label = 'normal';\nif (false)\n  label = 'CRITICAL';"
    );
    assert_eq!(
        terminate_prologue("if (a)\n  x = 1\nelse\n  x = 2"),
        "if (a)\n  x = 1\nelse\n  x = 2;"
    );
    assert_eq!(
        terminate_prologue("for (let i = 0; i < 3; i++)\n  total += i"),
        "for (let i = 0; i < 3; i++)\n  total += i;"
    );
    assert_eq!(terminate_prologue("if (a) go()"), "if (a) go();");
}

#[test]
fn test_control_header_detection() {
    assert!(is_control_header("if (ready)"));
    assert!(is_control_header("} else if (count > 2) // more"));
    assert!(is_control_header("while (next(\")\"))"));
    assert!(is_control_header("  else"));
    assert!(is_control_header("do"));
    assert!(!is_control_header("if (a) go()"));
    assert!(!is_control_header("if (a) {"));
    assert!(!is_control_header("notify(user)"));
    assert!(!is_control_header("elsewhere()"));
}

#[test]
fn test_function_body() {
    assert_eq!(shape_of("const x = 2;\nreturn <b>{x}</b>;"), SourceShape::FunctionBody);
    assert_eq!(shape_of("// done\nreturn null"), SourceShape::FunctionBody);
}

#[test]
fn test_guard_return_keeps_markup() {
    let text = "if (props.hidden) return null;\n<p/>";
    assert_eq!(shape_of(text), SourceShape::StatementsThenMarkup);
    assert!(transform_source(text).body.contains("return null;\nreturn (\n<p/>\n);"));
}

#[test]
fn test_nested_return_is_not_top_level() {
    let text = "const f = () => { return 1; };\n<p>{f()}</p>";
    assert!(!has_top_level_return(text));
    assert_eq!(shape_of(text), SourceShape::StatementsThenMarkup);
}

#[test]
fn test_return_in_markup_text_is_ignored() {
    assert!(!has_top_level_return("<p>Don't return here</p>"));
    assert!(!has_top_level_return("const returnValue = 1;"));
    assert_eq!(shape_of("<p>Don't return here</p>"), SourceShape::Markup);
}

#[test]
fn test_expression_and_statements() {
    let out = transform_source("[1, 2].map((n) => n * 2).join('-')");
    assert_eq!(out.shape, SourceShape::Expression);
    assert!(out.body.contains("return (\n[1, 2].map((n) => n * 2).join('-')\n);"));

    assert_eq!(shape_of("const x = 1;"), SourceShape::Statements);
    assert_eq!(shape_of("let a = 1\nlet b = a"), SourceShape::Statements);
}

#[test]
fn test_literal_text() {
    let out = transform_source("  Just some words  ");
    assert_eq!(out.shape, SourceShape::LiteralText);
    assert_eq!(out.wrapper, WrapperKind::None);
    assert_eq!(out.body, "Just some words");
    assert_eq!(shape_of(""), SourceShape::LiteralText);
    assert_eq!(shape_of("   \n  "), SourceShape::LiteralText);
    assert!(!is_literal_text("return 1"));
}

#[test]
fn test_prose_detection() {
    assert!(reads_as_prose("Patient notes (draft)"));
    assert!(reads_as_prose("Dose = 5mg"));
    assert!(!reads_as_prose("[1, 2].map(n => n * 2"));
    assert!(!reads_as_prose("<p>Hi"));
    assert!(!reads_as_prose("`open"));
    assert_eq!(shape_of("Patient notes (draft)"), SourceShape::Expression);
}

#[test]
fn test_whole_form_detection() {
    assert!(is_whole_form("initialData = { a: 1 }\nrender = () => <p/>"));
    assert!(is_whole_form("// form\nrender = function () { return null; }"));
    assert!(!is_whole_form("function setup() {\n  render = 1;\n}\n<p/>"));
    assert!(!is_whole_form("render == 1"));
    assert!(!is_whole_form("render => render"));
    assert!(!is_whole_form("const text = `\nrender = 1\n`;"));
    assert!(!is_whole_form("rendered = 1"));
}

#[test]
fn test_whole_form_is_verbatim() {
    let text = "initialData = { a: 1 }\nrender = () => <p/>";
    let out = transform_source(text);
    assert_eq!(out.shape, SourceShape::WholeForm);
    assert_eq!(out.wrapper, WrapperKind::Verbatim);
    assert_eq!(out.body, text);
}

#[test]
fn test_stateful_bindings_force_named_wrapper() {
    let text = "const [n, setN] = useState(0);\nreturn <p>{n}</p>;";
    let out = transform_source(text);
    assert_eq!(out.wrapper, WrapperKind::Named);
    assert!(out.body.starts_with("function FormRender(props) {\n"));
    assert!(out.body.ends_with("\n}"));
}

#[test]
fn test_custom_stateful_names() {
    let text = "const v = useThing();\nreturn <p>{v}</p>;";
    assert_eq!(classify_source(text, &["useThing"]).wrapper, WrapperKind::Named);
    assert_eq!(classify_source(text, STATEFUL_BINDING_NAMES).wrapper, WrapperKind::Immediate);
    assert_eq!(classify_source(text, &[]).wrapper, WrapperKind::Immediate);
    assert!(!uses_stateful_bindings("myuseState(1)", STATEFUL_BINDING_NAMES));
}

#[test]
fn test_leading_comments_are_stripped() {
    assert_eq!(strip_leading_comments("// heading\n/* note */\n<p>Hi</p>"), "<p>Hi</p>");
    assert_eq!(strip_leading_comments("/* unterminated"), "");
    assert_eq!(shape_of("// heading\n/* note */\n<p>Hi</p>"), SourceShape::Markup);
}

#[test]
fn test_split_prologue_ignores_nested_markup() {
    let text = "const row = (\n  <td/>\n);\n<table>{row}</table>";
    let (prologue, markup) = split_prologue(text).unwrap();
    assert_eq!(prologue, "const row = (\n  <td/>\n);");
    assert_eq!(markup, "<table>{row}</table>");
    assert_eq!(split_prologue("const a = 1;"), None);
}
