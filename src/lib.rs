//! # Live Form Runtime
//!
//! Renders author-edited form source without a build step.
//!
//! 1. **Environment** (`environment`): primitives, stateful bindings,
//!    namespace tables, components and globals flattened in that order.
//! 2. **Transform** (`transform`): classify a source text's shape and rewrite
//!    it into one invokable body. Never executes anything.
//! 3. **Execute** (`executor`, `lower`, `interpreter`): parse the body with
//!    oxc, lower it to an owned IR and run it. Names nobody bound read as
//!    Placeholders. `Executor::render_source` turns every failure into an
//!    inert error node.
//! 4. **Load** (`registry`): run many component groups in two or more passes
//!    so cross-group references resolve, pooling exports into one Registry.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod environment;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod interpreter;
pub mod lower;
pub mod registry;
pub mod render;
pub mod scope;
pub mod transform;
pub mod value;

#[cfg(test)]
mod environment_tests;
#[cfg(test)]
mod registry_tests;
#[cfg(test)]
mod transform_tests;

pub use environment::{primitive, standard_primitives, Environment, EnvironmentBuilder};
pub use error::{CompileError, RuntimeError};
pub use executor::{CompiledUnit, Executor, FormDefinition, Module, RenderFunction, RenderOptions};
pub use hooks::{MemoryStateStore, StateStore, STATEFUL_BINDING_NAMES};
pub use registry::{declared_names, ComponentGroup, LoaderOptions, Registry, RegistryLoader};
pub use render::RenderNode;
pub use scope::{Scope, ScopeMode};
pub use transform::{classify_source, transform_source, Classification, SourceShape, TransformedSource};
pub use value::{ObjectMap, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// HOST BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn props_from_json(props_json: Option<serde_json::Value>) -> ObjectMap {
    match props_json.as_ref().map(Value::from_json) {
        Some(Value::Object(map)) => map.borrow().clone(),
        _ => ObjectMap::new(),
    }
}

/// Render `source` against the standard environment and return the render
/// tree as JSON (`null` when nothing rendered).
#[cfg(feature = "napi")]
#[napi]
pub fn render_source_native(
    source: String,
    props_json: Option<serde_json::Value>,
    options_json: Option<serde_json::Value>,
) -> napi::Result<String> {
    let options: RenderOptions = match options_json {
        Some(json) => serde_json::from_value(json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid RenderOptions: {}", e)))?,
        None => RenderOptions::default(),
    };
    let env = EnvironmentBuilder::standard().build_scope();
    let executor = Executor::new(options);
    let node = executor.render_source(&source, &env, props_from_json(props_json));
    let json = node.map(|n| n.to_json()).unwrap_or(serde_json::Value::Null);
    serde_json::to_string(&json)
        .map_err(|e| napi::Error::from_reason(format!("Failed to serialize render tree: {}", e)))
}

/// Load component groups and report the exports each one contributed.
#[cfg(feature = "napi")]
#[napi]
pub fn load_groups_native(
    groups_json: serde_json::Value,
    options_json: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let groups: Vec<ComponentGroup> = serde_json::from_value(groups_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid component groups: {}", e)))?;
    let options: LoaderOptions = match options_json {
        Some(json) => serde_json::from_value(json)
            .map_err(|e| napi::Error::from_reason(format!("Invalid LoaderOptions: {}", e)))?,
        None => LoaderOptions::default(),
    };
    let env = EnvironmentBuilder::standard().build_scope();
    let registry = RegistryLoader::new(env, options).load(&groups);
    Ok(registry.to_json())
}
