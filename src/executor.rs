//! Environment-bound execution.
//!
//! A transformed body is compiled once (through the compile cache) and run
//! against a scope built from an `Environment`. Ordinary shapes see the
//! environment as a parameter snapshot; whole-form sources run in an ambient
//! scope where assignments to undeclared names land in the global frame.
//! `render_source` is the error boundary: nothing it does returns an error.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::ast::Program;
use crate::cache::CompileCache;
use crate::environment::Environment;
use crate::error::{CompileError, RuntimeError};
use crate::hooks::{HookRuntime, MemoryStateStore, StateStore, STATEFUL_BINDING_NAMES};
use crate::interpreter::Interpreter;
use crate::lower::compile_program;
use crate::render::{to_render_node, RenderNode};
use crate::scope::{Scope, ScopeMode};
use crate::transform::{
    reads_as_prose, transform_source_with, SourceShape, TransformedSource, RENDER_BINDING, WHOLE_FORM_DATA,
    WHOLE_FORM_RENDER,
};
use crate::value::{ObjectMap, Value, DEFAULT_MAX_ARRAY_LENGTH};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Statements and calls a single execution may take before it is aborted.
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Longest array authored code may grow, and longest string `padStart`
    /// or `padEnd` may build.
    pub max_array_length: usize,
    /// Lowered units kept by the compile cache. Zero disables caching.
    pub cache_capacity: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 64,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            cache_capacity: 64,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILED ARTIFACTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub shape: SourceShape,
    pub program: Rc<Program>,
}

impl CompiledUnit {
    /// Identifiers the unit reads without binding them.
    pub fn free_identifiers(&self) -> &[String] {
        &self.program.free_identifiers
    }
}

/// An invokable render function together with the stateful-binding slots it
/// owns. Slots persist across calls to `render` on the same instance.
#[derive(Clone)]
pub struct RenderFunction {
    function: Value,
    hooks: Rc<HookRuntime>,
    options: RenderOptions,
}

impl RenderFunction {
    pub fn new(function: Value, store: Rc<dyn StateStore>, options: RenderOptions) -> Self {
        Self {
            function,
            hooks: Rc::new(HookRuntime::new(store)),
            options,
        }
    }

    pub fn function(&self) -> &Value {
        &self.function
    }

    pub fn hooks(&self) -> &Rc<HookRuntime> {
        &self.hooks
    }

    /// Call the function with `props` and return the raw result.
    pub fn render_value(&self, props: ObjectMap) -> Result<Value, RuntimeError> {
        self.hooks.begin_render();
        let mut interp = Interpreter::new(&self.options).with_hooks(self.hooks.clone());
        interp.call_function(&self.function, &Value::Undefined, &[Value::object(props)])
    }

    /// Render to a tree. `None` when the function rendered nothing.
    pub fn render(&self, props: ObjectMap) -> Result<Option<RenderNode>, RuntimeError> {
        let value = self.render_value(props)?;
        to_render_node(&value)
    }

    /// Run effects recorded by the last render.
    pub fn run_effects(&self) -> Result<usize, RuntimeError> {
        let mut interp = Interpreter::new(&self.options).with_hooks(self.hooks.clone());
        self.hooks.run_effects(&mut interp)
    }
}

impl std::fmt::Debug for RenderFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderFunction")
            .field("function", &self.function)
            .field("slots", &self.hooks.slot_count())
            .finish()
    }
}

/// Result of running a whole-form source.
pub struct FormDefinition {
    pub render: RenderFunction,
    pub initial_data: Value,
    store: Rc<dyn StateStore>,
}

impl FormDefinition {
    /// Hand `initial_data` to the state store. Undefined data leaves the
    /// store untouched.
    pub fn seed(&self) {
        if !matches!(self.initial_data, Value::Undefined) {
            self.store.seed(self.initial_data.clone());
        }
    }

    pub fn store(&self) -> Rc<dyn StateStore> {
        self.store.clone()
    }
}

impl std::fmt::Debug for FormDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormDefinition")
            .field("render", &self.render)
            .field("initial_data", &self.initial_data)
            .finish()
    }
}

/// A group source executed for its top-level declarations.
#[derive(Debug, Clone)]
pub struct Module {
    scope: Scope,
    declared: Vec<String>,
}

impl Module {
    /// A name bound at the module's own top level.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scope.get_own(name)
    }

    pub fn declared_names(&self) -> &[String] {
        &self.declared
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXECUTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Executor {
    options: RenderOptions,
    stateful_names: Vec<String>,
    cache: RefCell<CompileCache>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

impl Executor {
    pub fn new(options: RenderOptions) -> Self {
        let cache = CompileCache::new(options.cache_capacity);
        Self {
            options,
            stateful_names: STATEFUL_BINDING_NAMES.iter().map(|s| s.to_string()).collect(),
            cache: RefCell::new(cache),
        }
    }

    /// Replace the names that force the named-function wrapper.
    pub fn with_stateful_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stateful_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// (hits, misses) of the compile cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        let cache = self.cache.borrow();
        (cache.hits(), cache.misses())
    }

    pub fn transform(&self, source: &str) -> TransformedSource {
        let names: Vec<&str> = self.stateful_names.iter().map(String::as_str).collect();
        transform_source_with(source, &names)
    }

    /// Parse and lower arbitrary source, going through the compile cache.
    pub fn compile_source(&self, source: &str) -> Result<Rc<Program>, CompileError> {
        self.cache
            .borrow_mut()
            .get_or_compile(source, compile_program)
    }

    pub fn compile_unit(&self, transformed: &TransformedSource) -> Result<CompiledUnit, CompileError> {
        let program = match transformed.shape {
            // Literal text becomes a render function returning the text itself.
            SourceShape::LiteralText => {
                let literal = serde_json::to_string(&transformed.body)
                    .map_err(|e| CompileError::Parse(e.to_string()))?;
                self.compile_source(&format!("const {} = () => {};", RENDER_BINDING, literal))?
            }
            _ => self.compile_source(&transformed.body)?,
        };
        debug!(
            shape = ?transformed.shape,
            free = program.free_identifiers.len(),
            "compiled unit"
        );
        Ok(CompiledUnit {
            shape: transformed.shape,
            program,
        })
    }

    /// Run a wrapped unit and return its render function.
    pub fn execute_render(
        &self,
        unit: &CompiledUnit,
        env: &Environment,
    ) -> Result<RenderFunction, RuntimeError> {
        self.execute_render_with_store(unit, env, Rc::new(MemoryStateStore::new()))
    }

    pub fn execute_render_with_store(
        &self,
        unit: &CompiledUnit,
        env: &Environment,
        store: Rc<dyn StateStore>,
    ) -> Result<RenderFunction, RuntimeError> {
        let scope = Scope::global(env, ScopeMode::Parameters).child();
        let mut interp = Interpreter::new(&self.options);
        interp.run_program(&unit.program, &scope)?;
        let function = scope
            .get_own(RENDER_BINDING)
            .filter(Value::is_callable)
            .ok_or_else(|| RuntimeError::MissingBinding(RENDER_BINDING.to_string()))?;
        Ok(RenderFunction::new(function, store, self.options.clone()))
    }

    /// Run a whole-form unit in an ambient scope and read back `render` and
    /// `initialData`.
    pub fn execute_form(
        &self,
        unit: &CompiledUnit,
        env: &Environment,
        store: Rc<dyn StateStore>,
    ) -> Result<FormDefinition, RuntimeError> {
        let scope = Scope::global(env, ScopeMode::Ambient);
        let mut interp = Interpreter::new(&self.options);
        interp.run_program(&unit.program, &scope)?;

        let render = scope
            .lookup(WHOLE_FORM_RENDER)
            .filter(|value| value.is_callable() && !value.is_placeholder())
            .ok_or_else(|| RuntimeError::MissingBinding(WHOLE_FORM_RENDER.to_string()))?;
        let initial_data = scope
            .lookup(WHOLE_FORM_DATA)
            .filter(|value| !value.is_placeholder())
            .unwrap_or(Value::Undefined);

        Ok(FormDefinition {
            render: RenderFunction::new(render, store.clone(), self.options.clone()),
            initial_data,
            store,
        })
    }

    /// Run `source` verbatim for its top-level declarations.
    pub fn execute_module(&self, source: &str, env: &Environment) -> Result<Module, RuntimeError> {
        let program = self.compile_source(source)?;
        let scope = Scope::global(env, ScopeMode::Parameters).child();
        let mut interp = Interpreter::new(&self.options);
        interp.run_program(&program, &scope)?;
        Ok(Module {
            declared: program.declared_names(),
            scope,
        })
    }

    /// Transform, compile, execute and render `source` with `props`.
    ///
    /// Failures at any stage come back as a `RenderNode::Error`.
    pub fn render_source(
        &self,
        source: &str,
        env: &Environment,
        props: ObjectMap,
    ) -> Option<RenderNode> {
        match self.try_render_source(source, env, props) {
            Ok(node) => node,
            Err(err) => {
                warn!(error = %err, "form source failed to render");
                Some(RenderNode::error(err.to_string()))
            }
        }
    }

    fn try_render_source(
        &self,
        source: &str,
        env: &Environment,
        props: ObjectMap,
    ) -> Result<Option<RenderNode>, RuntimeError> {
        let transformed = self.transform(source);
        if transformed.shape == SourceShape::LiteralText {
            if transformed.body.is_empty() {
                return Ok(None);
            }
            return Ok(Some(RenderNode::Text(transformed.body)));
        }
        let unit = match self.compile_unit(&transformed) {
            Ok(unit) => unit,
            Err(CompileError::Parse(message))
                if transformed.shape == SourceShape::Expression && reads_as_prose(source) =>
            {
                debug!(%message, "expression did not parse, showing it as text");
                return Ok(Some(RenderNode::Text(source.trim().to_string())));
            }
            Err(err) => return Err(err.into()),
        };
        if unit.shape == SourceShape::WholeForm {
            let form = self.execute_form(&unit, env, Rc::new(MemoryStateStore::new()))?;
            form.seed();
            return form.render.render(props);
        }
        self.execute_render(&unit, env)?.render(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: RenderOptions = serde_json::from_str(r#"{"maxSteps": 10}"#).unwrap();
        assert_eq!(options.max_steps, 10);
        assert_eq!(options.max_call_depth, 64);
        assert_eq!(options.max_array_length, 1_000_000);
        assert_eq!(options.cache_capacity, 64);
    }

    #[test]
    fn test_literal_text_unit_renders_text() {
        let executor = Executor::default();
        let unit = executor.compile_unit(&executor.transform("Hello there")).unwrap();
        let render = executor.execute_render(&unit, &Environment::new()).unwrap();
        let node = render.render(ObjectMap::new()).unwrap().unwrap();
        assert_eq!(node.text_content(), "Hello there");
    }

    #[test]
    fn test_missing_render_binding() {
        let executor = Executor::default();
        let program = executor.compile_source("const other = 1;").unwrap();
        let unit = CompiledUnit {
            shape: SourceShape::Statements,
            program,
        };
        let err = executor.execute_render(&unit, &Environment::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::MissingBinding(ref name) if name == "FormRender"));
    }
}
