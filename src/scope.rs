//! Runtime scopes and static identifier collection.
//!
//! A `Scope` is a chain of frames. The root frame is built from an
//! `Environment` and decides what happens to names nobody declared: reads
//! always fall through to a Placeholder, while writes either fail
//! (`Parameters`) or land in the root frame (`Ambient`).

use indexmap::IndexMap;
use oxc_ast_visit::Visit;
use oxc_syntax::scope::{ScopeFlags, ScopeId};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::value::Value;

/// How the root frame treats undeclared names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Environment keys are bound like function parameters. Assigning to an
    /// undeclared name is a `ReferenceError`.
    Parameters,
    /// The environment is a live scope object; undeclared assignments create
    /// entries in it. Used for whole-form sources.
    Ambient,
}

#[derive(Debug)]
struct Slot {
    value: Value,
    mutable: bool,
}

#[derive(Debug)]
struct Frame {
    vars: RefCell<IndexMap<String, Slot>>,
    parent: Option<Scope>,
    mode: ScopeMode,
}

#[derive(Debug, Clone)]
pub struct Scope(Rc<Frame>);

impl Scope {
    /// Root frame seeded with a snapshot of the environment.
    pub fn global(env: &Environment, mode: ScopeMode) -> Self {
        let vars = env
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    Slot {
                        value: value.clone(),
                        mutable: true,
                    },
                )
            })
            .collect();
        Scope(Rc::new(Frame {
            vars: RefCell::new(vars),
            parent: None,
            mode,
        }))
    }

    pub fn child(&self) -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(self.clone()),
            mode: self.0.mode,
        }))
    }

    pub fn mode(&self) -> ScopeMode {
        self.0.mode
    }

    /// Bind a name in this frame, shadowing anything further up.
    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .vars
            .borrow_mut()
            .insert(name.to_string(), Slot { value, mutable });
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(slot) = scope.0.vars.borrow().get(name) {
                return Some(slot.value.clone());
            }
            frame = scope.0.parent.as_ref();
        }
        None
    }

    pub fn lookup_or_placeholder(&self, name: &str) -> Value {
        self.lookup(name)
            .unwrap_or_else(|| Value::placeholder(name))
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut frame = Some(self);
        let mut root = self;
        while let Some(scope) = frame {
            if let Some(slot) = scope.0.vars.borrow_mut().get_mut(name) {
                if !slot.mutable {
                    return Err(RuntimeError::type_error(format!(
                        "Assignment to constant variable '{}'",
                        name
                    )));
                }
                slot.value = value;
                return Ok(());
            }
            root = scope;
            frame = scope.0.parent.as_ref();
        }

        match self.0.mode {
            ScopeMode::Ambient => {
                root.declare(name, value, true);
                Ok(())
            }
            ScopeMode::Parameters => Err(RuntimeError::Reference(format!(
                "{} is not defined",
                name
            ))),
        }
    }

    /// Value bound directly in this frame, ignoring parents.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.0.vars.borrow().get(name).map(|slot| slot.value.clone())
    }

    pub fn own_names(&self) -> Vec<String> {
        self.0.vars.borrow().keys().cloned().collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FREE IDENTIFIER COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifiers a unit references without binding them in any enclosing
/// scope, in first-use order. Used for diagnostics only; resolution happens
/// at run time.
pub fn collect_free_identifiers(program: &oxc_ast::ast::Program<'_>) -> Vec<String> {
    let mut collector = ScopeAwareCollector {
        frames: vec![StaticFrame::new(true, false)],
        next_reference: 0,
        hoisting: false,
    };
    collector.visit_program(program);
    while collector.frames.len() > 1 {
        collector.leave_scope();
    }

    let mut unresolved = collector
        .frames
        .pop()
        .map(StaticFrame::into_unresolved)
        .unwrap_or_default();
    unresolved.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    unresolved
        .into_iter()
        .map(|(_, name)| name)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// One lexical scope seen while walking the AST. References are resolved
/// when the scope closes, so later declarations still count.
struct StaticFrame {
    bindings: HashSet<String>,
    references: Vec<(usize, String)>,
    function: bool,
    saved_hoisting: bool,
}

impl StaticFrame {
    fn new(function: bool, saved_hoisting: bool) -> Self {
        Self {
            bindings: HashSet::new(),
            references: Vec::new(),
            function,
            saved_hoisting,
        }
    }

    fn into_unresolved(self) -> Vec<(usize, String)> {
        let bindings = self.bindings;
        self.references
            .into_iter()
            .filter(|(_, name)| !bindings.contains(name))
            .collect()
    }
}

struct ScopeAwareCollector {
    frames: Vec<StaticFrame>,
    next_reference: usize,
    /// Inside a `var` declaration; bindings go to the enclosing function.
    hoisting: bool,
}

impl ScopeAwareCollector {
    fn bind(&mut self, name: &str) {
        let frame = if self.hoisting {
            self.frames.iter_mut().rev().find(|frame| frame.function)
        } else {
            self.frames.last_mut()
        };
        if let Some(frame) = frame {
            frame.bindings.insert(name.to_string());
        }
    }
}

impl<'a> Visit<'a> for ScopeAwareCollector {
    fn enter_scope(&mut self, flags: ScopeFlags, _scope_id: &Cell<Option<ScopeId>>) {
        let function = flags.is_function() || flags.is_top();
        self.frames.push(StaticFrame::new(function, self.hoisting));
        self.hoisting = false;
    }

    fn leave_scope(&mut self) {
        if self.frames.len() < 2 {
            return;
        }
        if let Some(frame) = self.frames.pop() {
            self.hoisting = frame.saved_hoisting;
            let unresolved = frame.into_unresolved();
            if let Some(parent) = self.frames.last_mut() {
                parent.references.extend(unresolved);
            }
        }
    }

    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'a>) {
        let position = self.next_reference;
        self.next_reference += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.references.push((position, ident.name.to_string()));
        }
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.bind(&ident.name);
    }

    fn visit_variable_declaration(&mut self, decl: &oxc_ast::ast::VariableDeclaration<'a>) {
        let saved = self.hoisting;
        self.hoisting = decl.kind.is_var();
        oxc_ast_visit::walk::walk_variable_declaration(self, decl);
        self.hoisting = saved;
    }

    fn visit_function(&mut self, func: &oxc_ast::ast::Function<'a>, flags: ScopeFlags) {
        // A declaration's name belongs to the enclosing scope; the walk binds
        // it again inside the function, which is where expression names live.
        if func.is_declaration() {
            if let Some(id) = &func.id {
                self.bind(&id.name);
            }
        }
        oxc_ast_visit::walk::walk_function(self, func, flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::from_iter([("Label".to_string(), Value::string("label"))])
    }

    #[test]
    fn test_unresolved_reads_become_placeholders() {
        let scope = Scope::global(&env(), ScopeMode::Parameters).child();
        assert_eq!(scope.lookup_or_placeholder("Nope").placeholder_name(), Some("Nope"));
        assert_eq!(scope.lookup_or_placeholder("Label").as_str(), Some("label"));
    }

    #[test]
    fn test_parameter_mode_rejects_undeclared_assignment() {
        let scope = Scope::global(&env(), ScopeMode::Parameters).child();
        let err = scope.assign("render", Value::Null).unwrap_err();
        assert!(matches!(err, RuntimeError::Reference(_)));
    }

    #[test]
    fn test_ambient_mode_writes_to_root() {
        let root = Scope::global(&env(), ScopeMode::Ambient);
        let inner = root.child().child();
        inner.assign("initialData", Value::Number(1.0)).unwrap();
        assert!(root.get_own("initialData").is_some());
        assert!(inner.get_own("initialData").is_none());
    }

    #[test]
    fn test_const_bindings_are_immutable() {
        let scope = Scope::global(&Environment::default(), ScopeMode::Ambient);
        scope.declare("limit", Value::Number(3.0), false);
        assert!(scope.assign("limit", Value::Number(4.0)).is_err());
    }

    #[test]
    fn test_shadowing_keeps_outer_binding() {
        let root = Scope::global(&env(), ScopeMode::Parameters);
        let inner = root.child();
        inner.declare("Label", Value::Number(2.0), true);
        assert_eq!(inner.lookup("Label").and_then(|v| v.as_number()), Some(2.0));
        assert_eq!(root.lookup("Label").and_then(|v| v.as_str().map(str::to_string)), Some("label".to_string()));
    }

    fn free(source: &str) -> Vec<String> {
        crate::lower::compile_program(source)
            .expect("source should compile")
            .free_identifiers
    }

    #[test]
    fn test_parameter_does_not_hide_free_use_elsewhere() {
        let source = "const a = (label) => label;\nconst b = () => <p>{label}</p>;";
        assert_eq!(free(source), vec!["label"]);
    }

    #[test]
    fn test_later_declarations_still_bind() {
        let source = "function f() { return g(count); }\nfunction g(n) { return n; }\nconst count = 1;";
        assert_eq!(free(source), Vec::<String>::new());
    }

    #[test]
    fn test_var_is_visible_outside_its_block() {
        let source = "if (flag) { var total = 1; let inner = 2; }\nconst out = [total, inner];";
        assert_eq!(free(source), vec!["flag", "inner"]);
    }
}
