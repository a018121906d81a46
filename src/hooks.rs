//! Stateful bindings.
//!
//! A `HookRuntime` belongs to one `RenderFunction` and hands out slots in
//! call order, so the same sequence of calls on the next render finds the
//! same state. The runtime is reachable from native code only while a render
//! is in progress (`Interpreter::hooks`).

use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::{arg, ObjectMap, Value};

/// Names whose presence in a source text forces the named-function wrapper.
pub const STATEFUL_BINDING_NAMES: &[&str] = &[
    "useState",
    "useEffect",
    "useMemo",
    "useRef",
    "useCallback",
    "useReducer",
    "useFormState",
];

/// External store that receives a whole form's `initialData`.
pub trait StateStore {
    fn seed(&self, data: Value);
    fn snapshot(&self) -> Value;
    /// Shallow-merge `patch` into the current state.
    fn update(&self, patch: Value);
}

#[derive(Debug)]
pub struct MemoryStateStore {
    state: RefCell<Value>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(Value::object(ObjectMap::new())),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn seed(&self, data: Value) {
        *self.state.borrow_mut() = data;
    }

    fn snapshot(&self) -> Value {
        self.state.borrow().clone()
    }

    fn update(&self, patch: Value) {
        let current = self.state.borrow().clone();
        let merged = match (&current, &patch) {
            (Value::Object(current), Value::Object(patch)) => {
                let mut map = current.borrow().clone();
                for (key, value) in patch.borrow().iter() {
                    map.insert(key.clone(), value.clone());
                }
                Value::object(map)
            }
            _ => patch,
        };
        *self.state.borrow_mut() = merged;
    }
}

enum HookSlot {
    State { value: Value, setter: Value },
    Ref(Value),
    Memo { value: Value, deps: Option<Vec<Value>> },
    Effect { deps: Option<Vec<Value>>, cleanup: Option<Value> },
    FormState { setter: Value },
}

struct PendingEffect {
    index: usize,
    effect: Value,
}

pub struct HookRuntime {
    slots: Rc<RefCell<Vec<HookSlot>>>,
    cursor: Cell<usize>,
    pending: RefCell<Vec<PendingEffect>>,
    dirty: Rc<Cell<bool>>,
    store: Rc<dyn StateStore>,
}

impl HookRuntime {
    pub fn new(store: Rc<dyn StateStore>) -> Self {
        Self {
            slots: Rc::new(RefCell::new(Vec::new())),
            cursor: Cell::new(0),
            pending: RefCell::new(Vec::new()),
            dirty: Rc::new(Cell::new(false)),
            store,
        }
    }

    /// Reset the call-order cursor before a render.
    pub fn begin_render(&self) {
        self.cursor.set(0);
        self.dirty.set(false);
    }

    /// True when a setter ran since the last `begin_render`.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn store(&self) -> Rc<dyn StateStore> {
        self.store.clone()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn pending_effects(&self) -> usize {
        self.pending.borrow().len()
    }

    fn next_index(&self) -> usize {
        let index = self.cursor.get();
        self.cursor.set(index + 1);
        index
    }

    fn existing(&self, index: usize) -> bool {
        index < self.slots.borrow().len()
    }

    fn push(&self, slot: HookSlot) {
        self.slots.borrow_mut().push(slot);
    }

    fn use_state(&self, interp: &mut Interpreter, initial: Value) -> Result<Value, RuntimeError> {
        let index = self.next_index();
        if !self.existing(index) {
            let value = if matches!(initial, Value::Function(_) | Value::Native(_)) {
                interp.call_function(&initial, &Value::Undefined, &[])?
            } else {
                initial
            };
            let setter = state_setter(self.slots.clone(), self.dirty.clone(), index, None);
            self.push(HookSlot::State { value, setter });
        }
        self.state_pair(index, "useState")
    }

    fn use_reducer(
        &self,
        interp: &mut Interpreter,
        reducer: Value,
        initial: Value,
        init: Value,
    ) -> Result<Value, RuntimeError> {
        let index = self.next_index();
        if !self.existing(index) {
            let value = if init.is_callable() {
                interp.call_function(&init, &Value::Undefined, &[initial])?
            } else {
                initial
            };
            let dispatch =
                state_setter(self.slots.clone(), self.dirty.clone(), index, Some(reducer));
            self.push(HookSlot::State {
                value,
                setter: dispatch,
            });
        }
        self.state_pair(index, "useReducer")
    }

    fn state_pair(&self, index: usize, hook: &str) -> Result<Value, RuntimeError> {
        match self.slots.borrow().get(index) {
            Some(HookSlot::State { value, setter }) => {
                Ok(Value::array(vec![value.clone(), setter.clone()]))
            }
            _ => Err(hook_order_error(hook, index)),
        }
    }

    fn use_ref(&self, initial: Value) -> Result<Value, RuntimeError> {
        let index = self.next_index();
        if !self.existing(index) {
            let mut map = ObjectMap::new();
            map.insert("current".to_string(), initial);
            self.push(HookSlot::Ref(Value::object(map)));
        }
        match self.slots.borrow().get(index) {
            Some(HookSlot::Ref(obj)) => Ok(obj.clone()),
            _ => Err(hook_order_error("useRef", index)),
        }
    }

    fn use_memo(
        &self,
        interp: &mut Interpreter,
        hook: &str,
        compute: impl FnOnce(&mut Interpreter) -> Result<Value, RuntimeError>,
        deps: Option<Vec<Value>>,
    ) -> Result<Value, RuntimeError> {
        let index = self.next_index();
        if self.existing(index) {
            let cached = match self.slots.borrow().get(index) {
                Some(HookSlot::Memo { value, deps: old }) => {
                    if deps_equal(old.as_deref(), deps.as_deref()) {
                        Some(value.clone())
                    } else {
                        None
                    }
                }
                _ => return Err(hook_order_error(hook, index)),
            };
            if let Some(value) = cached {
                return Ok(value);
            }
            let value = compute(interp)?;
            self.slots.borrow_mut()[index] = HookSlot::Memo {
                value: value.clone(),
                deps,
            };
            return Ok(value);
        }
        let value = compute(interp)?;
        self.push(HookSlot::Memo {
            value: value.clone(),
            deps,
        });
        Ok(value)
    }

    fn use_effect(&self, effect: Value, deps: Option<Vec<Value>>) -> Result<Value, RuntimeError> {
        let index = self.next_index();
        if self.existing(index) {
            let mut slots = self.slots.borrow_mut();
            match &mut slots[index] {
                HookSlot::Effect { deps: old, .. } => {
                    if deps_equal(old.as_deref(), deps.as_deref()) {
                        return Ok(Value::Undefined);
                    }
                    *old = deps;
                }
                _ => return Err(hook_order_error("useEffect", index)),
            }
        } else {
            self.push(HookSlot::Effect {
                deps,
                cleanup: None,
            });
        }
        self.pending
            .borrow_mut()
            .push(PendingEffect { index, effect });
        Ok(Value::Undefined)
    }

    fn use_form_state(&self) -> Result<Value, RuntimeError> {
        let index = self.next_index();
        if !self.existing(index) {
            let store = self.store.clone();
            let dirty = self.dirty.clone();
            let setter = Value::native("setFormState", move |interp, _, args| {
                let patch = arg(args, 0);
                let patch = if matches!(patch, Value::Function(_) | Value::Native(_)) {
                    interp.call_function(&patch, &Value::Undefined, &[store.snapshot()])?
                } else {
                    patch
                };
                store.update(patch);
                dirty.set(true);
                Ok(Value::Undefined)
            });
            self.push(HookSlot::FormState { setter });
        }
        match self.slots.borrow().get(index) {
            Some(HookSlot::FormState { setter }) => {
                Ok(Value::array(vec![self.store.snapshot(), setter.clone()]))
            }
            _ => Err(hook_order_error("useFormState", index)),
        }
    }

    /// Run effects recorded during the last render, cleaning up the previous
    /// run of each slot first. Returns how many effects ran.
    pub fn run_effects(&self, interp: &mut Interpreter) -> Result<usize, RuntimeError> {
        let pending: Vec<PendingEffect> = self.pending.borrow_mut().drain(..).collect();
        let count = pending.len();
        for PendingEffect { index, effect } in pending {
            let previous = match self.slots.borrow_mut().get_mut(index) {
                Some(HookSlot::Effect { cleanup, .. }) => cleanup.take(),
                _ => None,
            };
            if let Some(cleanup) = previous {
                interp.call_function(&cleanup, &Value::Undefined, &[])?;
            }
            let result = interp.call_function(&effect, &Value::Undefined, &[])?;
            if matches!(result, Value::Function(_) | Value::Native(_)) {
                if let Some(HookSlot::Effect { cleanup, .. }) = self.slots.borrow_mut().get_mut(index)
                {
                    *cleanup = Some(result);
                }
            }
        }
        debug!(count, "ran effects");
        Ok(count)
    }
}

fn hook_order_error(hook: &str, index: usize) -> RuntimeError {
    RuntimeError::type_error(format!(
        "{} was called in a different order than on the previous render (slot {})",
        hook, index
    ))
}

fn deps_equal(old: Option<&[Value]>, new: Option<&[Value]>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => {
            old.len() == new.len() && old.iter().zip(new).all(|(a, b)| a.strict_equals(b))
        }
        _ => false,
    }
}

fn deps_arg(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.borrow().clone()),
        _ => None,
    }
}

/// Setter for `useState`, or dispatch for `useReducer` when a reducer is given.
fn state_setter(
    slots: Rc<RefCell<Vec<HookSlot>>>,
    dirty: Rc<Cell<bool>>,
    index: usize,
    reducer: Option<Value>,
) -> Value {
    let name = if reducer.is_some() { "dispatch" } else { "setState" };
    Value::native(name, move |interp, _, args| {
        let current = match slots.borrow().get(index) {
            Some(HookSlot::State { value, .. }) => value.clone(),
            _ => Value::Undefined,
        };
        let input = arg(args, 0);
        let next = match &reducer {
            Some(reducer) => interp.call_function(reducer, &Value::Undefined, &[current, input])?,
            None if matches!(input, Value::Function(_) | Value::Native(_)) => {
                interp.call_function(&input, &Value::Undefined, &[current])?
            }
            None => input,
        };
        if let Some(HookSlot::State { value, .. }) = slots.borrow_mut().get_mut(index) {
            *value = next;
        }
        dirty.set(true);
        Ok(Value::Undefined)
    })
}

fn current_hooks(interp: &Interpreter, hook: &str) -> Result<Rc<HookRuntime>, RuntimeError> {
    interp
        .hooks()
        .ok_or_else(|| RuntimeError::OutsideRender(hook.to_string()))
}

/// The default stateful-binding table, keyed by `STATEFUL_BINDING_NAMES`.
pub fn default_stateful_bindings() -> IndexMap<String, Value> {
    let mut table = IndexMap::new();

    table.insert(
        "useState".to_string(),
        Value::native("useState", |interp, _, args| {
            current_hooks(interp, "useState")?.use_state(interp, arg(args, 0))
        }),
    );
    table.insert(
        "useReducer".to_string(),
        Value::native("useReducer", |interp, _, args| {
            current_hooks(interp, "useReducer")?.use_reducer(
                interp,
                arg(args, 0),
                arg(args, 1),
                arg(args, 2),
            )
        }),
    );
    table.insert(
        "useRef".to_string(),
        Value::native("useRef", |interp, _, args| {
            current_hooks(interp, "useRef")?.use_ref(arg(args, 0))
        }),
    );
    table.insert(
        "useMemo".to_string(),
        Value::native("useMemo", |interp, _, args| {
            let factory = arg(args, 0);
            current_hooks(interp, "useMemo")?.use_memo(
                interp,
                "useMemo",
                |interp| interp.call_function(&factory, &Value::Undefined, &[]),
                deps_arg(arg(args, 1)),
            )
        }),
    );
    table.insert(
        "useCallback".to_string(),
        Value::native("useCallback", |interp, _, args| {
            let callback = arg(args, 0);
            current_hooks(interp, "useCallback")?.use_memo(
                interp,
                "useCallback",
                |_| Ok(callback),
                deps_arg(arg(args, 1)),
            )
        }),
    );
    table.insert(
        "useEffect".to_string(),
        Value::native("useEffect", |interp, _, args| {
            current_hooks(interp, "useEffect")?.use_effect(arg(args, 0), deps_arg(arg(args, 1)))
        }),
    );
    table.insert(
        "useFormState".to_string(),
        Value::native("useFormState", |interp, _, _| {
            current_hooks(interp, "useFormState")?.use_form_state()
        }),
    );

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_name_list() {
        let table = default_stateful_bindings();
        let names: Vec<&str> = table.keys().map(String::as_str).collect();
        for name in STATEFUL_BINDING_NAMES {
            assert!(names.contains(name), "missing {}", name);
        }
        assert_eq!(names.len(), STATEFUL_BINDING_NAMES.len());
    }

    #[test]
    fn test_memory_store_merges_objects() {
        let store = MemoryStateStore::new();
        store.seed(Value::from_json(&serde_json::json!({ "name": "Ada", "age": 36 })));
        store.update(Value::from_json(&serde_json::json!({ "age": 37 })));
        assert_eq!(
            store.snapshot().to_json(),
            serde_json::json!({ "name": "Ada", "age": 37.0 })
        );
    }

    #[test]
    fn test_hooks_outside_render_fail() {
        let table = default_stateful_bindings();
        let mut interp = Interpreter::default();
        let use_state = table.get("useState").cloned().unwrap();
        let err = interp
            .call_function(&use_state, &Value::Undefined, &[Value::Number(0.0)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::OutsideRender(_)));
    }

    #[test]
    fn test_dependency_comparison() {
        let a = vec![Value::Number(1.0), Value::string("x")];
        let b = vec![Value::Number(1.0), Value::string("x")];
        assert!(deps_equal(Some(&a[..]), Some(&b[..])));
        assert!(!deps_equal(None, Some(&b[..])));
        assert!(!deps_equal(Some(&a[..1]), Some(&b[..])));
    }
}
