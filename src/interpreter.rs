//! Tree-walking interpreter for lowered form source.
//!
//! Free identifiers resolve through `Scope`, so a name nobody bound reads as
//! a Placeholder instead of failing. Markup is evaluated eagerly: component
//! tags are called while the tree is built and the result is a plain
//! `RenderNode` value.

use std::rc::Rc;
use tracing::trace;

use crate::ast::{
    ArrayItem, AssignOp, AssignTarget, AttributeItem, BinaryOp, ChildItem, DeclKind, ElementDef,
    ElementTag, Expr, Literal, LogicalOp, MemberProperty, ObjectItem, Pattern, Program,
    PropertyName, Stmt, UnaryOp,
};
use crate::builtins::{self, error_object};
use crate::error::RuntimeError;
use crate::executor::RenderOptions;
use crate::hooks::HookRuntime;
use crate::render::{collect_children, RenderNode};
use crate::scope::Scope;
use crate::value::{arg, format_number, Closure, ObjectMap, Value};

type EvalResult<T = Value> = Result<T, RuntimeError>;

/// How a statement finished. `return`, `break` and `continue` travel up
/// through this rather than through errors.
enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    steps: u64,
    max_steps: u64,
    depth: usize,
    max_call_depth: usize,
    max_array_length: usize,
    hooks: Option<Rc<HookRuntime>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(&RenderOptions::default())
    }
}

impl Interpreter {
    pub fn new(options: &RenderOptions) -> Self {
        Self {
            steps: 0,
            max_steps: options.max_steps,
            depth: 0,
            max_call_depth: options.max_call_depth,
            max_array_length: options.max_array_length,
            hooks: None,
        }
    }

    /// Make stateful bindings usable for the lifetime of this interpreter.
    pub fn with_hooks(mut self, hooks: Rc<HookRuntime>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn hooks(&self) -> Option<Rc<HookRuntime>> {
        self.hooks.clone()
    }

    /// Longest array or padded string authored code may build.
    pub fn max_array_length(&self) -> usize {
        self.max_array_length
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(RuntimeError::StepLimit(self.max_steps));
        }
        Ok(())
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.tick()?;
        if self.depth >= self.max_call_depth {
            return Err(RuntimeError::CallDepth(self.max_call_depth));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a unit's top level in `scope`. Returns the value of a top-level
    /// `return`, if the unit has one.
    pub fn run_program(&mut self, program: &Program, scope: &Scope) -> EvalResult<Option<Value>> {
        trace!(statements = program.body.len(), "running unit");
        match self.exec_block(&program.body, scope)? {
            Completion::Return(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Execute statements directly in `scope`, hoisting function declarations.
    fn exec_block(&mut self, stmts: &[Stmt], scope: &Scope) -> EvalResult<Completion> {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = Value::Function(Rc::new(Closure {
                        def: def.clone(),
                        scope: scope.clone(),
                    }));
                    scope.declare(name, closure, true);
                }
            }
        }
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Scope) -> EvalResult<Completion> {
        self.tick()?;
        match stmt {
            Stmt::Declare {
                kind,
                pattern,
                init,
            } => {
                let value = match init {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                self.bind_pattern(pattern, value, scope, *kind != DeclKind::Const)?;
                Ok(Completion::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Completion::Normal),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Block(stmts) => self.exec_block(stmts, &scope.child()),
            Stmt::Expression(expr) => {
                self.eval(expr, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable, scope)?;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    let iteration = scope.child();
                    self.bind_pattern(pattern, item, &iteration, *kind != DeclKind::Const)?;
                    match self.exec(body, &iteration)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_scope = scope.child();
                match init.as_deref() {
                    // Declarations in the header belong to the loop scope.
                    Some(Stmt::Block(decls)) => {
                        for decl in decls {
                            self.exec(decl, &loop_scope)?;
                        }
                    }
                    Some(other) => {
                        self.exec(other, &loop_scope)?;
                    }
                    None => {}
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, &loop_scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &loop_scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &loop_scope)?;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                Err(RuntimeError::Thrown {
                    message: thrown_message(&value),
                    value,
                })
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block, &scope.child());
                if let Some(handler) = handler {
                    if let Err(err) = &result {
                        if !err.is_fatal() {
                            let catch_scope = scope.child();
                            if let Some(param) = param {
                                self.bind_pattern(param, caught_value(err), &catch_scope, true)?;
                            }
                            result = self.exec_block(handler, &catch_scope);
                        }
                    }
                }
                if let Some(finalizer) = finalizer {
                    match self.exec_block(finalizer, &scope.child())? {
                        Completion::Normal => {}
                        other => return Ok(other),
                    }
                }
                result
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
        }
    }

    fn iterate(&self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            Value::Placeholder(_) => Ok(Vec::new()),
            other => Err(RuntimeError::type_error(format!(
                "{} is not iterable",
                describe(other)
            ))),
        }
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &Scope,
        mutable: bool,
    ) -> EvalResult<()> {
        match pattern {
            Pattern::Identifier(name) => {
                scope.declare(name, value, mutable);
                Ok(())
            }
            Pattern::Default { target, default } => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval(default, scope)?
                } else {
                    value
                };
                self.bind_pattern(target, value, scope, mutable)
            }
            Pattern::Object { properties, rest } => {
                if value.is_nullish() {
                    return Err(RuntimeError::type_error(format!(
                        "Cannot destructure '{}' as it is {}",
                        value.to_display_string(),
                        value.to_display_string()
                    )));
                }
                let mut used = Vec::with_capacity(properties.len());
                for (key, target) in properties {
                    let key = match key {
                        PropertyName::Static(name) => name.clone(),
                        PropertyName::Computed(expr) => key_string(&self.eval(expr, scope)?),
                    };
                    let member = value.get_property(&key)?;
                    used.push(key);
                    self.bind_pattern(target, member, scope, mutable)?;
                }
                if let Some(rest) = rest {
                    let remaining: ObjectMap = match &value {
                        Value::Object(map) => map
                            .borrow()
                            .iter()
                            .filter(|(k, _)| !used.contains(k))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                        _ => ObjectMap::new(),
                    };
                    self.bind_pattern(rest, Value::object(remaining), scope, mutable)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let items = match &value {
                    Value::Placeholder(_) => {
                        vec![value.clone(); elements.len()]
                    }
                    other => self.iterate(other)?,
                };
                for (i, element) in elements.iter().enumerate() {
                    if let Some(target) = element {
                        let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                        self.bind_pattern(target, item, scope, mutable)?;
                    }
                }
                if let Some(rest) = rest {
                    let tail = items.iter().skip(elements.len()).cloned().collect();
                    self.bind_pattern(rest, Value::array(tail), scope, mutable)?;
                }
                Ok(())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn eval(&mut self, expr: &Expr, scope: &Scope) -> EvalResult {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Template {
                quasis,
                expressions,
            } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = expressions.get(i) {
                        out.push_str(&self.eval(expr, scope)?.to_display_string());
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Identifier(name) => Ok(scope.lookup_or_placeholder(name)),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope)?)),
            Expr::Object(items) => {
                let mut map = ObjectMap::new();
                for item in items {
                    match item {
                        ObjectItem::Property { key, value } => {
                            let key = match key {
                                PropertyName::Static(name) => name.clone(),
                                PropertyName::Computed(expr) => {
                                    key_string(&self.eval(expr, scope)?)
                                }
                            };
                            let value = self.eval(value, scope)?;
                            map.insert(key, value);
                        }
                        ObjectItem::Spread(expr) => {
                            let source = self.eval(expr, scope)?;
                            spread_entries(&source, &mut map);
                        }
                    }
                }
                Ok(Value::object(map))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: def.clone(),
                scope: scope.clone(),
            }))),
            Expr::Call { .. } | Expr::Member { .. } => {
                Ok(self.eval_chain_part(expr, scope)?.unwrap_or(Value::Undefined))
            }
            Expr::Chain(inner) => Ok(self.eval_chain_part(inner, scope)?.unwrap_or(Value::Undefined)),
            Expr::Unary { operator, argument } => {
                if let (UnaryOp::TypeOf, Expr::Identifier(name)) = (operator, argument.as_ref()) {
                    // `typeof missing` is how authored code checks for optional bindings.
                    return Ok(Value::string(match scope.lookup(name) {
                        Some(value) => value.type_of(),
                        None => "undefined",
                    }));
                }
                let value = self.eval(argument, scope)?;
                Ok(match operator {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::string(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                    UnaryOp::BitNot => Value::Number(!to_int32(value.to_number()) as f64),
                })
            }
            Expr::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*operator, &left, &right)
            }
            Expr::Logical {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match operator {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign {
                operator,
                target,
                value,
            } => self.eval_assign(*operator, target, value, scope),
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let delta = if *increment { 1.0 } else { -1.0 };
                let (old, new) = match target {
                    AssignTarget::Identifier(name) => {
                        let old = scope.lookup_or_placeholder(name).to_number();
                        scope.assign(name, Value::Number(old + delta))?;
                        (old, old + delta)
                    }
                    AssignTarget::Member { object, property } => {
                        let object = self.eval(object, scope)?;
                        let key = self.property_key(property, scope)?;
                        let old = object.get_property(&key)?.to_number();
                        object.set_property_within(&key, Value::Number(old + delta), self.max_array_length)?;
                        (old, old + delta)
                    }
                };
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, scope)?;
                }
                Ok(last)
            }
            Expr::Element(def) => self.eval_element(def, scope),
        }
    }

    fn eval_items(&mut self, items: &[ArrayItem], scope: &Scope) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Expr(expr) => out.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let value = self.eval(expr, scope)?;
                    out.extend(self.iterate(&value)?);
                }
                ArrayItem::Hole => out.push(Value::Undefined),
            }
        }
        Ok(out)
    }

    fn property_key(&mut self, property: &MemberProperty, scope: &Scope) -> EvalResult<String> {
        match property {
            MemberProperty::Static(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => Ok(key_string(&self.eval(expr, scope)?)),
        }
    }

    /// Evaluate the object position of a member or call, propagating an
    /// optional-chain short circuit (`None`) from inside it.
    fn eval_chain_object(&mut self, expr: &Expr, scope: &Scope) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Member { .. } | Expr::Call { .. } => self.eval_chain_part(expr, scope),
            other => self.eval(other, scope).map(Some),
        }
    }

    fn eval_chain_part(&mut self, expr: &Expr, scope: &Scope) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(object) = self.eval_chain_object(object, scope)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property, scope)?;
                Ok(Some(object.get_property(&key)?))
            }
            Expr::Call {
                callee,
                arguments,
                optional,
            } => {
                if let Expr::Member {
                    object,
                    property,
                    optional: member_optional,
                } = callee.as_ref()
                {
                    let Some(object) = self.eval_chain_object(object, scope)? else {
                        return Ok(None);
                    };
                    if *member_optional && object.is_nullish() {
                        return Ok(None);
                    }
                    let key = self.property_key(property, scope)?;
                    if *optional {
                        let method = object.get_property(&key)?;
                        if method.is_nullish() {
                            return Ok(None);
                        }
                        let args = self.eval_items(arguments, scope)?;
                        return self.call_function(&method, &object, &args).map(Some);
                    }
                    let args = self.eval_items(arguments, scope)?;
                    return self.call_method(&object, &key, &args).map(Some);
                }

                let Some(func) = self.eval_chain_object(callee, scope)? else {
                    return Ok(None);
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_items(arguments, scope)?;
                if !func.is_callable() {
                    return Err(RuntimeError::type_error(format!(
                        "{} is not a function",
                        describe_expr(callee)
                    )));
                }
                self.call_function(&func, &Value::Undefined, &args).map(Some)
            }
            other => self.eval(other, scope).map(Some),
        }
    }

    fn eval_assign(
        &mut self,
        operator: AssignOp,
        target: &AssignTarget,
        value: &Expr,
        scope: &Scope,
    ) -> EvalResult {
        // Resolve the target first so the object expression runs once.
        let member = match target {
            AssignTarget::Identifier(_) => None,
            AssignTarget::Member { object, property } => {
                let object = self.eval(object, scope)?;
                let key = self.property_key(property, scope)?;
                Some((object, key))
            }
        };
        let current = || -> EvalResult {
            match (&member, target) {
                (Some((object, key)), _) => object.get_property(key),
                (None, AssignTarget::Identifier(name)) => Ok(scope.lookup_or_placeholder(name)),
                (None, _) => Ok(Value::Undefined),
            }
        };

        let new = match operator {
            AssignOp::Assign => self.eval(value, scope)?,
            AssignOp::Compound(op) => {
                let current = current()?;
                let rhs = self.eval(value, scope)?;
                binary(op, &current, &rhs)?
            }
            AssignOp::LogicalAnd | AssignOp::LogicalOr | AssignOp::Coalesce => {
                let current = current()?;
                let keep = match operator {
                    AssignOp::LogicalAnd => !current.truthy(),
                    AssignOp::LogicalOr => current.truthy(),
                    _ => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.eval(value, scope)?
            }
        };

        match (&member, target) {
            (Some((object, key)), _) => {
                object.set_property_within(key, new.clone(), self.max_array_length)?
            }
            (None, AssignTarget::Identifier(name)) => scope.assign(name, new.clone())?,
            (None, _) => {}
        }
        Ok(new)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CALLS
    // ═══════════════════════════════════════════════════════════════════════

    /// Call a value. Calling a Placeholder yields the same Placeholder.
    pub fn call_function(&mut self, callee: &Value, this: &Value, args: &[Value]) -> EvalResult {
        match callee {
            Value::Function(closure) => {
                self.enter()?;
                let result = self.invoke_closure(closure, callee, args);
                self.depth -= 1;
                result
            }
            Value::Native(native) => {
                self.enter()?;
                let result = native.invoke(self, this, args);
                self.depth -= 1;
                result
            }
            Value::Placeholder(_) => Ok(callee.clone()),
            other => Err(RuntimeError::type_error(format!(
                "{} is not a function",
                describe(other)
            ))),
        }
    }

    fn invoke_closure(&mut self, closure: &Closure, callee: &Value, args: &[Value]) -> EvalResult {
        let def = &closure.def;
        let scope = closure.scope.child();
        if let Some(name) = &def.name {
            if scope.lookup(name).is_none() {
                scope.declare(name, callee.clone(), true);
            }
        }
        for (i, param) in def.params.iter().enumerate() {
            self.bind_pattern(param, arg(args, i), &scope, true)?;
        }
        match self.exec_block(&def.body, &scope)? {
            Completion::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    /// `object.name(args)`, with built-in methods for arrays, strings and numbers.
    pub fn call_method(&mut self, object: &Value, name: &str, args: &[Value]) -> EvalResult {
        let builtin = match object {
            Value::Placeholder(_) => return Ok(object.clone()),
            Value::Undefined | Value::Null => {
                return Err(RuntimeError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    object.to_display_string(),
                    name
                )))
            }
            Value::Array(items) => builtins::call_array_method(self, items, object, name, args)?,
            Value::String(text) => {
                builtins::call_string_method(text, name, args, self.max_array_length)?
            }
            Value::Number(n) => builtins::call_number_method(*n, name, args)?,
            _ => None,
        };
        if let Some(value) = builtin {
            return Ok(value);
        }

        let method = object.get_property(name)?;
        if !method.is_callable() {
            return Err(RuntimeError::type_error(format!(
                "{}.{} is not a function",
                describe(object),
                name
            )));
        }
        self.call_function(&method, object, args)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MARKUP
    // ═══════════════════════════════════════════════════════════════════════

    fn eval_element(&mut self, def: &ElementDef, scope: &Scope) -> EvalResult {
        let mut props = ObjectMap::new();
        for attribute in &def.attributes {
            match attribute {
                AttributeItem::Named { name, value } => {
                    let value = self.eval(value, scope)?;
                    props.insert(name.clone(), value);
                }
                AttributeItem::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    spread_entries(&source, &mut props);
                }
            }
        }

        let mut children = Vec::with_capacity(def.children.len());
        for child in &def.children {
            match child {
                ChildItem::Text(text) => children.push(Value::string(text)),
                ChildItem::Expr(expr) => children.push(self.eval(expr, scope)?),
                ChildItem::Spread(expr) => {
                    let value = self.eval(expr, scope)?;
                    children.extend(self.iterate(&value)?);
                }
            }
        }

        match &def.tag {
            ElementTag::Intrinsic(tag) => Ok(Value::node(RenderNode::element(
                tag,
                props,
                collect_children(&children)?,
            ))),
            ElementTag::Fragment => Ok(Value::node(RenderNode::Fragment(collect_children(
                &children,
            )?))),
            ElementTag::Component(expr) => {
                let component = self.eval(expr, scope)?;
                self.render_component(&component, props, children)
                    .map_err(|err| match err {
                        RuntimeError::Type(message) if !component.is_callable() => {
                            RuntimeError::Type(format!("<{}>: {}", describe_expr(expr), message))
                        }
                        other => other,
                    })
            }
        }
    }

    /// Render a component value with props and children.
    ///
    /// Callables receive one props object with `children` set; Placeholders
    /// render their children unchanged; strings act as intrinsic tags.
    pub fn render_component(
        &mut self,
        component: &Value,
        mut props: ObjectMap,
        mut children: Vec<Value>,
    ) -> EvalResult {
        match component {
            Value::Function(_) | Value::Native(_) => {
                match children.len() {
                    0 => {}
                    1 => {
                        props.insert("children".to_string(), children.remove(0));
                    }
                    _ => {
                        props.insert("children".to_string(), Value::array(children));
                    }
                }
                self.call_function(component, &Value::Undefined, &[Value::object(props)])
            }
            Value::Placeholder(name) => Ok(Value::node(RenderNode::Placeholder {
                name: name.to_string(),
                children: collect_children(&children)?,
            })),
            Value::String(tag) => Ok(Value::node(RenderNode::element(
                tag,
                props,
                collect_children(&children)?,
            ))),
            other => Err(RuntimeError::type_error(format!(
                "Element type is invalid: expected a component but got {}",
                other.type_of()
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS & HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64) as i32
}

fn key_string(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_display_string(),
    }
}

fn is_string_like(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Node(_)
    )
}

fn binary(operator: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    let int = |f: fn(i32, i32) -> i32| {
        Value::Number(f(to_int32(left.to_number()), to_int32(right.to_number())) as f64)
    };
    let compare = |f: fn(std::cmp::Ordering) -> bool| match (left, right) {
        (Value::String(a), Value::String(b)) => Value::Bool(f(a.cmp(b))),
        _ => Value::Bool(
            left.to_number()
                .partial_cmp(&right.to_number())
                .map(f)
                .unwrap_or(false),
        ),
    };

    Ok(match operator {
        BinaryOp::Add => {
            if is_string_like(left) || is_string_like(right) {
                Value::from(format!(
                    "{}{}",
                    left.to_display_string(),
                    right.to_display_string()
                ))
            } else {
                num(|a, b| a + b)
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Pow => num(f64::powf),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => compare(|o| o.is_lt()),
        BinaryOp::LtEq => compare(|o| o.is_le()),
        BinaryOp::Gt => compare(|o| o.is_gt()),
        BinaryOp::GtEq => compare(|o| o.is_ge()),
        BinaryOp::BitAnd => int(|a, b| a & b),
        BinaryOp::BitOr => int(|a, b| a | b),
        BinaryOp::BitXor => int(|a, b| a ^ b),
        BinaryOp::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
        BinaryOp::Shr => int(|a, b| a.wrapping_shr(b as u32 & 31)),
        BinaryOp::UShr => {
            let a = to_int32(left.to_number()) as u32;
            let b = to_int32(right.to_number()) as u32 & 31;
            Value::Number((a >> b) as f64)
        }
        BinaryOp::In => {
            let key = key_string(left);
            match right {
                Value::Object(map) => Value::Bool(map.borrow().contains_key(&key)),
                Value::Array(items) => Value::Bool(
                    key == "length"
                        || key
                            .parse::<usize>()
                            .map(|i| i < items.borrow().len())
                            .unwrap_or(false),
                ),
                Value::Placeholder(_) => Value::Bool(false),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        key,
                        describe(other)
                    )))
                }
            }
        }
    })
}

fn spread_entries(source: &Value, into: &mut ObjectMap) {
    match source {
        Value::Object(map) => {
            for (key, value) in map.borrow().iter() {
                into.insert(key.clone(), value.clone());
            }
        }
        Value::Array(items) => {
            for (i, value) in items.borrow().iter().enumerate() {
                into.insert(i.to_string(), value.clone());
            }
        }
        Value::String(s) => {
            for (i, c) in s.chars().enumerate() {
                into.insert(i.to_string(), Value::string(c.to_string()));
            }
        }
        _ => {}
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
        other => other.to_display_string(),
    }
}

fn describe_expr(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(name) => name.clone(),
        Expr::Member {
            object,
            property: MemberProperty::Static(name),
            ..
        } => format!("{}.{}", describe_expr(object), name),
        _ => "expression".to_string(),
    }
}

fn thrown_message(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let map = map.borrow();
            match map.get("message") {
                Some(message) => {
                    let name = map
                        .get("name")
                        .map(Value::to_display_string)
                        .unwrap_or_else(|| "Error".to_string());
                    format!("{}: {}", name, message.to_display_string())
                }
                None => "[object Object]".to_string(),
            }
        }
        other => other.to_display_string(),
    }
}

/// The value bound by `catch (e)` for an error raised inside `try`.
fn caught_value(err: &RuntimeError) -> Value {
    match err {
        RuntimeError::Thrown { value, .. } => value.clone(),
        RuntimeError::Type(message) => error_object("TypeError", message),
        RuntimeError::Reference(message) => error_object("ReferenceError", message),
        RuntimeError::Range(message) => error_object("RangeError", message),
        other => error_object("Error", &other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::lower::compile_program;
    use crate::scope::ScopeMode;

    fn run(source: &str) -> Result<Value, RuntimeError> {
        let program = compile_program(source)?;
        let scope = Scope::global(&Environment::default(), ScopeMode::Parameters).child();
        let mut interp = Interpreter::default();
        interp.run_program(&program, &scope)?;
        Ok(scope.lookup_or_placeholder("result"))
    }

    fn run_json(source: &str) -> serde_json::Value {
        run(source).unwrap().to_json()
    }

    #[test]
    fn test_closures_capture_scope() {
        let json = run_json(
            "const make = (base) => (n) => base + n; const add2 = make(2); const result = add2(3);",
        );
        assert_eq!(json, serde_json::json!(5.0));
    }

    #[test]
    fn test_destructuring_with_defaults_and_rest() {
        let json = run_json(
            "const { a, b = 2, ...others } = { a: 1, c: 3, d: 4 }; \
             const [x, , ...tail] = [10, 20, 30, 40]; \
             const result = [a, b, others, x, tail];",
        );
        assert_eq!(
            json,
            serde_json::json!([1.0, 2.0, { "c": 3.0, "d": 4.0 }, 10.0, [30.0, 40.0]])
        );
    }

    #[test]
    fn test_optional_chaining_short_circuits() {
        let json = run_json(
            "const patient = { name: null }; \
             const result = [patient.name?.first, patient.vitals?.pulse(), patient?.['name']];",
        );
        assert_eq!(json, serde_json::json!([null, null, null]));
    }

    #[test]
    fn test_loops_and_control_flow() {
        let json = run_json(
            "let total = 0; \
             for (let i = 0; i < 10; i++) { if (i % 2) continue; if (i > 6) break; total += i; } \
             for (const n of [1, 2, 3]) { total = total * 10 + n; } \
             const result = total;",
        );
        // 0 + 2 + 4 + 6 = 12, then 12 -> 121 -> 1212 -> 12123
        assert_eq!(json, serde_json::json!(12123.0));
    }

    #[test]
    fn test_try_catch_binds_thrown_value() {
        let json = run_json(
            "let result; try { throw { name: 'DoseError', message: 'bad dose' }; } catch (e) { result = e.message; }",
        );
        assert_eq!(json, serde_json::json!("bad dose"));
    }

    #[test]
    fn test_type_errors_are_catchable() {
        let json = run_json("let result; try { null.x; } catch (e) { result = e.name; }");
        assert_eq!(json, serde_json::json!("TypeError"));
    }

    #[test]
    fn test_const_reassignment_fails() {
        let err = run("const limit = 1; limit = 2;").unwrap_err();
        assert!(matches!(err, RuntimeError::Type(_)));
    }

    #[test]
    fn test_missing_names_are_placeholders() {
        let result = run("const result = Missing.deep.call(1);").unwrap();
        assert_eq!(result.placeholder_name(), Some("Missing"));
    }

    #[test]
    fn test_typeof_unbound_is_undefined() {
        assert_eq!(run_json("const result = typeof Nowhere;"), serde_json::json!("undefined"));
    }

    #[test]
    fn test_step_budget_stops_infinite_loops() {
        let program = compile_program("for (;;) {}").unwrap();
        let scope = Scope::global(&Environment::default(), ScopeMode::Parameters);
        let options = RenderOptions {
            max_steps: 500,
            ..RenderOptions::default()
        };
        let err = Interpreter::new(&options)
            .run_program(&program, &scope)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::StepLimit(500)));
    }

    #[test]
    fn test_call_depth_is_bounded() {
        let program =
            compile_program("function loop(n) { return loop(n + 1); } loop(0);").unwrap();
        let scope = Scope::global(&Environment::default(), ScopeMode::Parameters).child();
        let options = RenderOptions {
            max_call_depth: 16,
            ..RenderOptions::default()
        };
        let err = Interpreter::new(&options)
            .run_program(&program, &scope)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::CallDepth(16)));
    }

    #[test]
    fn test_markup_expands_components() {
        let result = run(
            "const Badge = ({ label, children }) => <span className=\"badge\">{label}: {children}</span>; \
             const result = <div><Badge label=\"Status\">Active</Badge>{[1, 2].map(n => <i key={n}>{n}</i>)}</div>;",
        )
        .unwrap();
        let node = match result {
            Value::Node(node) => node,
            other => panic!("expected a node, got {:?}", other),
        };
        assert_eq!(node.text_content(), "Status: Active12");
        let badge = node.find_element("span").unwrap();
        assert_eq!(badge.prop("className").and_then(Value::as_str), Some("badge"));
    }

    #[test]
    fn test_placeholder_tags_keep_children() {
        let result = run("const result = <Vitals.Panel><b>BP</b></Vitals.Panel>;").unwrap();
        let node = match result {
            Value::Node(node) => node,
            other => panic!("expected a node, got {:?}", other),
        };
        assert_eq!(node.placeholders(), vec!["Vitals"]);
        assert_eq!(node.text_content(), "BP");
    }

    #[test]
    fn test_string_concatenation_and_templates() {
        let json = run_json(
            "const n = 3; const result = [`dose: ${n * 2}mg`, 'a' + 1, 1 + 2 + '3', [1, 2] + ''];",
        );
        assert_eq!(json, serde_json::json!(["dose: 6mg", "a1", "33", "1,2"]));
    }
}
