//! Environment assembly.
//!
//! Sources are layered in a fixed order: primitives (and their aliases),
//! stateful bindings, namespace tables, components, host globals and finally
//! the built-in globals. Later layers overwrite earlier ones and nothing
//! ever errors on a duplicate key.

use indexmap::IndexMap;
use tracing::debug;

use crate::builtins::global_constants;
use crate::hooks::default_stateful_bindings;
use crate::render::{collect_children, RenderNode};
use crate::value::{arg, ObjectMap, Value};

/// Flat, ordered name to value map visible to executed source.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Copy of this environment with `entries` added on top.
    pub fn extend<I>(&self, entries: I) -> Environment
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut bindings = self.bindings.clone();
        bindings.extend(entries);
        Environment { bindings }
    }

    pub fn lookup_or_placeholder(&self, name: &str) -> Value {
        self.bindings
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::placeholder(name))
    }
}

impl FromIterator<(String, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Environment {
            bindings: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentBuilder {
    primitives: IndexMap<String, Value>,
    stateful: IndexMap<String, Value>,
    namespaces: IndexMap<String, ObjectMap>,
    components: IndexMap<String, Value>,
    globals: IndexMap<String, Value>,
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with `standard_primitives` and the default
    /// stateful bindings.
    pub fn standard() -> Self {
        Self::new()
            .with_primitives(standard_primitives())
            .with_stateful_bindings(default_stateful_bindings())
    }

    pub fn with_primitives<I>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.primitives.extend(table);
        self
    }

    /// Register `alias -> target` pairs against primitives already seeded.
    pub fn with_aliases<'a, I>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (alias, target) in aliases {
            match self.primitives.get(target).cloned() {
                Some(value) => {
                    self.primitives.insert(alias.to_string(), value);
                }
                None => debug!(alias, target, "alias target is not a known primitive"),
            }
        }
        self
    }

    /// Replace the stateful-binding table wholesale.
    pub fn with_stateful_bindings<I>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.stateful = table.into_iter().collect();
        self
    }

    /// Merge members into the namespace `name`, later members winning.
    pub fn with_namespace<I>(mut self, name: &str, table: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.namespaces
            .entry(name.to_string())
            .or_default()
            .extend(table);
        self
    }

    pub fn with_components<I>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.components.extend(components);
        self
    }

    pub fn with_globals<I>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.globals.extend(globals);
        self
    }

    /// Flatten every layer into one `Environment`.
    pub fn build_scope(&self) -> Environment {
        let mut bindings: IndexMap<String, Value> = IndexMap::new();
        bindings.extend(self.primitives.iter().map(|(k, v)| (k.clone(), v.clone())));
        bindings.extend(self.stateful.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (name, members) in &self.namespaces {
            bindings.insert(name.clone(), Value::object(members.clone()));
        }
        bindings.extend(self.components.iter().map(|(k, v)| (k.clone(), v.clone())));
        bindings.extend(self.globals.iter().map(|(k, v)| (k.clone(), v.clone())));
        bindings.extend(global_constants());

        debug!(
            primitives = self.primitives.len(),
            namespaces = self.namespaces.len(),
            components = self.components.len(),
            total = bindings.len(),
            "built environment"
        );
        Environment { bindings }
    }
}

/// Native constructor that renders `tag` with the props it is given.
/// `children` in props become the element's children.
pub fn primitive(name: &str, tag: &'static str) -> Value {
    Value::native(name, move |_, _, args| {
        let mut props = match arg(args, 0) {
            Value::Object(map) => map.borrow().clone(),
            _ => ObjectMap::new(),
        };
        let children = props.shift_remove("children").unwrap_or(Value::Undefined);
        let children = collect_children(std::slice::from_ref(&children))?;
        Ok(Value::node(RenderNode::element(tag, props, children)))
    })
}

/// A small primitive table mapping form building blocks to host tags.
pub fn standard_primitives() -> IndexMap<String, Value> {
    [
        ("Box", "div"),
        ("Stack", "div"),
        ("Row", "div"),
        ("Card", "section"),
        ("Text", "span"),
        ("Heading", "h2"),
        ("Label", "label"),
        ("Input", "input"),
        ("TextArea", "textarea"),
        ("Select", "select"),
        ("Option", "option"),
        ("Checkbox", "input"),
        ("Button", "button"),
        ("Divider", "hr"),
    ]
    .into_iter()
    .map(|(name, tag)| (name.to_string(), primitive(name, tag)))
    .collect()
}
