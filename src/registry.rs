//! Multi-group loading.
//!
//! Each component group is executed as a module. The first pass runs every
//! group on the base environment alone; later passes inject the exports
//! pooled so far, so a group can use a component another group defines
//! regardless of which one was listed first.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::executor::{Executor, Module, RenderFunction, RenderOptions};
use crate::hooks::MemoryStateStore;
use crate::render::RenderNode;
use crate::value::{ObjectMap, Value};

/// Names read back from every group in addition to its own name and its
/// top-level declarations.
pub const EXPORT_CATALOGUE: &[&str] = &[
    "Component",
    "Form",
    "Layout",
    "Section",
    "Preview",
    "Fields",
    "Page",
    "default",
];

lazy_static! {
    static ref DECLARATION_RE: Regex = Regex::new(
        r"\b(?:(?:const|let|var|class)\s+|function(?:\s*\*\s*|\s+))([A-Za-z_$][\w$]*)"
    )
    .unwrap();
    static ref DESTRUCTURING_RE: Regex =
        Regex::new(r"\b(?:const|let|var)\s*[\{\[]([^\}\]]*)[\}\]]").unwrap();
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentGroup {
    pub name: String,
    #[serde(alias = "text")]
    pub source: String,
}

impl ComponentGroup {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderOptions {
    /// Total passes over the groups, clamped to `2..=groups + 1`.
    pub passes: usize,
    pub render: RenderOptions,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            passes: 2,
            render: RenderOptions::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

type ExportSet = IndexMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    exports: ExportSet,
    groups: IndexMap<String, ExportSet>,
    first_pass: IndexMap<String, ExportSet>,
    failures: IndexMap<String, String>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.exports.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exports.contains_key(name)
    }

    /// Export names in the order they were first registered.
    pub fn names(&self) -> Vec<&str> {
        self.exports.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// What `group` exported on the last pass that ran it.
    pub fn group_exports(&self, group: &str) -> Option<&ExportSet> {
        self.groups.get(group)
    }

    /// What `group` exported before anything was injected into it.
    pub fn first_pass_exports(&self, group: &str) -> Option<&ExportSet> {
        self.first_pass.get(group)
    }

    /// Groups whose last run failed, with the error message.
    pub fn failures(&self) -> &IndexMap<String, String> {
        &self.failures
    }

    pub fn entries(&self) -> impl Iterator<Item = (String, Value)> + '_ {
        self.exports.iter().map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Render the export `name` as a component. Missing exports and render
    /// failures come back as error nodes.
    pub fn render_export(
        &self,
        name: &str,
        props: ObjectMap,
        options: &RenderOptions,
    ) -> Option<RenderNode> {
        let Some(value) = self.exports.get(name) else {
            return Some(RenderNode::error(format!("No export named `{}`", name)));
        };
        let render = RenderFunction::new(
            value.clone(),
            Rc::new(MemoryStateStore::new()),
            options.clone(),
        );
        match render.render(props) {
            Ok(node) => node,
            Err(err) => {
                warn!(export = name, error = %err, "export failed to render");
                Some(RenderNode::error(err.to_string()))
            }
        }
    }

    /// Export names per group, plus failures, for hosts.
    pub fn to_json(&self) -> serde_json::Value {
        let groups: serde_json::Map<String, serde_json::Value> = self
            .groups
            .iter()
            .map(|(group, exports)| {
                let names: Vec<&str> = exports.keys().map(String::as_str).collect();
                (group.clone(), json!(names))
            })
            .collect();
        json!({
            "exports": self.names(),
            "groups": groups,
            "failures": self.failures,
        })
    }

    fn record(&mut self, group: &str, exports: ExportSet) {
        for (name, value) in &exports {
            self.exports.insert(name.clone(), value.clone());
        }
        self.groups.insert(group.to_string(), exports);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct RegistryLoader {
    env: Environment,
    options: LoaderOptions,
    executor: Executor,
}

impl RegistryLoader {
    pub fn new(env: Environment, options: LoaderOptions) -> Self {
        let executor = Executor::new(options.render.clone());
        Self {
            env,
            options,
            executor,
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Load every group and pool their exports. Never fails; a group that
    /// cannot be executed contributes nothing.
    pub fn load(&self, groups: &[ComponentGroup]) -> Registry {
        let mut registry = Registry::default();
        let passes = self.options.passes.clamp(2, groups.len().max(1) + 1);

        for group in groups {
            let exports = self.run_group(group, &self.env, &mut registry.failures);
            registry.first_pass.insert(group.name.clone(), exports.clone());
            registry.record(&group.name, exports);
        }
        debug!(groups = groups.len(), exports = registry.len(), "first pass done");

        for pass in 2..=passes {
            for group in groups {
                let env = self.injected_env(group, &registry);
                let exports = self.run_group(group, &env, &mut registry.failures);
                registry.record(&group.name, exports);
            }
            debug!(pass, exports = registry.len(), "injection pass done");
        }

        registry
    }

    /// Base environment plus every pooled export the group does not declare
    /// itself.
    fn injected_env(&self, group: &ComponentGroup, registry: &Registry) -> Environment {
        let own = declared_names(&group.source);
        self.env
            .extend(registry.entries().filter(|(name, _)| !own.contains(name)))
    }

    fn run_group(
        &self,
        group: &ComponentGroup,
        env: &Environment,
        failures: &mut IndexMap<String, String>,
    ) -> ExportSet {
        match self.executor.execute_module(&group.source, env) {
            Ok(module) => {
                failures.shift_remove(&group.name);
                extract_exports(&module, &group.name)
            }
            Err(err) => {
                warn!(group = %group.name, error = %err, "component group failed to load");
                failures.insert(group.name.clone(), err.to_string());
                ExportSet::new()
            }
        }
    }
}

fn extract_exports(module: &Module, group_name: &str) -> ExportSet {
    let mut exports = ExportSet::new();
    let candidates = EXPORT_CATALOGUE
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(group_name.to_string()))
        .chain(module.declared_names().iter().cloned());
    for name in candidates {
        if exports.contains_key(&name) {
            continue;
        }
        match module.get(&name) {
            Some(value) if !value.is_placeholder() => {
                exports.insert(name, value);
            }
            _ => {}
        }
    }
    exports
}

/// Names a source text declares for itself, found by pattern matching on
/// the raw text. Block-scoped declarations count too.
pub fn declared_names(text: &str) -> HashSet<String> {
    let mut names: HashSet<String> = DECLARATION_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();

    for caps in DESTRUCTURING_RE.captures_iter(text) {
        for part in caps[1].split(',') {
            let part = part.trim().trim_start_matches("...");
            let local = part.rsplit(':').next().unwrap_or(part);
            let local = local.split('=').next().unwrap_or(local).trim();
            if IDENTIFIER_RE.is_match(local) {
                names.insert(local.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: HashSet<String>) -> Vec<String> {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names
    }

    #[test]
    fn test_declared_names_plain() {
        let text = "const A = 1;\nlet b;\nfunction C() {}\nclass D {}\nvar e = 2;";
        assert_eq!(sorted(declared_names(text)), vec!["A", "C", "D", "b", "e"]);
    }

    #[test]
    fn test_declared_names_destructuring() {
        let text = "const { a, b: renamed, c = 1, ...rest } = props;\nconst [x, y] = pair;";
        assert_eq!(
            sorted(declared_names(text)),
            vec!["a", "c", "renamed", "rest", "x", "y"]
        );
    }

    #[test]
    fn test_declared_names_ignore_lookalikes() {
        let text = "const constant = functional(); Header();";
        assert_eq!(sorted(declared_names(text)), vec!["constant"]);
    }

    #[test]
    fn test_group_source_alias() {
        let group: ComponentGroup =
            serde_json::from_str(r#"{"name": "X", "text": "const Y = 1;"}"#).unwrap();
        assert_eq!(group, ComponentGroup::new("X", "const Y = 1;"));
    }
}
