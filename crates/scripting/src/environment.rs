//! Group symbol environment
//!
//! One `GlobalEnvironment` exists per script group. Units of the group are
//! parsed against it in order; each successfully parsed unit commits its
//! globals and functions so later units (and the compiler) can resolve them.

use crate::bytecode::Value;
use crate::host::Natives;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves bracket expressions such as `<item:minecraft:stone>`
pub trait BracketHandler: Send + Sync {
    /// `parts` are the colon-separated segments between `<` and `>`
    fn resolve(&self, parts: &[String]) -> Option<Value>;
}

/// Resolves `<namespace:rest...>` to the string `"namespace:rest..."`
pub struct NamespaceBrackets {
    namespace: String,
}

impl NamespaceBrackets {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl BracketHandler for NamespaceBrackets {
    fn resolve(&self, parts: &[String]) -> Option<Value> {
        match parts {
            [namespace, rest @ ..] if !rest.is_empty() && *namespace == self.namespace => {
                Some(Value::String(parts.join(":")))
            }
            _ => None,
        }
    }
}

/// Ordered set of bracket handlers; the first match wins
#[derive(Default)]
pub struct BracketRegistry {
    handlers: Vec<Box<dyn BracketHandler>>,
}

impl BracketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one `NamespaceBrackets` per namespace
    pub fn with_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for namespace in namespaces {
            registry.register(NamespaceBrackets::new(namespace));
        }
        registry
    }

    pub fn register(&mut self, handler: impl BracketHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn resolve(&self, parts: &[String]) -> Option<Value> {
        self.handlers.iter().find_map(|handler| handler.resolve(parts))
    }
}

impl fmt::Debug for BracketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BracketRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Signature of a script function declared in the group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub arity: usize,
    /// Unit that declared it
    pub unit: String,
}

/// Symbol environment shared by all units of one group
#[derive(Debug)]
pub struct GlobalEnvironment {
    group: String,
    /// Global name -> declaring unit
    globals: HashMap<String, String>,
    functions: HashMap<String, FunctionSignature>,
    natives: Arc<Natives>,
    brackets: Arc<BracketRegistry>,
}

impl GlobalEnvironment {
    pub fn new(group: impl Into<String>, natives: Arc<Natives>, brackets: Arc<BracketRegistry>) -> Self {
        Self {
            group: group.into(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            natives,
            brackets,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn natives(&self) -> &Natives {
        &self.natives
    }

    pub fn resolve_bracket(&self, parts: &[String]) -> Option<Value> {
        self.brackets.resolve(parts)
    }

    /// Unit that already declared `name` as a global or function
    pub fn declared_in(&self, name: &str) -> Option<&str> {
        self.globals
            .get(name)
            .map(String::as_str)
            .or_else(|| self.functions.get(name).map(|f| f.unit.as_str()))
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub(crate) fn declare_global(&mut self, name: String, unit: &str) {
        self.globals.insert(name, unit.to_string());
    }

    pub(crate) fn declare_function(&mut self, name: String, arity: usize, unit: &str) {
        self.functions.insert(
            name,
            FunctionSignature {
                arity,
                unit: unit.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(path: &str) -> Vec<String> {
        path.split(':').map(String::from).collect()
    }

    #[test]
    fn test_namespace_brackets() {
        let registry = BracketRegistry::with_namespaces(["item", "ore"]);

        assert_eq!(
            registry.resolve(&parts("item:minecraft:stone")),
            Some(Value::String("item:minecraft:stone".into()))
        );
        assert_eq!(
            registry.resolve(&parts("ore:ingotIron")),
            Some(Value::String("ore:ingotIron".into()))
        );
        assert_eq!(registry.resolve(&parts("item")), None);
        assert_eq!(registry.resolve(&parts("entity:pig")), None);
    }

    #[test]
    fn test_declarations() {
        let mut env = GlobalEnvironment::new(
            "group",
            Arc::new(Natives::with_defaults()),
            Arc::new(BracketRegistry::new()),
        );

        env.declare_global("limit".into(), "a.zs");
        env.declare_function("helper".into(), 2, "b.zs");

        assert_eq!(env.group(), "group");
        assert!(env.has_global("limit"));
        assert_eq!(env.function("helper").map(|f| f.arity), Some(2));
        assert_eq!(env.declared_in("limit"), Some("a.zs"));
        assert_eq!(env.declared_in("helper"), Some("b.zs"));
        assert_eq!(env.declared_in("print"), None);
        assert!(env.natives().contains("print"));
    }
}
