//! Native functions callable from scripts
//!
//! The compiler checks calls against this table (name and arity), the VM
//! dispatches to it at runtime.

use crate::bytecode::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A host function exposed to scripts
#[derive(Clone)]
pub struct Native {
    /// Required argument count, `None` for variadic
    pub arity: Option<usize>,
    func: NativeFn,
}

impl Native {
    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.func)(args)
    }

    pub fn accepts(&self, argc: usize) -> bool {
        self.arity.map_or(true, |arity| arity == argc)
    }
}

/// Native function table
#[derive(Clone, Default)]
pub struct Natives {
    functions: HashMap<String, Native>,
}

impl Natives {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in `print`
    pub fn with_defaults() -> Self {
        let mut natives = Self::new();
        natives.register("print", None, |args| {
            let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
            tracing::info!(target: "scripting", "{}", line);
            Ok(Value::Null)
        });
        natives
    }

    /// Register (or replace) a native function
    pub fn register<F>(&mut self, name: impl Into<String>, arity: Option<usize>, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(
            name.into(),
            Native {
                arity,
                func: Arc::new(func),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Native> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl fmt::Debug for Natives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("Natives").field("functions", &names).finish()
    }
}
