//! Demo content store
//!
//! Scripts change it through the `define` and `remove` natives. Every change
//! is an [`Action`] applied through the shared [`ActionLog`].

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tweaker_core::{Action, ActionLog};
use tweaker_scripting::{Natives, Value};

/// Key/value content shared between natives and the host
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Set `key` to `value`
pub struct DefineEntry {
    store: ContentStore,
    key: String,
    value: String,
}

impl Action for DefineEntry {
    fn apply(&mut self) {
        self.store.entries.lock().insert(self.key.clone(), self.value.clone());
    }

    fn describe(&self) -> String {
        format!("Defining {} = {}", self.key, self.value)
    }
}

/// Remove `key`
pub struct RemoveEntry {
    store: ContentStore,
    key: String,
}

impl Action for RemoveEntry {
    fn apply(&mut self) {
        self.store.entries.lock().remove(&self.key);
    }

    fn describe(&self) -> String {
        format!("Removing {}", self.key)
    }
}

/// Register `define(key, value)` and `remove(key)`
pub fn register_natives(natives: &mut Natives, store: &ContentStore, actions: &ActionLog) {
    let (define_store, define_log) = (store.clone(), actions.clone());
    natives.register("define", Some(2), move |args| match args {
        [Value::String(key), value] => {
            define_log.apply(Box::new(DefineEntry {
                store: define_store.clone(),
                key: key.clone(),
                value: value.to_string(),
            }));
            Ok(Value::Null)
        }
        [other, _] => Err(format!("key must be a string, got {}", other.type_name())),
        _ => Err("expected 2 arguments".into()),
    });

    let (remove_store, remove_log) = (store.clone(), actions.clone());
    natives.register("remove", Some(1), move |args| match args {
        [Value::String(key)] => {
            let existed = remove_store.get(key).is_some();
            if existed {
                remove_log.apply(Box::new(RemoveEntry {
                    store: remove_store.clone(),
                    key: key.clone(),
                }));
            }
            Ok(Value::Bool(existed))
        }
        [other] => Err(format!("key must be a string, got {}", other.type_name())),
        _ => Err("expected 1 argument".into()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tweaker_core::BuildSettings;
    use tweaker_runtime::{MemorySource, ScriptBackend, Tweaker};
    use tweaker_scripting::BracketRegistry;

    #[test]
    fn test_natives_apply_actions() {
        let store = ContentStore::new();
        let actions = ActionLog::new();
        let mut natives = Natives::with_defaults();
        register_natives(&mut natives, &store, &actions);

        let define = natives.get("define").unwrap();
        define.call(&[Value::String("stone".into()), Value::Number(64.0)]).unwrap();
        assert!(define.call(&[Value::Null, Value::Null]).is_err());

        let remove = natives.get("remove").unwrap();
        assert_eq!(remove.call(&[Value::String("dirt".into())]), Ok(Value::Bool(false)));

        assert_eq!(store.get("stone").as_deref(), Some("64"));
        assert_eq!(actions.descriptions(), vec!["Defining stone = 64"]);
    }

    #[test]
    fn test_scripts_mutate_store() {
        let store = ContentStore::new();
        let actions = ActionLog::new();
        let mut natives = Natives::with_defaults();
        register_natives(&mut natives, &store, &actions);

        let backend = ScriptBackend::new(natives, BracketRegistry::with_namespaces(["item"]));
        let tweaker = Tweaker::new(backend, BuildSettings::new()).with_action_log(actions.clone());
        let source = MemorySource::new().with_text_group(
            "content.zs",
            [(
                "content.zs",
                "define('stone', <item:minecraft:stone>);\ndefine('dirt', 1);\nremove('dirt');",
            )],
        );

        let report = tweaker.load(&source).unwrap();

        assert!(report.success(), "{:?}", report.messages());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("stone").as_deref(), Some("item:minecraft:stone"));
        assert_eq!(
            tweaker.actions().descriptions(),
            vec![
                "Defining stone = item:minecraft:stone",
                "Defining dirt = 1",
                "Removing dirt",
            ]
        );
    }
}
