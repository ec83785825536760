// src/state.rs

//! Process-wide state: the pipeline context store shared between directive
//! evaluations, and the compiled-result cache read by tooling.

use crate::constants::UNSET_SENTINEL;
use crate::models::ParsedResult;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// The `output` slot plus variable overrides carried between directives and runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineContext {
    pub output: Option<String>,
    pub variables: BTreeMap<String, String>,
}

impl PipelineContext {
    /// Merges updates with the override rules: a value starting with `$` removes
    /// the key, an empty value is ignored, anything else overwrites.
    pub fn merge<I, K, V>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in updates {
            let key = key.into();
            let value = value.into();
            if value.starts_with(UNSET_SENTINEL) {
                self.variables.remove(&key);
            } else if !value.is_empty() {
                self.variables.insert(key, value);
            }
        }
    }

    /// Everything as name -> value bindings, `output` included.
    pub fn bindings(&self) -> HashMap<String, String> {
        let mut bindings: HashMap<String, String> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(output) = &self.output {
            bindings.insert("output".to_string(), output.clone());
        }
        bindings
    }
}

/// A mutex-guarded [`PipelineContext`], created lazily on first use.
///
/// Every mutation runs under one lock acquisition, so readers never observe a
/// half-merged map.
#[derive(Debug, Default)]
pub struct ContextStore {
    inner: Mutex<Option<PipelineContext>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PipelineContext>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` against the context as one read-merge-write step.
    pub fn update<R>(&self, f: impl FnOnce(&mut PipelineContext) -> R) -> R {
        let mut guard = self.lock();
        f(guard.get_or_insert_with(PipelineContext::default))
    }

    pub fn merge<I, K, V>(&self, updates: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.update(|ctx| ctx.merge(updates));
    }

    pub fn set_output(&self, output: impl Into<String>) {
        let output = output.into();
        self.update(|ctx| ctx.output = Some(output));
    }

    pub fn snapshot(&self) -> PipelineContext {
        self.lock().clone().unwrap_or_default()
    }

    /// Drops the context; the next use starts from an empty one.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }
}

static GLOBAL_CONTEXT: OnceLock<Arc<ContextStore>> = OnceLock::new();

/// The store shared by every session that was not handed its own.
pub fn global_context() -> Arc<ContextStore> {
    GLOBAL_CONTEXT
        .get_or_init(|| Arc::new(ContextStore::new()))
        .clone()
}

// --- COMPILED RESULTS ---

static COMPILED_RESULTS: OnceLock<Mutex<HashMap<String, ParsedResult>>> = OnceLock::new();

fn lock_compiled() -> MutexGuard<'static, HashMap<String, ParsedResult>> {
    COMPILED_RESULTS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Records a successful walk under its document name.
pub fn cache_compiled(name: &str, result: &ParsedResult) {
    lock_compiled().insert(name.to_string(), result.clone());
}

pub fn compiled(name: &str) -> Option<ParsedResult> {
    lock_compiled().get(name).cloned()
}

/// Names of every cached document, sorted.
pub fn compiled_names() -> Vec<String> {
    let mut names: Vec<String> = lock_compiled().keys().cloned().collect();
    names.sort();
    names
}

pub fn clear_compiled() {
    lock_compiled().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_rules() {
        let mut ctx = PipelineContext::default();
        ctx.merge([("a", "1"), ("b", "2")]);
        ctx.merge([("a", "$"), ("b", ""), ("c", "3")]);
        assert_eq!(ctx.variables.get("a"), None);
        assert_eq!(ctx.variables.get("b").map(String::as_str), Some("2"));
        assert_eq!(ctx.variables.get("c").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_store_lifecycle() {
        let store = ContextStore::new();
        assert!(!store.is_initialized());
        store.set_output("done");
        store.merge([("k", "v")]);
        let bindings = store.snapshot().bindings();
        assert_eq!(bindings.get("output").map(String::as_str), Some("done"));
        assert_eq!(bindings.get("k").map(String::as_str), Some("v"));
        store.clear();
        assert!(!store.is_initialized());
        assert_eq!(store.snapshot(), PipelineContext::default());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(ContextStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.merge([(format!("k{}-{}", i, j), "v")]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot().variables.len(), 400);
    }

    #[test]
    fn test_compiled_cache() {
        let result = ParsedResult {
            shire_output: "out".into(),
            ..Default::default()
        };
        cache_compiled("state-test.shire", &result);
        assert_eq!(
            compiled("state-test.shire").map(|r| r.shire_output),
            Some("out".to_string())
        );
        assert!(compiled_names().contains(&"state-test.shire".to_string()));
    }
}
