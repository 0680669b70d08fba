//! Type- and name-keyed dependency injection for procedural steps. A
//! procedural step's opaque function receives a [`DependencyMap`]
//! alongside its params and previous result, the same way a handler
//! elsewhere in this crate is handed its runtime dependencies rather
//! than reaching into globals.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type DynDependency = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default, Debug)]
pub struct DependencyMap {
    typed: Arc<RwLock<HashMap<TypeId, DynDependency>>>,
    named: Arc<RwLock<HashMap<String, DynDependency>>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T>(&self, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut typed = self
            .typed
            .write()
            .expect("dependency typed map lock poisoned");
        typed.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let typed = self.typed.read().ok()?;
        let value = typed.get(&TypeId::of::<T>())?.clone();
        Arc::downcast::<T>(value).ok()
    }

    pub fn insert_named<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut named = self
            .named
            .write()
            .expect("dependency named map lock poisoned");
        named.insert(key.into(), Arc::new(value));
    }

    pub fn get_named<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let named = self.named.read().ok()?;
        let value = named.get(key)?.clone();
        Arc::downcast::<T>(value).ok()
    }

    /// Returns a new map holding everything from `self`, with every
    /// entry in `overrides` replacing the one of the same key. Used to
    /// compute the runtime dependency set for a procedural step from a
    /// base map plus any later overrides.
    pub fn merged_with(&self, overrides: &DependencyMap) -> DependencyMap {
        let merged = DependencyMap::new();

        {
            let mut dst_typed = merged
                .typed
                .write()
                .expect("dependency typed map lock poisoned");
            if let Ok(src_typed) = self.typed.read() {
                for (key, value) in &*src_typed {
                    dst_typed.insert(*key, value.clone());
                }
            }
            if let Ok(src_typed_override) = overrides.typed.read() {
                for (key, value) in &*src_typed_override {
                    dst_typed.insert(*key, value.clone());
                }
            }
        }

        {
            let mut dst_named = merged
                .named
                .write()
                .expect("dependency named map lock poisoned");
            if let Ok(src_named) = self.named.read() {
                for (key, value) in &*src_named {
                    dst_named.insert(key.clone(), value.clone());
                }
            }
            if let Ok(src_named_override) = overrides.named.read() {
                for (key, value) in &*src_named_override {
                    dst_named.insert(key.clone(), value.clone());
                }
            }
        }

        merged
    }
}
