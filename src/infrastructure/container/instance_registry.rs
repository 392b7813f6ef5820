use super::types::{Instance, Type};
use crate::errors::ContainerError;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
struct Entries {
    by_name: HashMap<String, Instance>,
    order: Vec<String>,
}

/// Cache of constructed shared instances, keyed by name.
///
/// An entry, once present, is never replaced. Construction of a missing
/// entry goes through [`InstanceRegistry::or_else_get`], which serializes
/// builders per name so each name is built at most once.
#[derive(Default)]
pub struct InstanceRegistry {
    entries: RwLock<Entries>,
    build_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-built instance, e.g. a constant.
    pub fn add(&self, name: impl Into<String>, instance: Instance) -> Result<(), ContainerError> {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.by_name.contains_key(&name) {
            return Err(ContainerError::DuplicateInstance(name));
        }
        trace!(instance = %name, "instance registered");
        entries.order.push(name.clone());
        entries.by_name.insert(name, instance);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Instance> {
        self.entries.read().by_name.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().by_name.contains_key(name)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single instance matching `ty`; none or several is an error.
    pub fn find_by_type(&self, ty: &Type) -> Result<Instance, ContainerError> {
        let mut candidates = self.find_all_named_by_type(ty);
        match candidates.len() {
            0 => Err(ContainerError::TypeNotFound(ty.name().to_string())),
            1 => Ok(candidates.remove(0).1),
            _ => Err(ContainerError::Ambiguous {
                type_name: ty.name().to_string(),
                candidates: candidates.into_iter().map(|(name, _)| name).collect(),
            }),
        }
    }

    /// Every instance matching `ty`, in registration order.
    pub fn find_all_by_type(&self, ty: &Type) -> Vec<Instance> {
        self.find_all_named_by_type(ty)
            .into_iter()
            .map(|(_, instance)| instance)
            .collect()
    }

    /// Every `(name, instance)` pair matching `ty`, taken from one snapshot.
    pub fn find_all_named_by_type(&self, ty: &Type) -> Vec<(String, Instance)> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|name| {
                let instance = entries.by_name.get(name)?;
                instance
                    .instance_type()
                    .matches(ty)
                    .then(|| (name.clone(), instance.clone()))
            })
            .collect()
    }

    /// Instances matching `ty` in registration order, plus the names of all
    /// live instances, both read under one lock.
    pub fn snapshot_by_type(&self, ty: &Type) -> (Vec<Instance>, HashSet<String>) {
        let entries = self.entries.read();
        let matching = entries
            .order
            .iter()
            .filter_map(|name| entries.by_name.get(name))
            .filter(|instance| instance.instance_type().matches(ty))
            .cloned()
            .collect();
        let names = entries.order.iter().cloned().collect();
        (matching, names)
    }

    /// Returns the instance registered under `name`, building and storing it
    /// with `builder` if absent.
    ///
    /// Concurrent callers for the same name wait on a per-name lock; only the
    /// first runs `builder`, the rest observe its stored result. A failed
    /// build stores nothing, so the next caller builds again. `builder` must
    /// not resolve `name` itself.
    pub fn or_else_get<F>(&self, name: &str, builder: F) -> Result<Instance, ContainerError>
    where
        F: FnOnce() -> Result<Instance, ContainerError>,
    {
        if let Some(existing) = self.find(name) {
            return Ok(existing);
        }

        let lock = self
            .build_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock();

        let result = match self.find(name) {
            Some(existing) => {
                trace!(instance = %name, "instance built by a concurrent caller");
                Ok(existing)
            }
            None => builder().map(|built| self.install(name, built)),
        };
        drop(guard);
        drop(lock);
        self.release_build_lock(name);
        result
    }

    // Drops the per-name lock entry once only the map still holds it. Callers
    // release their own handle first, so the last one out removes it.
    fn release_build_lock(&self, name: &str) {
        self.build_locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn pending_build_locks(&self) -> usize {
        self.build_locks.len()
    }

    // An entry added through `add` while the builder ran wins.
    fn install(&self, name: &str, instance: Instance) -> Instance {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.by_name.get(name) {
            return existing.clone();
        }
        entries.order.push(name.to_string());
        entries.by_name.insert(name.to_string(), instance.clone());
        instance
    }
}
