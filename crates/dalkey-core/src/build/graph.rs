//! Module graph.
//!
//! Forward edges record what each module imports; reverse edges record who
//! imports each module. The two sides are kept consistent by construction:
//! [`ModuleGraph::insert`] is the only way edges enter the graph, and it
//! writes both directions. Reverse edges drive hot-update propagation.

use crate::resolver::DependencyInfo;
use std::collections::{HashMap, HashSet};

/// One discovered module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Module identity (canonical path or virtual id).
    pub id: String,
    /// Resolved import edges, in source order.
    pub dependencies: Vec<DependencyInfo>,
    /// Whether the module was an entry point.
    pub is_entry: bool,
}

/// Dependency graph for one session.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: HashMap<String, ModuleRecord>,
    /// Reverse edges: module id → ids of modules importing it.
    importers: HashMap<String, HashSet<String>>,
}

impl ModuleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module record, wiring reverse edges for every resolved
    /// dependency. Replaces any previous record for the same id.
    pub fn insert(&mut self, record: ModuleRecord) {
        // A re-insert replaces the module's out-edges, so drop the reverse
        // edges the old record contributed first.
        if let Some(old) = self.modules.get(&record.id) {
            for dep in &old.dependencies {
                if let Some(resolved) = &dep.resolved {
                    if let Some(set) = self.importers.get_mut(resolved) {
                        set.remove(&record.id);
                    }
                }
            }
        }

        for dep in &record.dependencies {
            if let Some(resolved) = &dep.resolved {
                self.importers
                    .entry(resolved.clone())
                    .or_default()
                    .insert(record.id.clone());
            }
        }

        self.modules.insert(record.id.clone(), record);
    }

    /// Record a single importer edge without touching the module record.
    ///
    /// Used when a traversal revisits an already-processed module through a
    /// new importer.
    pub fn add_importer(&mut self, id: &str, importer: &str) {
        self.importers
            .entry(id.to_string())
            .or_default()
            .insert(importer.to_string());
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Direct importers of a module.
    #[must_use]
    pub fn importers_of(&self, id: &str) -> Vec<&str> {
        self.importers
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// The full transitive importer closure of a module, including the
    /// module itself. This is the conservative affected set for a change.
    #[must_use]
    pub fn affected_by(&self, id: &str) -> HashSet<String> {
        let mut affected = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !affected.insert(current.clone()) {
                continue;
            }
            if let Some(importers) = self.importers.get(&current) {
                stack.extend(importers.iter().cloned());
            }
        }
        affected
    }

    /// Remove a module and the reverse edges it contributed. Importer edges
    /// pointing at the removed id are kept, so re-discovery reconnects it.
    pub fn remove(&mut self, id: &str) -> Option<ModuleRecord> {
        let record = self.modules.remove(id)?;
        for dep in &record.dependencies {
            if let Some(resolved) = &dep.resolved {
                if let Some(set) = self.importers.get_mut(resolved) {
                    set.remove(id);
                }
            }
        }
        Some(record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}
