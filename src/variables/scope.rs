//! Root scope, child frames and parent-ward propagation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::VariableLookup;

/// Root variable scope of a process instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableScope {
    variables: BTreeMap<String, Value>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scope seeded with the given variables.
    pub fn from_variables<I, K>(variables: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Open a child frame reading through this scope.
    pub fn child(&self) -> ScopeFrame<'_> {
        ScopeFrame::new(self)
    }
}

impl VariableLookup for VariableScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }
}

impl From<BTreeMap<String, Value>> for VariableScope {
    fn from(variables: BTreeMap<String, Value>) -> Self {
        Self { variables }
    }
}

impl From<HashMap<String, Value>> for VariableScope {
    fn from(variables: HashMap<String, Value>) -> Self {
        Self::from_variables(variables)
    }
}

impl From<serde_json::Map<String, Value>> for VariableScope {
    fn from(variables: serde_json::Map<String, Value>) -> Self {
        Self::from_variables(variables)
    }
}

/// Writes staged in a frame, destined for its parent.
///
/// Only keys that were explicitly written with `set_variable` are carried;
/// applying a propagation never touches any other key of the parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Propagation {
    writes: BTreeMap<String, Value>,
}

impl Propagation {
    pub fn writes(&self) -> &BTreeMap<String, Value> {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// A scope that can receive propagated writes from a child frame.
pub trait PropagationTarget {
    /// Merge the propagated writes; returns how many keys were written.
    fn apply_propagation(&mut self, propagation: Propagation) -> usize;
}

impl PropagationTarget for VariableScope {
    fn apply_propagation(&mut self, propagation: Propagation) -> usize {
        let count = propagation.writes.len();
        self.variables.extend(propagation.writes);
        count
    }
}

/// A child scope over a borrowed parent.
///
/// Lookup order is local entries, then staged (propagating) entries, then the
/// parent chain. The parent is never written through the frame; staged writes
/// leave the frame only via [`ScopeFrame::into_propagation`].
pub struct ScopeFrame<'p> {
    parent: &'p dyn VariableLookup,
    local: BTreeMap<String, Value>,
    staged: BTreeMap<String, Value>,
}

impl<'p> ScopeFrame<'p> {
    pub fn new(parent: &'p dyn VariableLookup) -> Self {
        Self {
            parent,
            local: BTreeMap::new(),
            staged: BTreeMap::new(),
        }
    }

    pub fn get_variable(&self, key: &str) -> Option<Value> {
        self.local
            .get(key)
            .or_else(|| self.staged.get(key))
            .cloned()
            .or_else(|| self.parent.lookup(key))
    }

    /// Stage a write for the parent scope.
    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.staged.insert(key.into(), value);
    }

    /// Write into this frame only.
    pub fn set_variable_local(&mut self, key: impl Into<String>, value: Value) {
        self.local.insert(key.into(), value);
    }

    pub fn local_variables(&self) -> &BTreeMap<String, Value> {
        &self.local
    }

    pub fn staged_variables(&self) -> &BTreeMap<String, Value> {
        &self.staged
    }

    /// Open a nested frame reading through this one.
    pub fn child(&self) -> ScopeFrame<'_> {
        ScopeFrame::new(self)
    }

    /// Close the frame, dropping local entries and handing back the staged
    /// writes for the parent.
    pub fn into_propagation(self) -> Propagation {
        Propagation {
            writes: self.staged,
        }
    }
}

impl VariableLookup for ScopeFrame<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get_variable(name)
    }
}

// Writes received from a nested frame keep travelling upward when this frame
// itself propagates.
impl PropagationTarget for ScopeFrame<'_> {
    fn apply_propagation(&mut self, propagation: Propagation) -> usize {
        let count = propagation.writes.len();
        self.staged.extend(propagation.writes);
        count
    }
}

impl fmt::Debug for ScopeFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFrame")
            .field("local", &self.local)
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}
