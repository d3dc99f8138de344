//! Hierarchical variable scopes.
//!
//! An instance owns one root [`VariableScope`]. Work inside the instance reads
//! through a [`ScopeFrame`] that borrows its parent for lookups only; writes made
//! in a frame reach the parent solely through an explicit [`Propagation`].
//!
//! ```text
//!   VariableScope (instance root)      <- apply(Propagation)
//!        ^ read-only borrow
//!   ScopeFrame { local, staged }       -> into_propagation()
//! ```

mod scope;

pub use scope::{Propagation, PropagationTarget, ScopeFrame, VariableScope};

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Read access to a flat variable namespace.
///
/// Implemented by plain maps (for standalone expression evaluation) and by the
/// scope types. `None` means "no value", never a zero value.
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl VariableLookup for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl VariableLookup for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl VariableLookup for serde_json::Map<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl<T: VariableLookup + ?Sized> VariableLookup for &T {
    fn lookup(&self, name: &str) -> Option<Value> {
        (**self).lookup(name)
    }
}

/// Empty namespace; every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariables;

impl VariableLookup for NoVariables {
    fn lookup(&self, _name: &str) -> Option<Value> {
        None
    }
}
