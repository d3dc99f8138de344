//! Strongly-typed identifiers.
//!
//! Identifiers come from the process definition and are stable for its
//! lifetime. Emptiness is rejected by `from_string` and by definition
//! validation; the infallible `From` conversions exist for builders and tests.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, From<&str>/From<String>,
/// Borrow<str>, Serialize, Deserialize (transparent).
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id!(ElementId);
define_id!(FlowId);
define_id!(BpmnProcessId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_rejects_empty() {
        assert!(ElementId::from_string(String::new()).is_err());
        assert_eq!(
            ElementId::from_string("task-a".to_string()).unwrap().as_str(),
            "task-a"
        );
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = FlowId::from("flow-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"flow-1\"");
        let back: FlowId = serde_json::from_str("\"flow-1\"").unwrap();
        assert_eq!(back, "flow-1");
    }
}
