//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types.

use serde::{Deserialize, Serialize};

/// Macro to define a type-safe sequential ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - Conversion methods: `new()`, `as_u64()`, `next()`
/// - `From<u64>` and `Into<u64>` implementations
///
/// # Example
///
/// ```rust
/// # use cartsync_core::define_id;
/// define_id!(IntentId);
/// define_id!(NoticeId);
///
/// let intent_id = IntentId::new(1);
/// let notice_id = NoticeId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: IntentId = notice_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new ID from a u64 value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying u64 value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            /// The ID that follows this one.
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0.saturating_add(1))
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(IntentId);
define_id!(NoticeId);

/// Prefix for line IDs minted locally for lines the server hasn't created yet.
const OPTIMISTIC_LINE_PREFIX: &str = "optimistic-line-";

/// A cart line identifier.
///
/// Server lines carry Shopify global IDs (`gid://shopify/CartLine/...`).
/// Lines added optimistically get a local ID derived from the intent that
/// created them until the server assigns the real one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(String);

impl LineId {
    /// Wrap a server-assigned line ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Local ID for the synthetic line produced by an add intent.
    #[must_use]
    pub fn optimistic(intent: IntentId) -> Self {
        Self(format!("{OPTIMISTIC_LINE_PREFIX}{intent}"))
    }

    /// Whether this ID was minted locally rather than by the server.
    #[must_use]
    pub fn is_optimistic(&self) -> bool {
        self.0.starts_with(OPTIMISTIC_LINE_PREFIX)
    }

    /// Borrow the raw ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ::core::fmt::Display for LineId {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_next_is_monotonic() {
        let id = IntentId::new(41);
        assert_eq!(id.next().as_u64(), 42);
        assert!(id < id.next());
    }

    #[test]
    fn test_id_saturates() {
        let id = NoticeId::new(u64::MAX);
        assert_eq!(id.next(), id);
    }

    #[test]
    fn test_optimistic_line_id() {
        let id = LineId::optimistic(IntentId::new(7));
        assert!(id.is_optimistic());
        assert_eq!(id.as_str(), "optimistic-line-7");
    }

    #[test]
    fn test_server_line_id_is_not_optimistic() {
        let id = LineId::new("gid://shopify/CartLine/abc123");
        assert!(!id.is_optimistic());
        assert_eq!(id.to_string(), "gid://shopify/CartLine/abc123");
    }

    #[test]
    fn test_line_id_serializes_transparently() {
        let json = serde_json::to_string(&LineId::from("L1")).unwrap_or_default();
        assert_eq!(json, "\"L1\"");
    }
}
