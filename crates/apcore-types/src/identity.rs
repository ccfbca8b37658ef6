//! Caller identity.
//!
//! An [`Identity`] describes *who* initiated a call: a human, a service, an
//! agent. It is identity only; whether the caller is *allowed* to do
//! something is decided by the ACL engine against this record.
//!
//! Identities are frozen after construction: all fields are private and
//! only builder-style constructors mutate them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// The actor behind a call.
///
/// `roles` is a set (cheap intersection tests for ACL role conditions);
/// `attrs` carries free-form key/value attributes.
///
/// # Example
///
/// ```
/// use apcore_types::Identity;
///
/// let identity = Identity::new("svc-batch")
///     .with_kind("service")
///     .with_role("reporting")
///     .with_role("batch");
///
/// assert_eq!(identity.kind(), "service");
/// assert!(identity.has_role("batch"));
/// assert!(!identity.is_system());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default)]
    attrs: BTreeMap<String, Value>,
}

fn default_kind() -> String {
    "user".to_string()
}

impl Identity {
    /// Creates an identity with kind `"user"` and no roles.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_kind(),
            roles: BTreeSet::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Sets the identity kind (`"user"`, `"service"`, `"system"`, ...).
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Adds one role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Adds several roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Adds one attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// The identity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The identity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The role set.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// The attribute map.
    #[must_use]
    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// Returns `true` if the identity holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns `true` if any of `roles` is held.
    #[must_use]
    pub fn has_any_role<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles.into_iter().any(|r| self.roles.contains(r))
    }

    /// Returns `true` for system identities (`type == "system"`).
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind == "system"
    }
}
