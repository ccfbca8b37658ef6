//! Access control for apcore.
//!
//! An [`Acl`] holds an ordered list of [`AclRule`]s evaluated
//! first-match-wins; when no rule matches, a default effect decides.
//! Rules match on wildcard caller/target patterns (plus the special
//! `@external` and `@system` patterns) and optional AND-combined
//! [`RuleConditions`].
//!
//! The executor consults the ACL at step 4 of the call pipeline with
//! the caller id, the target module id, and the execution context.

mod engine;
mod rule;

pub use engine::{Acl, EXTERNAL_CALLER};
pub use rule::{AclRule, Effect, RuleConditions};
