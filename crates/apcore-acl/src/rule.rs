//! Access-control rule types.

use serde::{Deserialize, Serialize};

/// Whether a matching rule allows or denies the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The call proceeds.
    Allow,
    /// The call is rejected with `ACL_DENIED`.
    Deny,
}

impl Effect {
    /// Parses `"allow"` / `"deny"`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// Conditions attached to a rule; all present conditions must hold
/// (AND-combined). When conditions are present and no context is
/// supplied, the rule does not match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleConditions {
    /// The caller identity's `type` must be in this list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_types: Option<Vec<String>>,
    /// The caller identity must hold at least one of these roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// The call chain may be at most this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,
}

impl RuleConditions {
    /// Returns `true` when no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identity_types.is_none() && self.roles.is_none() && self.max_call_depth.is_none()
    }
}

/// A single access control rule.
///
/// Evaluated first-match-wins against (caller, target, context): any
/// caller pattern must match, any target pattern must match, and all
/// conditions must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    /// Caller patterns (`*` wildcards plus `@external` / `@system`).
    pub callers: Vec<String>,
    /// Target patterns.
    pub targets: Vec<String>,
    /// The rule's effect when it matches.
    pub effect: Effect,
    /// Optional human description, used in decision logs.
    #[serde(default)]
    pub description: String,
    /// Optional conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<RuleConditions>,
}

impl AclRule {
    /// Creates a rule without description or conditions.
    #[must_use]
    pub fn new(callers: Vec<String>, targets: Vec<String>, effect: Effect) -> Self {
        Self {
            callers,
            targets,
            effect,
            description: String::new(),
            conditions: None,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attaches conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: RuleConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_parse() {
        assert_eq!(Effect::parse("allow"), Some(Effect::Allow));
        assert_eq!(Effect::parse("deny"), Some(Effect::Deny));
        assert_eq!(Effect::parse("block"), None);
    }

    #[test]
    fn conditions_emptiness() {
        assert!(RuleConditions::default().is_empty());
        let conditions = RuleConditions {
            max_call_depth: Some(4),
            ..Default::default()
        };
        assert!(!conditions.is_empty());
    }

    #[test]
    fn rule_builders() {
        let rule = AclRule::new(vec!["*".into()], vec!["admin.*".into()], Effect::Deny)
            .with_description("lock admin")
            .with_conditions(RuleConditions {
                roles: Some(vec!["ops".into()]),
                ..Default::default()
            });
        assert_eq!(rule.description, "lock admin");
        assert!(rule.conditions.is_some());
    }

    #[test]
    fn rule_yaml_round_trip() {
        let yaml = "callers: ['public.*']\ntargets: ['admin.*']\neffect: deny\n";
        let rule: AclRule = serde_yaml::from_str(yaml).expect("parses");
        assert_eq!(rule.effect, Effect::Deny);
        assert!(rule.conditions.is_none());
        assert!(rule.description.is_empty());
    }
}
