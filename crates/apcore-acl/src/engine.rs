//! The ACL engine.
//!
//! First-match-wins evaluation over an ordered rule list, with a default
//! effect when nothing matches. All public methods are thread-safe;
//! `check` takes a snapshot of the rule list under the lock and then
//! evaluates lock-free, so concurrent rule mutation never blocks
//! in-flight checks.

use crate::rule::{AclRule, Effect, RuleConditions};
use apcore_types::{match_pattern, Context, ErrorKind, ModuleError};
use parking_lot::Mutex;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The caller string used for external (empty-caller) calls.
pub const EXTERNAL_CALLER: &str = "@external";

#[derive(Debug)]
struct Inner {
    rules: Vec<AclRule>,
    default_effect: Effect,
}

/// Access Control List with pattern-based rules.
///
/// # Special patterns
///
/// - `@external` matches only the empty caller;
/// - `@system` matches only when the context identity has
///   `type == "system"`;
/// - everything else is wildcard-matched.
///
/// # Example
///
/// ```
/// use apcore_acl::{Acl, AclRule, Effect};
///
/// let acl = Acl::new(
///     vec![
///         AclRule::new(vec!["public.*".into()], vec!["admin.*".into()], Effect::Deny),
///         AclRule::new(vec!["*".into()], vec!["*".into()], Effect::Allow),
///     ],
///     Effect::Deny,
/// );
///
/// assert!(!acl.check(Some("public.web"), "admin.delete", None));
/// assert!(acl.check(Some("internal.job"), "admin.delete", None));
/// ```
#[derive(Debug)]
pub struct Acl {
    inner: Mutex<Inner>,
    yaml_path: Mutex<Option<PathBuf>>,
}

impl Acl {
    /// Creates an ACL from ordered rules and a default effect.
    #[must_use]
    pub fn new(rules: Vec<AclRule>, default_effect: Effect) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rules,
                default_effect,
            }),
            yaml_path: Mutex::new(None),
        }
    }

    /// Loads an ACL from a YAML configuration file.
    ///
    /// # Format
    ///
    /// ```yaml
    /// default_effect: deny
    /// rules:
    ///   - callers: ["public.*"]
    ///     targets: ["admin.*"]
    ///     effect: deny
    ///     description: public may not touch admin
    ///     conditions:
    ///       roles: ["ops"]
    /// ```
    ///
    /// # Errors
    ///
    /// `CONFIG_NOT_FOUND` when the file is missing; `ACL_RULE_ERROR`
    /// naming the rule index and field for every structural problem.
    pub fn load(yaml_path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        let yaml_path = yaml_path.as_ref();
        if !yaml_path.is_file() {
            return Err(ErrorKind::ConfigNotFound {
                path: yaml_path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(yaml_path)
            .map_err(|e| rule_error(format!("cannot read {}: {e}", yaml_path.display())))?;
        let acl = Self::from_yaml_str(&content)
            .map_err(|e| rule_error(format!("{e} (in {})", yaml_path.display())))?;
        *acl.yaml_path.lock() = Some(yaml_path.to_path_buf());
        Ok(acl)
    }

    /// Parses ACL configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// `ACL_RULE_ERROR` for structural problems.
    pub fn from_yaml_str(content: &str) -> Result<Self, ModuleError> {
        let data: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| rule_error(format!("invalid YAML: {e}")))?;

        let mapping = data
            .as_mapping()
            .ok_or_else(|| rule_error("ACL config must be a mapping"))?;

        let default_effect = match mapping.get("default_effect") {
            None => Effect::Deny,
            Some(value) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| rule_error("'default_effect' must be a string"))?;
                Effect::parse(text).ok_or_else(|| {
                    rule_error(format!(
                        "'default_effect' must be 'allow' or 'deny', got '{text}'"
                    ))
                })?
            }
        };

        let raw_rules = mapping
            .get("rules")
            .ok_or_else(|| rule_error("ACL config missing required 'rules' key"))?
            .as_sequence()
            .ok_or_else(|| rule_error("'rules' must be a list"))?;

        let mut rules = Vec::with_capacity(raw_rules.len());
        for (index, raw_rule) in raw_rules.iter().enumerate() {
            rules.push(parse_rule(index, raw_rule)?);
        }

        Ok(Self::new(rules, default_effect))
    }

    /// Checks whether a call from `caller_id` to `target_id` is allowed.
    ///
    /// `caller_id` of `None` (an external call) is matched as
    /// [`EXTERNAL_CALLER`].
    #[must_use]
    pub fn check(&self, caller_id: Option<&str>, target_id: &str, context: Option<&Context>) -> bool {
        let effective_caller = match caller_id {
            None | Some("") => EXTERNAL_CALLER,
            Some(caller) => caller,
        };

        // Snapshot under the lock, evaluate without it.
        let (rules, default_effect) = {
            let inner = self.inner.lock();
            (inner.rules.clone(), inner.default_effect)
        };

        for rule in &rules {
            if rule_matches(rule, effective_caller, target_id, context) {
                let decision = rule.effect == Effect::Allow;
                debug!(
                    caller = effective_caller,
                    target = target_id,
                    decision = if decision { "allow" } else { "deny" },
                    rule = if rule.description.is_empty() {
                        "(no description)"
                    } else {
                        rule.description.as_str()
                    },
                    "acl check"
                );
                return decision;
            }
        }

        let decision = default_effect == Effect::Allow;
        debug!(
            caller = effective_caller,
            target = target_id,
            decision = if decision { "allow" } else { "deny" },
            rule = "default",
            "acl check"
        );
        decision
    }

    /// Inserts a rule at position 0 (highest priority).
    pub fn add_rule(&self, rule: AclRule) {
        self.inner.lock().rules.insert(0, rule);
    }

    /// Removes the first rule whose caller and target pattern lists are
    /// equal to the given lists. Returns whether a rule was removed.
    pub fn remove_rule(&self, callers: &[String], targets: &[String]) -> bool {
        let mut inner = self.inner.lock();
        if let Some(index) = inner
            .rules
            .iter()
            .position(|rule| rule.callers == callers && rule.targets == targets)
        {
            inner.rules.remove(index);
            true
        } else {
            false
        }
    }

    /// Number of rules currently installed.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.inner.lock().rules.len()
    }

    /// Re-reads the ACL from the file it was originally loaded from.
    ///
    /// # Errors
    ///
    /// `ACL_RULE_ERROR` when the ACL was not created via [`Acl::load`],
    /// plus any loading error from the file itself.
    pub fn reload(&self) -> Result<(), ModuleError> {
        let path = self
            .yaml_path
            .lock()
            .clone()
            .ok_or_else(|| rule_error("cannot reload: ACL was not loaded from a file"))?;
        let fresh = Self::load(&path)?;
        let fresh_inner = fresh.inner.into_inner();
        let mut inner = self.inner.lock();
        inner.rules = fresh_inner.rules;
        inner.default_effect = fresh_inner.default_effect;
        Ok(())
    }
}

fn rule_error(message: impl Into<String>) -> ModuleError {
    ErrorKind::AclRule {
        message: message.into(),
    }
    .into()
}

fn parse_rule(index: usize, raw: &YamlValue) -> Result<AclRule, ModuleError> {
    let mapping = raw
        .as_mapping()
        .ok_or_else(|| rule_error(format!("rule {index} must be a mapping")))?;

    let get = |key: &str| mapping.get(key);

    for key in ["callers", "targets", "effect"] {
        if get(key).is_none() {
            return Err(rule_error(format!("rule {index} missing required key '{key}'")));
        }
    }

    let effect_text = get("effect")
        .and_then(YamlValue::as_str)
        .ok_or_else(|| rule_error(format!("rule {index} field 'effect' must be a string")))?;
    let effect = Effect::parse(effect_text).ok_or_else(|| {
        rule_error(format!(
            "rule {index} has invalid effect '{effect_text}', must be 'allow' or 'deny'"
        ))
    })?;

    let callers = parse_string_list(index, "callers", get("callers"))?;
    let targets = parse_string_list(index, "targets", get("targets"))?;

    let description = match get("description") {
        None => String::new(),
        Some(value) => value
            .as_str()
            .ok_or_else(|| {
                rule_error(format!("rule {index} field 'description' must be a string"))
            })?
            .to_string(),
    };

    let conditions = match get("conditions") {
        None => None,
        Some(value) => Some(parse_conditions(index, value)?),
    };

    Ok(AclRule {
        callers,
        targets,
        effect,
        description,
        conditions,
    })
}

fn parse_string_list(
    index: usize,
    field: &str,
    value: Option<&YamlValue>,
) -> Result<Vec<String>, ModuleError> {
    let sequence = value
        .and_then(YamlValue::as_sequence)
        .ok_or_else(|| rule_error(format!("rule {index} field '{field}' must be a list")))?;
    sequence
        .iter()
        .map(|entry| {
            entry.as_str().map(str::to_string).ok_or_else(|| {
                rule_error(format!(
                    "rule {index} field '{field}' entries must be strings"
                ))
            })
        })
        .collect()
}

fn parse_conditions(index: usize, value: &YamlValue) -> Result<RuleConditions, ModuleError> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| rule_error(format!("rule {index} field 'conditions' must be a mapping")))?;

    let mut conditions = RuleConditions::default();
    for (key, value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| rule_error(format!("rule {index} condition keys must be strings")))?;
        match key {
            "identity_types" => {
                conditions.identity_types =
                    Some(parse_string_list(index, "conditions.identity_types", Some(value))?);
            }
            "roles" => {
                conditions.roles =
                    Some(parse_string_list(index, "conditions.roles", Some(value))?);
            }
            "max_call_depth" => {
                let depth = value.as_u64().ok_or_else(|| {
                    rule_error(format!(
                        "rule {index} field 'conditions.max_call_depth' must be a non-negative integer"
                    ))
                })?;
                conditions.max_call_depth = Some(depth as usize);
            }
            other => {
                return Err(rule_error(format!(
                    "rule {index} has unknown condition '{other}'"
                )))
            }
        }
    }
    Ok(conditions)
}

fn rule_matches(
    rule: &AclRule,
    caller: &str,
    target: &str,
    context: Option<&Context>,
) -> bool {
    let caller_match = rule
        .callers
        .iter()
        .any(|pattern| match_special(pattern, caller, context));
    if !caller_match {
        return false;
    }

    let target_match = rule
        .targets
        .iter()
        .any(|pattern| match_special(pattern, target, context));
    if !target_match {
        return false;
    }

    match &rule.conditions {
        None => true,
        Some(conditions) => check_conditions(conditions, context),
    }
}

fn match_special(pattern: &str, value: &str, context: Option<&Context>) -> bool {
    match pattern {
        "@external" => value == EXTERNAL_CALLER,
        "@system" => context
            .and_then(|ctx| ctx.identity.as_ref())
            .is_some_and(apcore_types::Identity::is_system),
        _ => match_pattern(pattern, value),
    }
}

fn check_conditions(conditions: &RuleConditions, context: Option<&Context>) -> bool {
    let Some(context) = context else {
        return false;
    };

    if let Some(identity_types) = &conditions.identity_types {
        let matches = context
            .identity
            .as_ref()
            .is_some_and(|identity| identity_types.iter().any(|t| t == identity.kind()));
        if !matches {
            return false;
        }
    }

    if let Some(roles) = &conditions.roles {
        let matches = context
            .identity
            .as_ref()
            .is_some_and(|identity| identity.has_any_role(roles.iter().map(String::as_str)));
        if !matches {
            return false;
        }
    }

    if let Some(max_depth) = conditions.max_call_depth {
        if context.call_chain.len() > max_depth {
            return false;
        }
    }

    true
}
