//! Configuration management for `dcmscrub-core`.
//!
//! This module defines the classification rules that decide which files are
//! identifiable and must be deleted. Rules are plain data: the built-in set is
//! embedded from `config/default_rules.yaml`, and callers may load their own
//! set from a YAML file. Rule order is priority order.
//!
//! License: MIT OR Apache-2.0

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::tags;

/// Longest `regex` pattern a rule may carry.
pub const MAX_PATTERN_LENGTH: usize = 500;

/// Name of the opt-in rule for face-reconstructible T1-weighted volumes.
pub const T1W_RULE: &str = "t1w_face_reconstructible";

/// Name of the opt-in rule for inversion-recovery (T2-weighted) volumes.
pub const T2W_RULE: &str = "t2w_inversion_recovery";

/// How a condition tests an attribute's value components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Any listed value is a substring of any component.
    #[default]
    ContainsAny,
    /// The pattern matches any component.
    Regex,
}

/// A single test against one named attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Condition {
    /// Attribute keyword (e.g. `ImageType`) or literal tag.
    pub attribute: String,
    #[serde(default)]
    pub match_kind: MatchKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
}

fn default_case_insensitive() -> bool {
    true
}

/// A classification rule: a primary condition plus any number of extra
/// conditions that must all hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ClassificationRule {
    /// Unique identifier for the rule (e.g. "structured_report").
    pub name: String,
    /// What the rule catches, for humans.
    #[serde(default)]
    pub description: Option<String>,
    pub attribute: String,
    #[serde(default)]
    pub match_kind: MatchKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
    /// Extra conjunctive conditions, e.g. "Modality contains CT".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Condition>,
    /// If true, the rule is dropped unless explicitly enabled.
    #[serde(default)]
    pub opt_in: bool,
    /// Explicit override; `Some(false)` disables the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl ClassificationRule {
    /// The rule's own attribute test as a [`Condition`].
    pub fn primary_condition(&self) -> Condition {
        Condition {
            attribute: self.attribute.clone(),
            match_kind: self.match_kind,
            values: self.values.clone(),
            pattern: self.pattern.clone(),
            case_insensitive: self.case_insensitive,
        }
    }

    /// Every condition of the rule, primary first.
    pub fn conditions(&self) -> impl Iterator<Item = Condition> + '_ {
        std::iter::once(self.primary_condition()).chain(self.requires.iter().cloned())
    }
}

/// The ordered classification rule set.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub rules: Vec<ClassificationRule>,
}

/// The caller's two opt-in switches for the face-reconstructible rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierFlags {
    pub delete_t1w: bool,
    pub delete_t2w: bool,
}

impl ClassifierFlags {
    /// Rule names to pass as the enable list of
    /// [`ClassifierConfig::set_active_rules`].
    pub fn enabled_rules(&self) -> Vec<String> {
        let mut enabled = Vec::new();
        if self.delete_t1w {
            enabled.push(T1W_RULE.to_string());
        }
        if self.delete_t2w {
            enabled.push(T2W_RULE.to_string());
        }
        enabled
    }
}

impl ClassifierConfig {
    /// Loads classification rules from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading classification rules from {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let config: ClassifierConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse rules file {}", path.display()))?;

        validate_rules(&config.rules)
            .with_context(|| format!("Invalid rules in {}", path.display()))?;
        info!("{} classification rules in {}.", config.rules.len(), path.display());

        Ok(config)
    }

    /// Loads the built-in classification rules.
    pub fn load_default_rules() -> Result<Self> {
        let config: ClassifierConfig =
            serde_yml::from_str(include_str!("../config/default_rules.yaml"))
                .context("Built-in classification rules do not parse")?;
        debug!("{} built-in classification rules.", config.rules.len());
        Ok(config)
    }

    /// Loads the default rules with the opt-in rules selected by `flags`
    /// enabled.
    pub fn for_flags(flags: ClassifierFlags) -> Result<Self> {
        let mut config = Self::load_default_rules()?;
        config.set_active_rules(&flags.enabled_rules(), &[]);
        Ok(config)
    }

    /// Filters the active rules. Opt-in rules survive only when named in
    /// `enable_rules`; anything named in `disable_rules`, or with
    /// `enabled: false`, is dropped. Rule order is preserved.
    pub fn set_active_rules(&mut self, enable_rules: &[String], disable_rules: &[String]) {
        let enabled: HashSet<&str> = enable_rules.iter().map(String::as_str).collect();
        let disabled: HashSet<&str> = disable_rules.iter().map(String::as_str).collect();
        let known: HashSet<&str> = self.rules.iter().map(|r| r.name.as_str()).collect();

        for (list, names) in [("enable", &enabled), ("disable", &disabled)] {
            for unknown in names.difference(&known) {
                warn!("Cannot {} unknown classification rule '{}'.", list, unknown);
            }
        }

        let before = self.rules.len();
        self.rules.retain(|rule| {
            let name = rule.name.as_str();
            let switched_on = !rule.opt_in || enabled.contains(name);
            rule.enabled != Some(false) && !disabled.contains(name) && switched_on
        });
        debug!("{} of {} classification rules active.", self.rules.len(), before);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Validates rule integrity: unique names, known attributes, and a usable
/// value list or pattern for every condition. All problems are reported
/// together.
pub fn validate_rules(rules: &[ClassificationRule]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();

    for rule in rules {
        if rule.name.is_empty() {
            errors.push("A rule has no `name`.".to_string());
        } else if !seen.insert(rule.name.as_str()) {
            errors.push(format!("Rule name '{}' is used more than once.", rule.name));
        }

        for condition in rule.conditions() {
            validate_condition(&rule.name, &condition, &mut errors);
        }
    }

    if !errors.is_empty() {
        Err(anyhow!("{} problem(s) in classification rules:\n{}", errors.len(), errors.join("\n")))
    } else {
        Ok(())
    }
}

fn validate_condition(rule_name: &str, condition: &Condition, errors: &mut Vec<String>) {
    if tags::resolve(&condition.attribute).is_none() {
        errors.push(format!(
            "Rule '{}' refers to unknown attribute '{}'.",
            rule_name, condition.attribute
        ));
    }

    match condition.match_kind {
        MatchKind::ContainsAny => {
            if condition.values.is_empty() || condition.values.iter().any(String::is_empty) {
                errors.push(format!(
                    "Rule '{}': `contains_any` on '{}' needs at least one non-empty value.",
                    rule_name, condition.attribute
                ));
            }
        }
        MatchKind::Regex => match &condition.pattern {
            None => errors.push(format!(
                "Rule '{}' is missing the `pattern` field.",
                rule_name
            )),
            Some(pattern) if pattern.is_empty() => {
                errors.push(format!("Rule '{}' has an empty `pattern` field.", rule_name))
            }
            Some(pattern) if pattern.len() > MAX_PATTERN_LENGTH => errors.push(format!(
                "Rule '{}' pattern is {} characters long, the limit is {}.",
                rule_name,
                pattern.len(),
                MAX_PATTERN_LENGTH
            )),
            Some(pattern) => {
                if let Err(e) = Regex::new(pattern) {
                    errors.push(format!(
                        "Rule '{}' has an invalid regex pattern: {}",
                        rule_name, e
                    ));
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid_and_ordered() {
        let config = ClassifierConfig::load_default_rules().unwrap();
        validate_rules(&config.rules).unwrap();
        assert_eq!(
            config.rule_names(),
            vec![
                "structured_report",
                "non_diagnostic_image_type",
                "secondary_ct_capture",
                "scout_protocol",
                "non_diagnostic_series_description",
                T1W_RULE,
                T2W_RULE,
            ]
        );
    }

    #[test]
    fn test_opt_in_rules_dropped_unless_enabled() {
        let mut config = ClassifierConfig::load_default_rules().unwrap();
        config.set_active_rules(&[], &[]);
        assert!(!config.rule_names().contains(&T1W_RULE));
        assert!(!config.rule_names().contains(&T2W_RULE));

        let config = ClassifierConfig::for_flags(ClassifierFlags {
            delete_t1w: true,
            delete_t2w: false,
        })
        .unwrap();
        assert!(config.rule_names().contains(&T1W_RULE));
        assert!(!config.rule_names().contains(&T2W_RULE));
        assert_eq!(config.rules.len(), 6);
    }

    #[test]
    fn test_disable_list_and_enabled_override() {
        let mut config = ClassifierConfig::load_default_rules().unwrap();
        config.rules[0].enabled = Some(false);
        config.set_active_rules(&[], &["scout_protocol".to_string()]);
        assert_eq!(
            config.rule_names(),
            vec![
                "non_diagnostic_image_type",
                "secondary_ct_capture",
                "non_diagnostic_series_description",
            ]
        );
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
rules:
  - name: bad_regex
    attribute: ProtocolName
    match_kind: regex
    pattern: "(unclosed"
  - name: bad_regex
    attribute: NoSuchAttribute
    match_kind: contains_any
    values: []
"#;
        let config: ClassifierConfig = serde_yml::from_str(yaml).unwrap();
        let err = validate_rules(&config.rules).unwrap_err().to_string();
        assert!(err.contains("invalid regex pattern"));
        assert!(err.contains("Rule name 'bad_regex' is used more than once"));
        assert!(err.contains("unknown attribute 'NoSuchAttribute'"));
        assert!(err.contains("needs at least one non-empty value"));
    }
}
