//! compiler.rs - Compilation and caching of classification rules.
//!
//! Every condition is compiled to a single regex: `contains_any` value lists
//! become an escaped alternation, `regex` conditions use their pattern as is.
//! Attribute keywords are resolved to tags up front so that evaluation never
//! looks names up again. Compiled rule sets are cached by a hash of the rule
//! list.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::{Regex, RegexBuilder};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::config::{ClassificationRule, ClassifierConfig, Condition, MatchKind, MAX_PATTERN_LENGTH};
use crate::errors::ScrubError;
use crate::record::Tag;
use crate::tags;

/// One compiled attribute test.
#[derive(Debug)]
pub struct CompiledCondition {
    pub tag: Tag,
    /// The keyword or literal the condition was written with.
    pub attribute: String,
    pub regex: Regex,
}

/// A compiled classification rule: every condition must match.
#[derive(Debug)]
pub struct CompiledRule {
    pub name: String,
    pub conditions: Vec<CompiledCondition>,
}

/// The compiled rule set, in priority order.
#[derive(Debug)]
pub struct CompiledRules {
    pub rules: Vec<CompiledRule>,
}

lazy_static! {
    /// Compiled rule sets keyed by a hash of their source rules.
    static ref RULE_SET_CACHE: RwLock<HashMap<u64, Arc<CompiledRules>>> = RwLock::new(HashMap::new());
}

fn rule_set_key(config: &ClassifierConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    // Order is significant here: it is the evaluation priority.
    config.rules.hash(&mut hasher);
    hasher.finish()
}

fn condition_pattern(condition: &Condition) -> Option<String> {
    match condition.match_kind {
        MatchKind::ContainsAny => {
            if condition.values.is_empty() {
                return None;
            }
            let alternation = condition
                .values
                .iter()
                .map(|v| regex::escape(v))
                .collect::<Vec<_>>()
                .join("|");
            Some(format!("(?:{})", alternation))
        }
        MatchKind::Regex => condition.pattern.clone(),
    }
}

fn compile_condition(rule_name: &str, condition: &Condition) -> Result<CompiledCondition, ScrubError> {
    let tag = tags::resolve(&condition.attribute).ok_or_else(|| {
        ScrubError::InvalidConfig(format!(
            "rule '{}' refers to unknown attribute '{}'",
            rule_name, condition.attribute
        ))
    })?;
    let pattern = condition_pattern(condition).ok_or_else(|| {
        ScrubError::InvalidConfig(format!(
            "rule '{}' has nothing to match on '{}'",
            rule_name, condition.attribute
        ))
    })?;
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(ScrubError::InvalidConfig(format!(
            "rule '{}' pattern is {} characters long, the limit is {}",
            rule_name,
            pattern.len(),
            MAX_PATTERN_LENGTH
        )));
    }

    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(condition.case_insensitive)
        .size_limit(10 * (1 << 20))
        .build()
        .map_err(|e| ScrubError::RuleCompilation(rule_name.to_string(), e))?;

    Ok(CompiledCondition {
        tag,
        attribute: condition.attribute.clone(),
        regex,
    })
}

/// Compiles rules in order. All failures are collected into one error.
pub fn compile_rules(rules: &[ClassificationRule]) -> Result<CompiledRules, ScrubError> {
    let mut compiled = Vec::with_capacity(rules.len());
    let mut failures = Vec::new();

    for rule in rules {
        let mut conditions = Vec::new();
        for condition in rule.conditions() {
            match compile_condition(&rule.name, &condition) {
                Ok(compiled) => conditions.push(compiled),
                Err(e) => failures.push(e),
            }
        }
        if conditions.len() == rule.requires.len() + 1 {
            debug!("Compiled rule '{}' ({} conditions).", rule.name, conditions.len());
            compiled.push(CompiledRule {
                name: rule.name.clone(),
                conditions,
            });
        }
    }

    if failures.is_empty() {
        return Ok(CompiledRules { rules: compiled });
    }
    let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
    Err(ScrubError::Fatal(format!(
        "Failed to compile {} rule condition(s):\n{}",
        failures.len(),
        details.join("\n")
    )))
}

/// Returns the compiled form of `config`, compiling it on first use.
pub fn get_or_compile_rules(config: &ClassifierConfig) -> Result<Arc<CompiledRules>> {
    let key = rule_set_key(config);

    let cached = RULE_SET_CACHE
        .read()
        .map_err(|_| anyhow!("compiled rules cache lock poisoned"))?
        .get(&key)
        .cloned();
    if let Some(rules) = cached {
        debug!("Reusing compiled rule set {:016x}.", key);
        return Ok(rules);
    }

    let compiled = Arc::new(compile_rules(&config.rules)?);
    RULE_SET_CACHE
        .write()
        .map_err(|_| anyhow!("compiled rules cache lock poisoned"))?
        .insert(key, Arc::clone(&compiled));
    debug!("Compiled rule set {:016x} ({} rules).", key, compiled.rules.len());
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_any_values_are_escaped() {
        let condition = Condition {
            attribute: "SeriesDescription".to_string(),
            match_kind: MatchKind::ContainsAny,
            values: vec!["a+b".to_string(), "(x)".to_string()],
            pattern: None,
            case_insensitive: true,
        };
        let compiled = compile_condition("escaped", &condition).unwrap();
        assert_eq!(compiled.tag, tags::SERIES_DESCRIPTION);
        assert!(compiled.regex.is_match("T1 A+B"));
        assert!(compiled.regex.is_match("(X)"));
        assert!(!compiled.regex.is_match("aab"));
    }

    #[test]
    fn test_case_sensitivity_follows_condition() {
        let mut condition = Condition {
            attribute: "SequenceName".to_string(),
            match_kind: MatchKind::ContainsAny,
            values: vec!["ir".to_string()],
            pattern: None,
            case_insensitive: false,
        };
        let compiled = compile_condition("ir", &condition).unwrap();
        assert!(compiled.regex.is_match("*tir2d1"));
        assert!(!compiled.regex.is_match("IR"));

        condition.case_insensitive = true;
        let compiled = compile_condition("ir", &condition).unwrap();
        assert!(compiled.regex.is_match("IR"));
    }

    #[test]
    fn test_default_rules_compile_and_cache() {
        let config = ClassifierConfig::load_default_rules().unwrap();
        let first = get_or_compile_rules(&config).unwrap();
        let second = get_or_compile_rules(&config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.rules.len(), config.rules.len());
        assert_eq!(first.rules[2].conditions.len(), 2);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let config: ClassifierConfig = serde_yml::from_str(
            r#"
rules:
  - name: broken
    attribute: ProtocolName
    match_kind: regex
    pattern: "(unclosed"
"#,
        )
        .unwrap();
        let err = compile_rules(&config.rules).unwrap_err().to_string();
        assert!(err.contains("broken"));
    }
}
