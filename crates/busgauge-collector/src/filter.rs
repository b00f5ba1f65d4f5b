//! Entity filter chain.
//!
//! Three checks, ANDed: the entity type is enabled, the display name fully
//! matches the configured pattern, and the bare name starts with the
//! deployment-environment prefix (when one is configured).
//!
//! Subscriptions are special: their display name is `topic/subscription`
//! and the environment check belongs to the parent topic, so a topic that
//! fails it takes all its subscriptions with it.

use std::collections::BTreeSet;

use regex::Regex;

use busgauge_core::{ConfigResult, EntityType, Settings};

#[derive(Debug, Clone)]
pub struct EntityFilter {
    types: BTreeSet<EntityType>,
    /// `None` admits every name.
    pattern: Option<Regex>,
    environment: Option<Regex>,
}

impl EntityFilter {
    /// Compile a filter. `pattern` must fully match display names.
    pub fn new(
        types: impl IntoIterator<Item = EntityType>,
        pattern: &str,
        environment: Option<&str>,
    ) -> ConfigResult<Self> {
        let pattern = Regex::new(&format!("^(?:{pattern})$"))?;
        let environment = environment
            .filter(|e| !e.is_empty())
            .map(|e| Regex::new(&format!("^{}", regex::escape(e))))
            .transpose()?;
        Ok(Self {
            types: types.into_iter().collect(),
            pattern: Some(pattern),
            environment,
        })
    }

    pub fn from_settings(settings: &Settings) -> ConfigResult<Self> {
        Self::new(
            settings.entity_types.iter().copied(),
            &settings.filter,
            settings.environment.as_deref(),
        )
    }

    /// Accept-everything filter.
    pub fn allow_all() -> Self {
        Self {
            types: EntityType::ALL.into_iter().collect(),
            pattern: None,
            environment: None,
        }
    }

    pub fn type_enabled(&self, entity_type: EntityType) -> bool {
        self.types.contains(&entity_type)
    }

    pub fn matches_pattern(&self, display_name: &str) -> bool {
        self.pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(display_name))
    }

    pub fn matches_environment(&self, name: &str) -> bool {
        self.environment
            .as_ref()
            .is_none_or(|env| env.is_match(name))
    }

    /// Full check for a queue or topic.
    pub fn admits(&self, entity_type: EntityType, name: &str) -> bool {
        self.type_enabled(entity_type) && self.matches_pattern(name) && self.matches_environment(name)
    }

    /// Check for a subscription whose parent topic already passed.
    pub fn admits_subscription(&self, topic: &str, subscription: &str) -> bool {
        self.type_enabled(EntityType::Subscription)
            && self.matches_pattern(&format!("{topic}/{subscription}"))
    }
}
