//! The routing table.

use std::collections::HashMap;

use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

use herald_config::schema::RoutingConfig;

/// A downstream consumer of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    /// The automated conversational agent.
    Bot,
    /// Human support agents.
    Human,
}

impl RouteTarget {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bot" => Some(Self::Bot),
            "human" => Some(Self::Human),
            _ => None,
        }
    }
}

/// Maps a channel's outbound-facing address to an ordered target list, with
/// a fallback for unmatched addresses. Deterministic: a fixed address always
/// yields the same list.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    rules: HashMap<String, Vec<RouteTarget>>,
    default_targets: Vec<RouteTarget>,
}

impl RoutingTable {
    /// Build the table from config rules. Unknown target names are logged
    /// and skipped so a config typo degrades one rule, not the pipeline.
    #[must_use]
    pub fn from_config(config: &RoutingConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| (rule.address.clone(), parse_targets(&rule.tasks, &rule.address)))
            .collect();
        let default_targets = parse_targets(&config.default_tasks, "<default>");
        Self {
            rules,
            default_targets,
        }
    }

    /// Targets for a channel address, in dispatch order.
    #[must_use]
    pub fn route(&self, address: &str) -> &[RouteTarget] {
        self.rules
            .get(address)
            .map_or(&self.default_targets, Vec::as_slice)
    }
}

impl Default for RoutingTable {
    /// Bot-only fallback, matching the default policy.
    fn default() -> Self {
        Self::from_config(&RoutingConfig::default())
    }
}

fn parse_targets(names: &[String], address: &str) -> Vec<RouteTarget> {
    names
        .iter()
        .filter_map(|name| {
            let target = RouteTarget::parse(name);
            if target.is_none() {
                warn!(address, target = %name, "unknown routing target, skipping");
            }
            target
        })
        .collect()
}
