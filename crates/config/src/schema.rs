//! Config schema types (server, bot endpoint, routing, handover, tasks,
//! seeded channels).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub routing: RoutingConfig,
    pub handover: HandoverConfig,
    pub tasks: TasksConfig,
    /// Channel accounts upserted into the store at startup.
    pub channels: Vec<ChannelSeed>,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8480,
        }
    }
}

/// Conversational-agent endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Base URL of the conversational endpoint.
    pub base_url: String,
    /// Seconds between reply polls.
    pub poll_interval_secs: u64,
    /// Wall-clock budget for the whole poll phase, in seconds.
    pub poll_budget_secs: u64,
    /// Pause between consecutive answer parts, in milliseconds.
    pub part_delay_ms: u64,
    /// Pause after a part carrying an image, in milliseconds.
    pub image_part_delay_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8600".into(),
            poll_interval_secs: 1,
            poll_budget_secs: 20,
            part_delay_ms: 1_000,
            image_part_delay_ms: 3_000,
        }
    }
}

/// One routing rule: a channel address mapped to an ordered task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRuleConfig {
    /// The channel's outbound-facing address (configured number, bot id).
    pub address: String,
    /// Task names, in dispatch order: "bot", "human".
    pub tasks: Vec<String>,
}

/// Declarative routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub rules: Vec<RouteRuleConfig>,
    /// Applied when no rule matches the address.
    pub default_tasks: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_tasks: vec!["bot".into()],
        }
    }
}

/// Human-agent forwarding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoverConfig {
    /// Team name -> member contact identifiers.
    pub teams: HashMap<String, Vec<String>>,
    /// Provider messaging-session window. An agent is reachable only if a
    /// message was exchanged with them inside this window.
    pub session_window_secs: i64,
    /// Conversation turns included in a handover summary.
    pub history_turns: u32,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            teams: HashMap::new(),
            session_window_secs: 86_400,
            history_turns: 6,
        }
    }
}

/// Task runner tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_backoff_secs: 10,
            attempt_timeout_secs: 120,
        }
    }
}

/// A channel account seeded into the store at startup. Stands in for an
/// administrative surface this service does not expose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSeed {
    pub account_id: String,
    /// Provider kind: "whatsapp" or "telegram".
    pub kind: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub is_default: bool,
    /// Provider-specific credential/config document.
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routing_is_bot_only() {
        let cfg = HeraldConfig::default();
        assert_eq!(cfg.routing.default_tasks, vec!["bot".to_string()]);
        assert!(cfg.routing.rules.is_empty());
    }

    #[test]
    fn default_retry_policy_values() {
        let tasks = TasksConfig::default();
        assert_eq!(tasks.max_attempts, 3);
        assert_eq!(tasks.retry_backoff_secs, 10);
        assert_eq!(tasks.attempt_timeout_secs, 120);
    }

    #[test]
    fn bot_defaults_cover_poll_budget() {
        let bot = BotConfig::default();
        assert_eq!(bot.poll_interval_secs, 1);
        assert_eq!(bot.poll_budget_secs, 20);
        assert!(bot.image_part_delay_ms > bot.part_delay_ms);
    }

    #[test]
    fn channel_seed_deserializes_with_defaults() {
        let seed: ChannelSeed = serde_json::from_value(serde_json::json!({
            "account_id": "tg-main",
            "kind": "telegram",
        }))
        .unwrap();
        assert!(!seed.disabled);
        assert!(!seed.is_default);
        assert!(seed.config.as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let mut cfg = HeraldConfig::default();
        cfg.handover
            .teams
            .insert("support".into(), vec!["919990001111".into()]);
        let raw = toml::to_string_pretty(&cfg).unwrap();
        let back: HeraldConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.handover.teams["support"], vec!["919990001111"]);
    }
}
