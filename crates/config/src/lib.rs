//! Configuration loading and env substitution.
//!
//! Config files: `herald.toml`, `herald.yaml`, or `herald.json`,
//! searched in `./` then `~/.config/herald/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{data_dir, discover_and_load, find_or_default_config_path, load_config, save_config},
    schema::{
        BotConfig, ChannelSeed, HandoverConfig, HeraldConfig, RouteRuleConfig, RoutingConfig,
        ServerConfig, TasksConfig,
    },
};
