use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::HeraldConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["herald.toml", "herald.yaml", "herald.yml", "herald.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HeraldConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. an explicit `config_dir` override, when given
/// 2. `./herald.{toml,yaml,yml,json}` (project-local)
/// 3. `~/.config/herald/herald.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HeraldConfig::default()` if no config file is found.
pub fn discover_and_load(config_dir: Option<&Path>) -> HeraldConfig {
    if let Some(path) = find_config_file(config_dir) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    HeraldConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file(config_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = config_dir {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
        return None;
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/herald/
    if let Some(dirs) = directories::ProjectDirs::from("", "", "herald") {
        let config_dir = dirs.config_dir();
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/herald/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "herald").map(|d| d.config_dir().to_path_buf())
}

/// Default data directory (`~/.local/share/herald/` or platform equivalent).
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "herald")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".herald"))
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file(None) {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("herald.toml")
}

/// Serialize `config` to TOML and write it to the user-global config path.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &HeraldConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HeraldConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_channels() {
        let raw = r#"
            [server]
            bind = "0.0.0.0"
            port = 9100

            [[channels]]
            account_id = "wa-main"
            kind = "whatsapp"

            [channels.config]
            phone_number_id = "123456"
            access_token = "tok"
            verify_token = "vt"
        "#;
        let cfg = parse_config(raw, Path::new("herald.toml")).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.channels.len(), 1);
        assert_eq!(cfg.channels[0].kind, "whatsapp");
        assert_eq!(cfg.channels[0].config["phone_number_id"], "123456");
    }

    #[test]
    fn parses_routing_rules() {
        let raw = r#"
            [routing]
            default_tasks = ["bot"]

            [[routing.rules]]
            address = "15550001111"
            tasks = ["bot", "human"]
        "#;
        let cfg = parse_config(raw, Path::new("herald.toml")).unwrap();
        assert_eq!(cfg.routing.rules.len(), 1);
        assert_eq!(cfg.routing.rules[0].tasks, vec!["bot", "human"]);
    }

    #[test]
    fn unknown_extension_rejected() {
        assert!(parse_config("", Path::new("herald.ini")).is_err());
    }

    #[test]
    fn defaults_when_empty() {
        let cfg = parse_config("", Path::new("herald.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.bot.poll_budget_secs, 20);
        assert_eq!(cfg.tasks.max_attempts, 3);
    }
}
