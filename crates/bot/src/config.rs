use core::time::Duration;
use std::{fs, path::Path};

use anyhow::{Context as _, Result, anyhow};
use responder_core::{ReconnectPolicy, ResponderConfig};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct BotConfig {
    #[serde(flatten)]
    pub(crate) responder: ResponderConfig,
    /// Sent to the owner each time a session comes up. `null` disables it.
    #[serde(default = "default_startup_notice")]
    pub(crate) startup_notice: Option<String>,
    #[serde(default = "default_reconnect_delay_secs")]
    pub(crate) reconnect_delay_secs: u64,
    #[serde(default)]
    pub(crate) max_reconnect_attempts: Option<u32>,
    #[serde(default)]
    pub(crate) keepalive: KeepaliveConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub(crate) struct KeepaliveConfig {
    pub(crate) status: String,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            status: "💀 Necromancer bot is running and awaiting commands!".to_owned(),
        }
    }
}

impl BotConfig {
    pub(crate) fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_secs(self.reconnect_delay_secs),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn default_startup_notice() -> Option<String> {
    Some("☠️ The Necromancer has risen. Awaiting your dark commands.".to_owned())
}

const fn default_reconnect_delay_secs() -> u64 {
    5
}

pub(crate) fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config file not found at {}. Create one or set --config",
            path.display()
        ));
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    if cfg.responder.owner.trim().is_empty() {
        return Err(anyhow!("config `owner` must name the owner's user id"));
    }
    if cfg.responder.command_prefix.trim().is_empty() {
        return Err(anyhow!("config `command_prefix` must not be blank"));
    }
    Ok(cfg)
}
