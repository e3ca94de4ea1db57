use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use taskdeck_engine::RemindPolicy;

#[derive(Debug, Parser)]
#[command(name = "taskdeck", about = "Headless task tracker and reminder daemon")]
pub struct AppConfig {
    /// Directory for persisted state. Defaults to the platform data dir.
    #[arg(long, env = "TASKDECK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Reminder poll cadence in seconds.
    #[arg(long, env = "TASKDECK_POLL_INTERVAL", default_value = "3")]
    pub poll_interval: u64,

    /// Which task statuses fire reminders: not-started-only or until-done.
    #[arg(long, env = "TASKDECK_REMIND_POLICY", default_value = "not-started-only", value_parser = parse_policy)]
    pub remind_policy: RemindPolicy,

    /// Broker handshake timeout in seconds when joining a room.
    #[arg(long, env = "TASKDECK_HANDSHAKE_TIMEOUT", default_value = "10")]
    pub handshake_timeout: u64,

    /// Room token to join for collaborative sessions.
    #[arg(long, env = "TASKDECK_ROOM")]
    pub room: Option<String>,

    /// Auto-dismiss a presented reminder after this many seconds, so the
    /// headless daemon keeps cycling without an interactive dismisser.
    #[arg(long, env = "TASKDECK_AUTO_DISMISS", default_value = "30")]
    pub auto_dismiss: u64,
}

fn parse_policy(s: &str) -> Result<RemindPolicy, String> {
    RemindPolicy::from_str(s)
        .ok_or_else(|| format!("unknown remind policy '{s}' (expected not-started-only or until-done)"))
}

impl AppConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }
}

fn default_data_dir() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local/share")
    } else {
        PathBuf::from(".")
    };
    base.join("taskdeck")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = AppConfig::parse_from(["taskdeck"]);
        assert_eq!(config.poll_interval, 3);
        assert_eq!(config.remind_policy, RemindPolicy::NotStartedOnly);
        assert_eq!(config.auto_dismiss, 30);
        assert!(config.room.is_none());
    }

    #[test]
    fn policy_flag_parses_both_values() {
        let config = AppConfig::parse_from(["taskdeck", "--remind-policy", "until-done"]);
        assert_eq!(config.remind_policy, RemindPolicy::UntilDone);

        let bad = AppConfig::try_parse_from(["taskdeck", "--remind-policy", "always"]);
        assert!(bad.is_err());
    }
}
