use clap::Args;
use minechat_core::supervisor::{DEFAULT_HOST, DEFAULT_READ_PORT, DEFAULT_WRITE_PORT};
use minechat_core::{BackoffPolicy, Credential, Endpoint, SupervisorConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_HISTORY: &str = "minechat.history";
const DEFAULT_CREDENTIALS: &str = "minechat-credentials.json";
const DEFAULT_LOG_DIR: &str = ".minechat/logs";

/// Flags shared by every subcommand. Empty strings mean "not given" so the
/// environment and the defaults can fill in.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Chat server host
    #[arg(long, global = true, default_value = "")]
    pub host: String,
    /// Port of the read-only stream
    #[arg(long, global = true, default_value = "")]
    pub read_port: String,
    /// Port of the authenticated write stream
    #[arg(long, global = true, default_value = "")]
    pub write_port: String,
    /// File the chat history is appended to
    #[arg(long, global = true, default_value = "")]
    pub history: String,
    /// Account token; skips the stored credential and registration
    #[arg(long, global = true, default_value = "")]
    pub key: String,
    /// Nickname to register with when no token is known
    #[arg(long, global = true, default_value = "")]
    pub user_name: String,
    /// Where issued credentials are stored
    #[arg(long, global = true, default_value = "")]
    pub credentials: String,
    #[arg(long, global = true, default_value = "")]
    pub log_dir: String,
    #[arg(long, global = true, default_value = "")]
    pub idle_timeout_ms: String,
    #[arg(long, global = true, default_value = "")]
    pub stale_after_ms: String,
    #[arg(long, global = true, default_value = "")]
    pub backoff_initial_ms: String,
    #[arg(long, global = true, default_value = "")]
    pub backoff_max_ms: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub read_port: u16,
    pub write_port: u16,
    pub history_path: PathBuf,
    pub credentials_path: PathBuf,
    pub key: Option<String>,
    pub user_name: Option<String>,
    pub log_dir: String,
    pub log_stdout: bool,
    pub idle_timeout: Duration,
    pub stale_after: Duration,
    pub backoff: BackoffPolicy,
}

impl RuntimeConfig {
    pub fn read_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.read_port)
    }

    pub fn write_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.write_port)
    }

    pub fn supervisor_config(&self, credential: Credential) -> SupervisorConfig {
        SupervisorConfig {
            read_endpoint: self.read_endpoint(),
            write_endpoint: self.write_endpoint(),
            credential,
            read_idle_timeout: self.idle_timeout,
            stale_after: self.stale_after,
            backoff: self.backoff,
            ..SupervisorConfig::default()
        }
    }
}

pub fn load_config(args: ConnectionArgs) -> Result<RuntimeConfig, ConfigError> {
    load_config_with(args, |key| env::var(key).ok())
}

pub fn load_config_with(
    args: ConnectionArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig, ConfigError> {
    let defaults = SupervisorConfig::default();
    let host = resolve_value(&args.host, "MINECHAT_HOST", &lookup)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let read_port = resolve_number(&args.read_port, "MINECHAT_READ_PORT", &lookup)?
        .unwrap_or(u64::from(DEFAULT_READ_PORT));
    let write_port = resolve_number(&args.write_port, "MINECHAT_WRITE_PORT", &lookup)?
        .unwrap_or(u64::from(DEFAULT_WRITE_PORT));
    let history_path = resolve_value(&args.history, "MINECHAT_HISTORY", &lookup)
        .unwrap_or_else(|| DEFAULT_HISTORY.to_string());
    let credentials_path = resolve_value(&args.credentials, "MINECHAT_CREDENTIALS", &lookup)
        .unwrap_or_else(|| DEFAULT_CREDENTIALS.to_string());
    let log_dir = resolve_value(&args.log_dir, "MINECHAT_LOG_DIR", &lookup)
        .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());

    let idle_timeout = resolve_millis(
        &args.idle_timeout_ms,
        "MINECHAT_IDLE_TIMEOUT_MS",
        defaults.read_idle_timeout,
        &lookup,
    )?;
    let stale_after = resolve_millis(
        &args.stale_after_ms,
        "MINECHAT_STALE_AFTER_MS",
        defaults.stale_after,
        &lookup,
    )?;
    let initial = resolve_millis(
        &args.backoff_initial_ms,
        "MINECHAT_BACKOFF_INITIAL_MS",
        defaults.backoff.initial,
        &lookup,
    )?;
    let max = resolve_millis(
        &args.backoff_max_ms,
        "MINECHAT_BACKOFF_MAX_MS",
        defaults.backoff.max,
        &lookup,
    )?;

    Ok(RuntimeConfig {
        host,
        read_port: port("read port", read_port)?,
        write_port: port("write port", write_port)?,
        history_path: PathBuf::from(history_path),
        credentials_path: PathBuf::from(credentials_path),
        key: resolve_value(&args.key, "MINECHAT_KEY", &lookup),
        user_name: resolve_value(&args.user_name, "MINECHAT_USER_NAME", &lookup),
        log_dir,
        log_stdout: resolve_log_stdout(&lookup),
        idle_timeout,
        stale_after,
        backoff: BackoffPolicy {
            initial,
            max: max.max(initial),
            ..defaults.backoff
        },
    })
}

fn resolve_value(flag: &str, key: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    if !flag.trim().is_empty() {
        return Some(flag.trim().to_string());
    }
    if let Some(value) = lookup(key) {
        if !value.trim().is_empty() {
            return Some(value.trim().to_string());
        }
    }
    None
}

fn resolve_number(
    flag: &str,
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = resolve_value(flag, key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { name: key, value })
}

fn resolve_millis(
    flag: &str,
    key: &'static str,
    default: Duration,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Duration, ConfigError> {
    match resolve_number(flag, key, lookup)? {
        Some(0) => Err(ConfigError::Zero { name: key }),
        Some(millis) => Ok(Duration::from_millis(millis)),
        None => Ok(default),
    }
}

fn port(name: &'static str, value: u64) -> Result<u16, ConfigError> {
    match u16::try_from(value) {
        Ok(0) => Err(ConfigError::Zero { name }),
        Ok(port) => Ok(port),
        Err(_) => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}

fn resolve_log_stdout(lookup: &impl Fn(&str) -> Option<String>) -> bool {
    if let Some(value) = lookup("MINECHAT_LOG_STDOUT") {
        match value.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => return true,
            "0" | "false" | "FALSE" | "no" | "NO" => return false,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_given() {
        let config = load_config_with(ConnectionArgs::default(), env_of(&[])).expect("config");
        assert_eq!(config.host, "minechat.dvmn.org");
        assert_eq!(config.read_port, 5000);
        assert_eq!(config.write_port, 5050);
        assert_eq!(config.history_path, PathBuf::from("minechat.history"));
        assert_eq!(
            config.credentials_path,
            PathBuf::from("minechat-credentials.json")
        );
        assert_eq!(config.log_dir, ".minechat/logs");
        assert_eq!(config.key, None);
        assert!(!config.log_stdout);
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
    }

    #[test]
    fn flags_win_over_environment() {
        let args = ConnectionArgs {
            host: "localhost".to_string(),
            read_port: "7000".to_string(),
            key: " abc ".to_string(),
            ..ConnectionArgs::default()
        };
        let env = env_of(&[
            ("MINECHAT_HOST", "env.example"),
            ("MINECHAT_READ_PORT", "7100"),
            ("MINECHAT_WRITE_PORT", "7150"),
            ("MINECHAT_USER_NAME", "neo"),
            ("MINECHAT_LOG_STDOUT", "yes"),
        ]);
        let config = load_config_with(args, env).expect("config");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.read_port, 7000);
        assert_eq!(config.write_port, 7150);
        assert_eq!(config.key.as_deref(), Some("abc"));
        assert_eq!(config.user_name.as_deref(), Some("neo"));
        assert!(config.log_stdout);
        assert_eq!(config.read_endpoint().to_string(), "localhost:7000");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let args = ConnectionArgs {
            write_port: "http".to_string(),
            ..ConnectionArgs::default()
        };
        assert_eq!(
            load_config_with(args, env_of(&[])).expect_err("bad port"),
            ConfigError::InvalidNumber {
                name: "MINECHAT_WRITE_PORT",
                value: "http".to_string(),
            }
        );

        let args = ConnectionArgs {
            read_port: "70000".to_string(),
            ..ConnectionArgs::default()
        };
        assert!(load_config_with(args, env_of(&[])).is_err());

        let env = env_of(&[("MINECHAT_STALE_AFTER_MS", "0")]);
        assert_eq!(
            load_config_with(ConnectionArgs::default(), env).expect_err("zero"),
            ConfigError::Zero {
                name: "MINECHAT_STALE_AFTER_MS"
            }
        );
    }

    #[test]
    fn tunables_flow_into_supervisor_config() {
        let args = ConnectionArgs {
            idle_timeout_ms: "250".to_string(),
            stale_after_ms: "4000".to_string(),
            backoff_initial_ms: "200".to_string(),
            backoff_max_ms: "100".to_string(),
            ..ConnectionArgs::default()
        };
        let config = load_config_with(args, env_of(&[])).expect("config");
        let supervisor = config.supervisor_config(Credential::with_token("abc"));
        assert_eq!(supervisor.read_idle_timeout, Duration::from_millis(250));
        assert_eq!(supervisor.stale_after, Duration::from_secs(4));
        assert_eq!(supervisor.backoff.initial, Duration::from_millis(200));
        assert_eq!(supervisor.backoff.max, Duration::from_millis(200));
        assert_eq!(supervisor.credential.usable_token(), Some("abc"));
    }
}
