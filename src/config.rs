//! Service configuration.
//!
//! The front coordinator reads a YAML file discovered through a list of
//! conventional locations (environment variable first, then the command
//! line, then well-known directories). Every field has a default, so a
//! partial file is enough. Durations are humantime strings ("15s", "2m").

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration file name of the front coordinator.
pub const CONFIG_FILE: &str = "stripestore-front.yaml";
/// Environment variable pointing at the configuration directory.
pub const CONFIG_ENV: &str = "CONFIGPATH";

const CONFIG_DIR: &str = "config";

/// Web server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WebConfig {
    /// Listen addresses; a bare ":8008" binds all interfaces. Entries may
    /// reference environment variables ($VAR, ${VAR} or %VAR%).
    pub port_http: Vec<String>,
    #[serde(with = "duration_str")]
    pub read_timeout: Duration,
    #[serde(with = "duration_str")]
    pub read_header_timeout: Duration,
    #[serde(with = "duration_str")]
    pub write_timeout: Duration,
    #[serde(with = "duration_str")]
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
    /// Maximum duration to wait for graceful shutdown.
    #[serde(with = "duration_str")]
    pub shutdown_timeout: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port_http: vec![":8008".to_string(), ":8010".to_string()],
            read_timeout: Duration::from_secs(15),
            read_header_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            max_header_bytes: 1 << 20,
            shutdown_timeout: Duration::from_secs(15),
        }
    }
}

/// File striping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// Weight partitions by current node fill instead of splitting evenly.
    pub node_fluid_fill: bool,
    /// Files up to this size per node are kept as a single partition.
    pub min_node_chunk_size: i64,
    /// Size of the slices sent over a write stream.
    pub stream_chunk_size: i64,
    /// Per-call deadline for remove/purge calls issued to nodes.
    #[serde(with = "duration_str")]
    pub api_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            node_fluid_fill: true,
            min_node_chunk_size: 4 * 1024,
            stream_chunk_size: 1024,
            api_timeout: Duration::from_secs(2),
        }
    }
}

/// Common service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub webserver: WebConfig,
    pub storage: StorageConfig,
    /// Addresses of the storage nodes dialed at startup.
    pub node_list: Vec<String>,
}

impl Config {
    /// Loads and validates the configuration. A missing file is an error;
    /// the caller decides whether that is fatal.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = detect_config_path(cli_path)?;
        let body = std::fs::read_to_string(&path)
            .with_context(|| format!("can not read '{}'", path.display()))?;
        let mut cfg: Config = serde_yaml::from_str(&body)
            .with_context(|| format!("can not parse '{}'", path.display()))?;
        cfg.validate();
        Ok(cfg)
    }

    /// Clamps out-of-range values to safe defaults.
    pub fn validate(&mut self) {
        if self.storage.min_node_chunk_size <= 0 {
            self.storage.min_node_chunk_size = 4 * 1024;
            warn!(
                "'min-node-chunk-size' is adjusted to {}",
                self.storage.min_node_chunk_size
            );
        }
        if self.storage.stream_chunk_size <= 0 {
            self.storage.stream_chunk_size = 512;
            warn!(
                "'stream-chunk-size' is adjusted to {}",
                self.storage.stream_chunk_size
            );
        }
    }
}

/// Finds the configuration file: $CONFIGPATH, the command line path, a
/// `config` subdirectory next to the executable or under the working
/// directory, the executable directory, the working directory.
fn detect_config_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = env::var(CONFIG_ENV) {
        dirs.push(PathBuf::from(expand_env(&dir)));
    }
    if let Some(dir) = cli_path {
        dirs.push(dir.to_path_buf());
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            dirs.push(exe_dir.join(CONFIG_DIR));
            dirs.push(exe_dir.to_path_buf());
        }
    }
    dirs.push(PathBuf::from(CONFIG_DIR));
    dirs.push(PathBuf::from("."));

    for dir in &dirs {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            return Ok(path);
        }
    }
    bail!("no configuration path was found");
}

/// Expands environment variables written as $VAR, ${VAR} or %VAR% to their
/// values; unknown names are left as-is.
pub fn expand_env(s: &str) -> String {
    let evl = Regex::new(r"\$(\w+)").unwrap();
    let evu = Regex::new(r"\$\{(\w+)\}").unwrap();
    let evw = Regex::new(r"%(\w+)%").unwrap();

    let pass = |re: &Regex, s: &str| -> String {
        re.replace_all(s, |caps: &regex::Captures| {
            match env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
    };
    pass(&evw, &pass(&evu, &pass(&evl, s)))
}

/// Turns a port string into a bindable socket address: ":8008" becomes
/// "0.0.0.0:8008", anything else is passed through.
pub fn listen_addr(port: &str) -> String {
    if let Some(rest) = port.strip_prefix(':') {
        format!("0.0.0.0:{}", rest)
    } else {
        port.to_string()
    }
}

mod duration_str {
    //! Serde adapter storing [`Duration`] as a humantime string.

    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(de)?;
        humantime::parse_duration(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.webserver.port_http, vec![":8008", ":8010"]);
        assert_eq!(cfg.webserver.read_timeout, Duration::from_secs(15));
        assert_eq!(cfg.webserver.idle_timeout, Duration::from_secs(60));
        assert_eq!(cfg.webserver.max_header_bytes, 1 << 20);
        assert!(cfg.storage.node_fluid_fill);
        assert_eq!(cfg.storage.min_node_chunk_size, 4096);
        assert_eq!(cfg.storage.stream_chunk_size, 1024);
        assert_eq!(cfg.storage.api_timeout, Duration::from_secs(2));
        assert!(cfg.node_list.is_empty());
    }

    #[test]
    fn validate_clamps_sizes() {
        let mut cfg = Config::default();
        cfg.storage.min_node_chunk_size = 0;
        cfg.storage.stream_chunk_size = -5;
        cfg.validate();
        assert_eq!(cfg.storage.min_node_chunk_size, 4096);
        assert_eq!(cfg.storage.stream_chunk_size, 512);
    }

    #[test]
    fn parses_partial_yaml() {
        let yaml = r#"
webserver:
  port-http: [":9000"]
  shutdown-timeout: 5s
storage:
  node-fluid-fill: false
  min-node-chunk-size: 8192
node-list: ["127.0.0.1:50051", "127.0.0.1:50052"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.webserver.port_http, vec![":9000"]);
        assert_eq!(cfg.webserver.shutdown_timeout, Duration::from_secs(5));
        // untouched sections keep their defaults
        assert_eq!(cfg.webserver.read_timeout, Duration::from_secs(15));
        assert!(!cfg.storage.node_fluid_fill);
        assert_eq!(cfg.storage.min_node_chunk_size, 8192);
        assert_eq!(cfg.storage.stream_chunk_size, 1024);
        assert_eq!(cfg.node_list.len(), 2);
    }

    #[test]
    fn expand_env_all_syntaxes() {
        env::set_var("STRIPESTORE_TEST_PORT", "8123");
        assert_eq!(expand_env(":$STRIPESTORE_TEST_PORT"), ":8123");
        assert_eq!(expand_env(":${STRIPESTORE_TEST_PORT}"), ":8123");
        assert_eq!(expand_env(":%STRIPESTORE_TEST_PORT%"), ":8123");
        assert_eq!(expand_env(":$STRIPESTORE_TEST_MISSING"), ":$STRIPESTORE_TEST_MISSING");
        env::remove_var("STRIPESTORE_TEST_PORT");
    }

    #[test]
    fn listen_addr_prefixes_bare_ports() {
        assert_eq!(listen_addr(":8008"), "0.0.0.0:8008");
        assert_eq!(listen_addr("127.0.0.1:8008"), "127.0.0.1:8008");
    }
}
