//! Sniffer configuration from environment variables and command-line flags

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted `SNIFFER_INTERVAL_SECS`, one day
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendType {
    Jsonl,
    Log,
    Kafka,
}

impl BackendType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jsonl" => Some(BackendType::Jsonl),
            "log" => Some(BackendType::Log),
            "kafka" => Some(BackendType::Kafka),
            _ => None,
        }
    }
}

/// Broker authentication
#[derive(Clone, PartialEq)]
pub enum KafkaAuth {
    Disabled,
    /// SASL/PLAIN
    Plain { user: String, pass: String },
}

impl KafkaAuth {
    fn anonymous() -> Self {
        KafkaAuth::Plain {
            user: "anon".to_string(),
            pass: "anon".to_string(),
        }
    }
}

impl std::fmt::Debug for KafkaAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KafkaAuth::Disabled => write!(f, "Disabled"),
            KafkaAuth::Plain { user, .. } => write!(f, "Plain {{ user: {:?}, pass: \"***\" }}", user),
        }
    }
}

/// Kafka producer connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub tls: bool,
    pub auth: KafkaAuth,
}

impl KafkaConfig {
    /// librdkafka client properties for this connection
    pub fn client_properties(&self) -> Vec<(&'static str, String)> {
        let protocol = match (self.tls, &self.auth) {
            (false, KafkaAuth::Disabled) => "plaintext",
            (true, KafkaAuth::Disabled) => "ssl",
            (false, KafkaAuth::Plain { .. }) => "sasl_plaintext",
            (true, KafkaAuth::Plain { .. }) => "sasl_ssl",
        };

        let mut properties = vec![
            ("bootstrap.servers", self.brokers.join(",")),
            ("security.protocol", protocol.to_string()),
            // leader ack only, snappy batches flushed every 500ms
            ("acks", "1".to_string()),
            ("compression.type", "snappy".to_string()),
            ("linger.ms", "500".to_string()),
        ];

        if let KafkaAuth::Plain { user, pass } = &self.auth {
            properties.push(("sasl.mechanisms", "PLAIN".to_string()));
            properties.push(("sasl.username", user.clone()));
            properties.push(("sasl.password", pass.clone()));
        }

        properties
    }

    /// Read the broker settings
    ///
    /// - `KAFKA_BROKERS` (default: `127.0.0.1:9092,[::1]:9092`)
    /// - `KAFKA_DISABLE_TLS` (default: true)
    /// - `KAFKA_DISABLE_AUTH` (default: true)
    /// - `KAFKA_AUTH_ANON` (default: true)
    /// - `KAFKA_USER` / `KAFKA_PASS`
    /// - `KAFKA_SASL_USER` / `KAFKA_SASL_PASS` when no explicit user is given
    ///
    /// With auth enabled: anonymous wins, then the explicit user, then the
    /// SASL pair from the environment, and `anon:anon` when neither is set.
    fn from_sources<F>(var: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let brokers: Vec<String> = var("KAFKA_BROKERS")
            .unwrap_or_else(|| "127.0.0.1:9092,[::1]:9092".to_string())
            .split(',')
            .map(|broker| broker.trim().to_string())
            .filter(|broker| !broker.is_empty())
            .collect();

        let disable_tls = parse_bool(var, "KAFKA_DISABLE_TLS", true)?;
        let disable_auth = parse_bool(var, "KAFKA_DISABLE_AUTH", true)?;
        let auth_anon = parse_bool(var, "KAFKA_AUTH_ANON", true)?;

        let auth = if disable_auth {
            KafkaAuth::Disabled
        } else if auth_anon {
            KafkaAuth::anonymous()
        } else if let Some(user) = var("KAFKA_USER").filter(|user| !user.is_empty()) {
            KafkaAuth::Plain {
                user,
                pass: var("KAFKA_PASS").unwrap_or_default(),
            }
        } else {
            match (
                var("KAFKA_SASL_USER").filter(|v| !v.is_empty()),
                var("KAFKA_SASL_PASS").filter(|v| !v.is_empty()),
            ) {
                (Some(user), Some(pass)) => KafkaAuth::Plain { user, pass },
                _ => {
                    log::warn!("No Kafka credentials available, using anonymous auth");
                    KafkaAuth::anonymous()
                }
            }
        };

        Ok(Self {
            brokers,
            tls: !disable_tls,
            auth,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingValue(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingValue(flag) => write!(f, "Missing value for {}", flag),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime configuration for the sniffer
#[derive(Debug, Clone)]
pub struct SnifferConfig {
    /// Interface to capture on
    pub interface: String,

    /// Aggregation window length in seconds
    pub interval_secs: u64,

    /// Topic the flow records are published to
    pub out_topic: String,

    /// Directory for the JSONL topic logs
    pub output_dir: PathBuf,

    /// Bound of each topic's producer queue (records)
    pub queue_capacity: usize,

    /// Log every emitted flow record
    pub log_packets: bool,

    pub backend: BackendType,

    pub output_max_size_mb: u64,
    pub output_max_rotations: u32,
    pub rust_log: String,

    /// File the log output is also appended to, `None` for stderr only
    pub log_file: Option<PathBuf>,

    pub kafka: KafkaConfig,
}

impl SnifferConfig {
    /// Load configuration from the process environment and arguments
    ///
    /// Environment variables:
    /// - `SNIFFER_INTERFACE` (default: en0)
    /// - `SNIFFER_INTERVAL_SECS` (default: 60)
    /// - `SNIFFER_OUT_TOPIC` (default: mptcp-packets)
    /// - `SNIFFER_OUTPUT_DIR` (default: streams/mptcp)
    /// - `SNIFFER_QUEUE_CAPACITY` (default: 1000)
    /// - `SNIFFER_LOG_PACKETS` (default: true)
    /// - `SNIFFER_BACKEND` (default: jsonl)
    /// - `OUTPUT_MAX_SIZE_MB` (default: 100)
    /// - `OUTPUT_MAX_ROTATIONS` (default: 10)
    /// - `RUST_LOG` (default: info)
    /// - `SNIFFER_LOG_FILE` (default: ./mptcp_sniffer.log, empty disables)
    /// - the `KAFKA_*` broker settings, see `KafkaConfig`
    ///
    /// `--interface <name>`, `--backend <jsonl|log|kafka>` and `--log <path>`
    /// override the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = env::args().collect();
        Self::from_sources(|key| env::var(key).ok(), &args)
    }

    pub fn from_sources<F>(var: F, args: &[String]) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interface = match arg_value(args, "--interface")? {
            Some(name) => name,
            None => var("SNIFFER_INTERFACE").unwrap_or_else(|| "en0".to_string()),
        };

        let interval_raw = var("SNIFFER_INTERVAL_SECS").unwrap_or_else(|| "60".to_string());
        let interval_secs = match interval_raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "SNIFFER_INTERVAL_SECS must be a positive integer, got '{}'",
                    interval_raw
                )))
            }
        };

        let log_file = match arg_value(args, "--log")? {
            Some(path) => Some(path),
            None => var("SNIFFER_LOG_FILE").or_else(|| Some("./mptcp_sniffer.log".to_string())),
        }
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from);

        let backend_raw = match arg_value(args, "--backend")? {
            Some(value) => value,
            None => var("SNIFFER_BACKEND").unwrap_or_else(|| "jsonl".to_string()),
        };
        let backend = BackendType::from_str(&backend_raw).ok_or_else(|| {
            ConfigError::InvalidValue(format!("unknown backend '{}', expected jsonl, log or kafka", backend_raw))
        })?;

        let log_packets = match var("SNIFFER_LOG_PACKETS") {
            Some(value) => value.to_lowercase().parse::<bool>().unwrap_or_else(|_| {
                log::warn!("Invalid SNIFFER_LOG_PACKETS '{}', defaulting to true", value);
                true
            }),
            None => true,
        };

        let config = Self {
            interface,
            interval_secs,
            out_topic: var("SNIFFER_OUT_TOPIC").unwrap_or_else(|| "mptcp-packets".to_string()),
            output_dir: var("SNIFFER_OUTPUT_DIR")
                .unwrap_or_else(|| "streams/mptcp".to_string())
                .into(),
            queue_capacity: var("SNIFFER_QUEUE_CAPACITY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            log_packets,
            backend,
            output_max_size_mb: var("OUTPUT_MAX_SIZE_MB")
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            output_max_rotations: var("OUTPUT_MAX_ROTATIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_file,
            kafka: KafkaConfig::from_sources(&var)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.trim().is_empty() {
            return Err(ConfigError::InvalidValue("interface cannot be empty".to_string()));
        }

        if self.out_topic.trim().is_empty() {
            return Err(ConfigError::InvalidValue("output topic cannot be empty".to_string()));
        }

        if self.interval_secs == 0 || self.interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "interval must be between 1 and {} seconds, got {}",
                MAX_INTERVAL_SECS, self.interval_secs
            )));
        }

        if self.backend == BackendType::Kafka && self.kafka.brokers.is_empty() {
            return Err(ConfigError::InvalidValue("KAFKA_BROKERS cannot be empty".to_string()));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("queue capacity must be positive".to_string()));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn parse_bool<F>(var: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(value) => value.trim().to_lowercase().parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(format!("{} must be true or false, got '{}'", key, value))
        }),
        None => Ok(default),
    }
}

fn arg_value(args: &[String], flag: &str) -> Result<Option<String>, ConfigError> {
    match args.iter().position(|arg| arg == flag) {
        Some(idx) => match args.get(idx + 1) {
            Some(value) if !value.starts_with("--") => Ok(Some(value.clone())),
            _ => Err(ConfigError::MissingValue(flag.to_string())),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], args: &[&str]) -> Result<SnifferConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        SnifferConfig::from_sources(|key| vars.get(key).cloned(), &args)
    }

    #[test]
    fn test_default_config() {
        let config = load(&[], &["mptcp_sniffer"]).unwrap();

        assert_eq!(config.interface, "en0");
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.out_topic, "mptcp-packets");
        assert_eq!(config.output_dir, PathBuf::from("streams/mptcp"));
        assert_eq!(config.queue_capacity, 1000);
        assert!(config.log_packets);
        assert_eq!(config.backend, BackendType::Jsonl);
        assert_eq!(config.output_max_size_mb, 100);
        assert_eq!(config.output_max_rotations, 10);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.log_file, Some(PathBuf::from("./mptcp_sniffer.log")));
        assert_eq!(
            config.kafka,
            KafkaConfig {
                brokers: vec!["127.0.0.1:9092".to_string(), "[::1]:9092".to_string()],
                tls: false,
                auth: KafkaAuth::Disabled,
            }
        );
    }

    #[test]
    fn test_custom_config() {
        let config = load(
            &[
                ("SNIFFER_INTERFACE", "eth1"),
                ("SNIFFER_INTERVAL_SECS", "5"),
                ("SNIFFER_OUT_TOPIC", "mptcp-flows"),
                ("SNIFFER_LOG_PACKETS", "FALSE"),
                ("SNIFFER_BACKEND", "log"),
            ],
            &["mptcp_sniffer"],
        )
        .unwrap();

        assert_eq!(config.interface, "eth1");
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.out_topic, "mptcp-flows");
        assert!(!config.log_packets);
        assert_eq!(config.backend, BackendType::Log);
    }

    #[test]
    fn test_flags_override_env() {
        let config = load(
            &[("SNIFFER_INTERFACE", "eth1"), ("SNIFFER_BACKEND", "log")],
            &["mptcp_sniffer", "--interface", "wlan0", "--backend", "jsonl"],
        )
        .unwrap();

        assert_eq!(config.interface, "wlan0");
        assert_eq!(config.backend, BackendType::Jsonl);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("SNIFFER_INTERVAL_SECS", "0")], &[]).is_err());
        assert!(load(&[("SNIFFER_INTERVAL_SECS", "soon")], &[]).is_err());
        assert!(load(&[("SNIFFER_BACKEND", "pulsar")], &[]).is_err());
        assert!(load(&[("SNIFFER_OUT_TOPIC", " ")], &[]).is_err());
        assert!(load(&[("SNIFFER_QUEUE_CAPACITY", "0")], &[]).is_err());
        assert!(matches!(
            load(&[], &["mptcp_sniffer", "--interface"]),
            Err(ConfigError::MissingValue(_))
        ));
    }

    #[test]
    fn test_interval_upper_bound() {
        let max = MAX_INTERVAL_SECS.to_string();
        assert_eq!(load(&[("SNIFFER_INTERVAL_SECS", max.as_str())], &[]).unwrap().interval_secs, MAX_INTERVAL_SECS);

        let over = (MAX_INTERVAL_SECS + 1).to_string();
        assert!(load(&[("SNIFFER_INTERVAL_SECS", over.as_str())], &[]).is_err());
        assert!(load(&[("SNIFFER_INTERVAL_SECS", "18446744073709551615")], &[]).is_err());
    }

    #[test]
    fn test_log_file_sources() {
        let config = load(&[("SNIFFER_LOG_FILE", "/var/log/sniffer.log")], &[]).unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/sniffer.log")));

        let config = load(&[("SNIFFER_LOG_FILE", "")], &[]).unwrap();
        assert_eq!(config.log_file, None);

        let config = load(&[("SNIFFER_LOG_FILE", "a.log")], &["mptcp_sniffer", "--log", "b.log"]).unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("b.log")));
    }

    #[test]
    fn test_kafka_auth_resolution() {
        let plain = |user: &str, pass: &str| KafkaAuth::Plain {
            user: user.to_string(),
            pass: pass.to_string(),
        };

        // anonymous wins over explicit credentials
        let config = load(
            &[("KAFKA_DISABLE_AUTH", "false"), ("KAFKA_USER", "alice"), ("KAFKA_PASS", "pw")],
            &[],
        )
        .unwrap();
        assert_eq!(config.kafka.auth, plain("anon", "anon"));

        let config = load(
            &[
                ("KAFKA_DISABLE_AUTH", "false"),
                ("KAFKA_AUTH_ANON", "false"),
                ("KAFKA_USER", "alice"),
                ("KAFKA_PASS", "pw"),
                ("KAFKA_SASL_USER", "bob"),
                ("KAFKA_SASL_PASS", "pw2"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(config.kafka.auth, plain("alice", "pw"));

        let config = load(
            &[
                ("KAFKA_DISABLE_AUTH", "false"),
                ("KAFKA_AUTH_ANON", "false"),
                ("KAFKA_SASL_USER", "bob"),
                ("KAFKA_SASL_PASS", "pw2"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(config.kafka.auth, plain("bob", "pw2"));

        // half a SASL pair falls back to anonymous
        let config = load(
            &[
                ("KAFKA_DISABLE_AUTH", "false"),
                ("KAFKA_AUTH_ANON", "false"),
                ("KAFKA_SASL_USER", "bob"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(config.kafka.auth, plain("anon", "anon"));

        assert!(load(&[("KAFKA_DISABLE_TLS", "maybe")], &[]).is_err());
    }

    #[test]
    fn test_kafka_client_properties() {
        let config = load(
            &[
                ("SNIFFER_BACKEND", "kafka"),
                ("KAFKA_BROKERS", "k1:9093, k2:9093"),
                ("KAFKA_DISABLE_TLS", "false"),
                ("KAFKA_DISABLE_AUTH", "false"),
                ("KAFKA_AUTH_ANON", "false"),
                ("KAFKA_USER", "alice"),
                ("KAFKA_PASS", "secret"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(config.backend, BackendType::Kafka);

        let properties: HashMap<&str, String> = config.kafka.client_properties().into_iter().collect();
        assert_eq!(properties["bootstrap.servers"], "k1:9093,k2:9093");
        assert_eq!(properties["security.protocol"], "sasl_ssl");
        assert_eq!(properties["sasl.mechanisms"], "PLAIN");
        assert_eq!(properties["sasl.username"], "alice");
        assert_eq!(properties["sasl.password"], "secret");
        assert_eq!(properties["compression.type"], "snappy");

        assert!(!format!("{:?}", config.kafka).contains("secret"));

        let plaintext = load(&[], &[]).unwrap().kafka.client_properties();
        assert!(plaintext.contains(&("security.protocol", "plaintext".to_string())));
        assert!(!plaintext.iter().any(|(key, _)| key.starts_with("sasl")));

        assert!(load(&[("SNIFFER_BACKEND", "kafka"), ("KAFKA_BROKERS", " , ")], &[]).is_err());
    }
}
