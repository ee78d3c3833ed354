use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConsoleFormat {
    /// Coloured one-line summary per tick
    Text,
    /// One JSON object per tick
    Json,
}

#[derive(Clone, Debug, Parser)]
#[command(
    name = "host_telemetry",
    about = "Publishes host CPU, memory, disk and network metrics to an MQTT broker"
)]
pub struct Config {
    /// MQTT broker host
    #[arg(long, env = "TELEMETRY_MQTT_HOST", default_value = "localhost")]
    pub host: String,

    /// MQTT broker port
    #[arg(long, env = "TELEMETRY_MQTT_PORT", default_value_t = 1883)]
    pub port: u16,

    /// Broker username (credentials are sent only when username and password are both set)
    #[arg(long, env = "TELEMETRY_MQTT_USERNAME", default_value = "")]
    pub username: String,

    /// Broker password
    #[arg(
        long,
        env = "TELEMETRY_MQTT_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub password: String,

    /// MQTT client identifier
    #[arg(long, default_value = "obsidianhub_system_monitor")]
    pub client_id: String,

    /// Prefix for every published topic
    #[arg(long, default_value = "obsidianhub/system_monitor")]
    pub topic_prefix: String,

    /// MQTT keep-alive in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(5..))]
    pub keep_alive_secs: u64,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Filesystem mount point whose usage is reported
    #[arg(long, default_value = "/")]
    pub mount_point: PathBuf,

    /// First delay between reconnect attempts in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds
    #[arg(long, default_value_t = 60000)]
    pub reconnect_max_ms: u64,

    /// Also print each snapshot to stdout
    #[arg(long, value_enum)]
    pub console: Option<ConsoleFormat>,
}

/// Everything the MQTT transport needs to open a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn broker(&self) -> BrokerConfig {
        let credentials = if self.username.is_empty() || self.password.is_empty() {
            None
        } else {
            Some((self.username.clone(), self.password.clone()))
        };
        BrokerConfig {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
            credentials,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        }
    }
}
