use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Topic filter to subscribe to, e.g. `owntracks/#`.
    pub topic: String,
    pub username: String,
    pub password: String,
    pub tls: bool,
    pub client_prefix: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a write waits for another connection's write lock before failing.
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind_address: String,
    pub port: u16,
    pub map_token: String,
}

impl AppConfig {
    /// Loads the configuration from the process environment, optionally seeded from a dotenv file.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("unable to read env file {}", path.display()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }

        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mqtt = MqttConfig {
            host: var_or("MQTT_HOST", "localhost"),
            port: parse_or(lookup("MQTT_PORT"), 1883),
            topic: var_or("MQTT_TOPIC", "owntracks/#"),
            username: lookup("MQTT_USERNAME").unwrap_or_default(),
            password: lookup("MQTT_PASSWORD").unwrap_or_default(),
            tls: parse_or(lookup("MQTT_TLS"), false),
            client_prefix: var_or("MQTT_CLIENT_PREFIX", "location-history"),
        };

        let database = DatabaseConfig {
            url: var_or("DATABASE_URL", "sqlite://locationhistory.db"),
            max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), 5),
            busy_timeout: Duration::from_secs(parse_or(lookup("DB_BUSY_TIMEOUT_SECS"), 30)),
        };

        let http = HttpConfig {
            bind_address: var_or("HTTP_BIND_ADDRESS", "0.0.0.0"),
            port: parse_or(lookup("HTTP_PORT"), 8080),
            map_token: lookup("MAPBOX_TOKEN").unwrap_or_default(),
        };

        let log_level = var_or("LOG_LEVEL", "info");

        Self {
            mqtt,
            database,
            http,
            log_level,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic, "owntracks/#");
        assert!(!config.mqtt.tls);
        assert!(config.mqtt.username.is_empty());
        assert_eq!(config.database.url, "sqlite://locationhistory.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.busy_timeout, Duration::from_secs(30));
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = config_from(&[
            ("MQTT_HOST", "broker.example.org"),
            ("MQTT_PORT", "8883"),
            ("MQTT_TLS", "true"),
            ("DB_MAX_CONNECTIONS", "not-a-number"),
            ("DB_BUSY_TIMEOUT_SECS", "120"),
            ("HTTP_PORT", " 9000 "),
            ("MAPBOX_TOKEN", "pk.abc"),
        ]);
        assert_eq!(config.mqtt.host, "broker.example.org");
        assert_eq!(config.mqtt.port, 8883);
        assert!(config.mqtt.tls);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.busy_timeout, Duration::from_secs(120));
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.map_token, "pk.abc");
    }
}
