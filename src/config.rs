use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: String,
    /// Device access token, sent as the MQTT password.
    pub access_token: String,
    /// MQTT encodes keep-alive as a 16-bit field.
    pub keep_alive_secs: u16,
    pub max_backoff_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub interval_secs: u64,
}

/// Reads variables through `lookup`, which returns `None` for unset keys.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn or_default<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw }),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let config = Self {
            mqtt: MqttConfig {
                broker_host: vars.required("MQTT_BROKER_HOST")?,
                broker_port: vars.or_default("MQTT_BROKER_PORT", 1883)?,
                client_id: vars.required("MQTT_CLIENT_ID")?,
                username: vars.required("MQTT_USERNAME")?,
                access_token: vars.required("MQTT_ACCESS_TOKEN")?,
                keep_alive_secs: vars.or_default("MQTT_KEEP_ALIVE_SECS", 30)?,
                max_backoff_secs: vars.or_default("RECONNECT_MAX_BACKOFF_SECS", 60)?,
            },
            telemetry: TelemetryConfig {
                interval_secs: vars.or_default("TELEMETRY_INTERVAL_SECS", 5)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Zero("MQTT_BROKER_PORT"));
        }
        if self.mqtt.keep_alive_secs == 0 {
            return Err(ConfigError::Zero("MQTT_KEEP_ALIVE_SECS"));
        }
        if self.mqtt.max_backoff_secs == 0 {
            return Err(ConfigError::Zero("RECONNECT_MAX_BACKOFF_SECS"));
        }
        if self.telemetry.interval_secs == 0 {
            return Err(ConfigError::Zero("TELEMETRY_INTERVAL_SECS"));
        }
        Ok(())
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("MQTT_BROKER_HOST", "app.coreiot.io"),
        ("MQTT_CLIENT_ID", "IOT_DEVICE_2"),
        ("MQTT_USERNAME", "iot_device_2"),
        ("MQTT_ACCESS_TOKEN", "iot_device_2"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.mqtt.broker_host, "app.coreiot.io");
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(config.mqtt.max_backoff_secs, 60);
        assert_eq!(config.telemetry_interval(), Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_BROKER_PORT", "8883"));
        pairs.push(("TELEMETRY_INTERVAL_SECS", "1"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.telemetry.interval_secs, 1);
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "MQTT_ACCESS_TOKEN")
            .collect();
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("MQTT_ACCESS_TOKEN"));
    }

    #[test]
    fn blank_required_var_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("MQTT_BROKER_HOST", "  ");
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("MQTT_BROKER_HOST"));
    }

    #[test]
    fn unparseable_port_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_BROKER_PORT", "abc"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "MQTT_BROKER_PORT",
                value: "abc".into()
            }
        );
    }

    #[test]
    fn keep_alive_beyond_u16_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MQTT_KEEP_ALIVE_SECS", "65536"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "MQTT_KEEP_ALIVE_SECS",
                value: "65536".into()
            }
        );

        pairs.pop();
        pairs.push(("MQTT_KEEP_ALIVE_SECS", "65535"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.mqtt.keep_alive_secs, u16::MAX);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TELEMETRY_INTERVAL_SECS", "0"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Zero("TELEMETRY_INTERVAL_SECS"));
    }
}
