use std::time::Duration;

pub const VNSTAT_PATH: &str = "VNSTAT_PATH";
pub const VNSTAT_INTERFACE: &str = "VNSTAT_INTERFACE";
pub const VNSTAT_JSON_MODE: &str = "VNSTAT_JSON_MODE";
pub const VNSTAT_UNIT: &str = "VNSTAT_UNIT";
pub const MQTT_TOPIC: &str = "MQTT_TOPIC";
pub const MQTT_USER: &str = "MQTT_USER";
pub const MQTT_PASSWORD: &str = "MQTT_PASSWORD";
pub const MQTT_SSL_PATH: &str = "MQTT_SSL_PATH";
pub const MQTT_HOST: &str = "MQTT_HOST";
pub const MQTT_PORT: &str = "MQTT_PORT";

pub const DEFAULT_MQTT_HOST: &str = "k5aafa94.ala.asia-southeast1.emqxsl.com";
pub const DEFAULT_MQTT_PORT: u16 = 8883;

pub const TICK_INTERVAL: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Client identifier that tells apart agents sharing one broker login.
pub fn generate_client_id() -> String {
    format!("agent-{}", rand::random::<u64>())
}

/// Reads a variable from the process environment, treating empty values as unset.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
