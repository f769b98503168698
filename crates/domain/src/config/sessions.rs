use serde::{Deserialize, Serialize};

/// Session lifecycle rules (resets, idle timeouts).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Daily reset hour (0-23, local gateway time). `None` disables daily reset.
    #[serde(default)]
    pub daily_reset_hour: Option<u8>,
    /// Idle timeout in minutes. If the last message was more than this many
    /// minutes ago, the session is reset on the next inbound message.
    #[serde(default)]
    pub idle_minutes: Option<u32>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: Some(4),
            idle_minutes: None,
        }
    }
}
