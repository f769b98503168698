use serde::{Deserialize, Serialize};

/// `telegram.{botToken, adminId, secretToken?, webhookUrl?}`.
///
/// Validated at startup but not connected to a running bridge — chat-bot
/// bridges are explicitly out of scope for this core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub admin_id: Option<String>,
    #[serde(default)]
    pub secret_token: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}
