//! Owner and whitelist checks backed by the shared config.
use crate::config::SharedConfig;

/// Answers "is this user the owner" / "is this user allowed to query".
/// Checks look at the sending user's id, never the chat id.
#[derive(Clone)]
pub struct AccessControl {
    config: SharedConfig,
}

impl AccessControl {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// The owner may run management commands regardless of whitelist state.
    pub async fn is_owner(&self, user_id: i64) -> bool {
        self.config.with(|cfg| cfg.tg.owner == user_id).await
    }

    /// Disabling the whitelist opens the bot to every user.
    pub async fn is_allowed(&self, user_id: i64) -> bool {
        self.config
            .with(|cfg| {
                !cfg.tg.use_whitelist
                    || cfg.tg.owner == user_id
                    || cfg.tg.whitelist.values().any(|id| *id == user_id)
            })
            .await
    }
}
