//! Per-chat pending steps for multi-turn commands.
//!
//! A multi-step command parks the next expected step here and returns; the
//! dispatcher routes the chat's next message back to it. Steps are plain data
//! so the state machine can be inspected and tested without simulating
//! message delivery. Nothing is persisted: a restart drops every pending step.
use std::collections::HashMap;
use teloxide::types::ChatId;
use tokio::sync::Mutex;

/// Text that aborts any pending step.
pub const CANCEL_COMMAND: &str = "/cancel";

/// The next expected reply of a suspended command, with its captured
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Add flow: waiting for the photo that will become WAT `name`.
    AwaitingImage { name: String },
    /// Remove flow: waiting for the name of the WAT to delete.
    AwaitingRemovalChoice,
    /// Edit flow: waiting for the name of the WAT whose expressions to show.
    AwaitingExpressionTarget,
    /// Edit flow: waiting for the comma separated expression list for `name`.
    AwaitingExpressions { name: String },
}

/// Pending continuations keyed by chat. The lock is held only for map
/// insert/remove; resume handlers run outside it, so unrelated chats never
/// wait on each other.
#[derive(Default)]
pub struct Continuations {
    pending: Mutex<HashMap<ChatId, Continuation>>,
}

impl Continuations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the next step for a chat. A chat holds at most one step; any
    /// previous one is replaced and returned.
    pub async fn register(&self, chat: ChatId, next: Continuation) -> Option<Continuation> {
        self.pending.lock().await.insert(chat, next)
    }

    /// Remove and return the chat's pending step. The caller resumes it and
    /// re-registers if the flow is not done; not re-registering is how a flow
    /// completes or cancels.
    pub async fn take(&self, chat: ChatId) -> Option<Continuation> {
        self.pending.lock().await.remove(&chat)
    }

    pub async fn pending_for(&self, chat: ChatId) -> Option<Continuation> {
        self.pending.lock().await.get(&chat).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_removes_the_step() {
        let conts = Continuations::new();
        let chat = ChatId(1);
        conts.register(chat, Continuation::AwaitingRemovalChoice).await;

        assert_eq!(
            conts.take(chat).await,
            Some(Continuation::AwaitingRemovalChoice)
        );
        assert_eq!(conts.take(chat).await, None);
    }

    #[tokio::test]
    async fn register_replaces_without_stacking() {
        let conts = Continuations::new();
        let chat = ChatId(1);
        conts
            .register(
                chat,
                Continuation::AwaitingImage {
                    name: "first".into(),
                },
            )
            .await;
        let replaced = conts
            .register(chat, Continuation::AwaitingExpressionTarget)
            .await;

        assert_eq!(
            replaced,
            Some(Continuation::AwaitingImage {
                name: "first".into()
            })
        );
        assert_eq!(
            conts.take(chat).await,
            Some(Continuation::AwaitingExpressionTarget)
        );
    }

    #[tokio::test]
    async fn chats_are_isolated() {
        let conts = Continuations::new();
        conts
            .register(ChatId(1), Continuation::AwaitingRemovalChoice)
            .await;

        assert_eq!(conts.pending_for(ChatId(2)).await, None);
        assert_eq!(
            conts.pending_for(ChatId(1)).await,
            Some(Continuation::AwaitingRemovalChoice)
        );
    }
}
