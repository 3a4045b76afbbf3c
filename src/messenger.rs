//! Capability interface to the chat transport.
//!
//! Handlers depend on this trait only; the Telegram implementation lives
//! behind it so flows can be driven by a recording fake in tests.
use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    InlineQueryResult, InlineQueryResultCachedPhoto, InputFile, KeyboardButton, KeyboardMarkup,
    KeyboardRemove, MessageId, ReplyMarkup,
};

use crate::continuation::CANCEL_COMMAND;

/// One cached-photo result for an inline query answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePhoto {
    pub id: String,
    pub file_id: String,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()>;

    /// Prompt with a one-tap reply keyboard of `choices` plus a cancel button.
    async fn send_choices(&self, chat: ChatId, text: &str, choices: &[String]) -> Result<()>;

    /// Send text while removing any reply keyboard shown earlier in the flow.
    async fn clear_choices(&self, chat: ChatId, text: &str) -> Result<()>;

    async fn send_photo(
        &self,
        chat: ChatId,
        file_id: &str,
        reply_to: Option<MessageId>,
    ) -> Result<()>;

    async fn answer_inline_query(&self, query_id: &str, photos: Vec<InlinePhoto>) -> Result<()>;
}

/// Production messenger over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        self.bot.send_message(chat, text).await?;
        Ok(())
    }

    async fn send_choices(&self, chat: ChatId, text: &str, choices: &[String]) -> Result<()> {
        let mut rows: Vec<Vec<KeyboardButton>> = choices
            .chunks(2)
            .map(|pair| pair.iter().map(|c| KeyboardButton::new(c.as_str())).collect())
            .collect();
        rows.push(vec![KeyboardButton::new(CANCEL_COMMAND)]);
        let markup = KeyboardMarkup::new(rows).resize_keyboard(true);
        self.bot
            .send_message(chat, text)
            .reply_markup(ReplyMarkup::Keyboard(markup))
            .await?;
        Ok(())
    }

    async fn clear_choices(&self, chat: ChatId, text: &str) -> Result<()> {
        self.bot
            .send_message(chat, text)
            .reply_markup(ReplyMarkup::KeyboardRemove(KeyboardRemove::new()))
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        file_id: &str,
        reply_to: Option<MessageId>,
    ) -> Result<()> {
        let request = self.bot.send_photo(chat, InputFile::file_id(file_id));
        match reply_to {
            Some(message_id) => request.reply_to_message_id(message_id).await?,
            None => request.await?,
        };
        Ok(())
    }

    async fn answer_inline_query(&self, query_id: &str, photos: Vec<InlinePhoto>) -> Result<()> {
        let results: Vec<InlineQueryResult> = photos
            .into_iter()
            .map(|photo| {
                InlineQueryResult::CachedPhoto(InlineQueryResultCachedPhoto::new(
                    photo.id,
                    photo.file_id,
                ))
            })
            .collect();
        self.bot.answer_inline_query(query_id, results).await?;
        Ok(())
    }
}
