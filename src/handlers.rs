//! Command dispatch and the multi-turn command flows.
use crate::access::AccessControl;
use crate::config::SharedConfig;
use crate::continuation::{Continuation, Continuations, CANCEL_COMMAND};
use crate::db;
use crate::messenger::{InlinePhoto, Messenger};
use crate::model::{Content, Incoming};
use anyhow::Result;
use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};

/// Shared state threaded through every handler invocation.
pub struct App {
    pub pool: db::Pool,
    pub config: SharedConfig,
    pub access: AccessControl,
    pub continuations: Continuations,
}

const USAGE: &str = "tg-watbot - \"What the!?\"\n\n\
/add <name> : Add a new WAT\n\
/remove : Remove a WAT\n\
/wat <expression> : Get a random WAT\n\
/setexpressions : Set the expressions of a WAT\n\
/addwhitelist <name> <id> : Add user ID to whitelist\n\
/rmwhitelist <name> : Remove user from whitelist\n\
/whitelist : Show current whitelist";

const DENIED: &str = "You do not have permission to do that";
const CANCELLED: &str = "Operation cancelled";
const IMAGE_PROMPT: &str = "Please send the image for this WAT";
const NAME_PROMPT: &str = "You need to send a WAT name";
const NO_SUCH_WAT: &str = "No WAT found with that name";
const EXPRESSIONS_PROMPT: &str = "Send a comma separated list of expressions";

/// Entry point for chat messages. A pending continuation takes priority over
/// command dispatch: while a flow is pending, every message from that chat is
/// treated as its reply: a `/wat` typed mid-flow is an invalid reply, not a
/// new command. `/cancel` is the escape path.
#[instrument(skip_all)]
pub async fn handle_message<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
) -> Result<()> {
    if let Some(step) = app.continuations.take(update.chat).await {
        return resume(messenger, app, update, step).await;
    }

    let Some(text) = update.text() else {
        return Ok(());
    };
    let (command, args) = split_command(text);
    match command {
        "/start" | "/help" => messenger.send_text(update.chat, USAGE).await,
        "/me" => {
            messenger
                .send_text(update.chat, &update.user_id.to_string())
                .await
        }
        "/add" => handle_add(messenger, app, update, args).await,
        "/remove" => handle_remove(messenger, app, update).await,
        "/wat" => handle_wat(messenger, app, update, args).await,
        "/setexpressions" => handle_set_expressions(messenger, app, update).await,
        "/addwhitelist" => handle_add_whitelist(messenger, app, update, args).await,
        "/rmwhitelist" => handle_rm_whitelist(messenger, app, update, args).await,
        "/whitelist" => handle_show_whitelist(messenger, app, update).await,
        // Nothing pending to cancel.
        CANCEL_COMMAND => Ok(()),
        other if other.starts_with('/') => {
            messenger.send_text(update.chat, "Unknown command.").await
        }
        _ => Ok(()),
    }
}

/// Answer an inline query: empty text lists every WAT, anything else is an
/// exact expression filter. Results carry the smallest rendition.
#[instrument(skip_all)]
pub async fn handle_inline_query<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    query_id: &str,
    user_id: i64,
    query: &str,
) -> Result<()> {
    if !app.access.is_allowed(user_id).await {
        return Ok(());
    }

    let expression = query.trim().to_lowercase();
    let wats = if expression.is_empty() {
        db::list_wats(&app.pool).await?
    } else {
        db::search_by_expression(&app.pool, &expression).await?
    };

    let photos = wats
        .iter()
        .enumerate()
        .filter_map(|(index, wat)| {
            wat.smallest_file_id().map(|file_id| InlinePhoto {
                id: index.to_string(),
                file_id: file_id.to_string(),
            })
        })
        .collect();
    messenger.answer_inline_query(query_id, photos).await
}

fn split_command(text: &str) -> (&str, &str) {
    let trimmed = text.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (trimmed, ""),
    }
}

async fn handle_add<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    args: &str,
) -> Result<()> {
    if !app.access.is_owner(update.user_id).await {
        return messenger.send_text(update.chat, DENIED).await;
    }

    let name = args.trim();
    if name.is_empty() {
        return messenger.send_text(update.chat, "/add <name>").await;
    }
    if db::wat_exists(&app.pool, name).await? {
        return messenger
            .send_text(update.chat, "There is already a WAT with that name")
            .await;
    }

    messenger.send_text(update.chat, IMAGE_PROMPT).await?;
    app.continuations
        .register(
            update.chat,
            Continuation::AwaitingImage {
                name: name.to_string(),
            },
        )
        .await;
    Ok(())
}

async fn handle_remove<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
) -> Result<()> {
    if !app.access.is_owner(update.user_id).await {
        return messenger.send_text(update.chat, DENIED).await;
    }
    prompt_wat_choice(
        messenger,
        app,
        update,
        "Choose a WAT to delete",
        Continuation::AwaitingRemovalChoice,
    )
    .await
}

async fn handle_set_expressions<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
) -> Result<()> {
    if !app.access.is_owner(update.user_id).await {
        return messenger.send_text(update.chat, DENIED).await;
    }
    prompt_wat_choice(
        messenger,
        app,
        update,
        "Choose a WAT to modify",
        Continuation::AwaitingExpressionTarget,
    )
    .await
}

/// Show every WAT name as a one-tap keyboard and park the given step.
async fn prompt_wat_choice<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    prompt: &str,
    next: Continuation,
) -> Result<()> {
    let names: Vec<String> = db::list_wats(&app.pool)
        .await?
        .into_iter()
        .map(|wat| wat.name)
        .collect();
    messenger.send_choices(update.chat, prompt, &names).await?;
    app.continuations.register(update.chat, next).await;
    Ok(())
}

async fn handle_wat<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    args: &str,
) -> Result<()> {
    if !app.access.is_allowed(update.user_id).await {
        return Ok(());
    }

    let expression = args.trim().to_lowercase();
    let wats = if expression.is_empty() {
        db::list_wats(&app.pool).await?
    } else {
        let matched = db::search_by_expression(&app.pool, &expression).await?;
        if matched.is_empty() {
            // No match: fall back to a pick among everything.
            db::list_wats(&app.pool).await?
        } else {
            matched
        }
    };

    let Some(wat) = wats.choose(&mut rand::thread_rng()) else {
        return messenger
            .send_text(update.chat, "Sorry, I have no WATs that match that")
            .await;
    };
    let Some(file_id) = wat.largest_file_id() else {
        warn!(name = %wat.name, "WAT has no file ids");
        return Ok(());
    };
    messenger
        .send_photo(update.chat, file_id, Some(update.message_id))
        .await
}

async fn handle_add_whitelist<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    args: &str,
) -> Result<()> {
    if !app.access.is_owner(update.user_id).await {
        return messenger.send_text(update.chat, DENIED).await;
    }

    let mut parts = args.split_whitespace();
    let (Some(name), Some(raw_id), None) = (parts.next(), parts.next(), parts.next()) else {
        return messenger
            .send_text(update.chat, "/addwhitelist <name> <id>")
            .await;
    };
    let Ok(user_id) = raw_id.parse::<i64>() else {
        return messenger
            .send_text(update.chat, "/addwhitelist <name> <id>")
            .await;
    };

    match app.config.add_whitelist_entry(name, user_id).await {
        Ok(true) => messenger.send_text(update.chat, "User added to whitelist!").await,
        Ok(false) => {
            messenger
                .send_text(update.chat, "Failed to add user to whitelist")
                .await
        }
        Err(err) => {
            warn!(?err, "failed to persist whitelist change");
            messenger
                .send_text(update.chat, "Could not update the whitelist file")
                .await
        }
    }
}

async fn handle_rm_whitelist<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    args: &str,
) -> Result<()> {
    if !app.access.is_owner(update.user_id).await {
        return messenger.send_text(update.chat, DENIED).await;
    }

    let name = args.trim();
    if name.is_empty() {
        return messenger.send_text(update.chat, "/rmwhitelist <name>").await;
    }

    match app.config.remove_whitelist_entry(name).await {
        Ok(true) => {
            messenger
                .send_text(update.chat, "User removed from whitelist!")
                .await
        }
        Ok(false) => {
            messenger
                .send_text(update.chat, "Failed to remove user from whitelist")
                .await
        }
        Err(err) => {
            warn!(?err, "failed to persist whitelist change");
            messenger
                .send_text(update.chat, "Could not update the whitelist file")
                .await
        }
    }
}

async fn handle_show_whitelist<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
) -> Result<()> {
    if !app.access.is_owner(update.user_id).await {
        return messenger.send_text(update.chat, DENIED).await;
    }

    let mut out = String::from("Whitelisted users:\n\n");
    for (name, id) in app.config.whitelist().await {
        out.push_str(&format!("- {} ({})\n", name, id));
    }
    messenger.send_text(update.chat, &out).await
}

/// Resume a suspended flow with the chat's next message. The step has already
/// been taken from the engine, so not re-registering ends the flow.
async fn resume<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    step: Continuation,
) -> Result<()> {
    if update.text().map(str::trim) == Some(CANCEL_COMMAND) {
        let keyboard_shown = matches!(
            step,
            Continuation::AwaitingRemovalChoice | Continuation::AwaitingExpressionTarget
        );
        return if keyboard_shown {
            messenger.clear_choices(update.chat, CANCELLED).await
        } else {
            messenger.send_text(update.chat, CANCELLED).await
        };
    }

    match step {
        Continuation::AwaitingImage { name } => {
            resume_add_image(messenger, app, update, name).await
        }
        Continuation::AwaitingRemovalChoice => resume_removal(messenger, app, update).await,
        Continuation::AwaitingExpressionTarget => {
            resume_expression_target(messenger, app, update).await
        }
        Continuation::AwaitingExpressions { name } => {
            resume_set_expressions(messenger, app, update, name).await
        }
    }
}

async fn resume_add_image<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    name: String,
) -> Result<()> {
    match &update.content {
        Content::Photo(file_ids) if !file_ids.is_empty() => {
            db::create_wat(&app.pool, &name, file_ids).await?;
            info!(name = %name, "created WAT");
            messenger.send_text(update.chat, "Added correctly!").await
        }
        _ => {
            messenger.send_text(update.chat, IMAGE_PROMPT).await?;
            app.continuations
                .register(update.chat, Continuation::AwaitingImage { name })
                .await;
            Ok(())
        }
    }
}

async fn resume_removal<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
) -> Result<()> {
    let Some(name) = update.text().map(str::trim) else {
        messenger.send_text(update.chat, NAME_PROMPT).await?;
        app.continuations
            .register(update.chat, Continuation::AwaitingRemovalChoice)
            .await;
        return Ok(());
    };

    let Some(wat) = db::get_wat_by_name(&app.pool, name).await? else {
        messenger.send_text(update.chat, NO_SUCH_WAT).await?;
        app.continuations
            .register(update.chat, Continuation::AwaitingRemovalChoice)
            .await;
        return Ok(());
    };

    if db::remove_wat(&app.pool, wat.id).await? {
        info!(name = %wat.name, id = wat.id, "removed WAT");
        messenger
            .clear_choices(update.chat, &format!("Removed WAT {}", name))
            .await
    } else {
        messenger
            .clear_choices(update.chat, &format!("Failed to remove WAT {}", name))
            .await
    }
}

async fn resume_expression_target<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
) -> Result<()> {
    let Some(name) = update.text().map(str::trim) else {
        messenger.send_text(update.chat, NAME_PROMPT).await?;
        app.continuations
            .register(update.chat, Continuation::AwaitingExpressionTarget)
            .await;
        return Ok(());
    };

    let Some(wat) = db::get_wat_by_name(&app.pool, name).await? else {
        messenger.send_text(update.chat, NO_SUCH_WAT).await?;
        app.continuations
            .register(update.chat, Continuation::AwaitingExpressionTarget)
            .await;
        return Ok(());
    };

    messenger
        .clear_choices(update.chat, &format!("Expressions of {}", wat.name))
        .await?;
    let current = if wat.expressions.is_empty() {
        "[No expressions defined]".to_string()
    } else {
        wat.expressions.join(",")
    };
    messenger.send_text(update.chat, &current).await?;
    messenger.send_text(update.chat, EXPRESSIONS_PROMPT).await?;
    app.continuations
        .register(
            update.chat,
            Continuation::AwaitingExpressions { name: wat.name },
        )
        .await;
    Ok(())
}

async fn resume_set_expressions<M: Messenger + ?Sized>(
    messenger: &M,
    app: &App,
    update: &Incoming,
    name: String,
) -> Result<()> {
    let Some(text) = update.text() else {
        messenger
            .send_text(update.chat, "You need to send a comma separated list of expressions")
            .await?;
        app.continuations
            .register(update.chat, Continuation::AwaitingExpressions { name })
            .await;
        return Ok(());
    };

    let expressions: Vec<String> = text
        .split(',')
        .map(|expr| expr.trim().to_lowercase())
        .filter(|expr| !expr.is_empty())
        .collect();
    db::set_expressions(&app.pool, &name, &expressions).await?;
    info!(name = %name, count = expressions.len(), "updated expressions");
    messenger.send_text(update.chat, "Expressions updated").await
}
