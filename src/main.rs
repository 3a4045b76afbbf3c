use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::InlineQuery;
use tg_watbot::access::AccessControl;
use tg_watbot::config::{self, SharedConfig};
use tg_watbot::continuation::Continuations;
use tg_watbot::db;
use tg_watbot::handlers::{self, App};
use tg_watbot::messenger::TelegramMessenger;
use tg_watbot::model::Incoming;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file; falls back to $WATBOT_CONF
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config_path = config::resolve_path(args.config)?;
    let cfg = config::load(&config_path)?;

    let pool = db::init_pool(&cfg.db).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.tg.token.clone());
    let shared = SharedConfig::new(cfg, config_path);
    let app = Arc::new(App {
        pool,
        access: AccessControl::new(shared.clone()),
        config: shared,
        continuations: Continuations::new(),
    });
    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_inline_query().endpoint(on_inline_query));

    info!("starting telegram bot");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app, messenger])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn on_message(
    msg: Message,
    app: Arc<App>,
    messenger: Arc<TelegramMessenger>,
) -> ResponseResult<()> {
    let Some(update) = Incoming::from_message(&msg) else {
        return Ok(());
    };
    if let Err(err) = handlers::handle_message(messenger.as_ref(), &app, &update).await {
        error!(?err, "failed to handle message");
    }
    Ok(())
}

async fn on_inline_query(
    query: InlineQuery,
    app: Arc<App>,
    messenger: Arc<TelegramMessenger>,
) -> ResponseResult<()> {
    let user_id = query.from.id.0 as i64;
    // Best effort: a failed inline answer is logged and dropped.
    if let Err(err) =
        handlers::handle_inline_query(messenger.as_ref(), &app, &query.id, user_id, &query.query)
            .await
    {
        warn!(?err, "failed to answer inline query");
    }
    Ok(())
}
