use std::sync::Arc;

use anyhow::Context;

use outreach_bot::artifacts::{ArtifactIndexer, HttpIndexer, NoopIndexer};
use outreach_bot::bot::Bot;
use outreach_bot::cache::{CacheGateway, InMemoryCache, KvCache, RedisCache};
use outreach_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use outreach_bot::classifier::LlmClassifier;
use outreach_bot::config::BotConfig;
use outreach_bot::llm::{RetryProvider, create_provider};
use outreach_bot::outreach::{Coordinator, StoreCandidateSource, spawn_matcher_loop};
use outreach_bot::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().context("invalid configuration")?;

    // Initialize tracing; the appender guard must outlive the bot.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _log_guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "outreach-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    eprintln!("🤖 Outreach Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("failed to create LLM provider")?;
    let llm = Arc::new(RetryProvider::new(llm, config.retry.clone()));
    let classifier = Arc::new(LlmClassifier::new(llm));

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Cache ────────────────────────────────────────────────────────────
    let cache: Arc<dyn KvCache> = match &config.cache.redis_url {
        Some(url) => {
            eprintln!("   Cache: redis");
            Arc::new(RedisCache::new(url).context("failed to configure redis")?)
        }
        None => {
            eprintln!("   Cache: in-memory");
            Arc::new(InMemoryCache::new())
        }
    };
    let gateway = Arc::new(CacheGateway::new(
        Arc::clone(&db),
        cache,
        config.cache.clone(),
    ));

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let mut active_channels = Vec::new();

    if let Some(token) = &config.channels.telegram_token {
        let allowed = &config.channels.telegram_allowed_users;
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if allowed.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                allowed.join(", ")
            }
        );
        channels.add(Arc::new(TelegramChannel::new(token.clone(), allowed.clone())));
        active_channels.push("telegram");
    }
    if config.channels.cli_enabled {
        channels.add(Arc::new(CliChannel::new()));
        active_channels.push("cli");
    }
    eprintln!("   Channels: {}", active_channels.join(", "));
    let channels = Arc::new(channels);

    // ── Coordinator ──────────────────────────────────────────────────────
    let indexer: Arc<dyn ArtifactIndexer> = match &config.indexer_url {
        Some(url) => Arc::new(HttpIndexer::new(url.clone())),
        None => Arc::new(NoopIndexer),
    };
    let coordinator = Arc::new(
        Coordinator::new(
            gateway,
            classifier,
            channels.clone(),
            config.outreach.clone(),
        )
        .with_indexer(indexer),
    );

    // ── Matcher ──────────────────────────────────────────────────────────
    let _matcher_handle = spawn_matcher_loop(
        Arc::clone(&coordinator),
        Arc::new(StoreCandidateSource::new(Arc::clone(&db))),
        config.matcher.clone(),
    );

    eprintln!("   Type `<jid>: <message>` to speak as someone. Ctrl+C to exit.\n");

    Bot::new(coordinator, channels).run().await?;
    Ok(())
}
