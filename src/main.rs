use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use tron_wallet_bot::bot::handlers::{handle_callback, handle_command, handle_text, BotCommand};
use tron_wallet_bot::config::Settings;
use tron_wallet_bot::flow::{FlowEngine, Services};
use tron_wallet_bot::rate_limit::RateLimiter;
use tron_wallet_bot::services::ledger::HttpLedgerClient;
use tron_wallet_bot::services::otp::TotpService;
use tron_wallet_bot::storage::sweep::{spawn_sweeper, SweepPolicy};
use tron_wallet_bot::storage::{MemoryStorage, R2Storage, StorageError};

/// Regex patterns for redacting sensitive data, applied in order
struct RedactionPatterns {
    rules: Vec<(Regex, &'static str)>,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        let table: [(&str, &'static str); 9] = [
            (
                r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)",
                "$1[TELEGRAM_TOKEN]$3",
            ),
            (r"([0-9]{8,10}:[A-Za-z0-9_-]{35})", "[TELEGRAM_TOKEN]"),
            (r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+", "$1[TELEGRAM_TOKEN]"),
            (r"R2_ACCESS_KEY_ID=[^\s&]+", "R2_ACCESS_KEY_ID=[MASKED]"),
            (r"R2_SECRET_ACCESS_KEY=[^\s&]+", "R2_SECRET_ACCESS_KEY=[MASKED]"),
            (r"'aws_access_key_id': '[^']*'", "'aws_access_key_id': '[MASKED]'"),
            (
                r"'aws_secret_access_key': '[^']*'",
                "'aws_secret_access_key': '[MASKED]'",
            ),
            (r"\b[0-9a-fA-F]{64}\b", "[PRIVATE_KEY]"),
            (r"(otpauth://[^\s?]*\?[^\s]*secret=)[A-Z2-7]+", "$1[MASKED]"),
        ];

        let rules = table
            .into_iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |output, (pattern, replacement)| {
                pattern.replace_all(&output, *replacement).into_owned()
            })
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let redacted = self.patterns.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(redacted.as_bytes())?;
        // Report the whole input as written
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: Arc::clone(&self.patterns),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Compiled before logging starts
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting TRON wallet bot...");

    let settings = init_settings();
    let services = init_services(&settings).await;

    let policy = SweepPolicy {
        pending_ttl: settings.pending_state_ttl(),
        session_ttl: settings.session_ttl(),
        interval: settings.sweep_interval(),
    };
    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        Arc::clone(&services.sessions),
        Arc::clone(&services.pending),
        policy,
        shutdown.clone(),
    );

    let limiter = RateLimiter::new(
        settings.rate_limit_max,
        settings.rate_limit_window_ms,
        settings.rate_limit_block_ms,
    );
    let engine = Arc::new(FlowEngine::new(services, limiter));

    let bot = Bot::new(settings.telegram_token.clone());

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {e}");
    }
    info!("Bot stopped.");
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_services(settings: &Settings) -> Services {
    let ledger = match HttpLedgerClient::new(
        &settings.ledger_api_url,
        settings.ledger_api_key.clone(),
    ) {
        Ok(client) => {
            info!(url = %settings.ledger_api_url, "Ledger client initialized.");
            Arc::new(client)
        }
        Err(e) => {
            error!("Failed to initialize ledger client: {}", e);
            std::process::exit(1);
        }
    };
    let otp = Arc::new(TotpService::new(settings.otp_issuer.clone()));

    match R2Storage::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if s.check_connection().await.is_err() {
                error!("R2 Storage connection check returned error.");
            }
            Services::with_storage(Arc::new(s), ledger, otp)
        }
        Err(StorageError::Config(missing)) => {
            warn!("R2 Storage is not configured ({missing}); state will not survive a restart.");
            Services::with_storage(Arc::new(MemoryStorage::new()), ledger, otp)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<BotCommand>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text),
                ),
        )
}
