use std::sync::Arc;

use anyhow::Context;

use invoice_intake::channels::WebhookNotifier;
use invoice_intake::config::AppConfig;
use invoice_intake::mailbox::ImapConnector;
use invoice_intake::pipeline::{HttpFetcher, InvoicePipeline, PlaceholderExtractor, RunDeps};
use invoice_intake::store::LibSqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("Invoice intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mailbox: {}@{}:{}/{}",
        config.mailbox.user, config.mailbox.host, config.mailbox.port, config.mailbox.folder
    );
    eprintln!("   Database: {}", config.db_path.display());

    let store = LibSqlStore::new_local(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;

    let notifier = WebhookNotifier::new(&config.notifier);
    if !notifier.is_configured() {
        eprintln!("   Notifications: disabled (WECHAT_WEBHOOK_URL not set)");
    }

    let pipeline = InvoicePipeline::new(RunDeps {
        connector: Arc::new(ImapConnector::new(config.mailbox)),
        store: Arc::new(store),
        fetcher: Arc::new(HttpFetcher::new()),
        extractor: Arc::new(PlaceholderExtractor),
        notifier: Arc::new(notifier),
    });

    let summary = pipeline.run().await.context("invoice run aborted")?;
    eprintln!(
        "   Done: {} processed, {} failed",
        summary.processed.len(),
        summary.failed.len()
    );
    Ok(())
}
