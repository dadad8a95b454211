use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use gatelog_audit::{AppendLog, Consumer, LogLine};
use gatelog_queue::{InMemoryQueue, PubSubPublisher, PubSubSubscription, Publisher, Subscription};
use gatelog_server::{AuditRelay, FileServer};
use gatelog_store::{FsObjectStore, GcsObjectStore, InMemoryObjectStore, ObjectStore};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::*;
use crate::settings::{QueueBackend, Settings, StoreBackend};

/// Process-wide handles, built once and shared by reference.
struct Backends {
    store: Arc<dyn ObjectStore>,
    subscription: Arc<dyn Subscription>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl Backends {
    fn build(settings: &Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn ObjectStore> = match settings.store.backend {
            StoreBackend::Memory => Arc::new(InMemoryObjectStore::new(settings.store.gcs.bucket.clone())),
            StoreBackend::Fs => Arc::new(
                FsObjectStore::open(settings.store.gcs.bucket.clone(), settings.store.root.clone())
                    .context("opening local store")?,
            ),
            StoreBackend::Gcs => Arc::new(
                GcsObjectStore::new(settings.store.gcs.clone()).context("configuring GCS store")?,
            ),
        };

        let subscription: Arc<dyn Subscription>;
        let mut publisher: Option<Arc<dyn Publisher>> = None;
        match settings.queue.backend {
            QueueBackend::Memory => {
                let queue = Arc::new(InMemoryQueue::new());
                subscription = queue.clone();
                publisher = Some(queue);
            }
            QueueBackend::Pubsub => {
                let config = &settings.queue.pubsub;
                subscription = Arc::new(
                    PubSubSubscription::new(config.clone()).context("configuring Pub/Sub subscription")?,
                );
                if config.topic.is_some() {
                    let topic = PubSubPublisher::new(config).context("configuring Pub/Sub publisher")?;
                    publisher = Some(Arc::new(topic));
                }
            }
        }

        Ok(Self {
            store,
            subscription,
            publisher,
        })
    }

    fn relay(&self) -> AuditRelay {
        match &self.publisher {
            Some(publisher) => AuditRelay::publishing(publisher.clone()),
            None => AuditRelay::log_only(),
        }
    }

    fn consumer(&self, settings: &Settings) -> Consumer {
        let writer = AppendLog::new(self.store.clone(), settings.consumer.retry.clone());
        Consumer::new(self.subscription.clone(), writer, settings.consumer.clone())
    }
}

/// Flips to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "cannot listen for interrupts"),
        }
        let _ = tx.send(true);
    });
    rx
}

async fn until_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    settings.validate()?;

    match cli.command {
        Command::Serve => cmd_serve(&settings).await,
        Command::Consume => cmd_consume(&settings).await,
        Command::Run => cmd_run(&settings).await,
        Command::Cat(args) => cmd_cat(&settings, args, &cli.format).await,
        Command::Append(args) => cmd_append(&settings, args, &cli.format).await,
    }
}

async fn cmd_serve(settings: &Settings) -> anyhow::Result<()> {
    let backends = Backends::build(settings)?;
    if settings.queue.backend == QueueBackend::Memory {
        info!("memory queue: audit events are logged only; use `gatelog run` to consume them");
    }
    let relay = match settings.queue.backend {
        QueueBackend::Memory => AuditRelay::log_only(),
        QueueBackend::Pubsub => backends.relay(),
    };
    FileServer::new(settings.server.clone(), backends.store.clone())
        .with_relay(relay)
        .serve_until(until_shutdown(shutdown_signal()))
        .await?;
    Ok(())
}

async fn cmd_consume(settings: &Settings) -> anyhow::Result<()> {
    if settings.queue.backend == QueueBackend::Memory {
        warn!("memory queue has no producers in this process; use `gatelog run`");
    }
    let backends = Backends::build(settings)?;
    backends.consumer(settings).run(shutdown_signal()).await?;
    Ok(())
}

async fn cmd_run(settings: &Settings) -> anyhow::Result<()> {
    let backends = Backends::build(settings)?;
    let shutdown = shutdown_signal();
    let consumer = backends.consumer(settings);
    let server = FileServer::new(settings.server.clone(), backends.store.clone())
        .with_relay(backends.relay())
        .serve_until(until_shutdown(shutdown.clone()));

    let (served, consumed) = tokio::join!(server, consumer.run(shutdown));
    served?;
    consumed?;
    let stats = consumer.stats();
    println!(
        "{} {} received, {} acked, {} nacked",
        "✓".green().bold(),
        stats.received,
        stats.acked.to_string().green(),
        stats.nacked.to_string().red()
    );
    Ok(())
}

async fn cmd_cat(settings: &Settings, args: CatArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let backends = Backends::build(settings)?;
    let object = args.object.as_deref().unwrap_or(&settings.consumer.log_object);
    let Some(log) = backends.store.read(object).await? else {
        eprintln!("{} {} does not exist yet", "!".yellow().bold(), object.bold());
        return Ok(());
    };

    let text = String::from_utf8_lossy(&log.data);
    for raw in text.lines() {
        let parsed = LogLine::parse(raw);
        match (format, parsed) {
            (OutputFormat::Json, Ok(line)) => println!("{}", serde_json::to_string(&line)?),
            (OutputFormat::Json, Err(_)) => {
                println!("{}", serde_json::json!({ "unparsed": raw }));
            }
            (OutputFormat::Text, Ok(line)) => print_line(&line),
            (OutputFormat::Text, Err(_)) => println!("{}", raw.dimmed()),
        }
    }
    Ok(())
}

fn print_line(line: &LogLine) {
    let event_type = if line.event_type.is_empty() {
        "-".dimmed()
    } else {
        line.event_type.cyan()
    };
    print!(
        "{} {} {} {} {}",
        line.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string().dimmed(),
        line.message_id.yellow(),
        event_type,
        line.country.bold(),
        line.path
    );
    match &line.raw {
        Some(raw) => println!(" {}", format!("raw={raw:?}").red()),
        None => println!(),
    }
}

async fn cmd_append(settings: &Settings, args: AppendArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let backends = Backends::build(settings)?;
    let object = args.object.unwrap_or_else(|| settings.consumer.log_object.clone());
    let writer = AppendLog::new(backends.store.clone(), settings.consumer.retry.clone());
    let receipt = writer.append(&object, &args.line).await?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "object": object,
                "generation": receipt.generation,
                "attempts": receipt.attempts,
                "size": receipt.size,
            })
        ),
        OutputFormat::Text => println!(
            "{} Appended to {} (generation {}, {} attempt{})",
            "✓".green().bold(),
            object.bold(),
            receipt.generation.to_string().yellow(),
            receipt.attempts,
            if receipt.attempts == 1 { "" } else { "s" }
        ),
    }
    Ok(())
}
