//! The `simage scan` command.
//!
//! Runs the whole round trip in one process: discovery feeds the image
//! producer, the dispatcher turns loaded images into hash requests on the
//! in-process broker, hash workers answer them, and the result handler
//! records each hash.

mod report;
mod setup;

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use simage_core::dispatch::{HashDispatcher, HashRequester};
use simage_core::messaging::{MessageFactory, ProtocolMessage, ReplyKind};
use simage_core::{Config, FileDiscovery, ImageProducer, Session};

use report::ScanReport;
use setup::{ScanContext, Services};

/// How long to wait for the repository to answer the final pending query.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Arguments for the `scan` command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Image files or directories to scan
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Record file (defaults to storage.records_path)
    #[arg(short, long)]
    pub records: Option<PathBuf>,

    /// Number of hash workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Decoded images to keep buffered ahead of the dispatcher
    #[arg(short, long)]
    pub buffer: Option<usize>,

    /// Seconds to wait for outstanding hash results once loading is done
    #[arg(long, default_value = "30")]
    pub drain_timeout: u64,
}

pub async fn execute(args: ScanArgs, config: Config) -> anyhow::Result<()> {
    let ctx = setup::prepare(&args, config)?;

    let files = FileDiscovery::new(&ctx.config.processing).discover(&args.inputs);
    if files.is_empty() {
        tracing::warn!("No supported images found");
        return Ok(());
    }
    let discovered = files.len() as u64;
    tracing::info!("Found {} images", discovered);

    let start = Instant::now();
    let services = Services::start(&ctx);

    let producer = Arc::new(ImageProducer::from_config(&ctx.config, ctx.store.clone()));
    let dispatcher = HashDispatcher::new(
        HashRequester::new(
            ctx.session.clone(),
            ctx.registry.clone(),
            ctx.store.clone(),
            ctx.config.messaging.request_address.clone(),
        ),
        ctx.config.hashing.resize_dimension,
    );
    let dispatch_task = {
        let producer = Arc::clone(&producer);
        tokio::spawn(async move { dispatcher.run(&producer).await })
    };

    producer.submit(files);
    let progress = report::create_progress_bar(discovered)?;
    report::follow_loading(&producer, &progress).await;

    // Loading is done; let the dispatcher drain what is buffered.
    producer.shutdown().await;
    let dispatched = dispatch_task.await?;

    progress.set_message(format!("waiting for {} results", dispatched));
    let drain_timeout = Duration::from_secs(args.drain_timeout);
    if !await_results(&services, dispatched, drain_timeout).await {
        tracing::warn!(
            "Gave up waiting for results after {}s",
            drain_timeout.as_secs()
        );
    }
    progress.finish_and_clear();

    let pending = query_pending(&ctx, &services).await?;
    for path in &pending {
        tracing::warn!("Still waiting for a hash: {}", path);
    }

    let results = services.stats.summary();
    services.stop(&ctx.session).await;

    report::print_summary(&ScanReport {
        discovered,
        dispatched,
        results,
        pending,
        elapsed: start.elapsed(),
    });
    Ok(())
}

/// Wait until `expected` results have settled. Returns `false` on timeout.
async fn await_results(services: &Services, expected: u64, timeout: Duration) -> bool {
    let mut settled = services.stats.subscribe();
    tokio::time::timeout(timeout, async move {
        settled.wait_for(|n| *n >= expected).await.is_ok()
    })
    .await
    .unwrap_or(false)
}

/// Ask the repository which images are still waiting on a hash.
async fn query_pending(ctx: &ScanContext, services: &Services) -> anyhow::Result<Vec<String>> {
    ctx.session
        .send(
            &ctx.config.messaging.repository_address,
            MessageFactory::pending_query(),
        )
        .await?;

    let reply = match tokio::time::timeout(REPLY_TIMEOUT, services.replies.receive()).await {
        Ok(Some(reply)) => reply,
        Ok(None) | Err(_) => anyhow::bail!("Repository did not answer the pending query"),
    };

    match MessageFactory::decode_reply(reply, ReplyKind::Pending)? {
        ProtocolMessage::PendingResponse { paths } => Ok(paths),
        other => anyhow::bail!("Unexpected reply to pending query: {}", other.kind()),
    }
}
