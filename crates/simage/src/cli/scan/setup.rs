//! Scan setup: config overrides, record store, and the local broker services.

use std::sync::Arc;
use tokio::task::JoinHandle;

use simage_core::dispatch::{self, HashWorker, RepositoryResponder, ResultHandler, ResultStats};
use simage_core::messaging::Consumer;
use simage_core::{ChannelSession, Config, InMemoryTrackingRegistry, RecordStore};

use super::ScanArgs;

/// Everything a scan shares between its stages.
pub struct ScanContext {
    pub config: Config,
    pub session: Arc<ChannelSession>,
    pub store: Arc<RecordStore>,
    pub registry: Arc<InMemoryTrackingRegistry>,
}

/// Validate inputs, apply CLI overrides, and open the record store.
pub fn prepare(args: &ScanArgs, mut config: Config) -> anyhow::Result<ScanContext> {
    for input in &args.inputs {
        if !input.exists() {
            anyhow::bail!(
                "Input path does not exist: {:?}\n\n  Hint: Check the path and try again.",
                input
            );
        }
    }

    if let Some(workers) = args.workers {
        if workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }
        config.processing.hash_workers = workers;
    }
    if let Some(buffer) = args.buffer {
        if buffer == 0 {
            anyhow::bail!("--buffer must be at least 1");
        }
        config.pipeline.buffer_size = buffer;
    }
    if let Some(records) = &args.records {
        config.storage.records_path = records.clone();
    }

    let records_path = config.records_path();
    let store = RecordStore::open(&records_path)?;
    tracing::info!(
        "Using record file {:?} ({} images recorded)",
        records_path,
        store.len()
    );

    Ok(ScanContext {
        config,
        session: Arc::new(ChannelSession::new()),
        store: Arc::new(store),
        registry: Arc::new(InMemoryTrackingRegistry::new()),
    })
}

/// Handlers bound on the in-process broker for the duration of a scan.
pub struct Services {
    addresses: Vec<String>,
    handles: Vec<JoinHandle<u64>>,
    pub stats: Arc<ResultStats>,
    pub replies: Consumer,
}

impl Services {
    /// Bind every address and start its handlers.
    pub fn start(ctx: &ScanContext) -> Self {
        let messaging = &ctx.config.messaging;
        let mut handles = Vec::new();

        let requests = ctx.session.bind(&messaging.request_address);
        for _ in 0..ctx.config.processing.hash_workers {
            let worker = HashWorker::new(ctx.session.clone(), messaging.result_address.clone());
            handles.push(dispatch::spawn(requests.clone(), Arc::new(worker)));
        }

        let results = ResultHandler::new(
            ctx.registry.clone(),
            ctx.store.clone(),
            ctx.session.clone(),
        );
        let stats = results.stats();
        handles.push(dispatch::spawn(
            ctx.session.bind(&messaging.result_address),
            Arc::new(results),
        ));

        let responder = RepositoryResponder::new(
            ctx.store.clone(),
            ctx.registry.clone(),
            ctx.session.clone(),
            messaging.reply_address.clone(),
        );
        handles.push(dispatch::spawn(
            ctx.session.bind(&messaging.repository_address),
            Arc::new(responder),
        ));

        let replies = ctx.session.bind(&messaging.reply_address);

        tracing::debug!(
            "Started {} hash workers",
            ctx.config.processing.hash_workers
        );

        Self {
            addresses: vec![
                messaging.request_address.clone(),
                messaging.result_address.clone(),
                messaging.repository_address.clone(),
                messaging.reply_address.clone(),
            ],
            handles,
            stats,
            replies,
        }
    }

    /// Unbind every address and wait for the handlers to drain.
    pub async fn stop(self, session: &ChannelSession) {
        for address in &self.addresses {
            session.unbind(address);
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Handler task failed: {e}");
            }
        }
    }
}
