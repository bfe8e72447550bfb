//! Background image loading with a bounded output buffer.
//!
//! Paths go into an unbounded backlog. A single loader task takes one path
//! at a time, skips it if it is already recorded, otherwise reads and decodes
//! it, and pushes the result onto a bounded output queue. The loader only
//! ever waits in two places: on an empty backlog and on a full output queue.

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::channel::{Backlog, BoundedQueue};
use super::decode::ImageDecoder;
use crate::config::{Config, LimitsConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::persistence::Persistence;

/// A decoded image and the path it came from.
pub struct LoadedImage {
    pub path: PathBuf,
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for LoadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedImage")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Snapshot of the loader's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Items the loader has finished with, whatever the outcome
    pub processed: u64,
    /// Items submitted since the last reset
    pub total: u64,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    /// Fraction processed, 1.0 when nothing was submitted.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.processed as f64 / self.total as f64).min(1.0)
        }
    }
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    total: AtomicU64,
}

/// Loads images in the background for whoever drains the output queue.
pub struct ImageProducer {
    backlog: Arc<Backlog<PathBuf>>,
    output: Arc<BoundedQueue<LoadedImage>>,
    counters: Arc<Counters>,
    loader: Mutex<Option<JoinHandle<()>>>,
}

impl ImageProducer {
    /// Start a producer whose output queue holds at most `capacity` images.
    ///
    /// Must be called from within a tokio runtime; the loader task is spawned here.
    pub fn new(capacity: usize, persistence: Arc<dyn Persistence>, limits: LimitsConfig) -> Self {
        let backlog = Arc::new(Backlog::new());
        let output = Arc::new(BoundedQueue::new(capacity));
        let counters = Arc::new(Counters::default());

        let loader = Loader {
            backlog: Arc::clone(&backlog),
            output: Arc::clone(&output),
            counters: Arc::clone(&counters),
            persistence,
            decoder: ImageDecoder::new(limits),
        };
        let handle = tokio::spawn(loader.run());

        Self {
            backlog,
            output,
            counters,
            loader: Mutex::new(Some(handle)),
        }
    }

    /// Start a producer sized from `config.pipeline` and `config.limits`.
    pub fn from_config(config: &Config, persistence: Arc<dyn Persistence>) -> Self {
        Self::new(
            config.pipeline.buffer_size,
            persistence,
            config.limits.clone(),
        )
    }

    /// Queue paths for loading. Never blocks.
    pub fn submit<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return;
        }
        self.counters
            .total
            .fetch_add(paths.len() as u64, Ordering::AcqRel);
        tracing::debug!("Submitted {} paths", paths.len());
        self.backlog.push_all(paths);
    }

    /// Drop everything queued on both sides and zero the counters.
    ///
    /// An item the loader is working on when this is called still completes
    /// and may land in the output queue and the `processed` count; callers
    /// that care should drain first.
    pub fn reset(&self) {
        self.backlog.clear();
        self.output.clear();
        self.counters.processed.store(0, Ordering::Release);
        self.counters.total.store(0, Ordering::Release);
        tracing::debug!("Producer reset");
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed: self.counters.processed.load(Ordering::Acquire),
            total: self.counters.total.load(Ordering::Acquire),
        }
    }

    /// Watch the number of decoded images waiting in the output queue.
    pub fn subscribe_level(&self) -> watch::Receiver<usize> {
        self.output.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.output.capacity()
    }

    /// Number of decoded images waiting in the output queue.
    pub fn buffered(&self) -> usize {
        self.output.len()
    }

    /// Number of paths waiting in the backlog.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Next decoded image, in the order loads completed.
    ///
    /// Returns `None` after [`ImageProducer::shutdown`] once the queue is drained.
    pub async fn next(&self) -> Option<LoadedImage> {
        self.output.pop().await
    }

    /// Next decoded image if one is ready.
    pub fn try_next(&self) -> Option<LoadedImage> {
        self.output.try_pop()
    }

    /// Stop the loader. Images already in the output queue remain available.
    ///
    /// Paths still in the backlog are never loaded and never count as
    /// processed. Returns how many were left behind.
    pub async fn shutdown(&self) -> usize {
        self.backlog.close();
        self.output.close();

        let handle = self
            .loader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Loader task failed: {}", e);
            }
        }
        let discarded = self.backlog.len();
        if discarded > 0 {
            tracing::debug!("Discarding {} unloaded paths", discarded);
        }
        tracing::debug!("Producer stopped at {:?}", self.progress());
        discarded
    }
}

impl Drop for ImageProducer {
    fn drop(&mut self) {
        self.backlog.close();
        self.output.close();
    }
}

struct Loader {
    backlog: Arc<Backlog<PathBuf>>,
    output: Arc<BoundedQueue<LoadedImage>>,
    counters: Arc<Counters>,
    persistence: Arc<dyn Persistence>,
    decoder: ImageDecoder,
}

impl Loader {
    async fn run(self) {
        while let Some(path) = self.backlog.pop().await {
            self.step(path).await;
        }
        self.output.close();
    }

    /// Handle one path. Every outcome counts as processed.
    async fn step(&self, path: PathBuf) {
        match self.load(&path).await {
            Ok(Some(image)) => {
                if let Err(image) = self.output.push(image).await {
                    tracing::debug!("Output closed, dropping {:?}", image.path);
                }
            }
            Ok(None) => tracing::debug!("Already recorded, skipping {:?}", path),
            Err(e) => tracing::warn!("{}", e),
        }
        self.counters.processed.fetch_add(1, Ordering::AcqRel);
    }

    async fn load(&self, path: &Path) -> PipelineResult<Option<LoadedImage>> {
        let recorded = self
            .persistence
            .is_path_recorded(path)
            .await
            .map_err(|source| PipelineError::Persistence {
                path: path.to_path_buf(),
                source,
            })?;
        if recorded {
            return Ok(None);
        }

        let decoded = self.decoder.load(path).await?;
        Ok(Some(LoadedImage {
            path: path.to_path_buf(),
            image: decoded.image,
            width: decoded.width,
            height: decoded.height,
        }))
    }
}
