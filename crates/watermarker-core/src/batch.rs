//! Sequential, fault-isolated batch orchestration
//!
//! Each source image goes through decode, composite and encode before the next
//! one starts. A failing image becomes a `Failed` entry and the batch moves on,
//! so the result always holds one entry per input, in input order.

use crate::codec::ImageCodec;
use crate::compositor::{CompositeReport, Compositor};
use crate::config::{ImageFormat, ProcessingConfig};
use crate::error::{Result, WatermarkError};
use crate::models::{RasterSurface, WatermarkSource};
use crate::normalizer::WatermarkSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Unique identifier for a batch run
pub type BatchId = Uuid;

/// One input image
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Outcome for one input image
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchEntry {
    Succeeded {
        name: String,
        output_name: String,
        format: ImageFormat,
        #[serde(skip)]
        bytes: Vec<u8>,
        size: usize,
        report: CompositeReport,
    },
    Failed {
        name: String,
        error_type: String,
        message: String,
    },
}

impl BatchEntry {
    fn failed(name: String, error: &WatermarkError) -> Self {
        BatchEntry::Failed {
            name,
            error_type: error.error_type().to_string(),
            message: error.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BatchEntry::Succeeded { name, .. } | BatchEntry::Failed { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchEntry::Succeeded { .. })
    }

    /// Encoded output, present only for successful entries
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            BatchEntry::Succeeded { bytes, .. } => Some(bytes),
            BatchEntry::Failed { .. } => None,
        }
    }
}

/// Ordered results of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
    pub total_processing_time: Duration,
}

/// Counts for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u128,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| !e.is_success())
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded = self.succeeded().count();
        BatchSummary {
            batch_id: self.batch_id,
            total: self.entries.len(),
            succeeded,
            failed: self.entries.len() - succeeded,
            duration_ms: self.total_processing_time.as_millis(),
        }
    }
}

/// Per-image lifecycle reported on the progress channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: BatchId,
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub status: ItemStatus,
    pub timestamp: DateTime<Utc>,
}

/// Drives decode, composite and encode over a list of images
pub struct BatchOrchestrator {
    codec: Arc<dyn ImageCodec>,
    compositor: Compositor,
    config: ProcessingConfig,
    /// Replaced after a batch that observed cancellation
    cancellation_token: Mutex<CancellationToken>,
    progress_sender: broadcast::Sender<BatchProgress>,
    /// Decoded logos keyed by a hash of their bytes, used when `cache_logo` is
    /// set. Emptied at the start of every batch.
    logo_cache: RwLock<HashMap<u64, Arc<WatermarkSource>>>,
}

impl BatchOrchestrator {
    pub fn new(codec: Arc<dyn ImageCodec>, compositor: Compositor, config: ProcessingConfig) -> Self {
        let (progress_sender, _) = broadcast::channel(256);
        Self {
            codec,
            compositor,
            config,
            cancellation_token: Mutex::new(CancellationToken::new()),
            progress_sender,
            logo_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Token checked between images of the running batch, or of the next one
    /// when idle. Once a batch has seen the cancellation the orchestrator moves
    /// to a fresh token, so later batches run normally.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancellation_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cancel(&self) {
        info!("Batch cancellation requested");
        self.cancel_token().cancel();
    }

    /// Swap in a new token if `used` was cancelled and is still current
    fn reset_cancellation(&self, used: &CancellationToken) {
        if !used.is_cancelled() {
            return;
        }
        let mut current = self.cancellation_token.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_cancelled() {
            debug!("Cancellation consumed, arming a fresh token");
            *current = CancellationToken::new();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchProgress> {
        self.progress_sender.subscribe()
    }

    /// Watermark every source in order. Never fails: problems become `Failed` entries.
    #[instrument(skip(self, sources, spec), fields(total = sources.len()))]
    pub async fn run_batch(&self, sources: Vec<SourceImage>, spec: &WatermarkSpec) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();
        let total = sources.len();
        let spec = Arc::new(spec.clone());

        info!("Starting batch {} with {} images", batch_id, total);
        let cancellation = self.cancel_token();
        self.logo_cache.write().await.clear();

        let mut entries = Vec::with_capacity(total);
        for (index, source) in sources.into_iter().enumerate() {
            let name = source.name.clone();

            if cancellation.is_cancelled() {
                self.emit(batch_id, index, total, &name, ItemStatus::Cancelled);
                entries.push(BatchEntry::failed(name, &WatermarkError::Cancelled));
                continue;
            }

            self.emit(batch_id, index, total, &name, ItemStatus::Processing);
            let entry = match self.process_image(source, &spec).await {
                Ok((format, bytes, report)) => {
                    info!("Watermarked {} ({} bytes, {:?})", name, bytes.len(), format);
                    self.emit(batch_id, index, total, &name, ItemStatus::Succeeded);
                    BatchEntry::Succeeded {
                        output_name: output_name(&self.config.output_prefix, &name, format),
                        name,
                        format,
                        size: bytes.len(),
                        bytes,
                        report,
                    }
                }
                Err(e) => {
                    error!("Failed to watermark {}: {}", name, e);
                    self.emit(batch_id, index, total, &name, ItemStatus::Failed);
                    BatchEntry::failed(name, &e)
                }
            };
            entries.push(entry);
        }

        self.reset_cancellation(&cancellation);

        let result = BatchResult {
            batch_id,
            started_at,
            entries,
            total_processing_time: start_time.elapsed(),
        };
        let summary = result.summary();
        info!(
            "Batch {} finished: {} succeeded, {} failed in {} ms",
            batch_id, summary.succeeded, summary.failed, summary.duration_ms
        );
        result
    }

    #[instrument(skip(self, source, spec), fields(name = %source.name))]
    async fn process_image(
        &self,
        source: SourceImage,
        spec: &Arc<WatermarkSpec>,
    ) -> Result<(ImageFormat, Vec<u8>, CompositeReport)> {
        let hint = source.mime.as_deref().and_then(ImageFormat::from_mime);
        let format = hint
            .or_else(|| self.codec.sniff(&source.bytes))
            .unwrap_or(self.config.fallback_format);

        let surface = self.codec.decode(&source.name, source.bytes, hint).await?;

        let logo = if spec.kind.includes_logo() {
            self.load_logo(spec).await?
        } else {
            None
        };

        let compositor = self.compositor.clone();
        let spec = Arc::clone(spec);
        let (surface, report) = tokio::task::spawn_blocking(move || {
            let mut surface: RasterSurface = surface;
            let report = compositor.composite_watermark(&mut surface, &spec, logo.as_deref())?;
            Ok::<_, WatermarkError>((surface, report))
        })
        .await
        .map_err(|e| WatermarkError::TaskJoin {
            message: format!("Compositing task failed: {}", e),
        })??;

        let bytes = self
            .codec
            .encode(surface, format, self.config.encode_quality)
            .await?;
        Ok((format, bytes, report))
    }

    /// Decoded logo for this image, or `None` when absent or unreadable.
    /// Errors that should fail the image rather than skip the pass are returned.
    async fn load_logo(&self, spec: &WatermarkSpec) -> Result<Option<Arc<WatermarkSource>>> {
        let Some(bytes) = spec.logo.source.clone() else {
            warn!("Logo pass requested but no logo was provided");
            return Ok(None);
        };

        let key = self.config.cache_logo.then(|| {
            let mut hasher = DefaultHasher::new();
            bytes.hash(&mut hasher);
            hasher.finish()
        });

        if let Some(key) = key {
            if let Some(cached) = self.logo_cache.read().await.get(&key) {
                debug!("Using cached logo");
                return Ok(Some(Arc::clone(cached)));
            }
        }

        match self.codec.decode_logo(bytes).await {
            Ok(logo) => {
                let logo = Arc::new(logo);
                if let Some(key) = key {
                    self.logo_cache.write().await.insert(key, Arc::clone(&logo));
                }
                Ok(Some(logo))
            }
            Err(e) if e.fails_item() => Err(e),
            Err(e) => {
                warn!("Logo could not be decoded, skipping logo pass: {}", e);
                Ok(None)
            }
        }
    }

    fn emit(&self, batch_id: BatchId, index: usize, total: usize, name: &str, status: ItemStatus) {
        // No subscribers is fine
        let _ = self.progress_sender.send(BatchProgress {
            batch_id,
            index,
            total,
            name: name.to_string(),
            status,
            timestamp: Utc::now(),
        });
    }
}

/// `prefix + name`, with the extension swapped when the output format differs
pub fn output_name(prefix: &str, name: &str, format: ImageFormat) -> String {
    let path = Path::new(name);
    if ImageFormat::from_extension(path) == Some(format) {
        return format!("{}{}", prefix, name);
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    format!("{}{}.{}", prefix, stem, format.extension())
}
