//! Decoded thumbnail cache keyed by (image, size class).
//!
//! The cache is shared between the control thread (render lookups) and the
//! import / loader workers (blocking decodes). All synchronisation is internal:
//! callers hold an `Arc<ThumbnailCache>` and never lock anything themselves.

use crate::collection::ImageId;
use fast_image_resize::images::Image as FastImage;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::ImageError;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Decoded pixels as handed to the renderer.
pub type RasterImage = image::RgbaImage;

/// Pixel bound of the longest thumbnail side. Second half of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeClass(u32);

impl SizeClass {
    /// Viewports smaller than this in either dimension are treated as unknown.
    pub const MIN_VIEWPORT: u32 = 10;
    pub const VIEWPORT_FALLBACK: u32 = 500;
    pub const DEFAULT_THUMBNAIL: SizeClass = SizeClass(100);
    pub const RATED_PANEL: SizeClass = SizeClass(50);

    pub fn new(px: u32) -> Self {
        Self(px.max(1))
    }

    pub fn px(self) -> u32 {
        self.0
    }

    /// Size class for a preview that fills a `width` x `height` viewport.
    pub fn fit_viewport(width: u32, height: u32) -> Self {
        if width < Self::MIN_VIEWPORT || height < Self::MIN_VIEWPORT {
            Self(Self::VIEWPORT_FALLBACK)
        } else {
            Self(width.min(height))
        }
    }
}

impl std::fmt::Display for SizeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}px", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("cannot open {}: {message}", path.display())]
    Open { path: PathBuf, message: String },
    #[error("cannot decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
    #[error("cannot resize {}: {message}", path.display())]
    Resize { path: PathBuf, message: String },
    #[error("{} has no pixels", path.display())]
    EmptyImage { path: PathBuf },
}

/// The decode/resize routine the cache calls on a miss.
///
/// Must be safe to call from any worker thread.
pub trait Decoder: Send + Sync {
    fn decode_and_resize(&self, path: &Path, size: SizeClass) -> Result<RasterImage, DecodeError>;
}

impl<F> Decoder for F
where
    F: Fn(&Path, SizeClass) -> Result<RasterImage, DecodeError> + Send + Sync,
{
    fn decode_and_resize(&self, path: &Path, size: SizeClass) -> Result<RasterImage, DecodeError> {
        self(path, size)
    }
}

/// Decodes with `image` and downsamples with `fast_image_resize` (Lanczos3).
/// Aspect ratio is kept and images are never upscaled.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastResizeDecoder;

impl FastResizeDecoder {
    /// Largest `(w, h)` with the same aspect ratio that fits in a
    /// `bound` x `bound` box, never larger than the source.
    pub fn fit(width: u32, height: u32, bound: u32) -> (u32, u32) {
        if width <= bound && height <= bound {
            return (width, height);
        }
        let scale = bound as f64 / width.max(height) as f64;
        let w = ((width as f64 * scale).round() as u32).clamp(1, bound);
        let h = ((height as f64 * scale).round() as u32).clamp(1, bound);
        (w, h)
    }
}

impl Decoder for FastResizeDecoder {
    fn decode_and_resize(&self, path: &Path, size: SizeClass) -> Result<RasterImage, DecodeError> {
        let img = image::open(path).map_err(|e| match e {
            ImageError::IoError(io) => DecodeError::Open {
                path: path.to_path_buf(),
                message: io.to_string(),
            },
            other => DecodeError::Decode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;

        let rgba = img.to_rgba8();
        let (src_w, src_h) = rgba.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(DecodeError::EmptyImage {
                path: path.to_path_buf(),
            });
        }

        let (dst_w, dst_h) = Self::fit(src_w, src_h, size.px());
        if (dst_w, dst_h) == (src_w, src_h) {
            return Ok(rgba);
        }

        let resize_err = |message: String| DecodeError::Resize {
            path: path.to_path_buf(),
            message,
        };

        let src = FastImage::from_vec_u8(src_w, src_h, rgba.into_raw(), PixelType::U8x4)
            .map_err(|e| resize_err(e.to_string()))?;
        let mut dst = FastImage::new(dst_w, dst_h, PixelType::U8x4);

        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
        Resizer::new()
            .resize(&src, &mut dst, &options)
            .map_err(|e| resize_err(e.to_string()))?;

        RasterImage::from_raw(dst_w, dst_h, dst.into_vec())
            .ok_or_else(|| resize_err("resized buffer has the wrong length".to_string()))
    }
}

/// One decoded thumbnail. Immutable; clones share the pixel buffer.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: ImageId,
    pub size: SizeClass,
    pub raster: Arc<RasterImage>,
}

impl CacheEntry {
    /// Decoded size, 4 bytes per RGBA pixel.
    pub fn bytes(&self) -> usize {
        self.raster.width() as usize * self.raster.height() as usize * 4
    }
}

type CacheKey = (ImageId, SizeClass);

enum Slot {
    Ready(CacheEntry),
    /// Negative entry: the last decode of this key failed at `at`.
    Failed { error: DecodeError, at: Instant },
}

/// Outcome of a non-blocking lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(CacheEntry),
    /// A recent decode failed; do not retry yet.
    Failed(DecodeError),
    Miss,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
    /// How long a decode failure is remembered.
    pub negative_ttl: Duration,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_entries: 2048,
            max_bytes: 256 * 1024 * 1024,
            negative_ttl: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub negative_hits: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub decode_failures: u64,
}

struct CacheState {
    lru: LruCache<CacheKey, Slot>,
    bytes: usize,
    stats: CacheStats,
}

impl CacheState {
    fn remove(&mut self, key: &CacheKey) {
        if let Some(Slot::Ready(entry)) = self.lru.pop(key) {
            self.bytes = self.bytes.saturating_sub(entry.bytes());
        }
    }

    fn make_room(&mut self, incoming: usize, limits: &CacheLimits) {
        while !self.lru.is_empty()
            && (self.lru.len() >= limits.max_entries || self.bytes + incoming > limits.max_bytes)
        {
            if let Some((_, slot)) = self.lru.pop_lru() {
                if let Slot::Ready(entry) = slot {
                    self.bytes = self.bytes.saturating_sub(entry.bytes());
                }
                self.stats.evictions += 1;
            }
        }
    }
}

/// LRU-bounded, thread-safe thumbnail cache.
///
/// Bounded by both entry count and decoded bytes; eviction follows access
/// recency across every size class.
pub struct ThumbnailCache {
    decoder: Arc<dyn Decoder>,
    limits: CacheLimits,
    state: Mutex<CacheState>,
}

impl ThumbnailCache {
    pub fn new(decoder: Arc<dyn Decoder>, limits: CacheLimits) -> Self {
        let limits = CacheLimits {
            max_entries: limits.max_entries.max(1),
            ..limits
        };
        Self {
            decoder,
            limits,
            state: Mutex::new(CacheState {
                lru: LruCache::unbounded(),
                bytes: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // Entries are immutable once inserted, so a panicked holder cannot
        // have left one half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking lookup. Promotes the key on a hit and drops expired
    /// negative entries.
    pub fn lookup(&self, id: &ImageId, size: SizeClass) -> Lookup {
        let key = (id.clone(), size);
        let mut state = self.state();

        let expired = match state.lru.get(&key) {
            Some(Slot::Ready(entry)) => {
                let entry = entry.clone();
                state.stats.hits += 1;
                return Lookup::Hit(entry);
            }
            Some(Slot::Failed { error, at }) => {
                if at.elapsed() < self.limits.negative_ttl {
                    let error = error.clone();
                    state.stats.negative_hits += 1;
                    return Lookup::Failed(error);
                }
                true
            }
            None => false,
        };

        if expired {
            state.remove(&key);
        }
        state.stats.misses += 1;
        Lookup::Miss
    }

    /// Render-path access: never decodes.
    pub fn try_get(&self, id: &ImageId, size: SizeClass) -> Option<CacheEntry> {
        match self.lookup(id, size) {
            Lookup::Hit(entry) => Some(entry),
            _ => None,
        }
    }

    /// Cached entry, or decode on the calling thread and insert.
    ///
    /// The lock is not held while decoding. Two threads racing on the same
    /// key both decode; the later insert replaces the earlier one.
    pub fn get_or_decode(&self, id: &ImageId, size: SizeClass) -> Result<CacheEntry, DecodeError> {
        self.get_or_decode_while(id, size, &|| true)
    }

    /// Like `get_or_decode`, but the result is only stored if `keep` still
    /// holds once the decode is done. `keep` runs under the cache lock, so a
    /// caller that flips it before `evict_all` or `invalidate_size_class`
    /// never sees the entry reappear.
    pub fn get_or_decode_while(
        &self,
        id: &ImageId,
        size: SizeClass,
        keep: &dyn Fn() -> bool,
    ) -> Result<CacheEntry, DecodeError> {
        match self.lookup(id, size) {
            Lookup::Hit(entry) => return Ok(entry),
            Lookup::Failed(error) => {
                debug!("negative cache hit for {} at {}", id, size);
                return Err(error);
            }
            Lookup::Miss => {}
        }

        match self.decoder.decode_and_resize(id.path(), size) {
            Ok(raster) => {
                let entry = CacheEntry {
                    id: id.clone(),
                    size,
                    raster: Arc::new(raster),
                };
                self.insert(entry.clone(), keep);
                Ok(entry)
            }
            Err(error) => {
                warn!("thumbnail failed: {}", error);
                let mut state = self.state();
                if !keep() {
                    return Err(error);
                }
                let key = (id.clone(), size);
                state.remove(&key);
                state.make_room(0, &self.limits);
                state.lru.put(
                    key,
                    Slot::Failed {
                        error: error.clone(),
                        at: Instant::now(),
                    },
                );
                state.stats.decode_failures += 1;
                Err(error)
            }
        }
    }

    fn insert(&self, entry: CacheEntry, keep: &dyn Fn() -> bool) {
        let bytes = entry.bytes();
        if bytes > self.limits.max_bytes {
            debug!("{} at {} exceeds the cache budget, not cached", entry.id, entry.size);
            return;
        }

        let key = (entry.id.clone(), entry.size);
        let mut state = self.state();
        if !keep() {
            debug!("{} at {} no longer wanted, not cached", entry.id, entry.size);
            return;
        }
        state.remove(&key);
        state.make_room(bytes, &self.limits);
        state.bytes += bytes;
        state.lru.put(key, Slot::Ready(entry));
        state.stats.insertions += 1;
    }

    /// Whether a decoded entry is resident. Does not touch recency.
    pub fn contains(&self, id: &ImageId, size: SizeClass) -> bool {
        matches!(self.state().lru.peek(&(id.clone(), size)), Some(Slot::Ready(_)))
    }

    /// Drop every entry (decoded or failed) of one size class.
    pub fn invalidate_size_class(&self, size: SizeClass) -> usize {
        let mut state = self.state();
        let doomed: Vec<CacheKey> = state
            .lru
            .iter()
            .filter(|((_, s), _)| *s == size)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        debug!("invalidated {} entries at {}", doomed.len(), size);
        doomed.len()
    }

    pub fn evict_all(&self) {
        let mut state = self.state();
        state.lru.clear();
        state.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.state().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded bytes currently held.
    pub fn memory_usage(&self) -> usize {
        self.state().bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.state().stats
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }
}

/// Request to decode a thumbnail in the background
pub struct ThumbnailRequest {
    pub id: ImageId,
    pub size: SizeClass,
    /// Serial of this request; withdrawn tickets are skipped by the worker
    pub ticket: u64,
}

/// Completion report from the loader thread
#[derive(Debug)]
pub struct ThumbnailResponse {
    pub id: ImageId,
    pub size: SizeClass,
    pub ticket: u64,
    pub ok: bool,
}

type Tickets = Arc<Mutex<HashSet<u64>>>;

fn tickets(live: &Mutex<HashSet<u64>>) -> MutexGuard<'_, HashSet<u64>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render-path loader: one background thread that fills the cache on demand
/// so the interactive thread only ever calls `try_get`.
///
/// Requests are served newest first. A request can be withdrawn (`retain`,
/// `forget_pending`) until its decode lands in the cache.
pub struct ThumbnailLoader {
    cache: Arc<ThumbnailCache>,
    request_tx: Sender<ThumbnailRequest>,
    ready_rx: Receiver<ThumbnailResponse>,
    /// Keys sent to the worker and not yet reported back
    loading: HashMap<CacheKey, u64>,
    /// Tickets the worker may still decode and cache
    live: Tickets,
    next_ticket: u64,
}

impl ThumbnailLoader {
    pub fn new(cache: Arc<ThumbnailCache>) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<ThumbnailRequest>();
        let (ready_tx, ready_rx) = mpsc::channel::<ThumbnailResponse>();
        let live: Tickets = Arc::default();

        let worker_cache = Arc::clone(&cache);
        let worker_live = Arc::clone(&live);
        thread::spawn(move || {
            thumbnail_worker(request_rx, ready_tx, worker_cache, worker_live);
        });

        Self {
            cache,
            request_tx,
            ready_rx,
            loading: HashMap::new(),
            live,
            next_ticket: 0,
        }
    }

    /// Queue a decode. Returns false if the key is already cached or loading.
    pub fn request(&mut self, id: &ImageId, size: SizeClass) -> bool {
        if self.is_loading(id, size) || self.cache.contains(id, size) {
            return false;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        tickets(&self.live).insert(ticket);

        let request = ThumbnailRequest {
            id: id.clone(),
            size,
            ticket,
        };
        if self.request_tx.send(request).is_ok() {
            self.loading.insert((id.clone(), size), ticket);
            true
        } else {
            tickets(&self.live).remove(&ticket);
            false
        }
    }

    pub fn is_loading(&self, id: &ImageId, size: SizeClass) -> bool {
        self.loading.contains_key(&(id.clone(), size))
    }

    pub fn pending(&self) -> usize {
        self.loading.len()
    }

    /// Collect finished requests without blocking. Reports for withdrawn
    /// requests are swallowed.
    pub fn drain_ready(&mut self) -> Vec<ThumbnailResponse> {
        let mut done = Vec::new();
        while let Ok(response) = self.ready_rx.try_recv() {
            let key = (response.id.clone(), response.size);
            if self.loading.get(&key) == Some(&response.ticket) {
                self.loading.remove(&key);
                done.push(response);
            }
        }
        done
    }

    /// Withdraw every queued request whose key fails `wanted`.
    /// Returns how many were dropped.
    pub fn retain<F>(&mut self, wanted: F) -> usize
    where
        F: Fn(&ImageId, SizeClass) -> bool,
    {
        let mut live = tickets(&self.live);
        let before = self.loading.len();
        self.loading.retain(|(id, size), ticket| {
            let keep = wanted(id, *size);
            if !keep {
                live.remove(&*ticket);
            }
            keep
        });
        let dropped = before - self.loading.len();
        if dropped > 0 {
            debug!("dropped {} queued thumbnail decodes", dropped);
        }
        dropped
    }

    /// Withdraw everything in flight, e.g. before the cache is cleared.
    /// A decode already running finishes but is not cached.
    pub fn forget_pending(&mut self) {
        tickets(&self.live).clear();
        self.loading.clear();
    }
}

/// Background thread that decodes requested thumbnails into the shared cache
fn thumbnail_worker(
    rx: Receiver<ThumbnailRequest>,
    tx: Sender<ThumbnailResponse>,
    cache: Arc<ThumbnailCache>,
    live: Tickets,
) {
    let mut queue: Vec<ThumbnailRequest> = Vec::new();
    loop {
        if queue.is_empty() {
            match rx.recv() {
                Ok(request) => queue.push(request),
                Err(_) => break,
            }
        }
        queue.extend(rx.try_iter());

        // Newest first: the latest requests are what is on screen now.
        let Some(request) = queue.pop() else {
            continue;
        };
        let is_live = || tickets(&live).contains(&request.ticket);
        if !is_live() {
            continue;
        }

        let ok = cache
            .get_or_decode_while(&request.id, request.size, &is_live)
            .is_ok();
        tickets(&live).remove(&request.ticket);

        let response = ThumbnailResponse {
            id: request.id,
            size: request.size,
            ticket: request.ticket,
            ok,
        };
        if tx.send(response).is_err() {
            break;
        }
    }
}
