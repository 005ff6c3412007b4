use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

use super::decode::{DecodedImage, ImageDecoder};
use super::disk_cache::{DiskCache, ThumbnailCacheRecord};
use super::queue::{JobKey, LoadQueue, QueuedJob, RequestKind};
use super::resize::downscale;
use crate::content::content_uid;
use crate::error::Result;
use crate::persist::last_write_time;

/// Invoked on the interactive thread when an image is ready
pub type ReadyCallback = Box<dyn FnOnce(&ThumbnailReady)>;

/// A produced image, tagged with the request it answers
#[derive(Debug, Clone)]
pub struct ThumbnailReady {
    pub path: PathBuf,
    pub kind: RequestKind,
    pub priority: i32,
    /// View generation the request was made under
    pub generation: u64,
    pub image: Arc<DecodedImage>,
}

impl ThumbnailReady {
    /// False when the view moved on after the request was made
    pub fn is_current(&self, current_generation: u64) -> bool {
        self.generation == current_generation
    }
}

/// Monotonic view generation, owned by whoever owns the view
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    /// Start a new view; every outstanding request becomes stale
    pub fn advance(&mut self) -> u64 {
        self.current += 1;
        self.current
    }
}

/// How a request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Served from memory; the callback already ran
    Ready,
    /// New work was queued
    Queued,
    /// Joined work already pending for the same path
    Attached,
}

/// Default number of images kept in the memory cache
pub const DEFAULT_MEMORY_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Where thumbnail records are written
    pub cache_dir: PathBuf,
    /// Upper bound on concurrent decodes
    pub worker_threads: usize,
    /// Longest side of cached thumbnails
    pub max_side: u32,
    /// Images kept in memory before the least recently used is evicted
    pub memory_capacity: usize,
}

struct Waiter {
    path: PathBuf,
    priority: i32,
    generation: u64,
    /// Asked after the source was invalidated mid-decode
    after_invalidate: bool,
    on_ready: ReadyCallback,
}

struct Pending {
    /// Path the queued job decodes (the first requester's spelling)
    source: PathBuf,
    best_priority: i32,
    waiters: Vec<Waiter>,
    /// The running decode predates an `invalidate`; its image is not cached
    invalidated: bool,
}

struct CachedImage {
    image: Arc<DecodedImage>,
    last_used: u64,
}

struct Completion {
    key: JobKey,
    image: Option<Arc<DecodedImage>>,
}

/// State shared with the workers. Holds nothing the interactive thread owns.
struct WorkerShared {
    queue: Mutex<LoadQueue>,
    decoder: Arc<dyn ImageDecoder>,
    disk: DiskCache,
    max_side: u32,
    completions: Sender<Completion>,
}

impl WorkerShared {
    fn lock_queue(&self) -> MutexGuard<'_, LoadQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of one blocking task: claim the most urgent job, produce its
    /// image, hand it back, then write the disk record.
    fn run_next(&self) {
        let next = self.lock_queue().pop();
        let Some(job) = next else {
            return;
        };

        let (image, record) = match catch_unwind(AssertUnwindSafe(|| self.load(&job))) {
            Ok(Some((image, record))) => (Some(image), record),
            Ok(None) => (None, None),
            Err(_) => {
                warn!("Thumbnail worker panicked on {}", job.path.display());
                (None, None)
            }
        };

        // The receiver is gone only when the pipeline was dropped
        let _ = self.completions.send(Completion {
            key: job.key.clone(),
            image,
        });

        if let Some(record) = record {
            match self.disk.write(&job.path, &record) {
                Ok(()) => debug!(
                    "Cached {}x{} thumbnail for {}",
                    record.image.width,
                    record.image.height,
                    job.path.display()
                ),
                Err(e) => warn!("Failed to cache thumbnail for {}: {}", job.path.display(), e),
            }
        }
    }

    fn load(&self, job: &QueuedJob) -> Option<(Arc<DecodedImage>, Option<ThumbnailCacheRecord>)> {
        if job.key.kind == RequestKind::Thumbnail {
            if let Some(cached) = self.disk.lookup(&job.path) {
                debug!("Thumbnail cache hit: {}", job.path.display());
                return Some((Arc::new(cached), None));
            }
        }

        // Taken before decoding so an edit during decode leaves a stale record, not a wrong one
        let source_mtime = last_write_time(&job.path).ok();

        let decoded = match self.decoder.decode(&job.path) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("No thumbnail for {}: {}", job.path.display(), e);
                return None;
            }
        };

        let thumbnail = match downscale(&decoded, self.max_side) {
            Ok(thumbnail) => Some(thumbnail),
            Err(e) => {
                warn!("Failed to downscale {}: {}", job.path.display(), e);
                None
            }
        };

        let record = match (source_mtime, &thumbnail) {
            (Some(mtime), Some(thumb)) => {
                Some(ThumbnailCacheRecord::new(&job.path, mtime, thumb.clone()))
            }
            _ => None,
        };

        let image = match job.key.kind {
            RequestKind::Thumbnail => thumbnail?,
            RequestKind::Full => decoded,
        };
        Some((Arc::new(image), record))
    }
}

/// Resolves content paths to images without blocking the interactive thread.
///
/// Lookups go memory cache -> load queue. Workers try the disk cache for
/// thumbnail requests, decode on a miss, and post results to a channel that
/// the interactive thread drains with `pump` once per tick. Callbacks only
/// ever run inside `request` (memory hit) or `pump`.
///
/// Running decodes are never interrupted. Requests carry the caller's
/// generation id; `retire_generations_before` drops requests from older views
/// and withdraws queued jobs nobody is waiting for any more.
///
/// The memory cache holds at most `memory_capacity` images and evicts the
/// least recently used one.
pub struct ThumbnailPipeline {
    shared: Arc<WorkerShared>,
    completions: Receiver<Completion>,
    memory: HashMap<JobKey, CachedImage>,
    memory_capacity: usize,
    use_clock: u64,
    pending: HashMap<JobKey, Pending>,
    runtime: Option<Runtime>,
}

impl ThumbnailPipeline {
    pub fn new(settings: PipelineSettings, decoder: Arc<dyn ImageDecoder>) -> Result<Self> {
        let workers = settings.worker_threads.max(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(workers)
            .thread_name("thumbnail-worker")
            .build()?;

        let (tx, rx) = crossbeam_channel::unbounded();
        info!(
            "Thumbnail pipeline: {} workers, cache at {}",
            workers,
            settings.cache_dir.display()
        );

        Ok(Self {
            shared: Arc::new(WorkerShared {
                queue: Mutex::new(LoadQueue::new()),
                decoder,
                disk: DiskCache::new(settings.cache_dir),
                max_side: settings.max_side.max(1),
                completions: tx,
            }),
            completions: rx,
            memory: HashMap::new(),
            memory_capacity: settings.memory_capacity.max(1),
            use_clock: 0,
            pending: HashMap::new(),
            runtime: Some(runtime),
        })
    }

    /// Ask for an image. `on_ready` runs at most once, on the interactive
    /// thread, and only if an image was produced.
    ///
    /// Lower `priority` is served first; equal priorities are FIFO.
    pub fn request<F>(
        &mut self,
        path: &Path,
        kind: RequestKind,
        priority: i32,
        generation: u64,
        on_ready: F,
    ) -> RequestStatus
    where
        F: FnOnce(&ThumbnailReady) + 'static,
    {
        let key = JobKey {
            path: content_uid(path),
            kind,
        };

        let now = self.tick_use_clock();
        if let Some(cached) = self.memory.get_mut(&key) {
            cached.last_used = now;
            let ready = ThumbnailReady {
                path: path.to_path_buf(),
                kind,
                priority,
                generation,
                image: Arc::clone(&cached.image),
            };
            on_ready(&ready);
            return RequestStatus::Ready;
        }

        let mut waiter = Waiter {
            path: path.to_path_buf(),
            priority,
            generation,
            after_invalidate: false,
            on_ready: Box::new(on_ready),
        };

        if let Some(pending) = self.pending.get_mut(&key) {
            waiter.after_invalidate = pending.invalidated;
            pending.waiters.push(waiter);
            if priority < pending.best_priority {
                pending.best_priority = priority;
                let requeued = {
                    let mut queue = self.shared.lock_queue();
                    let waiting = queue.is_waiting(&key);
                    if waiting {
                        queue.push(key, pending.source.clone(), priority);
                    }
                    waiting
                };
                if requeued {
                    self.spawn_worker();
                }
            }
            return RequestStatus::Attached;
        }

        self.pending.insert(
            key.clone(),
            Pending {
                source: path.to_path_buf(),
                best_priority: priority,
                waiters: vec![waiter],
                invalidated: false,
            },
        );
        self.shared.lock_queue().push(key, path.to_path_buf(), priority);
        self.spawn_worker();
        RequestStatus::Queued
    }

    /// Drain finished work and run callbacks. Call once per interactive tick.
    /// Returns the number of completed jobs handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.complete(completion);
            handled += 1;
        }
        handled
    }

    /// Like `pump`, but waits up to `timeout` for the first completion
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => {
                self.complete(completion);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    /// Pump until nothing is pending. Returns false on timeout.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump_timeout(deadline - now);
        }
        true
    }

    /// Requests (distinct path/kind pairs) not yet delivered
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Jobs no worker has picked up yet
    pub fn queued_count(&self) -> usize {
        self.shared.lock_queue().len()
    }

    pub fn is_cached(&self, path: &Path, kind: RequestKind) -> bool {
        self.memory.contains_key(&JobKey {
            path: content_uid(path),
            kind,
        })
    }

    /// Forget everything known about `path` (e.g. after the source changed).
    ///
    /// Cached images are dropped. A decode already running for `path` still
    /// answers the requests made before this call, but its image is not
    /// cached and later requests get a fresh decode.
    pub fn invalidate(&mut self, path: &Path) {
        let uid = content_uid(path);
        self.memory.retain(|key, _| key.path != uid);

        let queue = self.shared.lock_queue();
        for (key, pending) in self.pending.iter_mut() {
            // A job still in the queue will read the new source anyway
            if key.path == uid && !queue.is_waiting(key) {
                pending.invalidated = true;
            }
        }
    }

    /// Drop every request made under a generation older than `current`.
    ///
    /// Queued jobs left without a waiter are withdrawn; running decodes finish
    /// but deliver to nobody. Returns the number of requests dropped.
    pub fn retire_generations_before(&mut self, current: u64) -> usize {
        let mut retired = 0;
        let mut queue = self.shared.lock_queue();
        self.pending.retain(|key, pending| {
            let before = pending.waiters.len();
            pending.waiters.retain(|w| w.generation >= current);
            retired += before - pending.waiters.len();

            if pending.waiters.is_empty() {
                queue.forget(key);
                return false;
            }
            true
        });
        retired
    }

    pub fn clear_memory_cache(&mut self) {
        self.memory.clear();
    }

    pub fn disk_cache(&self) -> &DiskCache {
        &self.shared.disk
    }

    fn spawn_worker(&self) {
        if let Some(runtime) = &self.runtime {
            let shared = Arc::clone(&self.shared);
            runtime.spawn_blocking(move || shared.run_next());
        }
    }

    fn complete(&mut self, completion: Completion) {
        let Some(pending) = self.pending.remove(&completion.key) else {
            return;
        };
        // A duplicate queued after a retire is answered by this result
        self.shared.lock_queue().forget(&completion.key);

        let (later, waiters): (Vec<Waiter>, Vec<Waiter>) = pending
            .waiters
            .into_iter()
            .partition(|w| w.after_invalidate);
        self.requeue(completion.key.clone(), pending.source, later);

        let Some(image) = completion.image else {
            return;
        };

        if !pending.invalidated {
            self.remember(completion.key.clone(), Arc::clone(&image));
        }
        for waiter in waiters {
            let ready = ThumbnailReady {
                path: waiter.path,
                kind: completion.key.kind,
                priority: waiter.priority,
                generation: waiter.generation,
                image: Arc::clone(&image),
            };
            (waiter.on_ready)(&ready);
        }
    }
}

impl ThumbnailPipeline {
    /// Queue a fresh job for requests that arrived after an invalidate
    fn requeue(&mut self, key: JobKey, source: PathBuf, waiters: Vec<Waiter>) {
        let Some(best_priority) = waiters.iter().map(|w| w.priority).min() else {
            return;
        };
        let waiters = waiters
            .into_iter()
            .map(|w| Waiter {
                after_invalidate: false,
                ..w
            })
            .collect();

        self.pending.insert(
            key.clone(),
            Pending {
                source: source.clone(),
                best_priority,
                waiters,
                invalidated: false,
            },
        );
        self.shared.lock_queue().push(key, source, best_priority);
        self.spawn_worker();
    }

    fn remember(&mut self, key: JobKey, image: Arc<DecodedImage>) {
        let last_used = self.tick_use_clock();
        self.memory.insert(key, CachedImage { image, last_used });

        while self.memory.len() > self.memory_capacity {
            let oldest = self
                .memory
                .iter()
                .min_by_key(|(_, cached)| cached.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => self.memory.remove(&key),
                None => break,
            };
        }
    }

    fn tick_use_clock(&mut self) -> u64 {
        self.use_clock += 1;
        self.use_clock
    }
}

impl Drop for ThumbnailPipeline {
    fn drop(&mut self) {
        // Don't block the interactive thread on in-flight decodes
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for ThumbnailPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailPipeline")
            .field("cache_dir", &self.shared.disk.dir())
            .field("cached", &self.memory.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalleryError;
    use crate::thumbnail::decode::PixelFormat;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    struct FakeDecoder {
        sizes: HashMap<String, (u32, u32)>,
        calls: Mutex<Vec<String>>,
        gate: Option<Receiver<()>>,
    }

    impl FakeDecoder {
        fn new(sizes: &[(&str, (u32, u32))]) -> Self {
            Self {
                sizes: sizes.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
                calls: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn pattern(width: u32, height: u32) -> Vec<u8> {
        (0..width * height * 4).map(|i| (i % 251) as u8).collect()
    }

    impl ImageDecoder for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.calls.lock().unwrap().push(name.clone());
            if let Some(gate) = &self.gate {
                let _ = gate.recv_timeout(WAIT);
            }
            let (w, h) = *self
                .sizes
                .get(&name)
                .ok_or_else(|| GalleryError::UnsupportedFormat(name.clone()))?;
            DecodedImage::new(w, h, PixelFormat::Rgba8, pattern(w, h))
        }
    }

    struct Fixture {
        dir: TempDir,
        decoder: Arc<FakeDecoder>,
    }

    impl Fixture {
        fn new(decoder: FakeDecoder) -> Self {
            let dir = TempDir::new().unwrap();
            for name in decoder.sizes.keys() {
                fs::write(dir.path().join(name), b"source").unwrap();
            }
            Self {
                dir,
                decoder: Arc::new(decoder),
            }
        }

        fn source(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn pipeline(&self, workers: usize) -> ThumbnailPipeline {
            self.pipeline_with_capacity(workers, DEFAULT_MEMORY_CAPACITY)
        }

        fn pipeline_with_capacity(&self, workers: usize, capacity: usize) -> ThumbnailPipeline {
            let settings = PipelineSettings {
                cache_dir: self.dir.path().join("cache"),
                worker_threads: workers,
                max_side: 256,
                memory_capacity: capacity,
            };
            ThumbnailPipeline::new(settings, Arc::clone(&self.decoder) as Arc<dyn ImageDecoder>)
                .unwrap()
        }
    }

    type Delivered = Rc<RefCell<Vec<ThumbnailReady>>>;

    fn collector() -> (Delivered, impl Fn() -> Box<dyn FnOnce(&ThumbnailReady)>) {
        let delivered: Delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delivered);
        let make = move || {
            let sink = Rc::clone(&sink);
            Box::new(move |ready: &ThumbnailReady| sink.borrow_mut().push(ready.clone()))
                as Box<dyn FnOnce(&ThumbnailReady)>
        };
        (delivered, make)
    }

    fn wait_for_first_call(decoder: &FakeDecoder) {
        let deadline = Instant::now() + WAIT;
        while decoder.calls().is_empty() {
            assert!(Instant::now() < deadline, "decoder never started");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn gated(sizes: &[(&str, (u32, u32))]) -> (Sender<()>, FakeDecoder) {
        let (open_gate, gate) = crossbeam_channel::unbounded();
        let mut decoder = FakeDecoder::new(sizes);
        decoder.gate = Some(gate);
        (open_gate, decoder)
    }

    fn wait_for_file(path: &Path) {
        let deadline = Instant::now() + WAIT;
        while !path.exists() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", path.display());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_delivers_thumbnail_then_serves_from_memory() {
        let fx = Fixture::new(FakeDecoder::new(&[("big.png", (1024, 512))]));
        let mut pipeline = fx.pipeline(2);
        let (delivered, callback) = collector();
        let source = fx.source("big.png");

        let status = pipeline.request(&source, RequestKind::Thumbnail, 0, 1, callback());
        assert_eq!(status, RequestStatus::Queued);
        assert!(delivered.borrow().is_empty());

        assert!(pipeline.wait_idle(WAIT));
        assert_eq!(delivered.borrow().len(), 1);
        let image = Arc::clone(&delivered.borrow()[0].image);
        assert_eq!((image.width, image.height), (256, 128));

        // Exact hit: synchronous, no second decode
        let status = pipeline.request(&source, RequestKind::Thumbnail, 0, 1, callback());
        assert_eq!(status, RequestStatus::Ready);
        assert_eq!(delivered.borrow().len(), 2);
        assert_eq!(fx.decoder.calls(), vec!["big.png".to_string()]);
        assert!(pipeline.is_cached(&source, RequestKind::Thumbnail));
    }

    #[test]
    fn test_disk_records_are_downscaled() {
        let fx = Fixture::new(FakeDecoder::new(&[
            ("wide.png", (1024, 512)),
            ("small.png", (200, 100)),
        ]));
        let mut pipeline = fx.pipeline(2);
        let (_delivered, callback) = collector();

        let wide = fx.source("wide.png");
        let small = fx.source("small.png");
        pipeline.request(&wide, RequestKind::Thumbnail, 0, 0, callback());
        pipeline.request(&small, RequestKind::Thumbnail, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));

        let disk = pipeline.disk_cache().clone();
        wait_for_file(&disk.record_path(&wide));
        wait_for_file(&disk.record_path(&small));

        let wide_record = disk.read_record(&wide).unwrap().unwrap();
        assert_eq!((wide_record.image.width, wide_record.image.height), (256, 128));
        assert_eq!(wide_record.source_mtime, last_write_time(&wide).unwrap());

        let small_record = disk.read_record(&small).unwrap().unwrap();
        assert_eq!((small_record.image.width, small_record.image.height), (200, 100));
        assert_eq!(small_record.image.format, PixelFormat::Rgba8);
        assert_eq!(small_record.image.pixels, pattern(200, 100));
    }

    #[test]
    fn test_full_request_delivers_full_size() {
        let fx = Fixture::new(FakeDecoder::new(&[("big.png", (1024, 512))]));
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();

        pipeline.request(&fx.source("big.png"), RequestKind::Full, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));

        let image = Arc::clone(&delivered.borrow()[0].image);
        assert_eq!((image.width, image.height), (1024, 512));
        assert!(!pipeline.is_cached(&fx.source("big.png"), RequestKind::Thumbnail));
    }

    #[test]
    fn test_duplicate_requests_share_one_decode() {
        let fx = Fixture::new(FakeDecoder::new(&[("pose.png", (64, 64))]));
        let mut pipeline = fx.pipeline(2);
        let (delivered, callback) = collector();

        let lower = fx.source("pose.png");
        let upper = PathBuf::from(lower.to_string_lossy().replace("pose.png", "POSE.PNG"));

        assert_eq!(
            pipeline.request(&lower, RequestKind::Thumbnail, 3, 0, callback()),
            RequestStatus::Queued
        );
        assert_eq!(
            pipeline.request(&upper, RequestKind::Thumbnail, 1, 0, callback()),
            RequestStatus::Attached
        );
        assert_eq!(pipeline.pending_count(), 1);

        assert!(pipeline.wait_idle(WAIT));
        assert_eq!(delivered.borrow().len(), 2);
        assert_eq!(fx.decoder.calls().len(), 1);

        // Each callback sees its own request
        let priorities: Vec<i32> = delivered.borrow().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![3, 1]);
    }

    #[test]
    fn test_stale_generation_is_detectable() {
        let fx = Fixture::new(FakeDecoder::new(&[("p.png", (32, 32))]));
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();
        let mut generation = GenerationCounter::new();

        let first = generation.advance();
        pipeline.request(&fx.source("p.png"), RequestKind::Thumbnail, 0, first, callback());
        let second = generation.advance();
        assert!(pipeline.wait_idle(WAIT));

        let ready = delivered.borrow()[0].clone();
        assert_eq!(ready.generation, first);
        assert!(!ready.is_current(second));
        assert!(ready.is_current(first));
    }

    #[test]
    fn test_decode_failure_is_silent() {
        let fx = Fixture::new(FakeDecoder::new(&[]));
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();
        let missing = fx.dir.path().join("missing.png");

        pipeline.request(&missing, RequestKind::Thumbnail, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));

        assert!(delivered.borrow().is_empty());
        assert_eq!(pipeline.pending_count(), 0);
        assert!(!pipeline.is_cached(&missing, RequestKind::Thumbnail));
    }

    #[test]
    fn test_valid_disk_record_skips_decode() {
        let fx = Fixture::new(FakeDecoder::new(&[("big.png", (1024, 512))]));
        let source = fx.source("big.png");
        {
            let mut first = fx.pipeline(1);
            let (_d, callback) = collector();
            first.request(&source, RequestKind::Thumbnail, 0, 0, callback());
            assert!(first.wait_idle(WAIT));
            wait_for_file(&first.disk_cache().record_path(&source));
        }
        assert_eq!(fx.decoder.calls().len(), 1);

        let mut second = fx.pipeline(1);
        let (delivered, callback) = collector();
        second.request(&source, RequestKind::Thumbnail, 0, 0, callback());
        assert!(second.wait_idle(WAIT));

        assert_eq!(delivered.borrow()[0].image.width, 256);
        assert_eq!(fx.decoder.calls().len(), 1);
    }

    #[test]
    fn test_stale_disk_record_is_redecoded() {
        let fx = Fixture::new(FakeDecoder::new(&[("big.png", (1024, 512))]));
        let source = fx.source("big.png");
        {
            let mut first = fx.pipeline(1);
            let (_d, callback) = collector();
            first.request(&source, RequestKind::Thumbnail, 0, 0, callback());
            assert!(first.wait_idle(WAIT));
            wait_for_file(&first.disk_cache().record_path(&source));
        }

        let later = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let mut second = fx.pipeline(1);
        let (delivered, callback) = collector();
        second.request(&source, RequestKind::Thumbnail, 0, 0, callback());
        assert!(second.wait_idle(WAIT));

        assert_eq!(delivered.borrow().len(), 1);
        assert_eq!(fx.decoder.calls().len(), 2);
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let (open_gate, gate) = crossbeam_channel::unbounded();
        let mut decoder = FakeDecoder::new(&[
            ("first.png", (8, 8)),
            ("a.png", (8, 8)),
            ("b.png", (8, 8)),
            ("c.png", (8, 8)),
        ]);
        decoder.gate = Some(gate);
        let fx = Fixture::new(decoder);
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();

        pipeline.request(&fx.source("first.png"), RequestKind::Thumbnail, 0, 0, callback());
        let deadline = Instant::now() + WAIT;
        while fx.decoder.calls().is_empty() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }

        // The only worker is busy; these wait in the queue
        pipeline.request(&fx.source("c.png"), RequestKind::Thumbnail, 5, 0, callback());
        pipeline.request(&fx.source("a.png"), RequestKind::Thumbnail, 1, 0, callback());
        pipeline.request(&fx.source("b.png"), RequestKind::Thumbnail, 1, 0, callback());
        assert_eq!(pipeline.queued_count(), 3);

        for _ in 0..4 {
            open_gate.send(()).unwrap();
        }
        assert!(pipeline.wait_idle(WAIT));

        assert_eq!(delivered.borrow().len(), 4);
        assert_eq!(fx.decoder.calls(), vec!["first.png", "a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let fx = Fixture::new(FakeDecoder::new(&[("p.png", (16, 16))]));
        let mut pipeline = fx.pipeline(1);
        let (_delivered, callback) = collector();
        let source = fx.source("p.png");

        pipeline.request(&source, RequestKind::Full, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));
        assert!(pipeline.is_cached(&source, RequestKind::Full));

        pipeline.invalidate(&source);
        assert!(!pipeline.is_cached(&source, RequestKind::Full));
        assert_eq!(
            pipeline.request(&source, RequestKind::Full, 0, 0, callback()),
            RequestStatus::Queued
        );
        assert!(pipeline.wait_idle(WAIT));
        assert_eq!(fx.decoder.calls().len(), 2);
    }

    #[test]
    fn test_invalidate_during_decode_keeps_old_image_out_of_memory() {
        let (open_gate, decoder) = gated(&[("p.png", (16, 16))]);
        let fx = Fixture::new(decoder);
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();
        let source = fx.source("p.png");

        pipeline.request(&source, RequestKind::Full, 0, 0, callback());
        wait_for_first_call(&fx.decoder);

        pipeline.invalidate(&source);
        open_gate.send(()).unwrap();
        assert!(pipeline.wait_idle(WAIT));

        // The request made before the invalidate is still answered
        assert_eq!(delivered.borrow().len(), 1);
        assert!(!pipeline.is_cached(&source, RequestKind::Full));
        assert_eq!(
            pipeline.request(&source, RequestKind::Full, 0, 0, callback()),
            RequestStatus::Queued
        );
        open_gate.send(()).unwrap();
        assert!(pipeline.wait_idle(WAIT));
    }

    #[test]
    fn test_request_after_invalidate_gets_fresh_decode() {
        let (open_gate, decoder) = gated(&[("p.png", (16, 16))]);
        let fx = Fixture::new(decoder);
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();
        let source = fx.source("p.png");

        pipeline.request(&source, RequestKind::Full, 4, 0, callback());
        wait_for_first_call(&fx.decoder);

        pipeline.invalidate(&source);
        assert_eq!(
            pipeline.request(&source, RequestKind::Full, 1, 0, callback()),
            RequestStatus::Attached
        );

        for _ in 0..2 {
            open_gate.send(()).unwrap();
        }
        assert!(pipeline.wait_idle(WAIT));

        assert_eq!(fx.decoder.calls().len(), 2);
        let priorities: Vec<i32> = delivered.borrow().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![4, 1]);
        assert!(pipeline.is_cached(&source, RequestKind::Full));
    }

    #[test]
    fn test_retired_generation_is_not_decoded() {
        let (open_gate, decoder) = gated(&[
            ("a.png", (8, 8)),
            ("b.png", (8, 8)),
            ("c.png", (8, 8)),
            ("d.png", (8, 8)),
        ]);
        let fx = Fixture::new(decoder);
        let mut pipeline = fx.pipeline(1);
        let (delivered, callback) = collector();
        let mut generation = GenerationCounter::new();

        let old = generation.advance();
        pipeline.request(&fx.source("a.png"), RequestKind::Thumbnail, 0, old, callback());
        wait_for_first_call(&fx.decoder);
        pipeline.request(&fx.source("b.png"), RequestKind::Thumbnail, 0, old, callback());
        pipeline.request(&fx.source("c.png"), RequestKind::Thumbnail, 0, old, callback());

        let current = generation.advance();
        assert_eq!(pipeline.retire_generations_before(current), 3);
        assert_eq!(pipeline.queued_count(), 0);
        assert_eq!(pipeline.pending_count(), 0);

        pipeline.request(&fx.source("d.png"), RequestKind::Thumbnail, 5, current, callback());
        for _ in 0..2 {
            open_gate.send(()).unwrap();
        }
        assert!(pipeline.wait_idle(WAIT));

        assert_eq!(fx.decoder.calls(), vec!["a.png", "d.png"]);
        assert_eq!(delivered.borrow().len(), 1);
        assert!(delivered.borrow()[0].is_current(current));
        assert_eq!(delivered.borrow()[0].path, fx.source("d.png"));
    }

    #[test]
    fn test_memory_cache_evicts_least_recently_used() {
        let fx = Fixture::new(FakeDecoder::new(&[
            ("a.png", (8, 8)),
            ("b.png", (8, 8)),
            ("c.png", (8, 8)),
        ]));
        let mut pipeline = fx.pipeline_with_capacity(1, 2);
        let (_delivered, callback) = collector();
        let (a, b, c) = (fx.source("a.png"), fx.source("b.png"), fx.source("c.png"));

        pipeline.request(&a, RequestKind::Full, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));
        pipeline.request(&b, RequestKind::Full, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));

        // Touch `a` so `b` becomes the oldest
        assert_eq!(
            pipeline.request(&a, RequestKind::Full, 0, 0, callback()),
            RequestStatus::Ready
        );
        pipeline.request(&c, RequestKind::Full, 0, 0, callback());
        assert!(pipeline.wait_idle(WAIT));

        assert!(pipeline.is_cached(&a, RequestKind::Full));
        assert!(!pipeline.is_cached(&b, RequestKind::Full));
        assert!(pipeline.is_cached(&c, RequestKind::Full));
    }
}
