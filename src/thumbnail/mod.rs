/// Asynchronous thumbnail acquisition
///
/// This module handles:
/// - Decoding source images off the interactive thread (decode.rs)
/// - Downscaling to the 256px thumbnail size (resize.rs)
/// - Reading and writing on-disk thumbnail records (disk_cache.rs)
/// - The priority load queue (queue.rs)
/// - Memory cache, dedup and completion delivery (pipeline.rs)

pub mod decode;
pub mod resize;
pub mod disk_cache;
pub mod queue;
pub mod pipeline;

pub use decode::{DecodedImage, ImageCrateDecoder, ImageDecoder, PixelFormat};
pub use disk_cache::{DiskCache, ThumbnailCacheRecord};
pub use pipeline::{
    GenerationCounter, PipelineSettings, DEFAULT_MEMORY_CAPACITY, ReadyCallback, RequestStatus, ThumbnailPipeline,
    ThumbnailReady,
};
pub use queue::RequestKind;
pub use resize::{downscale, thumbnail_dimensions, THUMBNAIL_SIZE};
