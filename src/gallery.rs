/// The gallery service
///
/// Built once at the composition root and passed to whatever needs it.
/// Owns every persisted store and the thumbnail pipeline; all of it lives
/// on the interactive thread.
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

use crate::config::GalleryConfig;
use crate::content::{CategoryEntry, ContentEntry};
use crate::error::Result;
use crate::index::{PoseCountIndex, RatingIndex, TagIndex};
use crate::sort::{sort_entries, sort_entries_with, SortContext, SortState, SortStateCache, SortType};
use crate::thumbnail::{
    GenerationCounter, ImageCrateDecoder, ImageDecoder, RequestKind, RequestStatus,
    ThumbnailPipeline, ThumbnailReady,
};

pub struct Gallery {
    config: GalleryConfig,
    ratings: RatingIndex,
    tags: TagIndex,
    poses: PoseCountIndex,
    sort_states: SortStateCache,
    thumbnails: ThumbnailPipeline,
    generation: GenerationCounter,
}

impl Gallery {
    /// Open with the `image` crate as the decode service
    pub fn open(config: GalleryConfig) -> Result<Self> {
        Self::with_decoder(config, Arc::new(ImageCrateDecoder))
    }

    pub fn with_decoder(config: GalleryConfig, decoder: Arc<dyn ImageDecoder>) -> Result<Self> {
        let thumbnails = ThumbnailPipeline::new(config.pipeline_settings(), decoder)?;
        info!("Gallery data at {}", config.data_dir.display());

        Ok(Self {
            ratings: RatingIndex::open(&config.data_dir),
            tags: TagIndex::open(&config.data_dir),
            poses: PoseCountIndex::open(&config.data_dir, config.pose_flush_threshold),
            sort_states: SortStateCache::open(&config.data_dir),
            thumbnails,
            generation: GenerationCounter::new(),
            config,
        })
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    pub fn ratings(&self) -> &RatingIndex {
        &self.ratings
    }

    pub fn ratings_mut(&mut self) -> &mut RatingIndex {
        &mut self.ratings
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagIndex {
        &mut self.tags
    }

    pub fn poses(&self) -> &PoseCountIndex {
        &self.poses
    }

    pub fn poses_mut(&mut self) -> &mut PoseCountIndex {
        &mut self.poses
    }

    pub fn sort_states(&self) -> &SortStateCache {
        &self.sort_states
    }

    pub fn sort_states_mut(&mut self) -> &mut SortStateCache {
        &mut self.sort_states
    }

    pub fn thumbnails(&self) -> &ThumbnailPipeline {
        &self.thumbnails
    }

    pub fn thumbnails_mut(&mut self) -> &mut ThumbnailPipeline {
        &mut self.thumbnails
    }

    /// Generation thumbnails are currently requested under
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// Start a new view. Requests made for earlier views are dropped.
    pub fn begin_view(&mut self) -> u64 {
        let generation = self.generation.advance();
        let retired = self.thumbnails.retire_generations_before(generation);
        if retired > 0 {
            debug!("Dropped {} thumbnail requests from earlier views", retired);
        }
        generation
    }

    /// Order files by the stored "Files" preference, ratings included
    pub fn sort_files(&self, entries: &mut [ContentEntry]) -> SortState {
        let state = self.sort_states.get(&SortContext::Files);
        match state.sort_type {
            SortType::Rating => sort_entries_with(entries, state, |e| {
                i64::from(self.ratings.rating(&e.uid()))
            }),
            _ => sort_entries(entries, state),
        }
        state
    }

    /// Every tag with its usage count, ordered by the stored "Tags" preference
    pub fn sorted_tags(&self) -> Vec<CategoryEntry> {
        let mut tags = self.tags.all_tags();
        sort_entries(&mut tags, self.sort_states.get(&SortContext::Tags));
        tags
    }

    /// Ask for an entry's thumbnail under the current generation
    pub fn request_thumbnail<F>(&mut self, path: &Path, priority: i32, on_ready: F) -> RequestStatus
    where
        F: FnOnce(&ThumbnailReady) + 'static,
    {
        let generation = self.generation.current();
        self.thumbnails
            .request(path, RequestKind::Thumbnail, priority, generation, on_ready)
    }

    /// One interactive tick: deliver finished thumbnails
    pub fn tick(&mut self) -> usize {
        self.thumbnails.pump()
    }

    /// Persist every dirty store
    pub fn flush(&mut self) {
        self.ratings.flush();
        self.tags.flush();
        self.poses.flush();
        self.sort_states.flush();
    }
}

impl std::fmt::Debug for Gallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery")
            .field("data_dir", &self.config.data_dir)
            .field("generation", &self.generation.current())
            .field("thumbnails", &self.thumbnails)
            .finish()
    }
}
