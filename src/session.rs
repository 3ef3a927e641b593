//! Control-thread facade over the engine.
//!
//! `Session` owns every piece of single-threaded state (store, cursor, page
//! geometry, filter) and the shared cache handle. The front-end talks only to
//! this type; each method is one user-level command.

use crate::collection::{CollectionError, CollectionStore, ImageId, Rating};
use crate::export::{export_entries, ExportReport, FileCopier};
use crate::filter::{FilterIndex, FilterPredicate};
use crate::import::{
    ImportCoordinator, ImportEvent, ImportHandle, ImportOutcome, ImportPolicy, ImportState,
    MergePrompt, Progress,
};
use crate::thumbnail::{
    CacheEntry, CacheLimits, CacheStats, DecodeError, Decoder, Lookup, SizeClass, ThumbnailCache,
    ThumbnailLoader,
};
use crate::utils;
use crate::view::{PagedView, SelectionCursor, SelectionError};
use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub page_size: usize,
    pub thumbnail_size: u32,
    pub min_thumbnail_size: u32,
    pub max_thumbnail_size: u32,
    pub rated_size: u32,
    pub filter: FilterPredicate,
    pub cache: CacheLimits,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_size: PagedView::DEFAULT_PAGE_SIZE,
            thumbnail_size: SizeClass::DEFAULT_THUMBNAIL.px(),
            min_thumbnail_size: 50,
            max_thumbnail_size: 150,
            rated_size: SizeClass::RATED_PANEL.px(),
            filter: FilterPredicate::All,
            cache: CacheLimits::default(),
        }
    }
}

/// Render-path view of one thumbnail.
#[derive(Debug, Clone)]
pub enum ThumbState {
    Ready(CacheEntry),
    /// Not decoded yet; a background decode has been scheduled.
    Pending,
    /// Decoding failed recently; draw a placeholder.
    Failed(DecodeError),
}

/// Last known state of the current (or most recent) import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportStatus {
    pub outcome: ImportOutcome,
    pub progress: Progress,
    pub finished: bool,
    pub cancelled: bool,
}

/// One row of the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub index: usize,
    pub id: ImageId,
    pub stars: u8,
    pub selected: bool,
}

pub struct Session {
    store: CollectionStore,
    cursor: SelectionCursor,
    view: PagedView,
    filter: FilterPredicate,
    filter_index: FilterIndex,
    cache: Arc<ThumbnailCache>,
    importer: ImportCoordinator,
    loader: ThumbnailLoader,
    active_import: Option<ImportHandle>,
    import_status: Option<ImportStatus>,
    thumb_size: SizeClass,
    thumb_range: (u32, u32),
    rated_size: SizeClass,
    viewport: Option<(u32, u32)>,
    /// Thumbnail misses of the frame being drawn
    drawn: HashSet<(ImageId, SizeClass)>,
}

impl Session {
    pub fn new(decoder: Arc<dyn Decoder>, options: SessionOptions) -> Self {
        let cache = Arc::new(ThumbnailCache::new(decoder, options.cache));
        let min = options.min_thumbnail_size.max(1);
        let max = options.max_thumbnail_size.max(min);
        let thumb_size = SizeClass::new(options.thumbnail_size.clamp(min, max));

        Self {
            store: CollectionStore::new(),
            cursor: SelectionCursor::new(),
            view: PagedView::new(options.page_size),
            filter: options.filter,
            filter_index: FilterIndex::new(),
            importer: ImportCoordinator::new(Arc::clone(&cache), thumb_size),
            loader: ThumbnailLoader::new(Arc::clone(&cache)),
            cache,
            active_import: None,
            import_status: None,
            thumb_size,
            thumb_range: (min, max),
            rated_size: SizeClass::new(options.rated_size),
            viewport: None,
            drawn: HashSet::new(),
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ThumbnailCache> {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // --- import ---

    /// Import `files` and re-anchor the selection.
    ///
    /// After a replace the first image is selected; after a merge the
    /// previously selected image stays selected at its new position.
    pub fn import(
        &mut self,
        files: Vec<ImageId>,
        policy: ImportPolicy,
        prompt: &mut dyn MergePrompt,
    ) -> ImportOutcome {
        let selected = self.cursor.current(&self.store).cloned();
        let handle = self.importer.begin_import(&mut self.store, files, policy, prompt);
        let outcome = handle.outcome();

        match outcome {
            ImportOutcome::Replaced { .. } => {
                self.loader.forget_pending();
                self.cursor.clear();
                self.cursor.clamp(&self.store);
            }
            ImportOutcome::Merged { .. } => match &selected {
                Some(id) => self.cursor.follow(&self.store, id),
                None => self.cursor.clamp(&self.store),
            },
            ImportOutcome::Cancelled | ImportOutcome::Empty => {}
        }

        if handle.has_population() {
            self.import_status = Some(ImportStatus {
                outcome,
                progress: Progress::default(),
                finished: false,
                cancelled: false,
            });
            self.active_import = Some(handle);
            self.poll_import();
        }
        outcome
    }

    /// List `dir` for files with one of `extensions`, canonicalise and import.
    pub fn import_dir<S: AsRef<str>>(
        &mut self,
        dir: &Path,
        recursive: bool,
        extensions: &[S],
        policy: ImportPolicy,
        prompt: &mut dyn MergePrompt,
    ) -> Result<ImportOutcome> {
        let files = utils::canonical_ids(utils::list_files(dir, recursive, extensions)?);
        info!("found {} images in {}", files.len(), dir.display());
        Ok(self.import(files, policy, prompt))
    }

    /// Drain progress from the running population.
    pub fn poll_import(&mut self) -> Option<ImportStatus> {
        let mut finished = false;
        if let (Some(handle), Some(status)) = (&self.active_import, &mut self.import_status) {
            for event in handle.drain() {
                status.progress = event.progress();
                match event {
                    ImportEvent::Progress(_) => {}
                    ImportEvent::Done(_) => status.finished = true,
                    ImportEvent::Cancelled(_) => {
                        status.finished = true;
                        status.cancelled = true;
                    }
                }
            }
            finished = status.finished;
        }
        if finished {
            self.active_import = None;
        }
        self.import_status
    }

    pub fn import_status(&self) -> Option<ImportStatus> {
        self.import_status
    }

    pub fn import_state(&mut self) -> ImportState {
        self.importer.state()
    }

    /// Stop the running population at its next file.
    pub fn cancel_import(&mut self) {
        self.importer.cancel();
    }

    // --- rating and navigation ---

    /// Rate the current image and step to the next one.
    /// Returns false when nothing is selected.
    pub fn rate(&mut self, rating: Rating) -> Result<bool, CollectionError> {
        let Some(id) = self.cursor.current(&self.store).cloned() else {
            return Ok(false);
        };
        self.store.rate(&id, rating)?;
        debug!("rated {} with {} stars", id, rating.stars());
        self.cursor.move_by(&self.store, 1);
        Ok(true)
    }

    /// Step to the next image without rating.
    pub fn skip(&mut self) -> bool {
        self.cursor.move_by(&self.store, 1)
    }

    pub fn move_by(&mut self, delta: isize) -> bool {
        self.cursor.move_by(&self.store, delta)
    }

    /// Move by whole pages, stopping at the first or last image.
    pub fn page_step(&mut self, pages: isize) -> bool {
        let step = pages.saturating_mul(self.view.page_size() as isize);
        self.cursor.move_by(&self.store, step)
    }

    pub fn select(&mut self, index: usize) -> Result<(), SelectionError> {
        self.cursor.select(&self.store, index)
    }

    pub fn current(&self) -> Option<&ImageId> {
        self.cursor.current(&self.store)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor.index()
    }

    pub fn current_rating(&self) -> u8 {
        self.current().map(|id| self.store.rating_of(id)).unwrap_or(0)
    }

    // --- paging ---

    pub fn window(&self) -> (usize, usize) {
        self.view
            .window(self.store.len(), self.cursor.index().unwrap_or(0))
    }

    pub fn page_entries(&self) -> Vec<PageEntry> {
        let (start, end) = self.window();
        let selected = self.cursor.index();
        (start..end)
            .filter_map(|index| {
                self.store.at(index).map(|id| PageEntry {
                    index,
                    id: id.clone(),
                    stars: self.store.rating_of(id),
                    selected: selected == Some(index),
                })
            })
            .collect()
    }

    /// Zero-based page of the selection.
    pub fn page(&self) -> usize {
        self.view.page(self.cursor.index().unwrap_or(0))
    }

    pub fn page_count(&self) -> usize {
        self.view.page_count(self.store.len())
    }

    pub fn page_size(&self) -> usize {
        self.view.page_size()
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.view.set_page_size(page_size);
    }

    // --- filter ---

    pub fn filter(&self) -> FilterPredicate {
        self.filter
    }

    pub fn set_filter(&mut self, predicate: FilterPredicate) {
        self.filter = predicate;
    }

    pub fn cycle_filter(&mut self) -> FilterPredicate {
        self.filter = self.filter.next();
        self.filter
    }

    /// Rated images matching the active filter, in path order.
    pub fn visible(&mut self) -> &[(ImageId, Rating)] {
        self.filter_index.visible(&self.store, self.filter)
    }

    pub fn visible_count(&mut self) -> usize {
        self.filter_index.count(&self.store, self.filter)
    }

    // --- thumbnails ---

    pub fn thumbnail_size(&self) -> SizeClass {
        self.thumb_size
    }

    pub fn thumbnail_range(&self) -> (u32, u32) {
        self.thumb_range
    }

    pub fn rated_size(&self) -> SizeClass {
        self.rated_size
    }

    /// Slider change. Clamps to the allowed range and drops cached entries
    /// of the old size unless the rated panel still uses them.
    ///
    /// A running population is stopped before the old class is dropped and
    /// restarted at the new class, so nothing of the old size lands late.
    pub fn set_thumbnail_size(&mut self, px: u32) -> SizeClass {
        let (min, max) = self.thumb_range;
        let next = SizeClass::new(px.clamp(min, max));
        let old = self.thumb_size;
        if next == old {
            return old;
        }

        let interrupted = if self.importer.is_populating() {
            self.import_status.map(|status| status.outcome)
        } else {
            None
        };
        self.importer.cancel_and_wait();
        self.loader.forget_pending();

        if old != self.rated_size {
            self.cache.invalidate_size_class(old);
        }
        self.thumb_size = next;
        self.importer.set_default_size(next);
        debug!("thumbnail size {} -> {}", old, next);

        if let Some(outcome) = interrupted {
            let handle = self.importer.repopulate(self.store.ids().to_vec(), outcome);
            self.import_status = Some(ImportStatus {
                outcome,
                progress: Progress::default(),
                finished: false,
                cancelled: false,
            });
            self.active_import = Some(handle);
            self.poll_import();
        }
        next
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Some((width, height));
    }

    /// Size class of the preview pane.
    pub fn viewport_size_class(&self) -> SizeClass {
        match self.viewport {
            Some((w, h)) => SizeClass::fit_viewport(w, h),
            None => SizeClass::new(SizeClass::VIEWPORT_FALLBACK),
        }
    }

    /// Non-blocking thumbnail access. A miss schedules a background decode.
    pub fn thumbnail(&mut self, id: &ImageId, size: SizeClass) -> ThumbState {
        match self.cache.lookup(id, size) {
            Lookup::Hit(entry) => ThumbState::Ready(entry),
            Lookup::Failed(error) => ThumbState::Failed(error),
            Lookup::Miss => {
                self.loader.request(id, size);
                self.drawn.insert((id.clone(), size));
                ThumbState::Pending
            }
        }
    }

    /// Start recording which thumbnails the next frame asks for.
    pub fn begin_frame(&mut self) {
        self.drawn.clear();
    }

    /// Drop queued decodes the frame just drawn no longer shows.
    pub fn end_frame(&mut self) -> usize {
        let drawn = &self.drawn;
        self.loader.retain(|id, size| drawn.contains(&(id.clone(), size)))
    }

    /// Collect finished background decodes. Returns how many landed.
    pub fn poll_thumbnails(&mut self) -> usize {
        self.loader.drain_ready().len()
    }

    pub fn thumbnails_pending(&self) -> usize {
        self.loader.pending()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // --- export and reset ---

    /// Copy every image visible under the active filter into `dst_dir`.
    pub fn export(&mut self, dst_dir: &Path, copier: &dyn FileCopier) -> ExportReport {
        let entries = self.filter_index.visible(&self.store, self.filter);
        export_entries(entries, dst_dir, copier)
    }

    /// Forget the whole collection and its ratings.
    pub fn reset(&mut self) {
        self.importer.cancel_and_wait();
        self.active_import = None;
        self.import_status = None;
        self.store.reset();
        self.cursor.clear();
        self.filter_index.invalidate();
        self.loader.forget_pending();
        self.cache.evict_all();
        info!("collection reset");
    }
}
