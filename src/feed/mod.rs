use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::api::models::Post;
use crate::api::{ApiClient, ApiError, Transport};
use crate::state::AppState;

/// The backend's page limit for both scroll endpoints.
pub const DEFAULT_PAGE_SIZE: usize = 3;
/// Pages the explore grid loads up front so there is something to scroll.
pub const EXPLORE_PREFETCH_PAGES: usize = 4;
pub const PREFETCH_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Posts from users who follow `user_id`
    Home { user_id: i64 },
    /// Randomized posts from everyone
    Explore,
}

impl FeedKind {
    /// Whether the data a first load depends on is present.
    pub fn is_ready(&self, state: &AppState) -> bool {
        match self {
            FeedKind::Home { .. } => state.is_authenticated() && !state.follows.is_empty(),
            FeedKind::Explore => state.is_authenticated(),
        }
    }
}

/// Where pages come from.
#[allow(async_fn_in_trait)]
pub trait FeedSource {
    async fn fetch_page(&self, kind: FeedKind, offset: usize) -> Result<Vec<Post>, ApiError>;
}

impl<T: Transport> FeedSource for ApiClient<T> {
    async fn fetch_page(&self, kind: FeedKind, offset: usize) -> Result<Vec<Post>, ApiError> {
        match kind {
            FeedKind::Home { user_id } => self.home_page(user_id, offset).await,
            FeedKind::Explore => self.explore_page(offset).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    /// Terminal for the life of the loader
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A full page arrived; more may follow
    Loaded(usize),
    /// A short (possibly empty) page arrived; the feed is now exhausted
    LastPage(usize),
    /// Another load is already running; no request was made
    InFlight,
    /// Nothing more to load; no request was made
    Exhausted,
    /// Prerequisites for the first load are missing
    NotReady,
    /// The first load already happened
    AlreadyStarted,
}

#[derive(Debug)]
struct FeedInner {
    status: FeedStatus,
    offset: usize,
    pages: usize,
    items: IndexMap<i64, Post>,
    last_error: Option<String>,
}

/// Resets the in-flight flag (and a stranded `Loading` status) when a load
/// finishes or its future is dropped.
struct InFlight<'g> {
    flag: &'g AtomicBool,
    inner: &'g Mutex<FeedInner>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.status == FeedStatus::Loading {
            inner.status = FeedStatus::Idle;
        }
        self.flag.store(false, Ordering::Release);
    }
}

/// Offset-based infinite scroll for the home and explore feeds.
///
/// One request per "load more" trigger; what comes back is appended and the
/// feed is exhausted once a page comes back short.
pub struct FeedLoader<'a, S> {
    source: &'a S,
    kind: FeedKind,
    page_size: usize,
    in_flight: AtomicBool,
    inner: Mutex<FeedInner>,
}

impl<'a, S: FeedSource> FeedLoader<'a, S> {
    pub fn new(source: &'a S, kind: FeedKind, page_size: usize) -> Self {
        Self {
            source,
            kind,
            page_size: page_size.max(1),
            in_flight: AtomicBool::new(false),
            inner: Mutex::new(FeedInner {
                status: FeedStatus::Idle,
                offset: 0,
                pages: 0,
                items: IndexMap::new(),
                last_error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// First load, once the feed's prerequisites are present.
    pub async fn load_initial(&self, state: &AppState) -> Result<LoadOutcome, ApiError> {
        if !self.kind.is_ready(state) {
            tracing::debug!("{:?} feed not ready for its first load", self.kind);
            return Ok(LoadOutcome::NotReady);
        }
        if self.lock().pages > 0 {
            return Ok(LoadOutcome::AlreadyStarted);
        }
        self.load_more().await
    }

    /// Fetch the next page at the current offset.
    ///
    /// A failed request leaves the offset where it was; the error is kept for
    /// display and returned, and a later call retries the same offset.
    pub async fn load_more(&self) -> Result<LoadOutcome, ApiError> {
        if self.lock().status == FeedStatus::Exhausted {
            return Ok(LoadOutcome::Exhausted);
        }
        // set before the first await
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("{:?} feed load already in flight", self.kind);
            return Ok(LoadOutcome::InFlight);
        }
        let _in_flight = InFlight {
            flag: &self.in_flight,
            inner: &self.inner,
        };

        let offset = {
            let mut inner = self.lock();
            inner.status = FeedStatus::Loading;
            inner.offset
        };

        let result = self.source.fetch_page(self.kind, offset).await;

        let mut inner = self.lock();
        match result {
            Ok(posts) => {
                let n = posts.len();
                inner.offset += n;
                inner.pages += 1;
                inner.last_error = None;
                for post in posts {
                    inner.items.insert(post.id, post);
                }
                if n < self.page_size {
                    inner.status = FeedStatus::Exhausted;
                    tracing::info!("{:?} feed exhausted at offset {}", self.kind, inner.offset);
                    Ok(LoadOutcome::LastPage(n))
                } else {
                    inner.status = FeedStatus::Idle;
                    tracing::debug!("{:?} feed advanced to offset {}", self.kind, inner.offset);
                    Ok(LoadOutcome::Loaded(n))
                }
            }
            Err(e) => {
                inner.status = FeedStatus::Idle;
                inner.last_error = Some(e.user_message());
                tracing::warn!("{:?} feed load at offset {} failed: {}", self.kind, offset, e);
                Err(e)
            }
        }
    }

    /// Load up to `min_pages` pages, stopping early once the feed runs out.
    /// Returns the number of pages this call loaded.
    pub async fn prefetch(&self, min_pages: usize, pause: Duration) -> Result<usize, ApiError> {
        let mut loaded = 0;
        while loaded < min_pages {
            match self.load_more().await? {
                LoadOutcome::Loaded(_) => {
                    loaded += 1;
                    if loaded < min_pages && !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                LoadOutcome::LastPage(_) => {
                    loaded += 1;
                    break;
                }
                _ => break,
            }
        }
        Ok(loaded)
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn status(&self) -> FeedStatus {
        self.lock().status
    }

    pub fn has_more(&self) -> bool {
        self.status() != FeedStatus::Exhausted
    }

    pub fn offset(&self) -> usize {
        self.lock().offset
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loaded posts, deduplicated, in arrival order.
    pub fn posts(&self) -> Vec<Post> {
        self.lock().items.values().cloned().collect()
    }
}
