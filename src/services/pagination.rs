//! Pagination aggregator.
//!
//! Drains a cursor-based listing into one complete result. The cursor is an
//! explicit state machine: `Idle` before the first call, `Fetching(token)`
//! while there is a page left to request, `Done` once the store reports the
//! listing is complete, an error occurs, or the drain is cancelled.
//!
//! Calls are strictly sequential since each token comes from the previous
//! response. Nothing is retried and nothing is kept between drains.

use std::{mem, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BrowserError, BrowserResult};
use crate::{
    models::object::ObjectEntry,
    store::{ListObjectsPage, ListObjectsRequest, ObjectStore, StoreError, StoreResult},
};

/// Filters applied to every page of one drain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
}

impl ListParams {
    /// Every key in the bucket.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every key starting with `prefix`, without folding.
    pub fn under(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            delimiter: None,
        }
    }

    /// One level below `prefix`, folded on `delimiter`. Empty strings count
    /// as unset.
    pub fn level(prefix: Option<&str>, delimiter: &str) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            delimiter: Some(delimiter).filter(|d| !d.is_empty()).map(str::to_string),
        }
    }
}

/// Concatenation of every page, in store order.
#[derive(Clone, Debug, Default)]
pub struct Drained {
    pub entries: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub pages: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    Fetching(Option<String>),
    Done,
}

/// Walks the pages of a single listing.
pub struct Paginator<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    params: &'a ListParams,
    state: CursorState,
}

impl<'a> Paginator<'a> {
    pub fn new(store: &'a dyn ObjectStore, bucket: &'a str, params: &'a ListParams) -> Self {
        Self {
            store,
            bucket,
            params,
            state: CursorState::Idle,
        }
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    /// Stop without issuing further fetches.
    pub fn cancel(&mut self) {
        self.state = CursorState::Done;
    }

    /// Fetch the next page, or `None` once the listing is complete.
    pub async fn next_page(&mut self) -> StoreResult<Option<ListObjectsPage>> {
        let token = match mem::replace(&mut self.state, CursorState::Done) {
            CursorState::Done => return Ok(None),
            CursorState::Idle => None,
            CursorState::Fetching(token) => token,
        };
        self.state = CursorState::Fetching(token.clone());

        let request = ListObjectsRequest {
            prefix: self.params.prefix.clone(),
            delimiter: self.params.delimiter.clone(),
            continuation_token: token.clone(),
        };
        let page = match self.store.list_objects_page(self.bucket, &request).await {
            Ok(page) => page,
            Err(err) => {
                self.state = CursorState::Done;
                return Err(err);
            }
        };

        self.state = CursorState::Done;
        if page.is_truncated {
            match &page.next_token {
                None => {
                    return Err(StoreError::Protocol(
                        "truncated listing without a continuation token".into(),
                    ));
                }
                Some(next) if token.as_ref() == Some(next) => {
                    return Err(StoreError::Protocol(
                        "listing returned the same continuation token twice".into(),
                    ));
                }
                Some(next) => self.state = CursorState::Fetching(Some(next.clone())),
            }
        }
        Ok(Some(page))
    }
}

/// Entry point every component uses to read from the store.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
}

impl Aggregator {
    pub fn new(store: Arc<dyn ObjectStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Drain every page for `params`, observing the service-wide
    /// cancellation token.
    pub async fn drain(&self, bucket: &str, params: &ListParams) -> BrowserResult<Drained> {
        self.drain_until(bucket, params, &self.cancel).await
    }

    /// Drain every page, stopping as soon as `cancel` fires. An in-flight
    /// store call is dropped, not awaited.
    pub async fn drain_until(
        &self,
        bucket: &str,
        params: &ListParams,
        cancel: &CancellationToken,
    ) -> BrowserResult<Drained> {
        let mut pager = Paginator::new(self.store.as_ref(), bucket, params);
        let mut drained = Drained::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                page = pager.next_page() => Some(page),
            };
            let Some(page) = next else {
                debug!(
                    "listing of {} cancelled after {} page(s), cursor {:?}",
                    bucket,
                    drained.pages,
                    pager.state()
                );
                pager.cancel();
                return Err(BrowserError::Cancelled);
            };

            match page? {
                Some(page) => {
                    drained.pages += 1;
                    drained.entries.extend(page.entries);
                    drained.common_prefixes.extend(page.common_prefixes);
                }
                None => break,
            }
        }

        debug!(
            "drained {} entries and {} prefixes from {} in {} page(s)",
            drained.entries.len(),
            drained.common_prefixes.len(),
            bucket,
            drained.pages
        );
        Ok(drained)
    }
}
