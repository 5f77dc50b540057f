//! Lazy, finite sequences of raw-record pages.
//!
//! A [`PageSource`] describes one remote collection; every call to
//! [`PageSource::pages`] hands out a fresh [`OffsetPager`] cursor. Pagers
//! are never rewound: restarting means asking the source for a new one.

use std::collections::VecDeque;

use futures::stream::{self, Stream};
use serde_json::Value;

use crate::error::AppError;
use crate::services::jira_types::PARENT_KEY_FIELD;
use crate::services::remote::{Endpoint, RemoteSource};

/// One remote collection paged with a fixed page size.
#[derive(Clone, Copy)]
pub struct PageSource<'a> {
    remote: &'a dyn RemoteSource,
    page_size: u64,
}

impl<'a> PageSource<'a> {
    pub fn new(remote: &'a dyn RemoteSource, page_size: u64) -> Self {
        Self {
            remote,
            page_size: page_size.max(1),
        }
    }

    /// Start a fresh cursor over `endpoint`.
    pub fn pages(&self, endpoint: Endpoint) -> OffsetPager<'a> {
        OffsetPager::new(self.remote, endpoint, self.page_size)
    }

    /// Start a fresh cursor over every parent's sub-collection, in order.
    pub fn pages_per_parent<F>(&self, parents: Vec<String>, endpoint_for: F) -> ParentScopedPager<'a, F>
    where
        F: Fn(&str) -> Endpoint,
    {
        ParentScopedPager {
            source: *self,
            parents: parents.into(),
            endpoint_for,
            current: None,
        }
    }

    /// Number of records in `endpoint`: the reported total when the remote
    /// provides one, otherwise counted by walking the pages.
    pub async fn count(&self, endpoint: &Endpoint) -> Result<u64, AppError> {
        if let Some(total) = self.remote.fetch_total(endpoint).await? {
            return Ok(total);
        }

        let mut pager = self.pages(endpoint.clone());
        let mut count = 0u64;
        while let Some(page) = pager.next_page().await? {
            count += page.len() as u64;
        }
        Ok(count)
    }

    /// Sum of [`PageSource::count`] over every parent's sub-collection.
    pub async fn count_per_parent<F>(&self, parents: &[String], endpoint_for: F) -> Result<u64, AppError>
    where
        F: Fn(&str) -> Endpoint,
    {
        let mut total = 0u64;
        for parent in parents {
            total += self.count(&endpoint_for(parent)).await?;
        }
        Ok(total)
    }
}

/// Offset pagination cursor: advances `start_at` by the number of records
/// returned and stops after the first short page.
pub struct OffsetPager<'a> {
    remote: &'a dyn RemoteSource,
    endpoint: Endpoint,
    page_size: u64,
    start_at: u64,
    exhausted: bool,
}

impl<'a> OffsetPager<'a> {
    fn new(remote: &'a dyn RemoteSource, endpoint: Endpoint, page_size: u64) -> Self {
        Self {
            remote,
            endpoint,
            page_size,
            start_at: 0,
            exhausted: false,
        }
    }

    /// Fetch the next non-empty page, or `None` once the sequence is over.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, AppError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .remote
            .fetch_page(&self.endpoint, self.start_at, self.page_size)
            .await?;

        let returned = page.records.len() as u64;
        self.start_at += returned;
        if returned < self.page_size {
            self.exhausted = true;
        }

        if returned == 0 {
            Ok(None)
        } else {
            Ok(Some(page.records))
        }
    }

    /// Whether the short-page terminator has been seen.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Consume the pager as a stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Value>, AppError>> + 'a {
        stream::try_unfold(self, |mut pager| async move {
            let page = pager.next_page().await?;
            Ok::<_, AppError>(page.map(|page| (page, pager)))
        })
    }
}

/// Parent-scoped pagination: walks each parent's own offset-paginated
/// sub-collection in turn and tags every record with the parent key.
pub struct ParentScopedPager<'a, F> {
    source: PageSource<'a>,
    parents: VecDeque<String>,
    endpoint_for: F,
    current: Option<(String, OffsetPager<'a>)>,
}

impl<'a, F> ParentScopedPager<'a, F>
where
    F: Fn(&str) -> Endpoint,
{
    /// Fetch the next non-empty page of any remaining parent.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, AppError> {
        loop {
            if self.current.is_none() {
                let Some(parent) = self.parents.pop_front() else {
                    return Ok(None);
                };
                let pager = self.source.pages((self.endpoint_for)(&parent));
                self.current = Some((parent, pager));
            }

            let next = match self.current.as_mut() {
                Some((_, pager)) => pager.next_page().await?,
                None => continue,
            };

            match (next, &self.current) {
                (Some(mut records), Some((parent, _))) => {
                    for record in &mut records {
                        tag_parent(record, parent);
                    }
                    return Ok(Some(records));
                }
                _ => self.current = None,
            }
        }
    }
}

fn tag_parent(record: &mut Value, parent: &str) {
    if let Value::Object(map) = record {
        map.insert(PARENT_KEY_FIELD.to_string(), Value::String(parent.to_string()));
    }
}
