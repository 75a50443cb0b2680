//! # Item Reader
//!
//! Adapts a [`PageReader`] to one-row-at-a-time consumption, the way a chunked
//! batch step pulls its input. Pages are fetched on demand and buffered; a page
//! shorter than the page size marks the end of the data without another query.
//!
//! With state saving on, a checkpoint taken partway through a page records the
//! cursor from *before* that page plus the number of rows already handed out,
//! so a restarted reader re-reads the page and skips exactly those rows.

use super::checkpoint::{cursor_key, page_skip_key, read_count_key, ExecutionContext};
use super::traits::PageReader;
use crate::error::ReaderResult;
use crate::query_builder::Pagination;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::marker::PhantomData;
use tracing::{debug, info};

pub struct PagingItemReader<T, R> {
    reader: R,
    buffer: VecDeque<T>,
    item_count: u64,
    max_item_count: Option<u64>,
    end_of_data: bool,
    consumed_in_page: usize,
    page_start: ExecutionContext,
    pending_skip: usize,
    _row: PhantomData<fn() -> T>,
}

impl<T, R> PagingItemReader<T, R>
where
    T: Send + 'static,
    R: PageReader<T>,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: VecDeque::new(),
            item_count: 0,
            max_item_count: None,
            end_of_data: false,
            consumed_in_page: 0,
            page_start: ExecutionContext::new(),
            pending_skip: 0,
            _row: PhantomData,
        }
    }

    /// Stop after `max` items in total, counting items read before a restart
    pub fn with_max_item_count(mut self, max: u64) -> Self {
        self.max_item_count = Some(max);
        self
    }

    /// Items handed out so far
    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn inner(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub async fn open(&mut self, context: &ExecutionContext) -> ReaderResult<()> {
        self.buffer.clear();
        self.item_count = 0;
        self.end_of_data = false;
        self.consumed_in_page = 0;
        self.page_start = ExecutionContext::new();
        self.pending_skip = 0;

        self.reader.open(context).await?;

        if self.reader.save_state() {
            let name = self.reader.name().to_string();
            self.item_count = context.get(&read_count_key(&name))?.unwrap_or(0);
            self.pending_skip = context.get(&page_skip_key(&name))?.unwrap_or(0);
            if self.item_count > 0 {
                info!(
                    reader = %name,
                    items = self.item_count,
                    skip = self.pending_skip,
                    "Resuming item reader"
                );
            }
        }
        Ok(())
    }

    /// Next item, or `None` once the data (or the item limit) is exhausted
    pub async fn read(&mut self) -> ReaderResult<Option<T>> {
        if self.max_item_count.is_some_and(|max| self.item_count >= max) {
            return Ok(None);
        }

        while self.buffer.is_empty() {
            if self.end_of_data {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }

        let item = self.buffer.pop_front();
        if item.is_some() {
            self.item_count += 1;
            self.consumed_in_page += 1;
        }
        Ok(item)
    }

    /// Up to `size` items; fewer only at the end of the data
    pub async fn read_chunk(&mut self, size: usize) -> ReaderResult<Vec<T>> {
        let mut chunk = Vec::with_capacity(size);
        while chunk.len() < size {
            match self.read().await? {
                Some(item) => chunk.push(item),
                None => break,
            }
        }
        Ok(chunk)
    }

    async fn fetch_next_page(&mut self) -> ReaderResult<()> {
        let mut snapshot = ExecutionContext::new();
        self.reader.update(&mut snapshot)?;

        let rows = self.reader.read_page().await?;
        if !Pagination::new(self.reader.page_size()).is_full(rows.len()) {
            self.end_of_data = true;
        }

        let skip = std::mem::take(&mut self.pending_skip).min(rows.len());
        if skip > 0 {
            debug!(reader = %self.reader.name(), skip = skip, "Skipping rows consumed before restart");
        }

        self.page_start = snapshot;
        self.consumed_in_page = skip;
        self.buffer = rows.into_iter().skip(skip).collect();
        Ok(())
    }

    /// Write restart state: cursor, item count and the position within the current page
    pub fn update(&self, context: &mut ExecutionContext) -> ReaderResult<()> {
        if !self.reader.save_state() {
            return Ok(());
        }
        let name = self.reader.name();

        if self.buffer.is_empty() {
            self.reader.update(context)?;
            context.remove(&page_skip_key(name));
        } else {
            context.remove(&cursor_key(name));
            context.merge(&self.page_start);
            context.put(page_skip_key(name), &self.consumed_in_page)?;
        }

        context.put(read_count_key(name), &self.item_count)?;
        Ok(())
    }

    pub async fn close(&mut self) -> ReaderResult<()> {
        self.buffer.clear();
        self.reader.close().await
    }

    /// Stream every remaining item; the stream ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = ReaderResult<T>> + Send
    where
        R: 'static,
    {
        stream::unfold((self, false), |(mut reader, failed)| async move {
            if failed {
                return None;
            }
            match reader.read().await {
                Ok(Some(item)) => Some((Ok(item), (reader, false))),
                Ok(None) => None,
                Err(error) => Some((Err(error), (reader, true))),
            }
        })
    }
}
