// Fixed-capacity browser pool.
//
// A semaphore with `capacity` permits gates every checkout, so callers park
// until a handle comes back instead of polling. Idle handles sit on a LIFO
// free list; a new one is launched only when a permit is held and the list is
// empty, which keeps live handles <= capacity.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::browser::{BrowserLauncher, PageRenderer};
use crate::error::{CortexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub launched: u64,
    pub retired: u64,
    pub idle: usize,
    pub in_use: usize,
}

struct BrowserHandle {
    id: u64,
    renderer: Box<dyn PageRenderer>,
    pages: u32,
}

struct PoolInner {
    launcher: Arc<dyn BrowserLauncher>,
    capacity: usize,
    /// Renders before a handle is retired. 0 disables retirement.
    max_pages: u32,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<BrowserHandle>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    launched: AtomicU64,
    retired: AtomicU64,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<BrowserHandle>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn launch(&self) -> Result<BrowserHandle> {
        let renderer = self.launcher.launch().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.launched.fetch_add(1, Ordering::Relaxed);
        info!(backend = self.launcher.name(), browser_id = id, "pool: browser launched");
        Ok(BrowserHandle {
            id,
            renderer,
            pages: 0,
        })
    }

    fn release(&self, handle: BrowserHandle, retire: bool) {
        let worn_out = self.max_pages > 0 && handle.pages >= self.max_pages;
        if retire || worn_out || self.closed.load(Ordering::Acquire) {
            self.retired.fetch_add(1, Ordering::Relaxed);
            debug!(browser_id = handle.id, pages = handle.pages, worn_out, "pool: browser retired");
            return;
        }
        self.idle().push(handle);
    }
}

/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, capacity: usize, max_pages: u32) -> Self {
        let capacity = capacity.max(1);
        info!(backend = launcher.name(), capacity, max_pages, "BrowserPool initialized");
        Self {
            inner: Arc::new(PoolInner {
                launcher,
                capacity,
                max_pages,
                permits: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(Vec::with_capacity(capacity)),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                launched: AtomicU64::new(0),
                retired: AtomicU64::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Check out a browser, waiting up to `wait` (forever if `None`) for one
    /// to become free.
    pub async fn acquire(&self, wait: Option<Duration>) -> Result<PooledBrowser> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CortexError::PoolClosed);
        }

        let permits = Arc::clone(&self.inner.permits);
        let permit = match wait {
            Some(limit) => tokio::time::timeout(limit, permits.acquire_owned())
                .await
                .map_err(|_| CortexError::PoolExhausted(limit))?,
            None => permits.acquire_owned().await,
        }
        .map_err(|_| CortexError::PoolClosed)?;

        let reused = self.inner.idle().pop();
        let handle = match reused {
            Some(handle) => handle,
            None => self.inner.launch().await?,
        };

        Ok(PooledBrowser {
            pool: Arc::clone(&self.inner),
            handle: Some(handle),
            retire: false,
            _permit: permit,
        })
    }

    /// Drop every idle handle. Returns how many were released.
    pub fn recycle_idle(&self) -> usize {
        let drained: Vec<BrowserHandle> = self.inner.idle().drain(..).collect();
        let count = drained.len();
        if count > 0 {
            self.inner.retired.fetch_add(count as u64, Ordering::Relaxed);
            info!(released = count, "pool: recycled idle browsers");
        }
        count
    }

    /// Reject further acquires and release idle handles. Checked-out handles
    /// are retired when their guards drop.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();
        self.recycle_idle();
        info!("pool: closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.capacity,
            launched: self.inner.launched.load(Ordering::Relaxed),
            retired: self.inner.retired.load(Ordering::Relaxed),
            idle: self.inner.idle().len(),
            in_use: self
                .inner
                .capacity
                .saturating_sub(self.inner.permits.available_permits()),
        }
    }
}

/// A checked-out browser. Returned to the pool (or retired) on drop.
pub struct PooledBrowser {
    pool: Arc<PoolInner>,
    handle: Option<BrowserHandle>,
    retire: bool,
    // Released after `Drop::drop` has put the handle back.
    _permit: OwnedSemaphorePermit,
}

impl PooledBrowser {
    pub fn id(&self) -> u64 {
        self.handle.as_ref().map_or(0, |h| h.id)
    }

    pub fn pages(&self) -> u32 {
        self.handle.as_ref().map_or(0, |h| h.pages)
    }

    /// Render `url`. Errors that leave the session in doubt mark the handle
    /// for retirement.
    pub async fn render(&mut self, url: &str, timeout: Duration) -> Result<String> {
        let handle = self.handle.as_mut().ok_or(CortexError::PoolClosed)?;
        handle.pages += 1;
        let result = handle.renderer.render(url, timeout).await;
        if let Err(e) = &result {
            if e.poisons_browser() {
                self.retire = true;
            }
        }
        result
    }

    /// Retire this handle instead of returning it to the free list.
    pub fn retire(&mut self) {
        self.retire = true;
    }
}

impl std::fmt::Debug for PooledBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBrowser")
            .field("id", &self.id())
            .field("pages", &self.pages())
            .field("retire", &self.retire)
            .finish()
    }
}

impl Drop for PooledBrowser {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle, self.retire);
        }
    }
}
