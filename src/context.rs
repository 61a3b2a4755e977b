//! Deferred background work
//!
//! Write-through and revalidation are handed off as fire-and-forget work
//! units. Whoever owns the context must call [`Context::flush`] before its
//! scope ends (process shutdown, end of a handler invocation) or in-flight
//! writes may be dropped.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

const DEFAULT_MAX_TRACKED: usize = 1024;

/// Receives asynchronous work the caller does not want to block on but
/// wants eventually awaited.
#[async_trait]
pub trait Context: Send + Sync + Debug {
    /// Schedules `work` without blocking the caller. Failures are the work
    /// unit's own responsibility to observe and log; there is no retry.
    fn wait_until(&self, work: BoxFuture<'static, ()>);

    /// Awaits every unit of work still tracked.
    async fn flush(&self);
}

/// Default [`Context`] backed by spawned tokio tasks.
///
/// Tracks at most `max_tracked` join handles; beyond that the oldest handle
/// is dropped. A dropped handle's task keeps running detached, it just can
/// no longer be flushed.
#[derive(Debug)]
pub struct StatefulContext {
    handles: Mutex<VecDeque<JoinHandle<()>>>,
    max_tracked: usize,
}

impl StatefulContext {
    pub fn new() -> Self {
        Self::with_max_tracked(DEFAULT_MAX_TRACKED)
    }

    pub fn with_max_tracked(max_tracked: usize) -> Self {
        Self {
            handles: Mutex::new(VecDeque::new()),
            max_tracked: max_tracked.max(1),
        }
    }

    /// Number of work units currently tracked.
    pub fn tracked(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

impl Default for StatefulContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Context for StatefulContext {
    fn wait_until(&self, work: BoxFuture<'static, ()>) {
        let handle = tokio::spawn(work);
        let mut handles = self.handles.lock().unwrap();
        if handles.len() >= self.max_tracked {
            handles.pop_front();
        }
        handles.push_back(handle);
    }

    async fn flush(&self) {
        loop {
            // drain outside the lock; flushed work may schedule more work
            let drained: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().unwrap();
                handles.drain(..).collect()
            };

            if drained.is_empty() {
                return;
            }

            for handle in drained {
                if let Err(error) = handle.await {
                    if !error.is_cancelled() {
                        tracing::warn!(%error, "deferred cache work panicked");
                    }
                }
            }
        }
    }
}
