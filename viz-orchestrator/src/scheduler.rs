//! Fixed-cadence reveal of pipeline stages
//!
//! A pass shows stage 0 immediately, then moves the cursor one stage forward
//! every [`STAGE_INTERVAL`]. The last stage is held for one interval as well,
//! after which the pass is finished. Each step is a timer wake-up on the tokio
//! runtime; nothing is held between steps.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Time each stage stays the newest revealed one
pub const STAGE_INTERVAL: Duration = Duration::from_millis(800);

/// Snapshot of a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevealProgress {
    /// Highest stage index revealed so far
    pub cursor: Option<usize>,
    pub finished: bool,
}

impl RevealProgress {
    /// Whether stage `index` has been revealed
    pub fn reached(&self, index: usize) -> bool {
        self.cursor.is_some_and(|c| c >= index)
    }
}

/// Starts reveal passes over a fixed number of stages
#[derive(Debug, Clone)]
pub struct RevealScheduler {
    stage_count: usize,
}

impl RevealScheduler {
    pub fn new(stage_count: usize) -> Self {
        Self { stage_count }
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// Start a pass on the current tokio runtime.
    ///
    /// Stage 0 is revealed before this returns. `on_advance` runs once per
    /// stage with the new cursor (stage 0 included, from the pass task), and
    /// `on_complete` once after the last stage has been held.
    ///
    /// Cancellation is checked right before each callback, so no callback
    /// starts after `cancel()` is observed. On a multi-thread runtime a
    /// callback that passed the check can still run concurrently with
    /// `cancel()`; callers that must ignore such a late call tag their
    /// callbacks and drop stale ones.
    pub fn start<A, C>(&self, mut on_advance: A, on_complete: C) -> RevealPass
    where
        A: FnMut(usize) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let initial = RevealProgress {
            cursor: (self.stage_count > 0).then_some(0),
            finished: false,
        };
        let (progress_tx, progress_rx) = watch::channel(initial);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let stage_count = self.stage_count;

        let task = tokio::spawn(async move {
            for cursor in 0..stage_count {
                if is_cancelled(&cancel_rx) {
                    return;
                }
                if cursor > 0 {
                    progress_tx.send_replace(RevealProgress {
                        cursor: Some(cursor),
                        finished: false,
                    });
                }
                on_advance(cursor);

                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => {
                        debug!(cursor, "Reveal pass cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(STAGE_INTERVAL) => {}
                }
            }

            if is_cancelled(&cancel_rx) {
                return;
            }
            progress_tx.send_modify(|p| p.finished = true);
            on_complete();
        });

        RevealPass {
            progress: progress_rx,
            cancel: cancel_tx,
            task,
        }
    }
}

/// Set by `cancel()`, and also when the owning [`RevealPass`] is dropped.
fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// A running (or finished) reveal pass. Dropping it cancels the pass.
pub struct RevealPass {
    progress: watch::Receiver<RevealProgress>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RevealPass {
    /// Highest stage index revealed so far
    pub fn cursor(&self) -> Option<usize> {
        self.progress.borrow().cursor
    }

    pub fn progress(&self) -> RevealProgress {
        *self.progress.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.progress.borrow().finished
    }

    /// Watch cursor changes
    pub fn subscribe(&self) -> watch::Receiver<RevealProgress> {
        self.progress.clone()
    }

    /// Stop the pass. No further advances or completion callbacks happen.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl Drop for RevealPass {
    fn drop(&mut self) {
        self.task.abort();
    }
}
