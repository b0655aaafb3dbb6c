//! Deferred frame zeroing.
//!
//! Scrubbing a frame is tens of microseconds at minimum; doing it under the
//! buffer lock would stall every stage on the pool. Buffers with
//! zero-on-release instead hand the work to a single worker thread per
//! buffer. One owner means zero work backs up in FIFO order under load
//! instead of spawning unbounded threads, and the worker can be pinned to a
//! dedicated CPU so it never steals cycles from pinned pipeline threads.

use crate::error::Result;
use crate::memory::numa;
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-owner task queue that scrubs frames off the buffer lock.
pub(crate) struct Zeroer {
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Zeroer {
    /// Spawn the worker thread, optionally pinned to one CPU.
    pub(crate) fn spawn(buffer_name: &str, pin_cpu: Option<usize>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let name = format!("zero-{buffer_name}");
        let log_name = name.clone();

        let handle = thread::Builder::new().name(name).spawn(move || {
            if let Some(cpu) = pin_cpu {
                if let Err(err) = numa::pin_current_thread(&[cpu]) {
                    tracing::warn!(worker = %log_name, cpu, %err, "could not pin zeroing worker");
                }
            }
            // Drain until every sender is gone.
            while let Ok(job) = rx.recv() {
                job();
            }
        })?;

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Enqueue one zeroing job. Jobs run in submission order.
    pub(crate) fn submit(&self, job: Job) {
        if let Some(tx) = self.jobs.lock().unwrap().as_ref() {
            // The worker outlives every sender; send only fails after drop.
            let _ = tx.send(job);
        }
    }
}

impl Drop for Zeroer {
    fn drop(&mut self) {
        // Close the queue so the worker exits once it drains.
        self.jobs.lock().unwrap().take();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            // The last buffer handle can die inside a zero job, in which
            // case this drop runs on the worker itself; joining would then
            // self-deadlock, and the thread exits on its own anyway.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
