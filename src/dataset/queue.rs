//! Bounded example queue fed by background loader workers
//!
//! Workers repeatedly read a per-class batch from their [`ExampleSource`]
//! and push the examples one by one into a bounded channel. The training
//! loop dequeues fixed-size batches. A shared [`Coordinator`] flag stops
//! everything; dropping the receiver releases workers blocked on a full
//! queue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use tracing::{debug, error, info};

use super::burn_dataset::EmotionItem;
use super::loader::DirectorySampler;
use crate::utils::error::{EmotionError, Result};

const SEND_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something a loader worker can repeatedly pull examples from
pub trait ExampleSource: Send + 'static {
    fn read_batch(&mut self) -> Result<Vec<EmotionItem>>;
}

/// Shared stop flag between the training loop and the loader workers
#[derive(Clone, Debug, Default)]
pub struct Coordinator {
    stop: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Pool of named loader threads behind a bounded queue
pub struct LoaderPool {
    receiver: Option<Receiver<EmotionItem>>,
    workers: Vec<(String, JoinHandle<Result<()>>)>,
    coordinator: Coordinator,
}

impl LoaderPool {
    /// Start `num_threads` workers, each with a source built by `make_source(i)`
    pub fn spawn<S, F>(num_threads: usize, capacity: usize, mut make_source: F) -> Result<Self>
    where
        S: ExampleSource,
        F: FnMut(usize) -> S,
    {
        if num_threads == 0 || capacity == 0 {
            return Err(EmotionError::Config(
                "loader pool needs at least one thread and a non-zero capacity".to_string(),
            ));
        }

        let (sender, receiver) = bounded(capacity);
        let coordinator = Coordinator::new();
        let mut pool = Self {
            receiver: Some(receiver),
            workers: Vec::with_capacity(num_threads),
            coordinator,
        };

        for i in 0..num_threads {
            let name = format!("loader-{}", i);
            let source = make_source(i);
            let sender = sender.clone();
            let coordinator = pool.coordinator.clone();
            let worker_name = name.clone();

            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&worker_name, source, sender, coordinator))?;
            pool.workers.push((name, handle));
        }

        info!(
            "Started {} loader workers (queue capacity {})",
            num_threads, capacity
        );
        Ok(pool)
    }

    /// Workers sampling random per-class batches from `source`
    ///
    /// Queue capacity is `batch_size * 3`; worker `i` is seeded with `seed + i`.
    pub fn from_directory(
        source: PathBuf,
        class_names: Vec<String>,
        batch_size: usize,
        image_size: u32,
        num_threads: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::spawn(num_threads, batch_size * 3, |i| {
            DirectorySampler::new(
                source.clone(),
                class_names.clone(),
                batch_size,
                image_size,
                seed.wrapping_add(i as u64),
            )
        })
    }

    /// Handle to the shared stop flag
    pub fn coordinator(&self) -> Coordinator {
        self.coordinator.clone()
    }

    /// Block until `batch_size` examples are dequeued
    ///
    /// Fails with `QueueClosed` once every worker has exited and the queue
    /// is drained.
    pub fn next_batch(&self, batch_size: usize) -> Result<Vec<EmotionItem>> {
        let receiver = self.receiver.as_ref().ok_or(EmotionError::QueueClosed)?;
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            let item = receiver.recv().map_err(|_| EmotionError::QueueClosed)?;
            batch.push(item);
        }
        Ok(batch)
    }

    /// Stop all workers, wait for them, and return the first worker error
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.coordinator.request_stop();
        // Disconnects workers blocked on a full queue
        self.receiver.take();

        let mut first_error = None;
        for (name, handle) in self.workers.drain(..) {
            let outcome = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(EmotionError::Worker {
                    name: name.clone(),
                    message: "thread panicked".to_string(),
                }),
            };
            match outcome {
                Ok(()) => debug!("Loader worker '{}' finished", name),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.stop_and_join();
        }
    }
}

fn worker_loop<S: ExampleSource>(
    name: &str,
    mut source: S,
    sender: Sender<EmotionItem>,
    coordinator: Coordinator,
) -> Result<()> {
    while !coordinator.should_stop() {
        let batch = match source.read_batch() {
            Ok(batch) => batch,
            Err(e) => {
                error!("Loader worker '{}' failed: {}", name, e);
                coordinator.request_stop();
                return Err(e);
            }
        };

        for item in batch {
            if !send_until_stopped(&sender, item, &coordinator) {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Returns false when the pool is stopping or the receiver is gone
fn send_until_stopped(
    sender: &Sender<EmotionItem>,
    mut item: EmotionItem,
    coordinator: &Coordinator,
) -> bool {
    loop {
        match sender.send_timeout(item, SEND_POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if coordinator.should_stop() {
                    return false;
                }
                item = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
