use anyhow::{bail, Context, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// Bounded hand-off to a playback task
///
/// Items are drained by a task that plays them at device pace. `depth`
/// counts items accepted but not yet played, which drives `has_room`.
pub struct PlaybackQueue<T> {
    tx: Option<mpsc::Sender<T>>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
    task: Option<JoinHandle<Result<()>>>,
}

impl<T: Send + 'static> PlaybackQueue<T> {
    /// Spawn `play` for every queued item, in order, until the queue closes.
    ///
    /// `finish` runs once after the last item.
    pub fn spawn<P, Fut, F>(capacity: usize, mut play: P, finish: F) -> Self
    where
        P: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (tx, mut rx) = mpsc::channel::<T>(capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        let played = Arc::clone(&depth);

        let task = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let result = play(item).await;
                played.fetch_sub(1, Ordering::SeqCst);
                if let Err(e) = result {
                    error!("Playback failed: {:#}", e);
                }
            }
            finish()
        });

        Self {
            tx: Some(tx),
            depth,
            capacity,
            task: Some(task),
        }
    }

    /// Queue an item, waiting for room if the buffer is full
    pub async fn push(&self, item: T) -> Result<()> {
        let Some(tx) = &self.tx else {
            bail!("Playback queue closed");
        };

        self.depth.fetch_add(1, Ordering::SeqCst);
        if tx.send(item).await.is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            bail!("Playback task exited");
        }
        Ok(())
    }

    pub fn has_room(&self) -> bool {
        self.tx.is_some() && self.depth.load(Ordering::SeqCst) < self.capacity
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Stop accepting items, drain what is queued, and run `finish`
    pub async fn close(&mut self) -> Result<()> {
        self.tx.take();
        match self.task.take() {
            Some(task) => task.await.context("Playback task panicked")?,
            None => Ok(()),
        }
    }
}
