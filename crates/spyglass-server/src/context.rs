//! The adapter execution context
//!
//! Embedded object databases require that all interaction happens on one
//! thread with a live run loop. [`AdapterContext`] models that rule
//! explicitly: it owns a dedicated thread that executes submitted jobs in
//! FIFO order against the adapter. Everything the server does with the
//! database - reads, writes, observation registration, subscription
//! teardown - flows through here.
//!
//! FIFO execution is also what the protocol's ordering guarantees rest on:
//! a single client's requests serialize through this context, so responses
//! leave in request order, and a subscribe response is posted before any
//! later mutation can fire the observation's sink.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use spyglass_adapter::DatabaseAdapter;

use crate::{Result, ServerError};

type Job = Box<dyn FnOnce(&dyn DatabaseAdapter) + Send>;

/// One dedicated execution lane for all adapter calls
pub struct AdapterContext {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl AdapterContext {
    /// Spawn the context thread for the given adapter
    pub fn spawn(adapter: Arc<dyn DatabaseAdapter>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        thread::spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                job(adapter.as_ref());
            }
            tracing::debug!("adapter context drained");
        });

        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        })
    }

    /// Queue a job; returns false when the context has shut down
    ///
    /// Jobs run in submission order. A job submitted after shutdown is
    /// silently dropped, which is how replies into a dead server become
    /// no-ops.
    pub fn submit(&self, job: impl FnOnce(&dyn DatabaseAdapter) + Send + 'static) -> bool {
        let sender = self.tx.lock().clone();
        match sender {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Run a job and await its result
    ///
    /// Also serves as a barrier: when this returns, every job submitted
    /// before it has completed.
    pub async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn DatabaseAdapter) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let submitted = self.submit(move |adapter| {
            let _ = tx.send(f(adapter));
        });
        if !submitted {
            return Err(ServerError::ContextClosed);
        }
        rx.await.map_err(|_| ServerError::ContextClosed)
    }

    /// Stop accepting jobs; the thread exits after draining its queue
    pub fn shutdown(&self) {
        self.tx.lock().take();
    }

    /// True until `shutdown` is called
    pub fn is_open(&self) -> bool {
        self.tx.lock().is_some()
    }
}
