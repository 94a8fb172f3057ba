//! Last-request-wins bookkeeping for the probe and analysis workers, plus the
//! registry of running downloads.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handed to each run started through a [`TaskSlot`]. A run only delivers
/// results while its ticket is current.
#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl RunTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Runs `deliver` only if this run has not been replaced. Returns whether
    /// it ran.
    pub fn deliver<F: FnOnce()>(&self, deliver: F) -> bool {
        if self.is_current() {
            deliver();
            true
        } else {
            tracing::debug!("dropping result of stale run {}", self.generation);
            false
        }
    }
}

struct Running {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// At most one live run. Starting a new one stops the previous run and waits
/// for it to end before the new run is spawned.
#[derive(Default)]
pub struct TaskSlot {
    generation: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn start<F, Fut>(&self, run: F) -> u64
    where
        F: FnOnce(RunTicket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            stop(previous).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let ticket = RunTicket {
            generation,
            current: self.generation.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run(ticket));
        *running = Some(Running { handle, cancel });
        generation
    }

    /// Stops the live run, if any. Its results will not be delivered.
    pub async fn cancel(&self) {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            stop(previous).await;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Waits for the live run to end on its own.
    pub async fn join(&self) {
        let handle = self.running.lock().await.take().map(|r| r.handle);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!("task panicked: {}", e);
                }
            }
        }
    }
}

async fn stop(previous: Running) {
    previous.cancel.cancel();
    previous.handle.abort();
    match previous.handle.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!("replaced task panicked: {}", e),
    }
}

/// Per-session worker state. Probes and analyses are single-slot; downloads
/// run side by side and are addressed by id.
#[derive(Default)]
pub struct Session {
    pub probe: TaskSlot,
    pub analysis: TaskSlot,
    downloads: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_download(&self) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.downloads.lock().await.insert(id, token.clone());
        (id, token)
    }

    pub async fn finish_download(&self, id: &Uuid) {
        self.downloads.lock().await.remove(id);
    }

    pub async fn cancel_download(&self, id: &Uuid) -> bool {
        match self.downloads.lock().await.remove(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn active_downloads(&self) -> Vec<Uuid> {
        self.downloads.lock().await.keys().copied().collect()
    }

    pub async fn shutdown(&self) {
        for (_, token) in self.downloads.lock().await.drain() {
            token.cancel();
        }
        self.probe.cancel().await;
        self.analysis.cancel().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type Delivered = Arc<std::sync::Mutex<Vec<&'static str>>>;

    fn slow_run(
        delivered: Delivered,
        label: &'static str,
        delay: Duration,
    ) -> impl FnOnce(RunTicket) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |ticket| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                ticket.deliver(|| delivered.lock().unwrap().push(label));
            })
        }
    }

    #[tokio::test]
    async fn replaced_run_never_delivers() {
        let slot = TaskSlot::new();
        let delivered: Delivered = Default::default();

        slot.start(slow_run(delivered.clone(), "first", Duration::from_millis(200)))
            .await;
        slot.start(slow_run(delivered.clone(), "second", Duration::from_millis(10)))
            .await;
        slot.join().await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(*delivered.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn finished_run_delivers_before_successor() {
        let slot = TaskSlot::new();
        let delivered: Delivered = Default::default();

        slot.start(slow_run(delivered.clone(), "first", Duration::ZERO)).await;
        slot.join().await;
        slot.start(slow_run(delivered.clone(), "second", Duration::ZERO)).await;
        slot.join().await;

        assert_eq!(*delivered.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn stale_ticket_filters_escaped_work() {
        let slot = TaskSlot::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        slot.start(|ticket| async move {
            let _ = tx.send(ticket);
        })
        .await;
        let ticket = rx.await.unwrap();
        assert!(ticket.is_current());

        slot.cancel().await;
        assert!(!ticket.is_current());
        assert!(!ticket.deliver(|| panic!("stale delivery")));
    }

    #[tokio::test]
    async fn generations_increase() {
        let slot = TaskSlot::new();
        let a = slot.start(|_| async {}).await;
        let b = slot.start(|_| async {}).await;
        assert!(b > a);
        assert_eq!(slot.current_generation(), b);
    }

    #[tokio::test]
    async fn downloads_cancel_by_id() {
        let session = Session::new();
        let (a, token_a) = session.register_download().await;
        let (b, token_b) = session.register_download().await;

        assert!(session.cancel_download(&a).await);
        assert!(token_a.is_cancelled());
        assert!(!token_b.is_cancelled());
        assert!(!session.cancel_download(&a).await);
        assert_eq!(session.active_downloads().await, vec![b]);

        session.shutdown().await;
        assert!(token_b.is_cancelled());
    }
}
