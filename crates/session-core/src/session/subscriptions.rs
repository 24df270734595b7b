//! Per-session subscription set
//!
//! Every background activity a session starts (timers, latch streams,
//! STUN waiters, remote hang-up listeners, transcoder supervision) and every
//! handler it registers on a media path is tracked here, so teardown can
//! stop all of them exactly once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::media::{HandlerId, MediaPath, MessageHandler};

type Disposer = Box<dyn FnOnce() + Send>;

/// Owned collection of disposers sharing one cancellation signal
pub struct Subscriptions {
    label: String,
    cancel_token: CancellationToken,
    disposers: Mutex<Vec<Disposer>>,
    disposed: AtomicBool,
    active_count: Arc<AtomicUsize>,
}

impl Subscriptions {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cancel_token: CancellationToken::new(),
            disposers: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Token cancelled by [`dispose_all`](Self::dispose_all) and by nothing else
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Token that can be cancelled on its own and is also cancelled at disposal
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Number of spawned activities still running
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Register a disposer. After disposal it runs immediately.
    pub fn add(&self, disposer: impl FnOnce() + Send + 'static) {
        {
            let mut disposers = self.disposers.lock();
            if !self.is_disposed() {
                disposers.push(Box::new(disposer));
                return;
            }
        }
        disposer();
    }

    /// Register `handler` on `path`, removed again at disposal
    pub fn add_message_handler(&self, path: &Arc<dyn MediaPath>, handler: MessageHandler) -> HandlerId {
        let id = path.add_message_handler(handler);
        let path = path.clone();
        self.add(move || path.remove_message_handler(id));
        id
    }

    /// Run `future` until it completes or the set is disposed
    pub fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_until(self.token(), name, future, |_| async {});
    }

    /// Run `future`; if it completes before disposal, run `then` with its output.
    ///
    /// `then` runs outside the cancellation race, so it may itself dispose the
    /// set without cutting itself short.
    pub fn spawn_then<F, T, G, Fut>(&self, name: &str, future: F, then: G)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        G: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_until(self.token(), name, future, then);
    }

    /// Like [`spawn_then`](Self::spawn_then) but raced against `token`,
    /// normally one obtained from [`child_token`](Self::child_token)
    pub fn spawn_until<F, T, G, Fut>(&self, token: CancellationToken, name: &str, future: F, then: G)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        G: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_disposed() {
            debug!("{}: not starting {} after disposal", self.label, name);
            return;
        }

        let label = self.label.clone();
        let task_name = name.to_string();
        let active_count = self.active_count.clone();
        active_count.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            trace!("{}: task started: {}", label, task_name);

            let output = tokio::select! {
                output = future => Some(output),
                _ = token.cancelled() => None,
            };

            match output {
                Some(output) => {
                    trace!("{}: task completed: {}", label, task_name);
                    then(output).await;
                }
                None => trace!("{}: task cancelled: {}", label, task_name),
            }

            active_count.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Cancel every activity and run every disposer. Only the first call has effect.
    pub fn dispose_all(&self) {
        let disposers = {
            let mut disposers = self.disposers.lock();
            if self.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *disposers)
        };

        self.cancel_token.cancel();
        debug!("{}: disposing {} subscriptions", self.label, disposers.len());
        for disposer in disposers {
            disposer();
        }
    }
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("label", &self.label)
            .field("disposed", &self.is_disposed())
            .field("active", &self.active_count())
            .finish()
    }
}
