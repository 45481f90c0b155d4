//! Identity source for a store: who is signed in, and a task that keeps a
//! [`BookingStore`] attached to that user.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::booking::UserId;
use crate::store::{AttachState, BookingStore};

/// Source of the current signed-in user.
///
/// The receiver holds `None` while nobody is signed in and is notified on
/// every sign-in, sign-out and account switch.
pub trait IdentityProvider {
    /// Receiver of the signed-in user, current value first.
    fn identity(&self) -> watch::Receiver<Option<UserId>>;
}

/// In-process sign-in state, shared by clones.
///
/// # Examples
///
/// ```
/// use ridebook::{AuthSession, UserId};
///
/// let session = AuthSession::new();
/// assert!(session.is_initializing());
///
/// session.sign_in(UserId::from("u1"));
/// assert_eq!(session.current(), Some(UserId::from("u1")));
/// assert!(!session.is_initializing());
/// ```
#[derive(Debug, Clone)]
pub struct AuthSession {
    user: Arc<watch::Sender<Option<UserId>>>,
    /// `true` until the first sign-in or sign-out has been reported.
    initializing: Arc<AtomicBool>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    /// A session nobody has signed in to yet.
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        Self {
            user: Arc::new(user),
            initializing: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Report `user_id` as signed in. Watchers are only notified if the user
    /// actually changed.
    pub fn sign_in(&self, user_id: UserId) {
        self.initializing.store(false, Ordering::Release);
        self.user.send_if_modified(|current| {
            if current.as_ref() == Some(&user_id) {
                false
            } else {
                tracing::info!(user_id = %user_id, "signed in");
                *current = Some(user_id);
                true
            }
        });
    }

    /// Report that nobody is signed in.
    pub fn sign_out(&self) {
        self.initializing.store(false, Ordering::Release);
        self.user.send_if_modified(|current| match current.take() {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, "signed out");
                true
            }
            None => false,
        });
    }

    /// The signed-in user, if any.
    pub fn current(&self) -> Option<UserId> {
        self.user.borrow().clone()
    }

    /// `true` until the auth state has been reported at least once.
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }
}

impl IdentityProvider for AuthSession {
    fn identity(&self) -> watch::Receiver<Option<UserId>> {
        self.user.subscribe()
    }
}

/// Handle to a running [`bind_identity`] task.
///
/// The task keeps its store alive until [`shutdown`](Self::shutdown) is
/// called or the provider goes away.
#[derive(Debug, Clone)]
pub struct IdentityBinding {
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl IdentityBinding {
    /// Stop following the provider and wait for the task to exit.
    ///
    /// The store is left as it is: still attached if a user was signed in.
    /// Calling `shutdown` more than once is safe -- later calls return
    /// `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the task panicked.
    pub async fn shutdown(&self) -> io::Result<()> {
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().await.take();
        match task {
            Some(join_handle) => join_handle
                .await
                .map_err(|e| io::Error::other(format!("identity task panicked: {e}"))),
            None => Ok(()),
        }
    }
}

/// Keep `store` attached to whoever `provider` reports as signed in.
///
/// The current identity is applied immediately, then every change: a user
/// attaches the store to that user, `None` detaches it. Attach failures are
/// logged and leave the store in [`AttachState::Error`].
///
/// Must be called from within a tokio runtime.
pub fn bind_identity(store: BookingStore, provider: &dyn IdentityProvider) -> IdentityBinding {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let identity = provider.identity();
    let task = tokio::spawn(run_binding(store, identity, shutdown_rx));
    IdentityBinding {
        shutdown_tx: Arc::new(shutdown_tx),
        task: Arc::new(tokio::sync::Mutex::new(Some(task))),
    }
}

async fn run_binding(
    store: BookingStore,
    mut identity: watch::Receiver<Option<UserId>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let current = identity.borrow_and_update().clone();
        apply_identity(&store, current).await;

        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            changed = identity.changed() => {
                if changed.is_err() {
                    tracing::debug!("identity provider dropped, binding stopped");
                    break;
                }
            }
        }
    }
}

async fn apply_identity(store: &BookingStore, user: Option<UserId>) {
    match user {
        Some(user_id) => {
            let live = matches!(
                store.state(),
                AttachState::Attaching | AttachState::Attached
            );
            if live && store.user_id().as_ref() == Some(&user_id) {
                return;
            }
            if let Err(e) = store.attach(user_id.clone()).await {
                tracing::error!(user_id = %user_id, error = %e, "attach on sign-in failed");
            }
        }
        None => store.detach(),
    }
}
