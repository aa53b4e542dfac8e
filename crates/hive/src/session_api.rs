//! Session-shaped handles of the public surface.
//!
//! [`Session`] wraps the per-client gateway behind `complete`/`dispose`;
//! [`ScheduledSession`] batches messages inside a delay window (all but
//! the newest are committed as plain user messages, the newest runs a
//! turn); [`Connection`] bridges a bidirectional connector; and
//! [`AutoDispose`] tears idle sessions down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hive_core::errors::Result;
use hive_core::{ClientId, ExecutionMode, SwarmName};
use hive_runtime::SendFn;

use crate::Hive;

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a live per-client session.
#[derive(Clone)]
pub struct Session {
    pub(crate) hive: Hive,
    pub(crate) client_id: ClientId,
    pub(crate) swarm_name: SwarmName,
}

impl Session {
    /// The session's client.
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Run one turn and return its output.
    pub async fn complete(&self, message: &str) -> Result<String> {
        self.hive
            .session_complete(&self.client_id, &self.swarm_name, message)
            .await
    }

    /// Tear the session down.
    pub async fn dispose(&self) {
        self.hive.dispose(&self.client_id).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduled session
// ─────────────────────────────────────────────────────────────────────────────

struct ScheduledInner {
    pending: Mutex<Vec<String>>,
    delay: Duration,
}

/// Session handle that batches messages within a delay window.
#[derive(Clone)]
pub struct ScheduledSession {
    session: Session,
    inner: Arc<ScheduledInner>,
}

impl ScheduledSession {
    pub(crate) fn new(session: Session, delay: Duration) -> Self {
        Self {
            session,
            inner: Arc::new(ScheduledInner {
                pending: Mutex::new(Vec::new()),
                delay,
            }),
        }
    }

    /// Submit a message. If a newer message arrives within the delay
    /// window, this one is committed as a plain user message and the call
    /// resolves with the empty string; otherwise the batch executes with
    /// this message and the turn output is returned.
    pub async fn complete(&self, message: &str) -> Result<String> {
        let sequence = {
            let mut pending = self.inner.pending.lock().await;
            pending.push(message.to_owned());
            pending.len()
        };

        tokio::time::sleep(self.inner.delay).await;

        {
            let mut pending = self.inner.pending.lock().await;
            if sequence < pending.len() {
                // Superseded within the window: record without executing.
                drop(pending);
                debug!(client_id = %self.session.client_id, "scheduled message committed without turn");
                self.session
                    .hive
                    .commit_user_message_force(message, ExecutionMode::User, &self.session.client_id)
                    .await?;
                return Ok(String::new());
            }
            pending.clear();
        }

        self.session.complete(message).await
    }

    /// Tear the underlying session down.
    pub async fn dispose(&self) {
        self.session.dispose().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// Handle returned by `make_connection`: feeds incoming messages to the
/// swarm while turn outputs flow to the connector callback.
pub struct Connection {
    pub(crate) hive: Hive,
    pub(crate) client_id: ClientId,
    pub(crate) receive:
        Box<dyn Fn(String) -> futures::future::BoxFuture<'static, Result<String>> + Send + Sync>,
}

impl Connection {
    /// Send an incoming message into the swarm; resolves with the turn
    /// output (also delivered through the connector callback).
    pub async fn send(&self, message: &str) -> Result<String> {
        (self.receive)(message.to_owned()).await
    }

    /// Tear the connection and its session down.
    pub async fn dispose(&self) {
        self.hive.dispose(&self.client_id).await;
    }
}

/// Scheduled variant of [`Connection`] with the same batching behavior as
/// [`ScheduledSession`].
pub struct ScheduledConnection {
    connection: Connection,
    inner: Arc<ScheduledInner>,
}

impl ScheduledConnection {
    pub(crate) fn new(connection: Connection, delay: Duration) -> Self {
        Self {
            connection,
            inner: Arc::new(ScheduledInner {
                pending: Mutex::new(Vec::new()),
                delay,
            }),
        }
    }

    /// Send with delay-window batching; superseded messages are committed
    /// without running a turn.
    pub async fn send(&self, message: &str) -> Result<String> {
        let sequence = {
            let mut pending = self.inner.pending.lock().await;
            pending.push(message.to_owned());
            pending.len()
        };

        tokio::time::sleep(self.inner.delay).await;

        {
            let mut pending = self.inner.pending.lock().await;
            if sequence < pending.len() {
                drop(pending);
                self.connection
                    .hive
                    .commit_user_message_force(message, ExecutionMode::User, &self.connection.client_id)
                    .await?;
                return Ok(String::new());
            }
            pending.clear();
        }

        self.connection.send(message).await
    }

    /// Tear the connection down.
    pub async fn dispose(&self) {
        self.connection.dispose().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auto-dispose
// ─────────────────────────────────────────────────────────────────────────────

/// Callback invoked after an idle session was torn down.
pub type OnDestroyFn = Arc<dyn Fn(&ClientId, &SwarmName) + Send + Sync>;

struct AutoDisposeInner {
    last_activity: parking_lot::Mutex<Instant>,
    token: CancellationToken,
}

/// Inactivity-driven session teardown.
///
/// A background watcher disposes the client once no [`AutoDispose::tick`]
/// arrived for the configured timeout.
pub struct AutoDispose {
    inner: Arc<AutoDisposeInner>,
}

impl AutoDispose {
    pub(crate) fn spawn(
        hive: Hive,
        client_id: ClientId,
        swarm_name: SwarmName,
        timeout: Duration,
        on_destroy: Option<OnDestroyFn>,
    ) -> Self {
        let inner = Arc::new(AutoDisposeInner {
            last_activity: parking_lot::Mutex::new(Instant::now()),
            token: CancellationToken::new(),
        });

        let watcher = inner.clone();
        let _task = tokio::spawn(async move {
            let poll = Duration::from_millis(250).min(timeout);
            loop {
                tokio::select! {
                    () = watcher.token.cancelled() => return,
                    () = tokio::time::sleep(poll) => {}
                }
                let idle = watcher.last_activity.lock().elapsed();
                if idle >= timeout {
                    info!(client_id = %client_id, "auto-disposing idle session");
                    hive.dispose(&client_id).await;
                    if let Some(on_destroy) = &on_destroy {
                        on_destroy(&client_id, &swarm_name);
                    }
                    return;
                }
            }
        });

        Self { inner }
    }

    /// Record activity, pushing the teardown deadline out.
    pub fn tick(&self) {
        *self.inner.last_activity.lock() = Instant::now();
    }

    /// Stop the watcher without disposing the session.
    pub fn destroy(&self) {
        self.inner.token.cancel();
    }
}

impl Drop for AutoDispose {
    fn drop(&mut self) {
        self.inner.token.cancel();
    }
}
