//! Single-slot asynchronous notifier.
//!
//! A [`Signal`] carries values from a publisher to whoever is currently
//! waiting. `send` wakes every waiter registered at that moment with a clone
//! of the value; `wait` suspends until the *next* send. Values are never
//! buffered — a send with no waiters is dropped (the count tells the caller).
//!
//! This is the coordination primitive of the turn engine: the dispatcher
//! races the five terminal signals instead of awaiting a tool body, and the
//! swarm races `output` against `cancelOutput`.
//!
//! [`Signal::listen`] registers synchronously and buffers one value, which
//! lets "start the turn, then await its output" sequences subscribe before
//! the publish without racing it.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A single-slot async notifier. Cheap to share behind an `Arc`.
pub struct Signal<T> {
    waiters: Mutex<Vec<oneshot::Sender<T>>>,
}

impl<T: Clone + Send> Signal<T> {
    /// Create a signal with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Publish a value to every current waiter.
    ///
    /// Returns the number of waiters actually woken. Waiters whose futures
    /// were dropped are skipped.
    pub fn send(&self, value: T) -> usize {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        let mut woken = 0;
        for tx in waiters {
            if tx.send(value.clone()).is_ok() {
                woken += 1;
            }
        }
        woken
    }

    /// Register a listener *now* and return a future for the next value.
    ///
    /// Registration is synchronous, so a publish that happens between
    /// `listen()` and awaiting the returned [`SignalListener`] is buffered,
    /// not lost. Use this when the publish may race the await.
    #[must_use]
    pub fn listen(&self) -> SignalListener<T> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(tx);
        SignalListener { rx }
    }

    /// Suspend until the next published value.
    pub async fn wait(&self) -> T {
        self.listen().await
    }

    /// Number of registered waiters.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl<T: Clone + Send> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered wait on a [`Signal`], created by [`Signal::listen`].
pub struct SignalListener<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> std::future::Future for SignalListener<T> {
    type Output = T;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match std::pin::Pin::new(&mut self.rx).poll(cx) {
            std::task::Poll::Ready(Ok(value)) => std::task::Poll::Ready(value),
            // Sender dropped: the Signal itself went away while we waited.
            // Stay pending so select! arms remain well-formed.
            std::task::Poll::Ready(Err(_)) => std::task::Poll::Pending,
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn send_wakes_waiter() {
        let signal = Arc::new(Signal::<String>::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        // Let the waiter register before sending.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(signal.send("hello".into()), 1);
        assert_eq!(waiter.await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_without_waiters_is_dropped() {
        let signal = Signal::<u32>::new();
        assert_eq!(signal.send(1), 0);
    }

    #[tokio::test]
    async fn send_wakes_all_current_waiters() {
        let signal = Arc::new(Signal::<u32>::new());
        let mut handles = Vec::new();
        for _ in 0..3 {
            let signal = signal.clone();
            handles.push(tokio::spawn(async move { signal.wait().await }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(signal.send(7), 3);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn waiter_only_sees_next_value() {
        let signal = Arc::new(Signal::<u32>::new());
        let _ = signal.send(1);

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = signal.send(2);
        assert_eq!(waiter.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn dropped_waiter_is_skipped() {
        let signal = Arc::new(Signal::<u32>::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();
        let _ = waiter.await;
        assert_eq!(signal.send(1), 0);
    }

    #[tokio::test]
    async fn waiter_count() {
        let signal = Arc::new(Signal::<u32>::new());
        assert_eq!(signal.waiter_count(), 0);
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(signal.waiter_count(), 1);
        let _ = signal.send(0);
        assert_eq!(signal.waiter_count(), 0);
        let _ = waiter.await;
    }

    #[tokio::test]
    async fn listen_buffers_publish_before_await() {
        let signal = Signal::<String>::new();
        let listener = signal.listen();
        assert_eq!(signal.send("early".into()), 1);
        // The value was published before the await; it must not be lost.
        assert_eq!(listener.await, "early");
    }

    #[tokio::test]
    async fn select_races_two_signals() {
        let a = Arc::new(Signal::<String>::new());
        let b = Arc::new(Signal::<String>::new());

        let racer = {
            let a = a.clone();
            let b = b.clone();
            tokio::spawn(async move {
                tokio::select! {
                    v = a.wait() => format!("a:{v}"),
                    v = b.wait() => format!("b:{v}"),
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = b.send("win".into());
        assert_eq!(racer.await.unwrap(), "b:win");
    }
}
