//! Async bridge for synchronous backend code
//!
//! The STT model backends run synchronously on blocking worker threads, but
//! the streaming cloud transcription client only exposes an async API. The
//! bridge owns a long-lived current-thread runtime on a dedicated OS thread
//! and lets synchronous callers submit a future and block on its result
//! with a timeout.
//!
//! One bridge is created at engine initialization and shared process-wide.

use std::future::Future;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use babelroom_core::{Error, Result};

pub struct AsyncBridge {
    handle: tokio::runtime::Handle,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AsyncBridge {
    /// Spawn the bridge runtime on its own OS thread.
    pub fn new() -> std::io::Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("async-bridge".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                // Park the runtime until shutdown; spawned tasks keep running
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| std::io::Error::other("bridge thread exited before handing a runtime"))?
            .map_err(|e| std::io::Error::other(format!("bridge runtime build failed: {e}")))?;

        tracing::debug!(target: "pipeline", "async bridge runtime started");

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Run a future on the bridge runtime, blocking the calling thread.
    ///
    /// Must be called from a blocking context (never from an async task).
    /// Returns `Error::Timeout` if the future does not complete in time.
    pub fn run<F>(&self, future: F, timeout: Duration) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.handle.spawn(async move {
            let outcome = tokio::time::timeout(timeout, future).await;
            let _ = tx.send(outcome);
        });

        // Small grace on top of the in-runtime timeout so the inner error
        // wins the race when both fire
        match rx.recv_timeout(timeout + Duration::from_millis(250)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::Timeout(timeout)),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_returns_value() {
        let bridge = AsyncBridge::new().unwrap();
        let value = bridge
            .run(async { 21 * 2 }, Duration::from_secs(1))
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_times_out() {
        let bridge = AsyncBridge::new().unwrap();
        let result = bridge.run(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                1
            },
            Duration::from_millis(20),
        );
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_sequential_submissions() {
        let bridge = AsyncBridge::new().unwrap();
        for i in 0..5 {
            let value = bridge
                .run(async move { i * 2 }, Duration::from_secs(1))
                .unwrap();
            assert_eq!(value, i * 2);
        }
    }
}
