//! # Completion Barrier
//!
//! Counting gate that releases once a fixed number of ingestion batches has
//! been recorded. Signals are unit messages on an unbounded channel, so
//! `signal_one` never blocks an ingestion call; the waiting side counts them
//! down.
//!
//! The number of signals consumed so far is kept inside the barrier rather
//! than on the waiter's stack. Dropping an `await_all` future (for instance
//! when it loses a `tokio::select!` against a shutdown signal) therefore does
//! not lose progress, and a later `await_all` resumes where it stopped.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

struct Countdown {
    signals: mpsc::UnboundedReceiver<()>,
    received: usize,
}

/// Releases waiters after `expected` calls to [`CompletionBarrier::signal_one`]
pub struct CompletionBarrier {
    expected: usize,
    sender: mpsc::UnboundedSender<()>,
    countdown: Mutex<Countdown>,
    signalled: AtomicUsize,
}

impl CompletionBarrier {
    pub fn new(expected: usize) -> Self {
        let (sender, signals) = mpsc::unbounded_channel();
        Self {
            expected,
            sender,
            countdown: Mutex::new(Countdown {
                signals,
                received: 0,
            }),
            signalled: AtomicUsize::new(0),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of signals sent so far
    pub fn signalled(&self) -> usize {
        self.signalled.load(Ordering::Acquire)
    }

    /// Record that one batch has been processed
    pub fn signal_one(&self) {
        let count = self.signalled.fetch_add(1, Ordering::AcqRel) + 1;
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.sender.send(());
        debug!("Completion barrier signalled {}/{}", count, self.expected);
    }

    /// Wait until `expected` signals have been observed
    ///
    /// Resolves immediately when `expected` is zero. There is no timeout; wrap
    /// the call in `tokio::time::timeout` or `tokio::select!` to bound it.
    pub async fn await_all(&self) {
        let mut countdown = self.countdown.lock().await;
        while countdown.received < self.expected {
            if countdown.signals.recv().await.is_none() {
                // Unreachable while `self.sender` is alive.
                break;
            }
            countdown.received += 1;
        }
    }
}
