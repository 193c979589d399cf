//! Bounded diagnostic channel and its flush loop.
//!
//! [`DiagnosticReporter::report`] never waits: when the channel is full the
//! event is dropped and counted. A single [`DiagnosticFlusher`] drains the
//! channel, suppresses repeats of the same (source, error type) within the
//! dedup window and fans events out to every sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::DiagnosticsConfig;
use super::events::DiagnosticEvent;
use super::sinks::DiagnosticSink;
use crate::Result;

pub struct DiagnosticReporter {
    tx: mpsc::Sender<DiagnosticEvent>,
    dropped: AtomicU64,
}

impl DiagnosticReporter {
    pub fn report(&self, event: DiagnosticEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(source = %event.source, dropped, "Diagnostic channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Diagnostic channel closed");
            }
        }
    }

    /// Events lost to a full or closed channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct DedupState {
    last_sent: Instant,
    suppressed: u64,
}

pub struct DiagnosticFlusher {
    rx: mpsc::Receiver<DiagnosticEvent>,
    sinks: Vec<Arc<dyn DiagnosticSink>>,
    dedup_window: Duration,
    seen: HashMap<(String, &'static str), DedupState>,
}

/// Create the reporter handle and the flusher that owns the receiving end.
pub fn diagnostic_channel(
    config: &DiagnosticsConfig,
    sinks: Vec<Arc<dyn DiagnosticSink>>,
) -> (Arc<DiagnosticReporter>, DiagnosticFlusher) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let reporter = Arc::new(DiagnosticReporter {
        tx,
        dropped: AtomicU64::new(0),
    });
    let flusher = DiagnosticFlusher {
        rx,
        sinks,
        dedup_window: config.dedup_window,
        seen: HashMap::new(),
    };
    (reporter, flusher)
}

impl DiagnosticFlusher {
    /// Drain events until cancelled or every reporter is gone. Events still
    /// queued at cancellation are flushed before returning.
    pub async fn run(mut self, cancel_token: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    while let Ok(event) = self.rx.try_recv() {
                        self.handle(event).await;
                    }
                    debug!("Diagnostic flusher stopped");
                    return Ok(());
                }
                event = self.rx.recv() => match event {
                    Some(event) => {
                        self.handle(event).await;
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// Returns true if the event was dispatched.
    async fn handle(&mut self, event: DiagnosticEvent) -> bool {
        let Some(suppressed) = self.admit(&event, Instant::now()) else {
            return false;
        };
        for sink in &self.sinks {
            if let Err(e) = sink.send(&event, suppressed).await {
                warn!(sink = sink.name(), error = %e, "Diagnostic sink failed");
            }
        }
        true
    }

    /// Dedup check. `Some(n)` admits the event, `n` being the number of
    /// repeats suppressed since the last dispatch of the same key.
    fn admit(&mut self, event: &DiagnosticEvent, now: Instant) -> Option<u64> {
        let window = self.dedup_window;
        if self.seen.len() > 1024 {
            self.seen.retain(|_, state| now.duration_since(state.last_sent) < window);
        }

        match self.seen.get_mut(&event.dedup_key()) {
            Some(state) if now.duration_since(state.last_sent) < window => {
                state.suppressed += 1;
                None
            }
            Some(state) => {
                let suppressed = std::mem::take(&mut state.suppressed);
                state.last_sent = now;
                Some(suppressed)
            }
            None => {
                self.seen.insert(
                    event.dedup_key(),
                    DedupState {
                        last_sent: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }
}
