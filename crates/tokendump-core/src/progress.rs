//! Progress reporting for the requester. The console layer consumes events
//! through a sink; the library never prints.

use std::sync::Arc;

/// One progress update, emitted after each chunk (and during the depot key join).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Package info chunk done; `owned` distinct apps discovered so far.
    OwnedApps {
        chunk: usize,
        chunks: usize,
        owned: usize,
    },
    /// Token chunk done.
    Tokens {
        chunk: usize,
        chunks: usize,
        granted: usize,
        denied: usize,
        nonzero: usize,
    },
    /// A depot key call settled.
    DepotKeys {
        chunk: usize,
        chunks: usize,
        depots: usize,
        pending: usize,
    },
}

/// Sink for progress events.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
