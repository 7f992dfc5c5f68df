//! Collective-communication glue for the distributed builder.
//!
//! MPI runtime bootstrapping is out of scope; the builder is generic over
//! the [`Communicator`] trait and ships [`SelfComm`], the trivial one-rank
//! communicator, under which every collective degenerates to a local
//! operation. Single-process and distributed builds share the same entry
//! points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SpatialIndexError;

/// A byte-oriented collective communication context.
///
/// The builder owns the communicator for the duration of a collective call;
/// split communicators are released on return.
pub trait Communicator: Sized {
    /// This process' rank, `0 <= rank < size`.
    fn rank(&self) -> usize;

    /// Number of ranks in the communicator.
    fn size(&self) -> usize;

    /// Gathers every rank's buffer at `root`. Returns `Some` with one
    /// buffer per rank (rank order) at the root, `None` elsewhere.
    fn gather(&self, data: Vec<u8>, root: usize) -> crate::Result<Option<Vec<Vec<u8>>>>;

    /// Broadcasts the root's buffer to every rank.
    fn broadcast(&self, data: Vec<u8>, root: usize) -> crate::Result<Vec<u8>>;

    /// Sends buffer `r` of `send` to rank `r`; returns the buffers received
    /// from every rank, in rank order.
    fn all_to_all(&self, send: Vec<Vec<u8>>) -> crate::Result<Vec<Vec<u8>>>;

    /// Splits the communicator: ranks sharing `color` end up in the same
    /// sub-communicator, ordered by `key`.
    fn split(&self, color: usize, key: usize) -> crate::Result<Self>;
}

/// The one-rank communicator for single-process builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn gather(&self, data: Vec<u8>, root: usize) -> crate::Result<Option<Vec<Vec<u8>>>> {
        debug_assert_eq!(root, 0);
        Ok(Some(vec![data]))
    }

    fn broadcast(&self, data: Vec<u8>, root: usize) -> crate::Result<Vec<u8>> {
        debug_assert_eq!(root, 0);
        Ok(data)
    }

    fn all_to_all(&self, send: Vec<Vec<u8>>) -> crate::Result<Vec<Vec<u8>>> {
        debug_assert_eq!(send.len(), 1);
        Ok(send)
    }

    fn split(&self, _color: usize, _key: usize) -> crate::Result<SelfComm> {
        Ok(SelfComm)
    }
}

/// A shared cancellation flag supplied by the host process.
///
/// Long query loops check the token between subtree traversals; in-flight
/// work finishes its current traversal and unwinds with
/// [`SpatialIndexError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation; visible to every clone of the token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fails with `Cancelled` if cancellation was requested.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(SpatialIndexError::Cancelled)
        } else {
            Ok(())
        }
    }
}
