//! In-process session pairs.
//!
//! Two sessions joined by a `tokio::io::duplex` pipe: whatever one writes,
//! the other reads. Handy for tests and for wiring two components in the
//! same process without a socket.

use duowire::Format;

use crate::session::Session;
use crate::session::SessionBuilder;

/// Pipe capacity in each direction.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Two connected sessions with default settings. Loops are not started.
pub fn pair<F: Format + Default>() -> (Session<F>, Session<F>) {
    pair_with(SessionBuilder::new(F::default()), SessionBuilder::new(F::default()))
}

/// Two connected sessions built from the given builders.
pub fn pair_with<F: Format>(a: SessionBuilder<F>, b: SessionBuilder<F>) -> (Session<F>, Session<F>) {
    let (left, right) = tokio::io::duplex(PIPE_CAPACITY);
    (a.build(left), b.build(right))
}
