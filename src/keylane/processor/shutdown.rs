//! Two-phase asynchronous shutdown contract
//!
//! Closing a worker takes as long as its in-flight task; an owner managing
//! many partitions cannot afford to pay that cost serially. The contract
//! splits shutdown into a non-blocking "begin" and a blocking "join": the
//! owner fans `initiate_shutdown` out across every component first, letting
//! all of them wind down concurrently, then blocks once in
//! `await_shutdown` per component. Total latency approaches the slowest
//! single close instead of the sum of all of them.

/// Components that shut down in two phases
pub trait AsyncShutdown {
    /// Begin shutting down; must not block on in-flight work
    fn initiate_shutdown(&mut self);

    /// Block until shutdown completes. Failures during teardown are logged
    /// and contained, never propagated — shutdown is best-effort.
    fn await_shutdown(&mut self);

    /// Convenience for callers without latency concerns
    fn shutdown(&mut self) {
        self.initiate_shutdown();
        self.await_shutdown();
    }
}
