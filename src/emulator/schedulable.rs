use emulator::time::EmuTime;

/// Distinguishes the sync points of one schedulable from each other.
pub type SyncTag = u32;

/// Something the scheduler can call back at a future virtual time.
///
/// Implementors register through a `SyncClient` and keep it for as long as
/// they live. Dropping the client cancels every sync point still pending, so
/// a destroyed schedulable can never be called back.
pub trait Schedulable {
    /// Called when the sync point `(time, tag)` is reached.
    ///
    /// The entry has already been removed from the queue, so the callback
    /// may set new sync points, including for itself and for `time`.
    fn execute_until(&mut self, time: EmuTime, tag: SyncTag);

    /// Name used in diagnostics.
    fn sched_name(&self) -> &str;
}
