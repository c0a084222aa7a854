//! Control-block accounting, for diagnosing leaks and the like.
//!
//! Every thread keeps its own ledger of block activity, updated without
//! synchronization. With the `global` feature a thread's ledger is folded into
//! a process-wide ledger when the thread exits.

use std::cell::Cell;

#[cfg(feature = "global")]
use lazy_static::lazy_static;
#[cfg(feature = "global")]
use parking_lot::Mutex;

/// The two control block variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind
{
    /// Block and object allocated independently, the block points at a `Box`.
    Separate,

    /// Block with the object stored inline.
    Combined,
}

/// Activity counters for one kind of block.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tally
{
    /// Blocks allocated.
    pub allocated: usize,

    /// Owned objects destroyed.
    pub destroyed: usize,

    /// Blocks deallocated.
    pub released: usize,

    /// Bytes currently held by live blocks (not counting separately boxed
    /// objects).
    pub live_bytes: usize,
}

impl Tally
{
    fn merge(&mut self, other: &Tally)
    {
        self.allocated += other.allocated;
        self.destroyed += other.destroyed;
        self.released += other.released;
        self.live_bytes += other.live_bytes;
    }

    fn since(&self, earlier: &Tally) -> Tally
    {
        Tally {
            allocated: self.allocated.saturating_sub(earlier.allocated),
            destroyed: self.destroyed.saturating_sub(earlier.destroyed),
            released: self.released.saturating_sub(earlier.released),
            live_bytes: self.live_bytes.saturating_sub(earlier.live_bytes),
        }
    }
}

/// Snapshot of control block activity.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats
{
    pub separate: Tally,
    pub combined: Tally,
}

impl Stats
{
    /// Counters of one block kind.
    pub fn of(&self, kind: BlockKind) -> &Tally
    {
        match kind {
            BlockKind::Separate => &self.separate,
            BlockKind::Combined => &self.combined,
        }
    }

    fn of_mut(&mut self, kind: BlockKind) -> &mut Tally
    {
        match kind {
            BlockKind::Separate => &mut self.separate,
            BlockKind::Combined => &mut self.combined,
        }
    }

    /// Blocks allocated and not yet released.
    pub fn live_blocks(&self) -> usize
    {
        (self.separate.allocated + self.combined.allocated)
            .saturating_sub(self.separate.released + self.combined.released)
    }

    /// Objects constructed under a block and not yet destroyed.
    pub fn live_objects(&self) -> usize
    {
        (self.separate.allocated + self.combined.allocated)
            .saturating_sub(self.separate.destroyed + self.combined.destroyed)
    }

    /// Memory size of live blocks.
    pub fn live_bytes(&self) -> usize { self.separate.live_bytes + self.combined.live_bytes }

    /// Activity recorded after `earlier` was taken.
    pub fn since(&self, earlier: &Stats) -> Stats
    {
        Stats {
            separate: self.separate.since(&earlier.separate),
            combined: self.combined.since(&earlier.combined),
        }
    }

    fn merge(&mut self, other: &Stats)
    {
        self.separate.merge(&other.separate);
        self.combined.merge(&other.combined);
    }
}

struct LocalLedger(Cell<Stats>);

thread_local! {
    static LEDGER: LocalLedger = LocalLedger(Cell::new(Stats::default()));
}

#[cfg(feature = "global")]
lazy_static! {
    static ref GLOBAL_LEDGER: Mutex<Stats> = Mutex::new(Stats::default());
}

#[cfg(feature = "global")]
impl Drop for LocalLedger
{
    fn drop(&mut self) { GLOBAL_LEDGER.lock().merge(&self.0.get()) }
}

fn update(f: impl FnOnce(&mut Stats))
{
    // Handles dropped by other thread-local destructors may outlive the ledger.
    let _ = LEDGER.try_with(|ledger| {
        let mut stats = ledger.0.get();
        f(&mut stats);
        ledger.0.set(stats);
    });
}

pub(crate) fn record_allocated(kind: BlockKind, bytes: usize)
{
    update(|s| {
        let t = s.of_mut(kind);
        t.allocated += 1;
        t.live_bytes += bytes;
    })
}

pub(crate) fn record_destroyed(kind: BlockKind) { update(|s| s.of_mut(kind).destroyed += 1) }

pub(crate) fn record_released(kind: BlockKind, bytes: usize)
{
    update(|s| {
        let t = s.of_mut(kind);
        t.released += 1;
        t.live_bytes = t.live_bytes.saturating_sub(bytes);
    })
}

/// Block activity of the current thread.
pub fn thread_local_stats() -> Stats { LEDGER.try_with(|l| l.0.get()).unwrap_or_default() }

/// Block activity of every thread that has exited so far.
///
/// The calling thread and threads still running are not included.
#[cfg(feature = "global")]
pub fn global_stats() -> Stats { *GLOBAL_LEDGER.lock() }
