//! Low-level synchronization primitives the scheduler is built from.

mod entrylist;
mod event;
mod signals;

pub use entrylist::{Entry, EntryList};
pub use event::{NotifierBus, WaitToken};
pub use signals::{node_state, OnSignal, StateBits};
