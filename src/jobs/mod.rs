//! Provisional records and result recording.

mod recorder;
mod store;

pub use recorder::ResultRecorder;
pub use store::{MemoryStore, NewRecord, ProvisionalRecord, ProvisionalStore, RecordStatus};
