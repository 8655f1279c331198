//! LendBank Events - protocol event types and JSONL journal
//!
//! Every committed protocol operation produces typed events. The in-memory
//! journal lives in `lendbank-protocol`; this crate defines the records and
//! persists them as one JSON object per line.

pub mod error;
pub mod event;
pub mod reader;
pub mod store;

pub use error::EventError;
pub use event::{EventRecord, ProtocolEvent};
pub use reader::EventReader;
pub use store::EventStore;
