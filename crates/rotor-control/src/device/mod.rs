//! rotctld Device Client
//!
//! Line protocol codec, the record shared between the control tick and the
//! device task, and the task itself.

pub mod client;
pub mod protocol;
pub mod shared;

pub use client::{ClientTiming, DeviceClient};
pub use protocol::Command;
pub use shared::DeviceRecord;
