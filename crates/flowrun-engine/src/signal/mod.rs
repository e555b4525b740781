//! Status signalers.
//!
//! Two implementations of [`StatusSignaler`]: a live one backed by an
//! in-memory map that also pushes `FLOW_STATUS` messages through the hub,
//! and a durable one that keeps one JSON file per flow. They are written
//! independently and may briefly disagree.
//!
//! [`StatusSignaler`]: flowrun_core::traits::StatusSignaler

pub mod file;
pub mod live;

pub use file::FileSignaler;
pub use live::HubSignaler;
