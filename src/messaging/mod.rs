//! Streaming events between the pipeline and the host UI.
//!
//! The pipeline publishes accumulated partial responses, tool-wait progress,
//! and a terminal sentinel over a broadcast bus; the popup (or any other
//! listener) subscribes and re-renders on each event.

mod bus;
mod types;

pub use bus::{BusError, StreamBus, StreamReceiver, StreamSender};
pub use types::StreamEvent;
