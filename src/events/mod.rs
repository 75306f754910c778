//! Event intake, priority queue, and bounded dispatcher

pub mod dispatcher;
pub mod queue;
pub mod source;

pub use dispatcher::{DispatcherStats, EventDispatcher};
pub use queue::PriorityEventQueue;
pub use source::{EventSource, FileReplaySource, PollingPlaceholderSource};
