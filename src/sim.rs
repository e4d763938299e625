//! Discrete-event kernel: virtual time, bandwidth and the event queue.

pub mod time;
pub mod event;
pub mod queue;

pub use time::{Time, Bw, Bytes, Bits, Quanta};
pub use event::EventHandle;
pub use queue::EventQueue;
