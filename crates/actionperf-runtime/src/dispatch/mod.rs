//! Off-thread delivery of metric notifications.
//!
//! Re-exports the dispatcher so downstream consumers can depend on this
//! module directly.

pub mod dispatcher;

pub use dispatcher::{CompletionTicket, DispatchSnapshot, Event, NotificationDispatcher};
