//! Asynchronous "send study to remote modality" queue.

pub mod api;
pub mod dispatcher;
pub mod reconcile;

pub use api::routes;
pub use dispatcher::{Clock, QueueDispatcher, SystemClock, TickReport};
pub use reconcile::{transition_for, PollOutcome, Transition};
