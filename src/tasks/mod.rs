//! Waiting on asynchronous generation tasks.

pub mod poller;

pub use poller::TaskPoller;
