//! Delivery of terminal job states to waiting consumers

pub mod hub;
pub mod poller;

pub use hub::{NotificationHub, Subscription};
pub use poller::{HttpStatusSource, PollConfig, PollError, Poller, StatusSource, StoreStatusSource};
