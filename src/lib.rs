pub mod auction;
pub mod bidding;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod lease;
pub mod message_broker;
pub mod propagation;
pub mod query;
pub mod scheduler;
pub mod store;
