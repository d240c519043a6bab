pub mod config;
pub mod error;
pub mod db;
pub mod models;
pub mod store;
pub mod retry;
pub mod session;
pub mod dispatch;
pub mod runner;
pub mod notify;
pub mod web;

pub use dispatch::{DispatchSettings, PartitionedDispatcher, SequentialDispatcher, Shutdown, Tally};
pub use error::AppError;
pub use models::{IssueResult, OrderRecord, OrderStatus, Summary};
pub use retry::RetryPolicy;
pub use runner::{run_once, RunReport};
pub use store::OrderStore;
