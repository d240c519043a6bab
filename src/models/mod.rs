pub mod order;
pub mod status;
pub mod summary;

pub use order::OrderRecord;
pub use status::{IssueResult, OrderStatus};
pub use summary::Summary;
