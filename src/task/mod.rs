#![forbid(unsafe_code)]

pub mod ids;
pub mod model;
pub mod query;
pub mod set;
pub mod sort;
pub mod status;
pub mod storage;
pub mod store;

pub use model::{Priority, Task};
pub use query::Query;
pub use set::TaskSet;
pub use status::Status;
pub use store::{MemoryStore, TaskStore};
