pub mod config;
pub mod coordinator;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod log;
pub mod store;
pub mod transactions;

pub use config::{Behaviours, CoordinatorConfig};
pub use coordinator::{Coordinator, CoordinatorEvent, ResultHandler, TaskHandler};
pub use error::{Error, Result};
pub use store::{MemoryStore, Store};
pub use transactions::{ScriptedTransactions, Transactions};
