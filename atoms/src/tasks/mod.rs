// Re-export model types and service functions
pub mod model;
pub mod service;
pub mod state;

pub use model::{CreateTaskPayload, Task, TaskDetails, UpdateTaskPayload};
pub use service::*;
pub use state::TaskStatus;
