pub mod model;
pub mod service;

pub use model::{
    ActiveTask, ActiveTaskStatus, KlusserProfile, KlusserProfilePatch, RegisterPayload, Role,
    UpdateUserPayload, User,
};
pub use service::*;
