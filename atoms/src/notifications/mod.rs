pub mod model;
pub mod service;
pub mod sink;

pub use model::{Notification, NotificationType};
pub use service::*;
pub use sink::{NotificationSink, StoreNotificationSink};
