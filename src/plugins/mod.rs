pub mod manager;
pub mod notifiers;
pub mod traits;

pub use manager::{DispatchOutcome, NotifierManager};
pub use notifiers::{EmailNotifier, LineNotifier};
pub use traits::{NotificationResult, Notifier};
