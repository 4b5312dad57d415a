pub mod email;
pub mod line;

pub use email::EmailNotifier;
pub use line::{chunk_message, LineNotifier};
