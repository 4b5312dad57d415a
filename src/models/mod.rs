pub mod listing;
pub mod seen_item;

// Re-exports for convenience
pub use listing::*;
pub use seen_item::*;
