pub mod diff;
pub mod digest;
pub mod identity;

pub use diff::{diff_records, ChangeKind, DetectedChange, DiffEngine, RunDiffResult};
pub use digest::{format_notification_line, Digest};
pub use identity::{
    canonicalize_link, extract_product_id, normalize_price, normalize_text, IdentityResolver,
    NoProductId, ProductIdStrategy, RegexProductId,
};
