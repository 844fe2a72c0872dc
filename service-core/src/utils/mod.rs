pub mod pagination;
pub mod signature;

pub use pagination::Pagination;
pub use signature::{constant_time_eq, hmac_sha256_hex};
