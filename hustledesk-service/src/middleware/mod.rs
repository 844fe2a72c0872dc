pub mod auth;
pub mod membership;

pub use auth::AuthUser;
pub use membership::{require_manager, require_member, require_outlet_access, require_role};
