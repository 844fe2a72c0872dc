pub mod database;
pub mod jwt;
pub mod metrics;
pub mod mpesa;
pub mod pricing;
pub mod stripe;

pub use database::Database;
pub use jwt::{Claims, TokenVerifier};
pub use metrics::{get_metrics, init_metrics};
pub use mpesa::MpesaClient;
pub use stripe::StripeClient;
