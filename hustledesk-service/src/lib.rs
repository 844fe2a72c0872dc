//! HustleDesk: point of sale, invoicing and expenses for small businesses,
//! with M-Pesa collections and Stripe-billed plans.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

pub use startup::{AppState, Application};
