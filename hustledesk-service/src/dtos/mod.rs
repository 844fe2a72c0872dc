//! Request and response bodies for the HTTP API.

pub mod billing;
pub mod catalog;
pub mod expenses;
pub mod mpesa;
pub mod orgs;
pub mod reports;
pub mod sales;
pub mod tasks;

use rust_decimal::Decimal;
use serde::Serialize;
use validator::{Validate, ValidationError, ValidationErrors};

/// Envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Derive-based validation plus checks the derive cannot express.
pub trait ValidateRequest: Validate {
    fn extra_checks(&self, _errors: &mut ValidationErrors) {}

    fn validated(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        self.extra_checks(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Record a range violation for a decimal field.
pub(crate) fn check_decimal_range(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Decimal,
    min: Decimal,
    max: Decimal,
) {
    if value < min || value > max {
        let mut error = ValidationError::new("range");
        error.message = Some(format!("{} must be between {} and {}", field, min, max).into());
        errors.add(field, error);
    }
}

pub(crate) fn add_error(errors: &mut ValidationErrors, field: &'static str, message: &str) {
    let mut error = ValidationError::new("invalid");
    error.message = Some(message.to_string().into());
    errors.add(field, error);
}
