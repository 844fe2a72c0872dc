pub mod dates;
pub mod money;
pub mod phone;

pub use dates::{eat, mpesa_timestamp, previous_period, today_eat, today_range_eat};
pub use money::{
    calculate_total, cents_from_shillings, format_for_mpesa, is_valid_mpesa_amount, line_total,
    pro_rated_line_tax, Totals, MPESA_MAX_AMOUNT_CENTS, MPESA_MIN_AMOUNT_CENTS,
};
pub use phone::{normalize_msisdn, KENYAN_MSISDN};
