//! Rule-based coercions for Danish invoice fields.

pub mod amounts;
pub mod dates;
pub mod patterns;
pub mod payment;
pub mod units;

pub use amounts::{parse_danish_amount, round_money};
pub use dates::{due_date_from_terms, parse_date, parse_terms_days};
pub use payment::{parse_bank_account, parse_fik};
pub use units::unit_code;
