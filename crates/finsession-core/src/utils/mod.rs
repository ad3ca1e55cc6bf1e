pub mod format;

pub use format::{format_countdown, format_currency, format_date, truncate};
