pub mod quote;
pub mod signature;

pub use quote::{build_quote, parse_iso_duration, seconds_to_iso_duration};
pub use signature::sign_agreement;
