pub mod dates;

pub use dates::{extract_dates, DateMention};
