pub mod error;
pub mod money;
pub mod period;
pub mod record;
pub mod text;

pub use error::ValueError;
pub use money::parse_amount;
pub use period::{parse_date, DateRange};
pub use record::Record;
