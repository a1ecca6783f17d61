pub mod error;
pub mod stooq;

pub use self::error::{Error, Result};
