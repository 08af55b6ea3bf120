pub mod error;
pub mod types;
pub mod value;

pub use error::{Result, TrackingError};
pub use types::DataType;
pub use value::Value;
