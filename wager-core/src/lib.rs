pub mod error;
pub mod ids;
pub mod model;
pub mod phone;
pub mod token;

pub use error::{Error, Result};
