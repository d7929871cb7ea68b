//! Serializable request/response facade over the library, errors flattened to strings.

pub mod forecast;
pub mod valuation;

pub use forecast::*;
pub use valuation::*;
