pub mod core;
pub mod error;
pub(crate) mod hash;
pub(crate) mod math;
