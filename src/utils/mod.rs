//! Utility modules

pub mod memory_services;
pub mod memory_storage;
pub mod validation;

pub use memory_services::*;
pub use memory_storage::*;
pub use validation::*;
