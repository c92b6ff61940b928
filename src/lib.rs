//! # Returns Core
//!
//! Returns processing for point-of-sale and ERP systems: taking back sold
//! goods, refunding them, issuing store credit and putting stock back on the
//! shelf.
//!
//! ## Features
//!
//! - **Return intake**: Validates returns against the originating sale, the return window and the receipt policy
//! - **Refund engine**: Tax-inclusive refund totals with a per-sale refund limit
//! - **Workflow**: Pending, approved, rejected, completed and cancelled returns with checked transitions
//! - **Stock restorer**: Idempotent restocking through an inventory collaborator
//! - **Store credit ledger**: Issue, look up, redeem, top up and expire store credit
//! - **Settings**: Serde/TOML backed policy settings
//! - **Storage abstraction**: Database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use returns_core::utils::{MemoryInventory, MemorySales, MemoryStorage};
//! use returns_core::ReturnsDesk;
//! use std::sync::Arc;
//!
//! let desk = ReturnsDesk::new(
//!     MemoryStorage::new(),
//!     Arc::new(MemorySales::new()),
//!     Arc::new(MemoryInventory::new()),
//! );
//! # drop(desk);
//! ```

pub mod config;
pub mod returns;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use returns::*;
pub use traits::*;
pub use types::*;
