//! Returns module containing intake, refunds, restocking and store credit

pub mod core;
pub mod credit;
pub mod intake;
pub mod reason;
pub mod refund;
pub mod restock;

pub use self::core::*;
pub use credit::*;
pub use intake::*;
pub use reason::*;
pub use refund::*;
pub use restock::*;
