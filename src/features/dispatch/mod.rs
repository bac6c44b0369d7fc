//! # Dispatch Feature
//!
//! Message delivery, per-contact locking and the dispatcher that ties them to
//! contact state and the activity log.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod delivery;
pub mod dispatcher;
pub mod locks;

pub use delivery::{Delivery, DeliveryError, HttpRelayDelivery, Sender};
pub use dispatcher::{validate_address, DispatchReceipt, Dispatcher};
pub use locks::{ContactGuard, ContactLocks};
