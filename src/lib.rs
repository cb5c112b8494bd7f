//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature that maps onto `core-service`, so a
//! host can depend on `status-sync-workspace` alone and get the service
//! façade, the HTTP control surface and the desktop adapters.

#[cfg(feature = "desktop-shims")]
pub use core_service::{api, CoreDependencies, CoreError, CoreService};
