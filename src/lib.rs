//! Library crate for dping-rs exposing reusable modules.
pub mod catalog;
pub mod dispatch;
pub mod netif;
pub mod probe;
pub mod stats;
pub mod summary;
pub mod types;
