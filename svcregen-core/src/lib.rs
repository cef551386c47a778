//! svcregen core library — service registry types, on-disk layout, errors,
//! and the Registry Store.
//!
//! - [`types`] — `ServiceName`, `ServiceEntry`, registries
//! - [`layout`] — where every file lives, rooted at a configurable prefix
//! - [`error`] — [`RegistryError`]
//! - [`store`] — load / snapshot / stage / promote / restore

pub mod error;
pub mod layout;
pub mod store;
pub mod types;

pub use error::RegistryError;
pub use layout::Layout;
pub use store::{Backup, RegistryStore};
pub use types::{BaselineRegistry, FieldValue, ServiceEntry, ServiceName, ServiceRegistry};
