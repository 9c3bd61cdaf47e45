//! Ecosystem adapters for pkgsync.
//!
//! Each upstream ecosystem is wrapped by an [`EcosystemAdapter`] that turns its
//! native index and package documents into canonical records. Adapters are
//! built through [`create_adapter`] from a [`RegistryHandle`].

pub mod adapter;
pub mod bower;
pub mod docker;
pub mod ecosystem;
pub mod error;
pub mod http;

#[cfg(test)]
mod test_utils;

pub use adapter::{
    create_adapter, DependencyMetadata, EcosystemAdapter, PackageMetadata, RegistryHandle,
    VersionMetadata,
};
pub use ecosystem::Ecosystem;
pub use error::{RegistryError, Result};
