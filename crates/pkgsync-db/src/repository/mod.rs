pub mod dependency;
pub mod package;
pub mod registry;
pub mod version;

pub use dependency::DependencyRepository;
pub use package::{PackageRepository, PackageUpsert};
pub use registry::RegistryRepository;
pub use version::{VersionRepository, INSERT_BATCH_SIZE};
