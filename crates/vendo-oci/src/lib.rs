//! OCI sources for vendo
//!
//! Pulls container images (layers extracted in order, whiteouts applied)
//! and bundles: images flagged with the `dev.carvel.imgpkg.bundle` config
//! label whose `.imgpkg/images.yml` may reference further bundles.
//!
//! Registry access goes through the [`Registry`] trait so fetchers can run
//! against [`HttpRegistry`] or the in-memory [`MemoryRegistry`].

pub mod bundle;
pub mod error;
pub mod image;
pub mod layer;
pub mod manifest;
pub mod memory;
pub mod reference;
pub mod registry;

pub use bundle::{BundleFetch, BundleOutcome, NestedBundle};
pub use error::{Error, Result};
pub use image::{ImageFetch, ImageOutcome};
pub use memory::MemoryRegistry;
pub use reference::ImageRef;
pub use registry::{HttpRegistry, Registry, RegistryCredentials, RegistryOptions};
