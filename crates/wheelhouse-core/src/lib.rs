//! Core data types for wheelhouse.
//!
//! Python packaging vocabulary (PEP 440 versions, PEP 503 names, PEP 508
//! requirements and markers, wheel tags) plus the closure configuration and
//! the frozen requirement file.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod candidate;
pub mod config;
pub mod frozen;
pub mod marker;
pub mod name;
pub mod requirement;
pub mod specifier;
pub mod target;
pub mod version;

pub use candidate::{Compatibility, DistributionFile, FileLocation, PackageCandidate, WheelTags};
pub use name::PackageName;
pub use requirement::Requirement;
pub use specifier::Constraint;
pub use target::{Platform, PythonVersion, Target};
pub use version::Version;
