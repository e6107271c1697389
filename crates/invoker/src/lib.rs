//! Container lifecycle management on top of a container engine.

pub mod docker;
pub mod lifecycle;
pub mod manager;
pub mod opts;
pub mod registry;

pub use docker::*;
pub use lifecycle::*;
pub use manager::*;
pub use opts::*;
pub use registry::*;
