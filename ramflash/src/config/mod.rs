//! Target descriptions known to the flasher.
//!
//! The [`Registry`] holds the chip families loaded from YAML descriptions, and
//! resolves a variant name to a [`Target`].

mod registry;
mod target;

pub use registry::{Registry, RegistryError};
pub use target::Target;
