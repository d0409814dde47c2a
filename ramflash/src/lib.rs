//! # Flash programming through RAM-resident flash algorithms
//!
//! Most microcontrollers can not program their flash through the debug port
//! directly. Instead, a small vendor supplied routine, the *flash algorithm*,
//! is copied into the RAM of the chip and called with the registers set up as
//! for a normal function call. ramflash takes care of loading the algorithm,
//! calling its routines, waiting for them to return and making sure that the
//! algorithm is always uninitialized again.
//!
//! # Examples
//!
//! ## Erasing a sector
//!
//! ```no_run
//! use ramflash::{config::Registry, flashing::FlasherConfig, CoreHandle, CoreInterface};
//!
//! fn erase(core: impl CoreInterface, yaml: &str) -> anyhow::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.add_target_family_from_yaml(yaml)?;
//!     let target = registry.get_target_by_name("esp32c3")?;
//!
//!     let mut flasher = target.flasher(CoreHandle::new(core), "main", FlasherConfig::default())?;
//!     flasher.erase_range_session(0x1000, 0x1000)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ramflash does not talk to debug probes itself. The transport is provided
//! by implementing [`CoreInterface`] for a single core of the target.

pub mod config;
#[warn(missing_docs)]
mod core;
mod error;
#[warn(missing_docs)]
pub mod flashing;


pub use crate::config::Target;
pub use crate::core::{
    CoreGuard, CoreHandle, CoreInterface, CoreRegisters, InstructionSet, RegisterDescription,
    RegisterId,
};
pub use crate::error::Error;

pub use ramflash_target::{Architecture, CoreType};
