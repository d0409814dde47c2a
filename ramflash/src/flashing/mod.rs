//! Flash programming operations.
//!
//! This module loads a flash algorithm into the RAM of a core and calls its
//! routines to erase and program the flash.
//!
//! ## Examples
//!
//! ### Programming data in a session
//!
//! A session loads the algorithm if needed, initializes it, runs the operation
//! and uninitializes it again, even if the operation failed.
//!
//! ```no_run
//! use ramflash::{config::Registry, flashing::{FlashAlgorithm, Flasher, FlasherConfig}};
//! use ramflash::{CoreHandle, CoreInterface};
//!
//! fn flash(core: impl CoreInterface) -> anyhow::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.add_target_family_from_yaml(&std::fs::read_to_string("esp32c3.yaml")?)?;
//!     let target = registry.get_target_by_name("esp32c3")?;
//!
//!     let raw = target.default_flash_algorithm("main")?;
//!     let algorithm = FlashAlgorithm::assemble(raw, &target)?;
//!
//!     let config = FlasherConfig::default();
//!     let mut flasher = Flasher::new(CoreHandle::new(core), algorithm, config);
//!     flasher.erase_range_session(0x0, 0x1000)?;
//!     flasher.program_session(0x0, &[0x1, 0x2, 0x3])?;
//!
//!     Ok(())
//! }
//! ```

mod error;
mod flash_algorithm;
mod flasher;
mod flasher_config;
mod loader;
mod progress;

pub use error::*;
pub use flash_algorithm::*;
pub use flasher::{FailureReason, FlashState, Flasher, Operation};
pub use flasher_config::FlasherConfig;
pub use loader::*;
pub use progress::*;
