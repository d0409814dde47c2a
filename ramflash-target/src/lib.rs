//! Target description schema
//!
//! Flashing a chip, called *target* in ramflash, requires some target specific
//! configuration. This includes the architecture of the cores, the memory map of
//! the chip and the flash algorithms which can be loaded into RAM to program the
//! flash memory.
//!
//! This crate contains the schema structs for the YAML target description files,
//! the validation of their invariants, and two pure lookup helpers: the
//! [`MemoryMap`] resolver and the [`SectorTable`].
#![warn(missing_docs)]

mod chip;
mod chip_family;
mod error;
mod flash_algorithm;
mod flash_properties;
mod memory;
mod memory_map;
mod sector_table;
pub(crate) mod serialize;

pub use chip::{
    ArmCoreAccessOptions, Chip, Core, CoreAccessOptions, RiscvCoreAccessOptions,
    ScanChainElement, XtensaCoreAccessOptions,
};
pub use chip_family::{Architecture, ChipFamily, CoreType, TargetDescriptionSource};
pub use error::{ConfigurationError, MemoryMapError, SectorError};
pub use flash_algorithm::RawFlashAlgorithm;
pub use flash_properties::FlashProperties;
pub use memory::{
    GenericRegion, MemoryAccess, MemoryRange, MemoryRegion, NvmRegion, PageInfo, RamRegion,
    SectorDescription, SectorInfo,
};
pub use memory_map::MemoryMap;
pub use sector_table::{SectorIter, SectorTable};

pub use jep106::JEP106Code;
