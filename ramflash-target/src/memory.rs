use crate::serialize::{hex_range, hex_u_int};
use serde::{Deserialize, Serialize};
use std::ops::Range;

fn default_true() -> bool {
    true
}

/// Represents access permissions of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryAccess {
    /// True if the region is readable.
    #[serde(default = "default_true")]
    pub read: bool,
    /// True if the region is writable.
    #[serde(default = "default_true")]
    pub write: bool,
    /// True if the region is executable.
    #[serde(default = "default_true")]
    pub execute: bool,
    /// True if the chip boots from this memory.
    #[serde(default)]
    pub boot: bool,
}

impl Default for MemoryAccess {
    fn default() -> Self {
        MemoryAccess {
            read: true,
            write: true,
            execute: true,
            boot: false,
        }
    }
}

/// Represents a region in non-volatile memory (e.g. flash or EEPROM).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NvmRegion {
    /// A name to describe the region
    #[serde(default)]
    pub name: Option<String>,
    /// Address range of the region
    #[serde(with = "hex_range")]
    pub range: Range<u64>,
    /// List of cores that can access this region
    pub cores: Vec<String>,
    /// Access permissions for the region.
    #[serde(default)]
    pub access: Option<MemoryAccess>,
}

/// Represents a region in RAM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RamRegion {
    /// A name to describe the region
    #[serde(default)]
    pub name: Option<String>,
    /// Address range of the region
    #[serde(with = "hex_range")]
    pub range: Range<u64>,
    /// List of cores that can access this region
    pub cores: Vec<String>,
    /// Access permissions for the region.
    #[serde(default)]
    pub access: Option<MemoryAccess>,
}

/// Represents a generic region, which is neither flash nor RAM
/// (peripherals, ROM, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenericRegion {
    /// A name to describe the region
    #[serde(default)]
    pub name: Option<String>,
    /// Address range of the region
    #[serde(with = "hex_range")]
    pub range: Range<u64>,
    /// List of cores that can access this region
    pub cores: Vec<String>,
    /// Access permissions for the region.
    #[serde(default)]
    pub access: Option<MemoryAccess>,
}

/// Declares the type of a memory region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryRegion {
    /// Memory region describing RAM.
    Ram(RamRegion),
    /// Generic memory region, which is neither flash nor RAM.
    Generic(GenericRegion),
    /// Memory region describing flash, EEPROM or other non-volatile memory.
    #[serde(alias = "Flash")]
    Nvm(NvmRegion),
}

impl MemoryRegion {
    /// Returns the RAM region if this is a RAM region, otherwise None.
    pub fn as_ram_region(&self) -> Option<&RamRegion> {
        match self {
            MemoryRegion::Ram(region) => Some(region),
            _ => None,
        }
    }

    /// Returns the NVM region if this is a NVM region, otherwise None.
    pub fn as_nvm_region(&self) -> Option<&NvmRegion> {
        match self {
            MemoryRegion::Nvm(region) => Some(region),
            _ => None,
        }
    }

    /// Returns the name of the region, if one was given.
    pub fn name(&self) -> Option<&str> {
        match self {
            MemoryRegion::Ram(region) => region.name.as_deref(),
            MemoryRegion::Generic(region) => region.name.as_deref(),
            MemoryRegion::Nvm(region) => region.name.as_deref(),
        }
    }

    /// Returns the address range of the memory region.
    pub fn address_range(&self) -> Range<u64> {
        match self {
            MemoryRegion::Ram(region) => region.range.clone(),
            MemoryRegion::Generic(region) => region.range.clone(),
            MemoryRegion::Nvm(region) => region.range.clone(),
        }
    }

    /// Returns whether the memory region contains the given address.
    pub fn contains(&self, address: u64) -> bool {
        self.address_range().contains(&address)
    }

    /// Get the cores to which this memory region belongs.
    pub fn cores(&self) -> &[String] {
        match self {
            MemoryRegion::Ram(region) => &region.cores,
            MemoryRegion::Generic(region) => &region.cores,
            MemoryRegion::Nvm(region) => &region.cores,
        }
    }

    /// Returns whether the region is accessible by the given core.
    pub fn accessible_by(&self, core_name: &str) -> bool {
        self.cores().iter().any(|c| c == core_name)
    }

    /// Returns the access permissions for the region.
    pub fn access(&self) -> MemoryAccess {
        let access = match self {
            MemoryRegion::Ram(region) => region.access,
            MemoryRegion::Generic(region) => region.access,
            MemoryRegion::Nvm(region) => region.access,
        };
        access.unwrap_or_default()
    }

    /// Returns whether the chip boots from this region.
    pub fn is_boot_memory(&self) -> bool {
        self.access().boot
    }

    /// Returns `true` if the memory region is [`Ram`].
    ///
    /// [`Ram`]: MemoryRegion::Ram
    #[must_use]
    pub fn is_ram(&self) -> bool {
        matches!(self, Self::Ram(..))
    }

    /// Returns `true` if the memory region is [`Nvm`].
    ///
    /// [`Nvm`]: MemoryRegion::Nvm
    #[must_use]
    pub fn is_nvm(&self) -> bool {
        matches!(self, Self::Nvm(..))
    }
}

/// Holds information about a specific, individual flash
/// sector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SectorInfo {
    /// Base address of the flash sector
    pub base_address: u64,
    /// Size of the flash sector
    pub size: u64,
}

impl SectorInfo {
    /// Returns the address range of the sector.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size
    }
}

/// Information about a group of flash sectors, which
/// is used as part of the [`FlashProperties`] struct.
///
/// Starting at the flash address `address`, all following sectors
/// have a size of `size`. This is valid until either the end of the
/// flash, or until another `SectorDescription` changes the sector size.
///
/// [`FlashProperties`]: crate::FlashProperties
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorDescription {
    /// Size of each individual flash sector
    #[serde(with = "hex_u_int")]
    pub size: u64,
    /// Start address of the group of flash sectors, relative
    /// to the start address of the flash.
    #[serde(with = "hex_u_int")]
    pub address: u64,
}

/// Holds information about a page in flash.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Base address of the page in flash.
    pub base_address: u64,
    /// Size of the page
    pub size: u32,
}

impl PageInfo {
    /// Returns the address range of the page.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size as u64
    }
}

/// Enables the user to do range intersection testing.
pub trait MemoryRange {
    /// Returns true if `self` contains `range` fully.
    fn contains_range(&self, range: &Range<u64>) -> bool;

    /// Returns true if `self` intersects `range` partially.
    fn intersects_range(&self, range: &Range<u64>) -> bool;
}

impl MemoryRange for Range<u64> {
    fn contains_range(&self, range: &Range<u64>) -> bool {
        if range.end == 0 || range.is_empty() {
            false
        } else {
            self.contains(&range.start) && self.contains(&(range.end - 1))
        }
    }

    fn intersects_range(&self, range: &Range<u64>) -> bool {
        if range.is_empty() || self.is_empty() {
            false
        } else {
            self.start < range.end && range.start < self.end
        }
    }
}
