use super::FlashError;
use crate::config::Target;
use ramflash_target::{
    ConfigurationError, FlashProperties, MemoryRange, PageInfo, RawFlashAlgorithm, SectorError,
    SectorInfo, SectorTable,
};
use std::ops::Range;

/// The absolute addresses of the routines of a flash algorithm.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    /// Address of the `Init()` entry point. Optional.
    pub init: Option<u64>,
    /// Address of the `UnInit()` entry point. Optional.
    pub uninit: Option<u64>,
    /// Address of the `ProgramPage()` entry point.
    pub program_page: u64,
    /// Address of the `EraseSector()` entry point.
    pub erase_sector: u64,
    /// Address of the `EraseAll()` entry point. Optional.
    pub erase_all: Option<u64>,
}

/// A flash algorithm, which has been assembled for a specific
/// chip and core.
///
/// To create a [FlashAlgorithm], call the [`assemble`] function.
///
/// [`assemble`]: FlashAlgorithm::assemble
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlashAlgorithm {
    /// The name of the flash algorithm.
    pub name: String,
    /// Whether this flash algorithm is the default one or not.
    pub default: bool,
    /// The core which executes the algorithm.
    pub core: String,
    /// Memory address where the flash algo instructions will be loaded to.
    pub load_address: u64,
    /// The machine code of the algorithm.
    pub instructions: Vec<u8>,
    /// The absolute routine addresses.
    pub entry_points: EntryPoints,
    /// Start of the scratch area, where the argument block is written.
    pub data_section: u64,
    /// Address of the buffer holding one page of data to program.
    pub page_buffer: u64,
    /// Initial value of the stack pointer when calling any flash algo API.
    pub begin_stack: u64,
    /// The properties of the flash on the device.
    pub flash_properties: FlashProperties,
}

impl FlashAlgorithm {
    /// Assembles `raw` for the first core it is assigned to.
    pub fn assemble(raw: &RawFlashAlgorithm, target: &Target) -> Result<Self, FlashError> {
        let core = raw
            .cores
            .first()
            .ok_or_else(|| ConfigurationError::AlgorithmWithoutCore(raw.name.clone()))?;

        Self::assemble_for_core(raw, target, core)
    }

    /// Validates `raw` and computes the absolute addresses of its routines and
    /// scratch area, for execution on `core`.
    ///
    /// The code, the scratch area and the stack must fit into a single RAM region
    /// of the executing core.
    pub fn assemble_for_core(
        raw: &RawFlashAlgorithm,
        target: &Target,
        core: &str,
    ) -> Result<Self, FlashError> {
        raw.validate()?;

        if !raw.cores.iter().any(|c| c == core) || target.core_by_name(core).is_none() {
            return Err(ConfigurationError::AlgorithmUnknownCore {
                algorithm: raw.name.clone(),
                core: core.to_string(),
            }
            .into());
        }

        let load_address = raw.load_address;
        let entry = |offset: u64| {
            load_address
                .checked_add(offset)
                .ok_or(ConfigurationError::AddressOverflow(load_address))
        };

        let entry_points = EntryPoints {
            init: raw.pc_init.map(entry).transpose()?,
            uninit: raw.pc_uninit.map(entry).transpose()?,
            program_page: entry(raw.pc_program_page)?,
            erase_sector: entry(raw.pc_erase_sector)?,
            erase_all: raw.pc_erase_all.map(entry).transpose()?,
        };

        // `validate` already checked that the scratch area does not overflow.
        let data_section = load_address + raw.data_section_offset;
        let page_buffer = data_section + RawFlashAlgorithm::ARGUMENT_BLOCK_SIZE;
        let stack_top = (page_buffer + raw.flash_properties.page_size as u64)
            .checked_add(raw.stack_size() as u64)
            .ok_or(ConfigurationError::AddressOverflow(page_buffer))?;
        let begin_stack = stack_top & !0x7;

        let ram_range = load_address..begin_stack;
        let region = target.memory_map().resolve_range(core, &ram_range);
        if !matches!(region, Ok(region) if region.is_ram()) {
            return Err(ConfigurationError::AlgorithmNotInRam {
                algorithm: raw.name.clone(),
                range: ram_range,
                core: core.to_string(),
            }
            .into());
        }

        tracing::debug!(
            "Assembled flash algorithm {} for core {core}: code at {load_address:#010x}, data at {data_section:#010x}, stack at {begin_stack:#010x}",
            raw.name
        );

        Ok(Self {
            name: raw.name.clone(),
            default: raw.default,
            core: core.to_string(),
            load_address,
            instructions: raw.instructions.clone(),
            entry_points,
            data_section,
            page_buffer,
            begin_stack,
            flash_properties: raw.flash_properties.clone(),
        })
    }

    /// The sector geometry of the flash.
    pub fn sector_table(&self) -> SectorTable<'_> {
        SectorTable::new(&self.flash_properties)
    }

    /// The flash address range the algorithm can program.
    pub fn flash_range(&self) -> Range<u64> {
        self.flash_properties.address_range.clone()
    }

    /// Returns the sector which contains `address`.
    pub fn sector_info(&self, address: u64) -> Option<SectorInfo> {
        self.sector_table().sector_at(address).ok()
    }

    /// Returns the page which contains `address`.
    pub fn page_info(&self, address: u64) -> Option<PageInfo> {
        self.sector_table().page_at(address).ok()
    }

    /// The RAM occupied by the loaded image, its scratch area and its stack.
    pub fn ram_range(&self) -> Range<u64> {
        self.load_address..self.begin_stack
    }

    /// Checks that `[address, address + length)` lies inside the flash.
    pub(crate) fn check_flash_range(&self, address: u64, length: u64) -> Result<(), FlashError> {
        let range = self.flash_range();
        let end = address.checked_add(length);

        match end {
            Some(end) if range.contains(&address) && end <= range.end => Ok(()),
            _ if !range.contains(&address) => Err(FlashError::OutOfRange { address, range }),
            _ => Err(FlashError::OutOfRange {
                address: address.saturating_add(length.saturating_sub(1)),
                range,
            }),
        }
    }

    /// Returns `true` if the whole range is part of the flash.
    pub fn contains_range(&self, range: &Range<u64>) -> bool {
        self.flash_range().contains_range(range)
    }
}

impl From<SectorError> for FlashError {
    fn from(error: SectorError) -> Self {
        match error {
            SectorError::OutOfRange { address, range } => FlashError::OutOfRange { address, range },
            SectorError::Empty => FlashError::Configuration(ConfigurationError::NoSectors(
                "sector table".to_string(),
            )),
        }
    }
}
