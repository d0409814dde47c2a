use super::flash_properties::FlashProperties;
use crate::serialize::{hex_option, hex_u_int};
use crate::{ConfigurationError, MemoryRange, SectorTable};

use base64::{engine::general_purpose as base64_engine, Engine as _};
use serde::{Deserialize, Serialize};

/// The raw flash algorithm is the description of a flash algorithm,
/// and is usually read from a target description file.
///
/// All entry points are offsets relative to [`load_address`](Self::load_address).
/// Before it can be used for flashing, it has to be assembled for a specific
/// target, which turns the offsets into absolute addresses.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFlashAlgorithm {
    /// The name of the flash algorithm.
    pub name: String,
    /// The description of the algorithm.
    #[serde(default)]
    pub description: String,
    /// Whether this flash algorithm is the default one or not.
    #[serde(default)]
    pub default: bool,
    /// The machine code and data of the algorithm, base64 encoded in the description file.
    #[serde(deserialize_with = "deserialize")]
    #[serde(serialize_with = "serialize")]
    pub instructions: Vec<u8>,
    /// Address in target RAM where the image is placed.
    #[serde(with = "hex_u_int")]
    pub load_address: u64,
    /// Offset of the data section, used to pass arguments and page data.
    #[serde(with = "hex_u_int")]
    pub data_section_offset: u64,
    /// Offset of the `Init()` entry point. Optional.
    #[serde(default, with = "hex_option")]
    pub pc_init: Option<u64>,
    /// Offset of the `UnInit()` entry point. Optional.
    #[serde(default, with = "hex_option")]
    pub pc_uninit: Option<u64>,
    /// Offset of the `ProgramPage()` entry point.
    #[serde(with = "hex_u_int")]
    pub pc_program_page: u64,
    /// Offset of the `EraseSector()` entry point.
    #[serde(with = "hex_u_int")]
    pub pc_erase_sector: u64,
    /// Offset of the `EraseAll()` entry point. Optional.
    #[serde(default, with = "hex_option")]
    pub pc_erase_all: Option<u64>,
    /// Stack size the algorithm needs, in bytes. Defaults to
    /// [`RawFlashAlgorithm::DEFAULT_STACK_SIZE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<u32>,
    /// The properties of the flash on the device.
    pub flash_properties: FlashProperties,
    /// List of cores that can execute this algorithm.
    #[serde(default)]
    pub cores: Vec<String>,
}

impl RawFlashAlgorithm {
    /// Number of bytes at the start of the data section used for argument words.
    pub const ARGUMENT_BLOCK_SIZE: u64 = 16;

    /// Stack size used when the description does not specify one.
    pub const DEFAULT_STACK_SIZE: u32 = 512;

    /// Size of the scratch area at the data section: the argument block plus one page buffer.
    pub fn scratch_size(&self) -> u64 {
        Self::ARGUMENT_BLOCK_SIZE + self.flash_properties.page_size as u64
    }

    /// The stack size, falling back to the default.
    pub fn stack_size(&self) -> u32 {
        self.stack_size.unwrap_or(Self::DEFAULT_STACK_SIZE)
    }

    /// Returns all present entry points as `(name, offset)` pairs.
    pub fn entry_points(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        [
            ("init", self.pc_init),
            ("uninit", self.pc_uninit),
            ("program_page", Some(self.pc_program_page)),
            ("erase_sector", Some(self.pc_erase_sector)),
            ("erase_all", self.pc_erase_all),
        ]
        .into_iter()
        .filter_map(|(name, offset)| offset.map(|offset| (name, offset)))
    }

    /// Checks the invariants which can be verified without knowing the chip the algorithm runs on.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        SectorTable::new(&self.flash_properties).validate(&self.name)?;

        let length = self.instructions.len();
        for (entry, offset) in self.entry_points() {
            // Routines return to the load address, a breakpoint there halts the core.
            if offset == 0 {
                return Err(ConfigurationError::EntryAtLoadAddress {
                    algorithm: self.name.clone(),
                    entry,
                });
            }

            if offset >= length as u64 {
                return Err(ConfigurationError::EntryOutsideImage {
                    algorithm: self.name.clone(),
                    entry,
                    offset,
                    length,
                });
            }
        }

        let data_start = self
            .load_address
            .checked_add(self.data_section_offset)
            .ok_or(ConfigurationError::AddressOverflow(self.load_address))?;
        let data_end = data_start
            .checked_add(self.scratch_size())
            .ok_or(ConfigurationError::AddressOverflow(data_start))?;
        let code = self.load_address..self.load_address + length as u64;
        if code.intersects_range(&(data_start..data_end)) {
            return Err(ConfigurationError::DataSectionOverlapsImage(
                self.name.clone(),
            ));
        }

        if self.cores.is_empty() {
            return Err(ConfigurationError::AlgorithmWithoutCore(self.name.clone()));
        }

        Ok(())
    }
}

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&base64_engine::STANDARD.encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Base64Visitor;

    impl serde::de::Visitor<'_> for Base64Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "base64 ASCII text")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            // Long images are usually wrapped over several lines.
            let compact: String = v.chars().filter(|c| !c.is_whitespace()).collect();
            base64_engine::STANDARD
                .decode(compact)
                .map_err(serde::de::Error::custom)
        }
    }

    deserializer.deserialize_str(Base64Visitor)
}
