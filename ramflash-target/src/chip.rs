use super::memory::MemoryRegion;
use crate::CoreType;
use serde::{Deserialize, Serialize};

/// A single chip variant.
///
/// This describes an exact chip variant, including the cores, flash and memory size. For example,
/// the `nRF52832` chip has two variants, `nRF52832_xxAA` and `nRF52832_xxBB`. For this case,
/// the struct will correspond to one of the variants, e.g. `nRF52832_xxAA`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Chip {
    /// This is the name of the chip in base form.
    /// E.g. `nRF52832`.
    pub name: String,
    /// The JTAG scan chain of the chip, in the order the taps are connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_chain: Option<Vec<ScanChainElement>>,
    /// The default binary format used when flashing this chip, e.g. `idf` or `elf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_binary_format: Option<String>,
    /// The cores available on the chip.
    pub cores: Vec<Core>,
    /// The memory regions available on the chip.
    pub memory_map: Vec<MemoryRegion>,
    /// Names of all flash algorithms available for this chip.
    ///
    /// This can be used to look up the flash algorithm in the
    /// [`ChipFamily::flash_algorithms`] field.
    ///
    /// [`ChipFamily::flash_algorithms`]: crate::ChipFamily::flash_algorithms
    #[serde(default)]
    pub flash_algorithms: Vec<String>,
}

impl Chip {
    /// Returns the core with the given name.
    pub fn core_by_name(&self, name: &str) -> Option<&Core> {
        self.cores.iter().find(|core| core.name == name)
    }
}

/// An individual core inside a chip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Core {
    /// The core name.
    pub name: String,

    /// The core type.
    /// E.g. `M0` or `M4`.
    #[serde(rename = "type")]
    pub core_type: CoreType,

    /// The architecture specific options to access the core.
    pub core_access_options: CoreAccessOptions,
}

/// The data required to access a core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreAccessOptions {
    /// Arm specific options
    Arm(ArmCoreAccessOptions),
    /// Riscv specific options
    Riscv(RiscvCoreAccessOptions),
    /// Xtensa specific options
    Xtensa(XtensaCoreAccessOptions),
}

/// The data required to access an ARM core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArmCoreAccessOptions {
    /// The access port number to access the core
    #[serde(default)]
    pub ap: u8,
    /// The port select number to access the core
    #[serde(default)]
    pub psel: u32,
}

/// The data required to access a Risc-V core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RiscvCoreAccessOptions {
    /// The hart id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hart_id: Option<u32>,
}

/// The data required to access an Xtensa core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct XtensaCoreAccessOptions {}

/// A single tap of a JTAG scan chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanChainElement {
    /// Unique name of the tap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Length of the instruction register in bits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ir_len: Option<u8>,
}

impl ScanChainElement {
    /// Returns the instruction register length, defaulting to 4 bits.
    pub fn ir_len(&self) -> u8 {
        self.ir_len.unwrap_or(4)
    }
}
