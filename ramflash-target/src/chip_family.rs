use crate::serialize::hex_jep106;
use crate::{ConfigurationError, CoreAccessOptions, MemoryMap, MemoryRange};

use super::chip::Chip;
use super::flash_algorithm::RawFlashAlgorithm;
use jep106::JEP106Code;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Source of a target description.
///
/// This is used for diagnostics, when
/// an error related to a target description occurs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetDescriptionSource {
    /// The target description was loaded from an external source
    /// during runtime.
    External,
}

/// Type of a supported core.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreType {
    /// ARMv6-M: Cortex M0, M0+, M1
    Armv6m,
    /// ARMv7-M: Cortex M3
    Armv7m,
    /// ARMv7e-M: Cortex M4, M7
    Armv7em,
    /// ARMv8-M: Cortex M23, M33
    Armv8m,
    /// RISC-V
    Riscv,
    /// Xtensa
    Xtensa,
}

impl CoreType {
    /// Returns the parent architecture family of this core type.
    pub fn architecture(&self) -> Architecture {
        match self {
            CoreType::Riscv => Architecture::Riscv,
            CoreType::Xtensa => Architecture::Xtensa,
            _ => Architecture::Arm,
        }
    }
}

/// The architecture family of a specific [`CoreType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// An ARM Cortex-M core.
    Arm,
    /// A RISC-V core.
    Riscv,
    /// An Xtensa core.
    Xtensa,
}

/// This describes a chip family with all its variants.
///
/// This struct is usually read from a target description
/// file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChipFamily {
    /// This is the name of the chip family in base form.
    /// E.g. `nRF52832`.
    pub name: String,
    /// The JEP106 code of the manufacturer.
    #[serde(default, with = "hex_jep106")]
    pub manufacturer: Option<JEP106Code>,
    /// This vector holds all the variants of the family.
    pub variants: Vec<Chip>,
    /// This vector holds all available algorithms.
    #[serde(default)]
    pub flash_algorithms: Vec<RawFlashAlgorithm>,
    #[serde(skip, default = "default_source")]
    /// Source of the target description, used for diagnostics
    pub source: TargetDescriptionSource,
}

fn default_source() -> TargetDescriptionSource {
    TargetDescriptionSource::External
}

impl ChipFamily {
    /// Validates the [`ChipFamily`] such that the flashing engine can make assumptions
    /// about the correctness without validating thereafter.
    ///
    /// This method should be called right after the [`ChipFamily`] is created!
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.reject_duplicate_target_names()?;
        self.reject_duplicate_algorithms()?;
        self.ensure_algorithms_exists()?;
        self.ensure_at_least_one_core()?;
        self.reject_incorrect_core_access_options()?;
        self.validate_memory_regions()?;
        self.validate_flash_algorithms()?;

        Ok(())
    }

    /// Rejects target descriptions with duplicate target names. Only one of these targets can
    /// be selected, so having multiple is probably a mistake.
    fn reject_duplicate_target_names(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();

        for chip in &self.variants {
            if !seen.insert(&chip.name) {
                return Err(ConfigurationError::DuplicateVariant(chip.name.clone()));
            }
        }

        Ok(())
    }

    fn reject_duplicate_algorithms(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();

        for algorithm in &self.flash_algorithms {
            if !seen.insert(&algorithm.name) {
                return Err(ConfigurationError::DuplicateAlgorithm(
                    algorithm.name.clone(),
                ));
            }
        }

        Ok(())
    }

    /// Make sure the algorithms used on the variant actually exist on the family (this is basically a check for typos).
    fn ensure_algorithms_exists(&self) -> Result<(), ConfigurationError> {
        for variant in &self.variants {
            for algorithm_name in variant.flash_algorithms.iter() {
                if self.get_algorithm(algorithm_name).is_none() {
                    return Err(ConfigurationError::UnknownAlgorithm {
                        algorithm: algorithm_name.clone(),
                        variant: variant.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    fn ensure_at_least_one_core(&self) -> Result<(), ConfigurationError> {
        for variant in &self.variants {
            let Some(core) = variant.cores.first() else {
                return Err(ConfigurationError::NoCores(variant.name.clone()));
            };

            let architecture = core.core_type.architecture();
            if variant
                .cores
                .iter()
                .any(|core| core.core_type.architecture() != architecture)
            {
                return Err(ConfigurationError::MixedArchitectures(
                    variant.name.clone(),
                ));
            }
        }

        Ok(())
    }

    fn reject_incorrect_core_access_options(&self) -> Result<(), ConfigurationError> {
        for core in self.variants.iter().flat_map(|variant| &variant.cores) {
            let matches = matches!(
                (&core.core_access_options, core.core_type.architecture()),
                (CoreAccessOptions::Arm(_), crate::Architecture::Arm)
                    | (CoreAccessOptions::Riscv(_), crate::Architecture::Riscv)
                    | (CoreAccessOptions::Xtensa(_), crate::Architecture::Xtensa)
            );

            if !matches {
                return Err(ConfigurationError::CoreAccessMismatch {
                    core: core.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Ensures that the memory is assigned to a core, that all the cores exist
    /// and that no two regions of the same core overlap.
    fn validate_memory_regions(&self) -> Result<(), ConfigurationError> {
        for variant in &self.variants {
            for memory in &variant.memory_map {
                let range = memory.address_range();

                if range.is_empty() {
                    return Err(ConfigurationError::EmptyRegion(range));
                }

                if memory.cores().is_empty() {
                    return Err(ConfigurationError::RegionWithoutCore {
                        variant: variant.name.clone(),
                        region: range,
                    });
                }

                for core in memory.cores() {
                    if variant.core_by_name(core).is_none() {
                        return Err(ConfigurationError::UnknownCore {
                            region: range,
                            core: core.clone(),
                        });
                    }
                }
            }

            MemoryMap::new(&variant.memory_map).check_overlaps()?;
        }

        Ok(())
    }

    /// Checks every algorithm on its own, and against each variant using it.
    fn validate_flash_algorithms(&self) -> Result<(), ConfigurationError> {
        for algorithm in &self.flash_algorithms {
            algorithm.validate()?;
        }

        for variant in &self.variants {
            let memory_map = MemoryMap::new(&variant.memory_map);

            for algorithm in variant
                .flash_algorithms
                .iter()
                .filter_map(|name| self.get_algorithm(name))
            {
                if let Some(core) = algorithm
                    .cores
                    .iter()
                    .find(|core| variant.core_by_name(core).is_none())
                {
                    return Err(ConfigurationError::AlgorithmUnknownCore {
                        algorithm: algorithm.name.clone(),
                        core: core.clone(),
                    });
                }

                let flash_range = &algorithm.flash_properties.address_range;
                if !memory_map
                    .nvm_regions()
                    .any(|region| region.range.contains_range(flash_range))
                {
                    return Err(ConfigurationError::FlashRangeNotInNvm {
                        algorithm: algorithm.name.clone(),
                        range: flash_range.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl ChipFamily {
    /// Get the different [Chip]s which are part of this
    /// family.
    pub fn variants(&self) -> &[Chip] {
        &self.variants
    }

    /// Get all flash algorithms for this family of chips.
    pub fn algorithms(&self) -> &[RawFlashAlgorithm] {
        &self.flash_algorithms
    }

    /// Try to find a [RawFlashAlgorithm] with a given name.
    pub fn get_algorithm(&self, name: impl AsRef<str>) -> Option<&RawFlashAlgorithm> {
        let name = name.as_ref();
        self.flash_algorithms.iter().find(|elem| elem.name == name)
    }
}
