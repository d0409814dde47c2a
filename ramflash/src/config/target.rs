use crate::flashing::{FlashAlgorithm, FlashError, Flasher, FlasherConfig};
use crate::{CoreHandle, CoreInterface};
use ramflash_target::{
    Architecture, Chip, ChipFamily, Core, JEP106Code, MemoryMap, MemoryMapError, MemoryRange,
    MemoryRegion, NvmRegion, RawFlashAlgorithm, TargetDescriptionSource,
};

/// This describes a complete target with a fixed chip model and variant.
#[derive(Clone)]
pub struct Target {
    /// The name of the target.
    pub name: String,
    /// The name of the family the target belongs to.
    pub family: String,
    /// The JEP106 code of the manufacturer.
    pub manufacturer: Option<JEP106Code>,
    /// The cores of the target.
    pub cores: Vec<Core>,
    /// The flash algorithms usable on this target.
    pub flash_algorithms: Vec<RawFlashAlgorithm>,
    /// The memory map of the target.
    pub memory_map: Vec<MemoryRegion>,
    /// The default binary format of the target, if any.
    pub default_binary_format: Option<String>,
    /// Source of the target description. Used for diagnostics.
    pub source: TargetDescriptionSource,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Target {{
            identifier: {:?},
            flash_algorithms: {:?},
            memory_map: {:?},
        }}",
            self.name, self.flash_algorithms, self.memory_map
        )
    }
}

impl Target {
    /// Create a new target for the given details.
    ///
    /// The chip family must have been validated.
    pub(crate) fn new(family: &ChipFamily, chip: &Chip) -> Target {
        let flash_algorithms = chip
            .flash_algorithms
            .iter()
            .filter_map(|name| family.get_algorithm(name))
            .cloned()
            .collect();

        Target {
            name: chip.name.clone(),
            family: family.name.clone(),
            manufacturer: family.manufacturer,
            cores: chip.cores.clone(),
            flash_algorithms,
            memory_map: chip.memory_map.clone(),
            default_binary_format: chip.default_binary_format.clone(),
            source: family.source.clone(),
        }
    }

    /// Get the architecture of the target
    pub fn architecture(&self) -> Architecture {
        let target_arch = self.cores[0].core_type.architecture();

        // This should be ensured when a `ChipFamily` is loaded.
        assert!(
            self.cores
                .iter()
                .map(|core| core.core_type.architecture())
                .all(|core_arch| core_arch == target_arch),
            "Not all cores of the target are of the same architecture. This is rejected when the family is validated."
        );

        target_arch
    }

    /// Returns the core with the given name.
    pub fn core_by_name(&self, name: &str) -> Option<&Core> {
        self.cores.iter().find(|core| core.name == name)
    }

    /// The memory map resolver of this target.
    pub fn memory_map(&self) -> MemoryMap<'_> {
        MemoryMap::new(&self.memory_map)
    }

    /// Returns the flash algorithm with the given name.
    pub fn flash_algorithm_by_name(&self, name: &str) -> Option<&RawFlashAlgorithm> {
        self.flash_algorithms.iter().find(|algo| algo.name == name)
    }

    /// Returns a suitable flash algorithm for the given region.
    ///
    /// The flash range of the algorithm has to lie inside the region. If more
    /// than one algorithm fits, the default one is preferred.
    pub fn flash_algorithm_for_region(&self, region: &NvmRegion) -> Option<&RawFlashAlgorithm> {
        let mut algorithms = self
            .flash_algorithms
            .iter()
            .filter(|algo| region.range.contains_range(&algo.flash_properties.address_range));

        let first = algorithms.next()?;
        if first.default {
            return Some(first);
        }

        Some(algorithms.find(|algo| algo.default).unwrap_or(first))
    }

    /// Returns the flash algorithm for the memory `core` boots from.
    pub fn default_flash_algorithm(&self, core: &str) -> Result<&RawFlashAlgorithm, FlashError> {
        let region = self.memory_map().default_boot_region(core)?;

        let Some(nvm) = region.as_nvm_region() else {
            return Err(MemoryMapError::NoBootRegion(core.to_string()).into());
        };

        let mut algorithms = self.flash_algorithms.iter().filter(|algo| {
            algo.cores.iter().any(|c| c == core)
                && nvm.range.contains_range(&algo.flash_properties.address_range)
        });

        let first = algorithms
            .next()
            .ok_or_else(|| FlashError::NoFlashAlgorithm(nvm.range.clone()))?;

        Ok(if first.default {
            first
        } else {
            algorithms.find(|algo| algo.default).unwrap_or(first)
        })
    }

    /// Assembles the default flash algorithm of `core_name` and creates a
    /// flasher for it.
    pub fn flasher<C: CoreInterface>(
        &self,
        core: CoreHandle<C>,
        core_name: &str,
        config: FlasherConfig,
    ) -> Result<Flasher<C>, FlashError> {
        let raw = self.default_flash_algorithm(core_name)?;
        let algorithm = FlashAlgorithm::assemble_for_core(raw, self, core_name)?;

        tracing::info!(
            "Using flash algorithm {} for core {core_name} of {}",
            algorithm.name,
            self.name
        );

        Ok(Flasher::new(core, algorithm, config))
    }
}
