use super::{EntryPoints, FlashAlgorithm, FlashError};
use crate::CoreInterface;

/// A flash algorithm which was written to the RAM of a core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// Name of the loaded algorithm.
    pub name: String,
    /// Address of the first byte of the image.
    pub load_address: u64,
    /// Length of the image in bytes.
    pub length: usize,
    /// The absolute routine addresses.
    pub entry_points: EntryPoints,
    /// Start of the argument block.
    pub data_section: u64,
    /// Address of the page buffer.
    pub page_buffer: u64,
    /// Initial stack pointer.
    pub begin_stack: u64,
}

impl LoadedImage {
    fn new(algorithm: &FlashAlgorithm) -> Self {
        Self {
            name: algorithm.name.clone(),
            load_address: algorithm.load_address,
            length: algorithm.instructions.len(),
            entry_points: algorithm.entry_points,
            data_section: algorithm.data_section,
            page_buffer: algorithm.page_buffer,
            begin_stack: algorithm.begin_stack,
        }
    }
}

/// Writes flash algorithms into target RAM.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmLoader {
    verify: bool,
}

impl Default for AlgorithmLoader {
    fn default() -> Self {
        Self { verify: true }
    }
}

impl AlgorithmLoader {
    /// Creates a loader. If `verify` is set, the image is read back after writing.
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }

    /// Writes the image of `algorithm` to its load address.
    ///
    /// The core has to be halted already, the loader never halts it. Only the
    /// image itself is written, the scratch area is left untouched. Loading the
    /// same algorithm again writes the same bytes.
    pub fn load<C: CoreInterface + ?Sized>(
        &self,
        core: &mut C,
        algorithm: &FlashAlgorithm,
    ) -> Result<LoadedImage, FlashError> {
        if !core.core_halted()? {
            return Err(FlashError::InvalidState {
                expected: "a halted core",
                actual: "running".to_string(),
            });
        }

        let span = tracing::debug_span!(
            "Loading algorithm into RAM",
            address = algorithm.load_address
        )
        .entered();

        core.write(algorithm.load_address, &algorithm.instructions)?;

        drop(span);

        if self.verify {
            let data = core.read_memory(algorithm.load_address, algorithm.instructions.len())?;

            if let Some(offset) = algorithm
                .instructions
                .iter()
                .zip(data.iter())
                .position(|(original, read_back)| original != read_back)
            {
                tracing::error!(
                    "Failed to verify flash algorithm. Data mismatch at address {:#010x}",
                    algorithm.load_address + offset as u64
                );
                tracing::error!("Original instruction: {:#04x}", algorithm.instructions[offset]);
                tracing::error!("Readback instruction: {:#04x}", data[offset]);

                return Err(FlashError::AlgorithmNotLoaded);
            }

            tracing::debug!("RAM contents match flashing algo blob.");
        }

        Ok(LoadedImage::new(algorithm))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::MockCore;
    use pretty_assertions::assert_eq;
    use ramflash_target::{Architecture, FlashProperties};

    fn algorithm() -> FlashAlgorithm {
        FlashAlgorithm {
            name: "test".to_string(),
            core: "main".to_string(),
            load_address: 0x2000_0000,
            instructions: vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02],
            data_section: 0x2000_1000,
            page_buffer: 0x2000_1010,
            begin_stack: 0x2000_1510,
            flash_properties: FlashProperties::default(),
            ..Default::default()
        }
    }

    #[test]
    fn load_writes_image() {
        let mut core = MockCore::new(Architecture::Arm);
        let algo = algorithm();

        let image = AlgorithmLoader::default().load(&mut core, &algo).unwrap();

        assert_eq!(image.length, 6);
        assert_eq!(image.page_buffer, 0x2000_1010);
        assert_eq!(
            core.memory().read_vec(0x2000_0000, 6),
            algo.instructions
        );
        // The scratch area is not touched.
        assert_eq!(core.memory().written_bytes(), 6);
    }

    #[test]
    fn load_twice_is_idempotent() {
        let mut core = MockCore::new(Architecture::Arm);
        let algo = algorithm();
        let loader = AlgorithmLoader::default();

        let first = loader.load(&mut core, &algo).unwrap();
        let ram = core.memory().read_vec(0x2000_0000, 0x20);
        let second = loader.load(&mut core, &algo).unwrap();

        assert_eq!(first, second);
        assert_eq!(core.memory().read_vec(0x2000_0000, 0x20), ram);
    }

    #[test]
    fn load_refuses_running_core() {
        let mut core = MockCore::new(Architecture::Arm);
        core.set_running();

        let result = AlgorithmLoader::default().load(&mut core, &algorithm());

        assert!(matches!(result, Err(FlashError::InvalidState { .. })));
        assert_eq!(core.memory().written_bytes(), 0);
    }

    #[test]
    fn load_detects_corrupted_ram() {
        let mut core = MockCore::new(Architecture::Arm);
        core.corrupt_writes_at(0x2000_0003);

        let result = AlgorithmLoader::new(true).load(&mut core, &algorithm());

        assert!(matches!(result, Err(FlashError::AlgorithmNotLoaded)));
    }

    #[test]
    fn load_without_verification() {
        let mut core = MockCore::new(Architecture::Arm);
        core.corrupt_writes_at(0x2000_0003);

        let result = AlgorithmLoader::new(false).load(&mut core, &algorithm());

        assert!(result.is_ok());
    }
}
