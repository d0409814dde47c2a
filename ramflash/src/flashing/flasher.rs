use super::{
    AlgorithmLoader, FlashAlgorithm, FlashError, FlashProgress, FlasherConfig, LoadedImage,
};
use crate::core::ResidentImage;
use crate::{CoreHandle, CoreInterface};
use ramflash_target::SectorInfo;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use tracing::Level;

/// The operation a flash algorithm is initialized for.
///
/// The numeric code is passed to the `Init()` and `UnInit()` routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Erase sectors or the whole chip.
    Erase,
    /// Program pages.
    Program,
}

impl Operation {
    /// The code the algorithm expects for this operation.
    pub fn code(self) -> u32 {
        match self {
            Operation::Erase => 1,
            Operation::Program => 2,
        }
    }
}

/// Why a flasher ended up in [`FlashState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, docsplay::Display)]
pub enum FailureReason {
    /// a routine timed out
    Timeout,
    /// a routine returned an error code
    AlgorithmFailure,
    /// the debug transport failed
    Transport,
    /// the algorithm image in RAM is not intact
    ImageLost,
    /// the flash contents differ from the source
    VerifyFailed,
    /// the operation was rejected
    Other,
}

impl From<&FlashError> for FailureReason {
    fn from(error: &FlashError) -> Self {
        if error.is_timeout() {
            return FailureReason::Timeout;
        }

        match error.root_cause() {
            FlashError::AlgorithmFailure { .. } => FailureReason::AlgorithmFailure,
            FlashError::Transport(_) => FailureReason::Transport,
            FlashError::AlgorithmNotLoaded => FailureReason::ImageLost,
            FlashError::VerifyFailed { .. } => FailureReason::VerifyFailed,
            _ => FailureReason::Other,
        }
    }
}

/// The lifecycle of a [`Flasher`].
///
/// A session goes `Idle → Loaded → Initialized → Erasing | Programming →
/// Uninitialized → Idle`. Any timeout or failing routine moves the flasher to
/// `Failed`, which still gets a best-effort uninit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, docsplay::Display)]
pub enum FlashState {
    /// idle
    Idle,
    /// loaded
    Loaded,
    /// initialized for {0:?}
    Initialized(Operation),
    /// erasing
    Erasing,
    /// programming
    Programming,
    /// uninitialized
    Uninitialized,
    /// failed because {0}
    Failed(FailureReason),
}

/// A structure to control the flash of an attached microchip.
///
/// The flasher owns one assembled [`FlashAlgorithm`] and drives it on the core
/// behind a [`CoreHandle`]. Every routine call is a blocking request, resume
/// and wait cycle with an explicit deadline.
pub struct Flasher<C: CoreInterface> {
    core: CoreHandle<C>,
    flash_algorithm: FlashAlgorithm,
    config: FlasherConfig,
    progress: FlashProgress,
    image: Option<LoadedImage>,
    image_stale: bool,
    state: FlashState,
    operation: Option<Operation>,
    breakpoint: Option<u64>,
}

impl<C: CoreInterface> Debug for Flasher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flasher")
            .field("flash_algorithm", &self.flash_algorithm.name)
            .field("state", &self.state)
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

impl<C: CoreInterface> Flasher<C> {
    /// Creates a flasher. Nothing is written to the target until the first
    /// [`load`](Self::load) or session.
    pub fn new(core: CoreHandle<C>, flash_algorithm: FlashAlgorithm, config: FlasherConfig) -> Self {
        Self {
            core,
            flash_algorithm,
            config,
            progress: FlashProgress::default(),
            image: None,
            image_stale: false,
            state: FlashState::Idle,
            operation: None,
            breakpoint: None,
        }
    }

    /// Reports progress events to `progress`.
    pub fn with_progress(mut self, progress: FlashProgress) -> Self {
        self.progress = progress;
        self
    }

    /// The algorithm this flasher drives.
    pub fn flash_algorithm(&self) -> &FlashAlgorithm {
        &self.flash_algorithm
    }

    /// The configuration of this flasher.
    pub fn config(&self) -> &FlasherConfig {
        &self.config
    }

    /// The handle of the core the algorithm runs on.
    pub fn core(&self) -> &CoreHandle<C> {
        &self.core
    }

    /// The current state.
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// The image in RAM, if it is loaded and still trusted.
    pub fn loaded_image(&self) -> Option<&LoadedImage> {
        self.image.as_ref().filter(|_| !self.image_stale)
    }

    /// Halts the core and writes the algorithm image to RAM.
    pub fn load(&mut self) -> Result<&LoadedImage, FlashError> {
        if self.operation.is_some() {
            return Err(self.invalid_state("an idle flasher"));
        }

        tracing::debug!("Loading flash algorithm {}.", self.flash_algorithm.name);

        let image = match self.load_image() {
            Ok(image) => image,
            Err(error) => return Err(self.fail(error)),
        };

        self.progress
            .algorithm_loaded(image.load_address, image.length);
        self.image_stale = false;
        self.state = FlashState::Loaded;

        Ok(self.image.insert(image))
    }

    fn load_image(&mut self) -> Result<LoadedImage, FlashError> {
        let mut core = self.core.lock()?;

        if !core.core_halted()? {
            tracing::debug!("Halting core {}", self.flash_algorithm.core);
            core.halt(self.config.halt_timeout)?;
        }

        let image =
            AlgorithmLoader::new(self.config.verify_load).load(&mut *core, &self.flash_algorithm)?;
        core.mark_resident(self.resident_image());

        Ok(image)
    }

    /// The RAM the algorithm occupies on the shared core.
    fn resident_image(&self) -> ResidentImage {
        ResidentImage {
            name: self.flash_algorithm.name.clone(),
            ram: self.flash_algorithm.ram_range(),
        }
    }

    /// Checks that the image is loaded and no other flasher overwrote it since.
    fn image_is_resident(&self) -> Result<bool, FlashError> {
        if self.loaded_image().is_none() {
            return Ok(false);
        }

        let core = self.core.lock()?;
        if core.is_resident(&self.resident_image()) {
            Ok(true)
        } else {
            tracing::debug!(
                "Image of flash algorithm {} was overwritten, reloading it.",
                self.flash_algorithm.name
            );
            Ok(false)
        }
    }

    /// Forgets the loaded image, so the next session writes it again.
    ///
    /// Needed after the core was reset. Sessions do this on their own after a
    /// routine timed out.
    pub fn reset_and_reload(&mut self) -> Result<(), FlashError> {
        if self.operation.is_some() {
            return Err(self.invalid_state("an uninitialized flasher"));
        }

        tracing::debug!("Marking flash algorithm image as stale.");
        self.core.lock()?.forget_resident(&self.resident_image());
        self.image = None;
        self.image_stale = false;
        self.breakpoint = None;
        if !matches!(self.state, FlashState::Failed(_)) {
            self.state = FlashState::Idle;
        }

        Ok(())
    }

    /// Runs the `Init()` routine for `operation`, loading the image first if needed.
    ///
    /// The routine gets the flash start address, the clock and the operation code.
    #[tracing::instrument(name = "Call to flash algorithm init", skip(self, clock))]
    pub fn init(&mut self, operation: Operation, clock: Option<u32>) -> Result<(), FlashError> {
        if self.operation.is_some() {
            return Err(self.invalid_state("an idle or loaded flasher"));
        }

        let resident = match self.image_is_resident() {
            Ok(resident) => resident,
            Err(error) => return Err(self.fail(error)),
        };
        if !resident {
            self.load()?;
        }

        tracing::debug!("Preparing Flasher for operation {:?}", operation);
        self.operation = Some(operation);

        if let Some(pc_init) = self.flash_algorithm.entry_points.init {
            let address = self.flash_algorithm.flash_properties.address_range.start;
            let result = into_reg(address).and_then(|address| {
                self.call_routine(
                    "init",
                    &Registers {
                        pc: into_reg(pc_init)?,
                        args: [Some(address), clock.or(Some(0)), Some(operation.code()), None],
                    },
                    &[],
                    self.config.init_timeout,
                    None,
                )
            });

            if let Err(error) = result {
                return Err(self.fail(FlashError::Init(Box::new(error))));
            }
        }

        self.state = FlashState::Initialized(operation);
        Ok(())
    }

    /// Runs the `UnInit()` routine and clears the breakpoint.
    ///
    /// Failures are logged but not returned, the flash contents are already
    /// final at this point. Does nothing if the flasher is not initialized.
    pub fn uninit(&mut self) {
        let Some(operation) = self.operation.take() else {
            tracing::debug!("Flasher is not initialized, skipping uninit.");
            return;
        };

        tracing::debug!("Running uninit routine.");

        if let Some(pc_uninit) = self.flash_algorithm.entry_points.uninit {
            let result = into_reg(pc_uninit).and_then(|pc| {
                self.call_routine(
                    "uninit",
                    &Registers {
                        pc,
                        args: [Some(operation.code()), None, None, None],
                    },
                    &[],
                    self.config.uninit_timeout,
                    None,
                )
            });

            if let Err(error) = result {
                tracing::warn!(
                    "Uninit of flash algorithm {} failed: {error}",
                    self.flash_algorithm.name
                );
                if error.is_timeout() {
                    self.image_stale = true;
                }
            }
        }

        if let Some(address) = self.breakpoint.take() {
            let cleared = self
                .core
                .lock()
                .and_then(|mut core| core.clear_hw_breakpoint(address));
            if let Err(error) = cleared {
                tracing::warn!("Failed to clear breakpoint at {address:#010x}: {error}");
            }
        }

        if self.image_stale {
            let resident = self.resident_image();
            if let Err(error) = self.core.lock().map(|mut core| core.forget_resident(&resident)) {
                tracing::warn!("Failed to forget the stale image: {error}");
            }
            self.image = None;
            self.image_stale = false;
        }

        if !matches!(self.state, FlashState::Failed(_)) {
            self.state = FlashState::Uninitialized;
        }
    }

    /// Erases the whole flash with the `EraseAll()` routine.
    ///
    /// This uses the erase sector timeout as upper bound.
    pub fn erase_all(&mut self) -> Result<(), FlashError> {
        self.expect_operation(Operation::Erase)?;

        let Some(pc_erase_all) = self.flash_algorithm.entry_points.erase_all else {
            return Err(FlashError::RoutineNotSupported("erase_all"));
        };

        tracing::debug!("Erasing entire chip.");
        self.progress.started_erasing();
        self.state = FlashState::Erasing;

        let t1 = Instant::now();
        let timeout = Duration::from_millis(
            self.flash_algorithm.flash_properties.erase_sector_timeout as u64,
        );

        let result = into_reg(pc_erase_all).and_then(|pc| {
            self.call_routine(
                "erase_all",
                &Registers {
                    pc,
                    args: [None; 4],
                },
                &[],
                timeout,
                None,
            )
        });

        if let Err(error) = result {
            self.progress.failed_erasing();
            return Err(self.fail(FlashError::EraseAllFailed {
                source: Box::new(error),
            }));
        }

        tracing::info!("Done erasing chip. This took {:?}", t1.elapsed());
        self.progress.finished_erasing();

        Ok(())
    }

    /// Erases the sector which contains `address`.
    pub fn erase_sector(&mut self, address: u64) -> Result<(), FlashError> {
        let sector = self.flash_algorithm.sector_table().sector_at(address)?;
        self.expect_operation(Operation::Erase)?;

        self.erase_sector_at(sector)
    }

    /// Erases every sector touched by `[start, start + length)`.
    ///
    /// The first failing sector aborts the erase and is named in the error.
    pub fn erase_range(&mut self, start: u64, length: u64) -> Result<(), FlashError> {
        let sectors: Vec<SectorInfo> = self
            .flash_algorithm
            .sector_table()
            .sectors_covering(start, length)?
            .collect();
        self.expect_operation(Operation::Erase)?;

        tracing::debug!(
            "Erasing {} sectors for range {start:#010x}..{:#010x}",
            sectors.len(),
            start.saturating_add(length)
        );

        self.progress.started_erasing();
        for sector in sectors {
            if let Err(error) = self.erase_sector_at(sector) {
                self.progress.failed_erasing();
                return Err(error);
            }
        }
        self.progress.finished_erasing();

        Ok(())
    }

    fn erase_sector_at(&mut self, sector: SectorInfo) -> Result<(), FlashError> {
        let address = sector.base_address;
        tracing::info!("Erasing sector at address {:#010x}", address);
        self.state = FlashState::Erasing;

        let t1 = Instant::now();
        let timeout = Duration::from_millis(
            self.flash_algorithm.flash_properties.erase_sector_timeout as u64,
        );
        let pc = self.flash_algorithm.entry_points.erase_sector;

        let result = into_reg(address).and_then(|reg_address| {
            self.call_routine(
                "erase_sector",
                &Registers {
                    pc: into_reg(pc)?,
                    args: [Some(reg_address), None, None, None],
                },
                &[],
                timeout,
                Some(address),
            )
        });

        if let Err(error) = result {
            return Err(self.fail(FlashError::EraseFailed {
                sector_address: address,
                source: Box::new(error),
            }));
        }

        let elapsed = t1.elapsed();
        tracing::info!("Done erasing sector. This took {:?}", elapsed);
        self.progress.sector_erased(address, sector.size, elapsed);

        Ok(())
    }

    /// Programs `data` starting at `address`.
    ///
    /// The data is split into pages. Parts of a page not covered by `data` are
    /// filled with the erased byte value. If verification is enabled, the flash
    /// is read back afterwards.
    pub fn program(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        self.flash_algorithm
            .check_flash_range(address, data.len() as u64)?;
        self.expect_operation(Operation::Program)?;

        if data.is_empty() {
            return Ok(());
        }

        tracing::debug!("Starting program procedure.");
        let pages = self.fill_pages(address, data)?;

        self.progress.started_programming();
        for (page_address, bytes) in pages {
            if let Err(error) = self.program_page(page_address, &bytes) {
                self.progress.failed_programming();
                return Err(error);
            }
        }
        self.progress.finished_programming();

        if self.config.verify {
            self.verify(address, data)?;
        }

        Ok(())
    }

    /// Splits `data` into whole pages, padding with the erased byte value.
    fn fill_pages(&self, address: u64, data: &[u8]) -> Result<Vec<(u64, Vec<u8>)>, FlashError> {
        let properties = &self.flash_algorithm.flash_properties;
        let page_size = self.flash_algorithm.sector_table().page_size() as u64;
        let end = address + data.len() as u64;

        let mut pages = Vec::new();
        let mut page_address = self.flash_algorithm.sector_table().page_at(address)?.base_address;

        while page_address < end {
            let page_end = page_address + page_size;
            let mut bytes = vec![properties.erased_byte_value; page_size as usize];

            let copy_start = address.max(page_address);
            let copy_end = end.min(page_end);
            bytes[(copy_start - page_address) as usize..(copy_end - page_address) as usize]
                .copy_from_slice(&data[(copy_start - address) as usize..(copy_end - address) as usize]);

            pages.push((page_address, bytes));
            page_address = page_end;
        }

        Ok(pages)
    }

    fn program_page(&mut self, address: u64, bytes: &[u8]) -> Result<(), FlashError> {
        let t1 = Instant::now();

        tracing::info!(
            "Flashing page at address {:#010x} with size: {}",
            address,
            bytes.len()
        );
        self.state = FlashState::Programming;

        let timeout = Duration::from_millis(
            self.flash_algorithm.flash_properties.program_page_timeout as u64,
        );
        let pc = self.flash_algorithm.entry_points.program_page;
        let page_buffer = self.flash_algorithm.page_buffer;

        let result = into_reg(address).and_then(|reg_address| {
            self.call_routine(
                "program_page",
                &Registers {
                    pc: into_reg(pc)?,
                    args: [
                        Some(reg_address),
                        Some(bytes.len() as u32),
                        Some(into_reg(page_buffer)?),
                        None,
                    ],
                },
                bytes,
                timeout,
                Some(address),
            )
        });

        if let Err(error) = result {
            return Err(self.fail(FlashError::PageWrite {
                page_address: address,
                source: Box::new(error),
            }));
        }

        let elapsed = t1.elapsed();
        tracing::info!("Flashing took: {:?}", elapsed);
        self.progress
            .page_programmed(address, bytes.len() as u32, elapsed);

        Ok(())
    }

    fn verify(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        tracing::debug!("Verifying {} bytes at {address:#010x}", data.len());

        let read_back = match self.read_flash(address, data.len()) {
            Ok(read_back) => read_back,
            Err(error) => return Err(self.fail(error)),
        };

        if let Some(offset) = data
            .iter()
            .zip(read_back.iter())
            .position(|(expected, actual)| expected != actual)
        {
            let address = address + offset as u64;
            tracing::error!("Verification failed at address {address:#010x}");
            return Err(self.fail(FlashError::VerifyFailed { address }));
        }

        self.progress.verified(address, data.len() as u64);
        Ok(())
    }

    fn read_flash(&self, address: u64, length: usize) -> Result<Vec<u8>, FlashError> {
        let mut core = self.core.lock()?;
        Ok(core.read_memory(address, length)?)
    }

    /// Erases the whole chip: load if needed, init, erase all, uninit.
    pub fn erase_all_session(&mut self) -> Result<(), FlashError> {
        self.run_session(Operation::Erase, |flasher| flasher.erase_all())
    }

    /// Erases every sector touched by `[start, start + length)` in a full session.
    pub fn erase_range_session(&mut self, start: u64, length: u64) -> Result<(), FlashError> {
        self.flash_algorithm
            .sector_table()
            .sectors_covering(start, length)?;

        self.run_session(Operation::Erase, |flasher| {
            flasher.erase_range(start, length)
        })
    }

    /// Programs `data` at `address` in a full session.
    ///
    /// The affected sectors must already be erased.
    pub fn program_session(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        self.flash_algorithm
            .check_flash_range(address, data.len() as u64)?;

        self.run_session(Operation::Program, |flasher| flasher.program(address, data))
    }

    /// Runs `f` between init and uninit.
    ///
    /// On failure the flasher ends up in [`FlashState::Failed`] and the
    /// original error is returned. Uninit runs exactly once either way.
    fn run_session<T, F>(&mut self, operation: Operation, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut Self) -> Result<T, FlashError>,
    {
        if self.operation.is_some() {
            return Err(self.invalid_state("an idle flasher"));
        }

        let result = self.init(operation, None).and_then(|()| f(self));

        self.uninit();

        match &result {
            Ok(_) => self.state = FlashState::Idle,
            Err(error) => {
                tracing::error!(
                    "{:?} session of flash algorithm {} failed: {error}",
                    operation,
                    self.flash_algorithm.name
                );
                if !matches!(self.state, FlashState::Failed(_)) {
                    self.state = FlashState::Failed(FailureReason::from(error));
                }
            }
        }

        result
    }

    fn expect_operation(&self, operation: Operation) -> Result<(), FlashError> {
        if self.operation == Some(operation) && !matches!(self.state, FlashState::Failed(_)) {
            Ok(())
        } else {
            Err(FlashError::InvalidState {
                expected: match operation {
                    Operation::Erase => "a flasher initialized for erasing",
                    Operation::Program => "a flasher initialized for programming",
                },
                actual: self.state.to_string(),
            })
        }
    }

    fn invalid_state(&self, expected: &'static str) -> FlashError {
        FlashError::InvalidState {
            expected,
            actual: self.state.to_string(),
        }
    }

    /// Moves the flasher to `Failed`.
    ///
    /// After a timeout, or when the image in RAM was overwritten, the image is
    /// no longer trusted. It is dropped after the uninit call.
    fn fail(&mut self, error: FlashError) -> FlashError {
        self.state = FlashState::Failed(FailureReason::from(&error));

        if error.is_timeout() {
            tracing::warn!(
                "Flash algorithm {} timed out, it will be reloaded before the next session.",
                self.flash_algorithm.name
            );
            self.image_stale = true;
        } else if matches!(error.root_cause(), FlashError::AlgorithmNotLoaded) {
            self.image_stale = true;
        }

        error
    }

    fn call_routine(
        &mut self,
        routine: &'static str,
        registers: &Registers,
        page: &[u8],
        timeout: Duration,
        address: Option<u64>,
    ) -> Result<(), FlashError> {
        let result = self.call_function_and_wait(routine, registers, page, timeout)?;

        if result != 0 {
            return Err(FlashError::AlgorithmFailure {
                routine,
                error_code: result,
                address,
            });
        }

        Ok(())
    }

    /// Calls a routine and waits for it to hit the breakpoint at the load address.
    ///
    /// The core stays locked for the whole cycle.
    #[tracing::instrument(skip(self, registers, page))]
    fn call_function_and_wait(
        &mut self,
        routine: &'static str,
        registers: &Registers,
        page: &[u8],
        timeout: Duration,
    ) -> Result<u32, FlashError> {
        tracing::debug!("Calling routine {:?}", &registers);

        let image = self.image.as_ref().ok_or(FlashError::AlgorithmNotLoaded)?;
        let load_address = image.load_address;
        let data_section = image.data_section;
        let page_buffer = image.page_buffer;
        let begin_stack = image.begin_stack;
        let resident = self.resident_image();

        let mut core = self.core.lock()?;

        if !core.is_resident(&resident) {
            tracing::error!(
                "Image of flash algorithm {} was overwritten during the session.",
                self.flash_algorithm.name
            );
            return Err(FlashError::AlgorithmNotLoaded);
        }

        if !core.core_halted()? {
            core.halt(self.config.halt_timeout)?;
        }

        // The arguments are also passed in the scratch area.
        let block: Vec<u8> = registers
            .args
            .iter()
            .flat_map(|arg| arg.unwrap_or(0).to_le_bytes())
            .collect();
        core.write(data_section, &block)?;

        if !page.is_empty() {
            core.write(page_buffer, page)?;
        }

        let regs = core.registers();
        let values = [
            (regs.program_counter(), Some(registers.pc)),
            (regs.argument_register(0), registers.args[0]),
            (regs.argument_register(1), registers.args[1]),
            (regs.argument_register(2), registers.args[2]),
            (regs.argument_register(3), registers.args[3]),
            (regs.stack_pointer(), Some(into_reg(begin_stack)?)),
            (
                regs.return_address(),
                Some(into_reg(regs.return_address_value(load_address))?),
            ),
        ];

        for (description, value) in values {
            if let Some(v) = value {
                core.write_core_reg(description.id, v as u64)?;

                if tracing::enabled!(Level::TRACE) {
                    let value = core.read_core_reg(description.id)?;

                    tracing::trace!(
                        "content of {} {:#x}: {:#010x} should be: {:#010x}",
                        description.name,
                        description.id.0,
                        value,
                        v
                    );
                }
            }
        }

        if self.breakpoint.is_none() {
            core.set_hw_breakpoint(load_address)?;
            self.breakpoint = Some(load_address);
        }

        // Resume target operation.
        core.run()?;

        tracing::debug!("Waiting for routine call completion.");
        let deadline = Instant::now() + timeout;
        if !core.wait_for_core_halted(deadline)? {
            return Err(FlashError::Timeout { routine, timeout });
        }

        let result = core.read_core_reg(regs.result_register().id)?;
        Ok(result as u32)
    }
}

struct Registers {
    pc: u32,
    args: [Option<u32>; 4],
}

impl Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}({:?})", self.pc, self.args)
    }
}

fn into_reg(val: u64) -> Result<u32, FlashError> {
    let reg_value: u32 = val
        .try_into()
        .map_err(|_| FlashError::RegisterValueNotSupported(val))?;

    Ok(reg_value)
}
