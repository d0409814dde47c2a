use std::time::Duration;

/// A structure to manage the flashing procedure progress reporting.
///
/// This struct stores a handler closure which will be called everytime an event happens during the flashing process.
/// Such an event can be start or finish of the flashing procedure or a progress report, as well as some more events.
///
/// # Example
///
/// ```
/// use ramflash::flashing::FlashProgress;
///
/// // Print events
/// let progress = FlashProgress::new(|event| println!("Event: {:#?}", event));
/// ```
pub struct FlashProgress {
    handler: Box<dyn Fn(ProgressEvent)>,
}

impl Default for FlashProgress {
    fn default() -> Self {
        Self::new(|_| {})
    }
}

impl std::fmt::Debug for FlashProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashProgress").finish_non_exhaustive()
    }
}

impl FlashProgress {
    /// Create a new `FlashProgress` structure with a given `handler` to be called on events.
    pub fn new(handler: impl Fn(ProgressEvent) + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Emit a flashing progress event.
    fn emit(&self, event: ProgressEvent) {
        (self.handler)(event);
    }

    pub(super) fn algorithm_loaded(&self, address: u64, size: usize) {
        self.emit(ProgressEvent::AlgorithmLoaded { address, size });
    }

    /// Signalize that the erasing procedure started.
    pub(super) fn started_erasing(&self) {
        self.emit(ProgressEvent::StartedErasing);
    }

    /// Signalize that the sector erasing procedure has made progress.
    pub(super) fn sector_erased(&self, address: u64, size: u64, time: Duration) {
        self.emit(ProgressEvent::SectorErased {
            address,
            size,
            time,
        });
    }

    /// Signalize that the erasing procedure failed.
    pub(super) fn failed_erasing(&self) {
        self.emit(ProgressEvent::FailedErasing);
    }

    /// Signalize that the erasing procedure completed successfully.
    pub(super) fn finished_erasing(&self) {
        self.emit(ProgressEvent::FinishedErasing);
    }

    /// Signalize that the programing procedure started.
    pub(super) fn started_programming(&self) {
        self.emit(ProgressEvent::StartedProgramming);
    }

    /// Signalize that the page programming procedure has made progress.
    pub(super) fn page_programmed(&self, address: u64, size: u32, time: Duration) {
        self.emit(ProgressEvent::PageProgrammed {
            address,
            size,
            time,
        });
    }

    /// Signalize that the programming procedure failed.
    pub(super) fn failed_programming(&self) {
        self.emit(ProgressEvent::FailedProgramming);
    }

    /// Signalize that the programming procedure completed successfully.
    pub(super) fn finished_programming(&self) {
        self.emit(ProgressEvent::FinishedProgramming);
    }

    pub(super) fn verified(&self, address: u64, size: u64) {
        self.emit(ProgressEvent::Verified { address, size });
    }
}

/// Possible events during the flashing process.
///
/// If flashing works without problems, the events will arrive in the
/// following order:
///
/// * `AlgorithmLoaded`, when the image had to be written
/// * `StartedErasing`
/// * `SectorErased` for every sector
/// * `FinishedErasing`
/// * `StartedProgramming`
/// * `PageProgrammed` for every page
/// * `FinishedProgramming`
/// * `Verified`, if verification is enabled
///
/// If an error occurs in any stage, one of the `Failed*` events will be emitted,
/// and no further events will be emitted for that stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The flash algorithm was written to RAM.
    AlgorithmLoaded {
        /// The load address of the image.
        address: u64,
        /// The size of the image in bytes.
        size: usize,
    },
    /// Erasing of flash has started.
    StartedErasing,
    /// A sector has been erased successfully.
    SectorErased {
        /// The address of the sector.
        address: u64,
        /// The size of the sector in bytes.
        size: u64,
        /// The time it took to erase this sector.
        time: Duration,
    },
    /// Erasing of the flash has failed.
    FailedErasing,
    /// Erasing of the flash has finished successfully.
    FinishedErasing,
    /// Programming of the flash has started.
    StartedProgramming,
    /// A flash page has been programmed successfully.
    PageProgrammed {
        /// The address of the page.
        address: u64,
        /// The size of the page in bytes.
        size: u32,
        /// The time it took to program the page.
        time: Duration,
    },
    /// Programming of the flash failed.
    FailedProgramming,
    /// Programming of the flash has finished successfully.
    FinishedProgramming,
    /// The programmed range was read back and matches the source.
    Verified {
        /// Start of the verified range.
        address: u64,
        /// Length of the verified range.
        size: u64,
    },
}
