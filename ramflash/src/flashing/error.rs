use crate::error::Error;
use ramflash_target::{ConfigurationError, MemoryMapError};
use std::ops::Range;
use std::time::Duration;

/// Describes any error that happened during or in preparation for the flashing procedure.
#[derive(thiserror::Error, Debug, docsplay::Display)]
pub enum FlashError {
    /// The target description is inconsistent.
    Configuration(#[from] ConfigurationError),

    /// The memory map does not allow running the flash algorithm.
    MemoryMap(#[from] MemoryMapError),

    /// Something during the interaction with the core went wrong.
    Transport(#[from] Error),

    /// The '{routine}' routine did not return within {timeout:?}.
    Timeout {
        /// The routine which was running.
        routine: &'static str,
        /// The deadline which passed.
        timeout: Duration,
    },

    /// The '{routine}' routine returned the error code {error_code:#x}.
    AlgorithmFailure {
        /// The routine which failed.
        routine: &'static str,
        /// The non-zero result of the routine.
        error_code: u32,
        /// The flash address the routine was called for, if any.
        address: Option<u64>,
    },

    /// Failed to erase the whole chip.
    EraseAllFailed {
        /// The source error of this error.
        source: Box<FlashError>,
    },

    /// Failed to erase flash sector at address {sector_address:#010x}.
    EraseFailed {
        /// The address of the sector that should have been erased.
        sector_address: u64,
        /// The source error of this error.
        source: Box<FlashError>,
    },

    /// Failed to program the page at address {page_address:#010x}.
    PageWrite {
        /// The address of the page that should have been written.
        page_address: u64,
        /// The source error of this error.
        source: Box<FlashError>,
    },

    /// The initialization of the flash algorithm failed.
    Init(#[source] Box<FlashError>),

    /// The operation requires {expected}, but the flasher is {actual}.
    InvalidState {
        /// The state the operation needs.
        expected: &'static str,
        /// The state the operation found.
        actual: String,
    },

    /// Address {address:#010x} is outside of the flash range {range:#010x?}.
    OutOfRange {
        /// The offending address.
        address: u64,
        /// The flash range of the algorithm.
        range: Range<u64>,
    },

    /// No flash algorithm covers the flash region {0:#010x?}.
    NoFlashAlgorithm(Range<u64>),

    /// The flash algorithm has no '{0}' routine.
    RoutineNotSupported(&'static str),

    /// The RAM contents did not match the flash algorithm after loading it.
    AlgorithmNotLoaded,

    /// Verification of the flash contents failed at address {address:#010x}.
    VerifyFailed {
        /// The first address where flash and source differ.
        address: u64,
    },

    /// The value {0:#x} does not fit into a register of the core.
    RegisterValueNotSupported(u64),
}

impl FlashError {
    /// Returns the innermost error, unwrapping the errors which only add an address.
    pub fn root_cause(&self) -> &FlashError {
        match self {
            FlashError::EraseAllFailed { source }
            | FlashError::EraseFailed { source, .. }
            | FlashError::PageWrite { source, .. }
            | FlashError::Init(source) => source.root_cause(),
            other => other,
        }
    }

    /// Returns `true` if a routine did not return in time.
    ///
    /// After a timeout the algorithm may still be running, and the image in RAM
    /// can no longer be trusted.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root_cause(),
            FlashError::Timeout { .. } | FlashError::Transport(Error::Timeout)
        )
    }

    /// The error code a routine returned, if this error was caused by one.
    pub fn error_code(&self) -> Option<u32> {
        match self.root_cause() {
            FlashError::AlgorithmFailure { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timeout_is_found_through_wrappers() {
        let error = FlashError::EraseFailed {
            sector_address: 0x1000,
            source: Box::new(FlashError::Timeout {
                routine: "erase_sector",
                timeout: Duration::from_millis(2000),
            }),
        };

        assert!(error.is_timeout());
        assert_eq!(error.error_code(), None);
    }

    #[test]
    fn error_code_of_failed_page() {
        let error = FlashError::PageWrite {
            page_address: 0x800,
            source: Box::new(FlashError::AlgorithmFailure {
                routine: "program_page",
                error_code: 3,
                address: Some(0x800),
            }),
        };

        assert!(!error.is_timeout());
        assert_eq!(error.error_code(), Some(3));
        assert!(error.to_string().contains("0x00000800"));
    }
}
