use crate::core::RegisterId;

/// The error type of the debug transport.
///
/// Every [`CoreInterface`](crate::CoreInterface) method fails with this type. It only
/// describes problems of the transport itself, the outcome of a flash algorithm
/// routine is reported by [`FlashError`](crate::flashing::FlashError).
#[derive(thiserror::Error, Debug, docsplay::Display)]
pub enum Error {
    /// An error with the usage of the probe occurred: {0}
    Probe(String),

    /// A transport primitive did not complete in time.
    Timeout,

    /// Memory access at {address:#010x} failed.
    MemoryAccess {
        /// The address of the failing access.
        address: u64,
    },

    /// Register {0:?} does not exist on this core.
    InvalidRegister(RegisterId),

    /// The core lock was poisoned by a flasher which panicked while holding it.
    Poisoned,

    /// A transport specific error occurred.
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a [`Error::Probe`] from anything printable.
    pub fn probe(message: impl std::fmt::Display) -> Self {
        Self::Probe(message.to_string())
    }
}
