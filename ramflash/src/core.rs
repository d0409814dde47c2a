//! The contract between the flasher and the debug transport of a single core.

use crate::error::Error;
use ramflash_target::{Architecture, MemoryRange};
use std::ops::{Deref, DerefMut, Range};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The location of a CPU register. This is not an actual memory address, but a
/// transport specific number which identifies the register.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct RegisterId(pub u16);

impl From<u16> for RegisterId {
    fn from(value: u16) -> Self {
        RegisterId(value)
    }
}

/// Describes a single register of the calling convention.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterDescription {
    /// Display name of the register.
    pub name: &'static str,
    /// The number the transport uses for the register.
    pub id: RegisterId,
}

impl From<&RegisterDescription> for RegisterId {
    fn from(description: &RegisterDescription) -> RegisterId {
        description.id
    }
}

/// The instruction set the algorithm is executed in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstructionSet {
    /// ARM Thumb 2 instruction set
    Thumb2,
    /// RISC-V 32-bit instruction set
    RV32,
    /// Xtensa instruction set
    Xtensa,
}

/// The registers used to call a flash algorithm routine on a core.
///
/// Each architecture has a fixed calling convention: four argument registers,
/// one result register, the stack pointer and the return address.
#[derive(Debug, PartialEq, Eq)]
pub struct CoreRegisters {
    program_counter: RegisterDescription,
    stack_pointer: RegisterDescription,
    return_address: RegisterDescription,
    argument_registers: [RegisterDescription; 4],
    result_register: RegisterDescription,
    instruction_set: InstructionSet,
}

const fn reg(name: &'static str, id: u16) -> RegisterDescription {
    RegisterDescription {
        name,
        id: RegisterId(id),
    }
}

static ARM_REGISTERS: CoreRegisters = CoreRegisters {
    program_counter: reg("PC", 15),
    stack_pointer: reg("SP", 13),
    return_address: reg("LR", 14),
    argument_registers: [reg("R0", 0), reg("R1", 1), reg("R2", 2), reg("R3", 3)],
    result_register: reg("R0", 0),
    instruction_set: InstructionSet::Thumb2,
};

// The PC of a halted RISC-V hart is the `dpc` CSR.
static RISCV_REGISTERS: CoreRegisters = CoreRegisters {
    program_counter: reg("pc", 0x7b1),
    stack_pointer: reg("sp", 2),
    return_address: reg("ra", 1),
    argument_registers: [reg("a0", 10), reg("a1", 11), reg("a2", 12), reg("a3", 13)],
    result_register: reg("a0", 10),
    instruction_set: InstructionSet::RV32,
};

// CALL0 ABI.
static XTENSA_REGISTERS: CoreRegisters = CoreRegisters {
    program_counter: reg("pc", 0x100),
    stack_pointer: reg("a1", 1),
    return_address: reg("a0", 0),
    argument_registers: [reg("a2", 2), reg("a3", 3), reg("a4", 4), reg("a5", 5)],
    result_register: reg("a2", 2),
    instruction_set: InstructionSet::Xtensa,
};

impl CoreRegisters {
    /// Returns the calling convention of the given architecture.
    pub fn for_architecture(architecture: Architecture) -> &'static CoreRegisters {
        match architecture {
            Architecture::Arm => &ARM_REGISTERS,
            Architecture::Riscv => &RISCV_REGISTERS,
            Architecture::Xtensa => &XTENSA_REGISTERS,
        }
    }

    /// The program counter.
    pub fn program_counter(&self) -> &RegisterDescription {
        &self.program_counter
    }

    /// The stack pointer.
    pub fn stack_pointer(&self) -> &RegisterDescription {
        &self.stack_pointer
    }

    /// The link register.
    pub fn return_address(&self) -> &RegisterDescription {
        &self.return_address
    }

    /// Returns the nth argument register.
    ///
    /// # Panics
    ///
    /// Panics if `index` is larger than 3.
    pub fn argument_register(&self, index: usize) -> &RegisterDescription {
        &self.argument_registers[index]
    }

    /// All four argument registers.
    pub fn argument_registers(&self) -> &[RegisterDescription] {
        &self.argument_registers
    }

    /// The register holding the result of a routine.
    pub fn result_register(&self) -> &RegisterDescription {
        &self.result_register
    }

    /// The instruction set routines are executed in.
    pub fn instruction_set(&self) -> InstructionSet {
        self.instruction_set
    }

    /// The value to put into the return address register so that a routine
    /// returns to `address`.
    pub fn return_address_value(&self, address: u64) -> u64 {
        match self.instruction_set {
            // Stay in Thumb mode when returning.
            InstructionSet::Thumb2 => address | 1,
            _ => address,
        }
    }
}

/// Control over a single core through a debug transport.
///
/// This is everything the flasher needs from a debug probe: run control,
/// register and memory access and one hardware breakpoint. Implementations
/// are expected to be synchronous, every call returns once the transport
/// completed the request.
pub trait CoreInterface {
    /// The architecture of the core.
    fn architecture(&self) -> Architecture;

    /// Halts the core, waiting at most `timeout` for it to stop.
    fn halt(&mut self, timeout: Duration) -> Result<(), Error>;

    /// Resumes the core.
    fn run(&mut self) -> Result<(), Error>;

    /// Checks if the core is halted.
    fn core_halted(&mut self) -> Result<bool, Error>;

    /// Writes a core register.
    fn write_core_reg(&mut self, id: RegisterId, value: u64) -> Result<(), Error>;

    /// Reads a core register.
    fn read_core_reg(&mut self, id: RegisterId) -> Result<u64, Error>;

    /// Reads `data.len()` bytes starting at `address`.
    fn read(&mut self, address: u64, data: &mut [u8]) -> Result<(), Error>;

    /// Writes `data` starting at `address`.
    fn write(&mut self, address: u64, data: &[u8]) -> Result<(), Error>;

    /// Sets a hardware breakpoint at `address`.
    fn set_hw_breakpoint(&mut self, address: u64) -> Result<(), Error>;

    /// Clears the hardware breakpoint at `address`.
    fn clear_hw_breakpoint(&mut self, address: u64) -> Result<(), Error>;

    /// Waits until the core halts or `deadline` passes.
    ///
    /// Returns `false` if the core was still running at the deadline.
    fn wait_for_core_halted(&mut self, deadline: Instant) -> Result<bool, Error> {
        loop {
            if self.core_halted()? {
                return Ok(true);
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// The calling convention registers of this core.
    fn registers(&self) -> &'static CoreRegisters {
        CoreRegisters::for_architecture(self.architecture())
    }

    /// Sets the program counter.
    fn set_pc(&mut self, address: u64) -> Result<(), Error> {
        let pc = self.registers().program_counter().id;
        self.write_core_reg(pc, address)
    }

    /// Reads `len` bytes starting at `address` into a new buffer.
    fn read_memory(&mut self, address: u64, len: usize) -> Result<Vec<u8>, Error> {
        let mut data = vec![0; len];
        self.read(address, &mut data)?;
        Ok(data)
    }
}

/// A shared handle to a core.
///
/// Several flashers can hold a handle to the same transport. Each request,
/// resume and wait cycle is done while holding the lock, so the calls of
/// different flashers never interleave.
///
/// The handle also records which flash algorithm images are in the RAM of the
/// core, so a flasher notices when another one overwrote its image.
#[derive(Debug)]
pub struct CoreHandle<C> {
    inner: Arc<Mutex<SharedCore<C>>>,
}

#[derive(Debug)]
struct SharedCore<C> {
    core: C,
    resident: Vec<ResidentImage>,
}

/// A flash algorithm image and the RAM its code, scratch area and stack use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResidentImage {
    pub(crate) name: String,
    pub(crate) ram: Range<u64>,
}

impl<C> Clone for CoreHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: CoreInterface> CoreHandle<C> {
    /// Wraps a core into a new handle.
    pub fn new(core: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedCore {
                core,
                resident: vec![],
            })),
        }
    }

    /// Locks the core for exclusive use.
    pub fn lock(&self) -> Result<CoreGuard<'_, C>, Error> {
        let guard = self.inner.lock().map_err(|_| Error::Poisoned)?;
        Ok(CoreGuard { guard })
    }
}

/// Exclusive access to the core behind a [`CoreHandle`].
pub struct CoreGuard<'a, C> {
    guard: MutexGuard<'a, SharedCore<C>>,
}

impl<C> Deref for CoreGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard.core
    }
}

impl<C> DerefMut for CoreGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard.core
    }
}

impl<C> CoreGuard<'_, C> {
    /// Checks that `image` is still in RAM, untouched by any later load.
    pub(crate) fn is_resident(&self, image: &ResidentImage) -> bool {
        self.guard.resident.contains(image)
    }

    /// Records that `image` was written. Images whose RAM it overlaps are gone.
    pub(crate) fn mark_resident(&mut self, image: ResidentImage) {
        self.guard
            .resident
            .retain(|other| !other.ram.intersects_range(&image.ram));
        self.guard.resident.push(image);
    }

    /// Forgets `image`, it has to be written again before use.
    pub(crate) fn forget_resident(&mut self, image: &ResidentImage) {
        self.guard.resident.retain(|other| other != image);
    }
}
