use std::ops::Range;

/// A target description is internally inconsistent.
///
/// These errors are detected eagerly, when a description is loaded or a flash
/// algorithm is assembled, and are never worth retrying.
#[derive(thiserror::Error, Debug, docsplay::Display, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Target {0} appears multiple times in the family.
    DuplicateVariant(String),

    /// Flash algorithm `{0}` is defined multiple times.
    DuplicateAlgorithm(String),

    /// Unknown flash algorithm `{algorithm}` for variant `{variant}`.
    UnknownAlgorithm {
        /// The referenced algorithm name.
        algorithm: String,
        /// The variant referencing it.
        variant: String,
    },

    /// Variant `{0}` does not contain any cores.
    NoCores(String),

    /// Variant `{0}` contains mixed core architectures.
    MixedArchitectures(String),

    /// Core access options of core `{core}` don't match its type.
    CoreAccessMismatch {
        /// The offending core.
        core: String,
    },

    /// Memory region {region:#010x?} of variant `{variant}` is not assigned to a core.
    RegionWithoutCore {
        /// The variant name.
        variant: String,
        /// The address range of the region.
        region: Range<u64>,
    },

    /// Memory region {region:#010x?} is assigned to the unknown core `{core}`.
    UnknownCore {
        /// The address range of the region.
        region: Range<u64>,
        /// The name of the core which does not exist.
        core: String,
    },

    /// Memory region {0:#010x?} is empty.
    EmptyRegion(Range<u64>),

    /// Memory regions {first:#010x?} and {second:#010x?} overlap for core `{core}`.
    OverlappingRegions {
        /// The first region.
        first: Range<u64>,
        /// The second region.
        second: Range<u64>,
        /// The core that can access both.
        core: String,
    },

    /// Flash algorithm `{0}` does not declare any sectors.
    NoSectors(String),

    /// The sectors of flash algorithm `{algorithm}` leave a gap or overlap at offset {offset:#x}.
    SectorGap {
        /// The algorithm name.
        algorithm: String,
        /// The offset, relative to the flash start, where the layout breaks.
        offset: u64,
    },

    /// Flash algorithm `{algorithm}` declares an invalid sector size of {size:#x}.
    InvalidSectorSize {
        /// The algorithm name.
        algorithm: String,
        /// The sector size.
        size: u64,
    },

    /// The page size {page_size:#x} of flash algorithm `{algorithm}` does not divide the sector size {sector_size:#x}.
    PageSizeMismatch {
        /// The algorithm name.
        algorithm: String,
        /// The page size.
        page_size: u32,
        /// The sector size it does not divide.
        sector_size: u64,
    },

    /// The entry point `{entry}` of flash algorithm `{algorithm}` at offset {offset:#x} lies outside the {length} byte image.
    EntryOutsideImage {
        /// The algorithm name.
        algorithm: String,
        /// The entry point name.
        entry: &'static str,
        /// The entry point offset.
        offset: u64,
        /// The image length.
        length: usize,
    },

    /// The entry point `{entry}` of flash algorithm `{algorithm}` sits at the load address, where every routine returns to.
    EntryAtLoadAddress {
        /// The algorithm name.
        algorithm: String,
        /// The entry point name.
        entry: &'static str,
    },

    /// The data section of flash algorithm `{0}` overlaps its code.
    DataSectionOverlapsImage(String),

    /// The flash range {range:#010x?} of algorithm `{algorithm}` is not inside any NVM region.
    FlashRangeNotInNvm {
        /// The algorithm name.
        algorithm: String,
        /// The flash range.
        range: Range<u64>,
    },

    /// Flash algorithm `{0}` is not assigned to a core.
    AlgorithmWithoutCore(String),

    /// Flash algorithm `{algorithm}` is assigned to the unknown core `{core}`.
    AlgorithmUnknownCore {
        /// The algorithm name.
        algorithm: String,
        /// The name of the core which does not exist.
        core: String,
    },

    /// The RAM range {range:#010x?} needed by flash algorithm `{algorithm}` is not inside a RAM region of core `{core}`.
    AlgorithmNotInRam {
        /// The algorithm name.
        algorithm: String,
        /// The range the algorithm needs.
        range: Range<u64>,
        /// The core which executes the algorithm.
        core: String,
    },

    /// The address {0:#x} does not fit into the address space.
    AddressOverflow(u64),
}

/// A lookup in the memory map failed.
#[derive(thiserror::Error, Debug, docsplay::Display, Clone, PartialEq, Eq)]
pub enum MemoryMapError {
    /// Address {address:#010x} is not mapped for core `{core}`.
    NotMapped {
        /// The queried address.
        address: u64,
        /// The queried core.
        core: String,
    },

    /// No boot memory is declared for core `{0}`.
    NoBootRegion(String),

    /// The memory map is inconsistent.
    Configuration(#[from] ConfigurationError),
}

/// A lookup in a sector table failed.
#[derive(thiserror::Error, Debug, docsplay::Display, Clone, PartialEq, Eq)]
pub enum SectorError {
    /// Address {address:#010x} is outside of the flash range {range:#010x?}.
    OutOfRange {
        /// The queried address.
        address: u64,
        /// The flash range of the table.
        range: Range<u64>,
    },

    /// The sector table is empty.
    Empty,
}
