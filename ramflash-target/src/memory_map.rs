//! Address lookups in the memory map of a chip variant.

use crate::{
    ConfigurationError, MemoryMapError, MemoryRange, MemoryRegion, NvmRegion, RamRegion,
};
use std::ops::Range;

/// Resolves addresses to the [`MemoryRegion`]s of a variant, as seen by a given core.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMap<'a> {
    regions: &'a [MemoryRegion],
}

impl<'a> MemoryMap<'a> {
    /// Wraps the memory map of a variant.
    pub fn new(regions: &'a [MemoryRegion]) -> Self {
        Self { regions }
    }

    /// All regions, in declaration order.
    pub fn regions(&self) -> &'a [MemoryRegion] {
        self.regions
    }

    /// Returns the region which contains `address` and can be reached by `core`.
    ///
    /// If more than one region matches, the description is broken and a
    /// configuration error is returned instead of picking one.
    pub fn resolve(&self, core: &str, address: u64) -> Result<&'a MemoryRegion, MemoryMapError> {
        let mut candidates = self
            .regions
            .iter()
            .filter(|region| region.contains(address) && region.accessible_by(core));

        let Some(first) = candidates.next() else {
            return Err(MemoryMapError::NotMapped {
                address,
                core: core.to_string(),
            });
        };

        if let Some(second) = candidates.next() {
            return Err(ConfigurationError::OverlappingRegions {
                first: first.address_range(),
                second: second.address_range(),
                core: core.to_string(),
            }
            .into());
        }

        Ok(first)
    }

    /// Like [`MemoryMap::resolve`], but the whole `range` must lie inside the region.
    pub fn resolve_range(
        &self,
        core: &str,
        range: &Range<u64>,
    ) -> Result<&'a MemoryRegion, MemoryMapError> {
        let region = self.resolve(core, range.start)?;

        if range.is_empty() || region.address_range().contains_range(range) {
            Ok(region)
        } else {
            Err(MemoryMapError::NotMapped {
                address: range.end - 1,
                core: core.to_string(),
            })
        }
    }

    /// Returns the region the chip boots from, as seen by `core`.
    pub fn default_boot_region(&self, core: &str) -> Result<&'a MemoryRegion, MemoryMapError> {
        self.regions
            .iter()
            .find(|region| region.is_boot_memory() && region.accessible_by(core))
            .ok_or_else(|| MemoryMapError::NoBootRegion(core.to_string()))
    }

    /// All non-volatile regions.
    pub fn nvm_regions(&self) -> impl Iterator<Item = &'a NvmRegion> + 'a {
        self.regions.iter().filter_map(MemoryRegion::as_nvm_region)
    }

    /// All RAM regions `core` can reach.
    pub fn ram_regions_for<'c>(&self, core: &'c str) -> impl Iterator<Item = &'a RamRegion> + 'c
    where
        'a: 'c,
    {
        self.regions
            .iter()
            .filter_map(MemoryRegion::as_ram_region)
            .filter(move |region| region.cores.iter().any(|c| c == core))
    }

    /// Checks that no two regions reachable by the same core overlap.
    pub fn check_overlaps(&self) -> Result<(), ConfigurationError> {
        for (index, first) in self.regions.iter().enumerate() {
            for second in &self.regions[index + 1..] {
                if !first
                    .address_range()
                    .intersects_range(&second.address_range())
                {
                    continue;
                }

                if let Some(core) = first.cores().iter().find(|c| second.accessible_by(c)) {
                    return Err(ConfigurationError::OverlappingRegions {
                        first: first.address_range(),
                        second: second.address_range(),
                        core: core.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{GenericRegion, MemoryAccess};
    use pretty_assertions::assert_eq;

    fn nvm(range: Range<u64>, cores: &[&str], boot: bool) -> MemoryRegion {
        MemoryRegion::Nvm(NvmRegion {
            name: Some("flash".to_string()),
            range,
            cores: cores.iter().map(|c| c.to_string()).collect(),
            access: Some(MemoryAccess {
                boot,
                ..Default::default()
            }),
        })
    }

    fn ram(range: Range<u64>, cores: &[&str]) -> MemoryRegion {
        MemoryRegion::Ram(RamRegion {
            name: None,
            range,
            cores: cores.iter().map(|c| c.to_string()).collect(),
            access: None,
        })
    }

    fn regions() -> Vec<MemoryRegion> {
        vec![
            nvm(0x0..0x400_0000, &["main"], true),
            ram(0x4037_0000..0x403e_0000, &["main"]),
            ram(0x2000_0000..0x2000_8000, &["app"]),
            MemoryRegion::Generic(GenericRegion {
                name: None,
                range: 0x6000_0000..0x6010_0000,
                cores: vec!["main".to_string(), "app".to_string()],
                access: None,
            }),
        ]
    }

    #[test]
    fn resolve_finds_region() {
        let regions = regions();
        let map = MemoryMap::new(&regions);

        assert!(map.resolve("main", 0x1500).unwrap().is_nvm());
        assert!(map.resolve("main", 0x4037_0000).unwrap().is_ram());
        assert!(map.resolve("app", 0x6000_0004).is_ok());
    }

    #[test]
    fn resolve_respects_cores() {
        let regions = regions();
        let map = MemoryMap::new(&regions);

        assert_eq!(
            map.resolve("app", 0x1500),
            Err(MemoryMapError::NotMapped {
                address: 0x1500,
                core: "app".to_string()
            })
        );
    }

    #[test]
    fn resolve_unmapped_address() {
        let regions = regions();
        let map = MemoryMap::new(&regions);

        assert!(matches!(
            map.resolve("main", 0x500_0000),
            Err(MemoryMapError::NotMapped { .. })
        ));
    }

    #[test]
    fn resolve_rejects_overlap() {
        let regions = vec![
            nvm(0x0..0x1000, &["main"], false),
            ram(0x800..0x2000, &["main"]),
        ];
        let map = MemoryMap::new(&regions);

        assert_eq!(
            map.resolve("main", 0x900),
            Err(MemoryMapError::Configuration(
                ConfigurationError::OverlappingRegions {
                    first: 0x0..0x1000,
                    second: 0x800..0x2000,
                    core: "main".to_string()
                }
            ))
        );
        assert!(map.check_overlaps().is_err());
    }

    #[test]
    fn overlap_on_different_cores_is_allowed() {
        let regions = vec![
            ram(0x0..0x1000, &["main"]),
            ram(0x0..0x1000, &["app"]),
        ];

        assert_eq!(MemoryMap::new(&regions).check_overlaps(), Ok(()));
    }

    #[test]
    fn resolve_range_must_fit() {
        let regions = regions();
        let map = MemoryMap::new(&regions);

        assert!(map.resolve_range("main", &(0x4037_0000..0x4037_1000)).is_ok());
        assert!(map.resolve_range("main", &(0x403d_f000..0x403e_1000)).is_err());
    }

    #[test]
    fn boot_region() {
        let regions = regions();
        let map = MemoryMap::new(&regions);

        assert_eq!(
            map.default_boot_region("main").unwrap().address_range(),
            0x0..0x400_0000
        );
        assert_eq!(
            map.default_boot_region("app"),
            Err(MemoryMapError::NoBootRegion("app".to_string()))
        );
    }

    #[test]
    fn ram_for_core() {
        let regions = regions();
        let map = MemoryMap::new(&regions);

        let ram: Vec<_> = map.ram_regions_for("app").map(|r| r.range.clone()).collect();
        assert_eq!(ram, vec![0x2000_0000..0x2000_8000]);
        assert_eq!(map.nvm_regions().count(), 1);
    }
}
