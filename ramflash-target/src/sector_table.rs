//! Sector geometry of a flash device.
//!
//! The geometry is described by a list of [`SectorDescription`]s: starting at
//! `address` (relative to the flash start) all sectors have `size` bytes, until
//! the next description or the end of the flash. This supports the irregular
//! layouts found on many parts, e.g. four 16 KiB sectors followed by 64 KiB and
//! 128 KiB sectors.

use crate::{ConfigurationError, FlashProperties, PageInfo, SectorDescription, SectorError, SectorInfo};
use std::ops::Range;

/// A view on the sectors of a [`FlashProperties`] block.
#[derive(Debug, Clone, Copy)]
pub struct SectorTable<'a> {
    properties: &'a FlashProperties,
}

impl<'a> SectorTable<'a> {
    /// Creates the table for the given flash properties.
    pub fn new(properties: &'a FlashProperties) -> Self {
        Self { properties }
    }

    /// The flash address range covered by the table.
    pub fn address_range(&self) -> Range<u64> {
        self.properties.address_range.clone()
    }

    /// The smallest programmable unit, in bytes.
    pub fn page_size(&self) -> u32 {
        self.properties.page_size
    }

    fn sectors(&self) -> &'a [SectorDescription] {
        &self.properties.sectors
    }

    /// Checks that the sectors partition the flash range without gaps, and
    /// that the page size divides every sector.
    ///
    /// `algorithm` is only used to name the culprit in the error.
    pub fn validate(&self, algorithm: &str) -> Result<(), ConfigurationError> {
        let sectors = self.sectors();
        let range = self.address_range();
        let flash_size = range.end.saturating_sub(range.start);
        let page_size = self.properties.page_size;

        let Some(first) = sectors.first() else {
            return Err(ConfigurationError::NoSectors(algorithm.to_string()));
        };

        if first.address != 0 {
            return Err(ConfigurationError::SectorGap {
                algorithm: algorithm.to_string(),
                offset: 0,
            });
        }

        for (index, sector) in sectors.iter().enumerate() {
            if sector.size == 0 {
                return Err(ConfigurationError::InvalidSectorSize {
                    algorithm: algorithm.to_string(),
                    size: sector.size,
                });
            }

            if page_size == 0 || sector.size % page_size as u64 != 0 {
                return Err(ConfigurationError::PageSizeMismatch {
                    algorithm: algorithm.to_string(),
                    page_size,
                    sector_size: sector.size,
                });
            }

            // The band ends where the next one starts, the last one at the end of the flash.
            let band_end = sectors
                .get(index + 1)
                .map(|next| next.address)
                .unwrap_or(flash_size);

            if band_end <= sector.address || (band_end - sector.address) % sector.size != 0 {
                return Err(ConfigurationError::SectorGap {
                    algorithm: algorithm.to_string(),
                    offset: band_end,
                });
            }
        }

        Ok(())
    }

    /// Returns the sector which contains `address`.
    pub fn sector_at(&self, address: u64) -> Result<SectorInfo, SectorError> {
        let range = self.address_range();
        if self.sectors().is_empty() {
            return Err(SectorError::Empty);
        }

        let out_of_range = || SectorError::OutOfRange {
            address,
            range: range.clone(),
        };

        if !range.contains(&address) {
            tracing::trace!("Address {:#010x} not contained in this flash device", address);
            return Err(out_of_range());
        }

        let offset = address - range.start;
        let band = self
            .sectors()
            .iter()
            .rfind(|s| s.address <= offset)
            .ok_or_else(out_of_range)?;

        let index = (offset - band.address) / band.size;

        Ok(SectorInfo {
            base_address: range.start + band.address + index * band.size,
            size: band.size,
        })
    }

    /// Returns the size of the sector which contains `address`.
    pub fn sector_size_at(&self, address: u64) -> Result<u64, SectorError> {
        self.sector_at(address).map(|sector| sector.size)
    }

    /// Rounds `address` down to the start of its sector.
    pub fn align_down_to_sector(&self, address: u64) -> Result<u64, SectorError> {
        self.sector_at(address).map(|sector| sector.base_address)
    }

    /// Returns the page which contains `address`.
    pub fn page_at(&self, address: u64) -> Result<PageInfo, SectorError> {
        let range = self.address_range();
        if !range.contains(&address) {
            return Err(SectorError::OutOfRange { address, range });
        }

        let page_size = self.page_size();
        let offset = address - range.start;

        Ok(PageInfo {
            base_address: range.start + offset - offset % page_size as u64,
            size: page_size,
        })
    }

    /// Iterates over the sectors touched by the byte range `[start, start + length)`.
    ///
    /// Every physical sector is reported once, consecutive sectors of the same
    /// size are not merged. The iterator can be cloned to restart it.
    pub fn sectors_covering(&self, start: u64, length: u64) -> Result<SectorIter<'a>, SectorError> {
        let range = self.address_range();
        if length == 0 {
            return Ok(SectorIter {
                table: *self,
                next: start,
                end: start,
            });
        }

        let end = start
            .checked_add(length)
            .filter(|end| *end <= range.end)
            .ok_or_else(|| SectorError::OutOfRange {
                address: start.saturating_add(length - 1),
                range: range.clone(),
            })?;

        let first = self.sector_at(start)?;

        Ok(SectorIter {
            table: *self,
            next: first.base_address,
            end,
        })
    }

    /// Iterates over all sectors of the flash.
    pub fn iter(&self) -> SectorIter<'a> {
        let range = self.address_range();
        SectorIter {
            table: *self,
            next: range.start,
            end: range.end,
        }
    }
}

/// Iterator over consecutive flash sectors, see [`SectorTable::sectors_covering`].
#[derive(Debug, Clone)]
pub struct SectorIter<'a> {
    table: SectorTable<'a>,
    next: u64,
    end: u64,
}

impl Iterator for SectorIter<'_> {
    type Item = SectorInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let sector = self.table.sector_at(self.next).ok()?;
        self.next = sector.base_address + sector.size;

        Some(sector)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn properties(address_range: Range<u64>, sectors: &[(u64, u64)]) -> FlashProperties {
        FlashProperties {
            address_range,
            page_size: 0x10,
            erased_byte_value: 0xff,
            sectors: sectors
                .iter()
                .map(|&(size, address)| SectorDescription { size, address })
                .collect(),
            ..Default::default()
        }
    }

    fn multiple_sizes() -> FlashProperties {
        properties(
            0x800_0000..0x800_0000 + 0x8_0000,
            &[(0x4000, 0x0), (0x1_0000, 0x1_0000), (0x2_0000, 0x2_0000)],
        )
    }

    #[test]
    fn single_size_lookup() {
        let props = properties(0x1000..0x2000, &[(0x100, 0x0)]);
        let table = SectorTable::new(&props);

        let expected_first = SectorInfo {
            base_address: 0x1000,
            size: 0x100,
        };

        assert!(table.sector_at(0x1000 - 1).is_err());
        assert_eq!(table.sector_at(0x1000), Ok(expected_first));
        assert_eq!(table.sector_at(0x10ff), Ok(expected_first));
        assert_eq!(table.sector_at(0x100b), Ok(expected_first));
        assert!(table.sector_at(0x2000).is_err());
    }

    #[test]
    fn odd_sector_size() {
        let props = properties(0x800_0000..0x800_0000 + 258 * 10, &[(258, 0x0)]);
        let table = SectorTable::new(&props);

        assert_eq!(table.sector_size_at(0x800_0000 + 257), Ok(258));
        assert_eq!(table.align_down_to_sector(0x800_0000 + 258 * 3 + 7), Ok(0x800_0000 + 258 * 3));
    }

    // `test_case`'s `=>` form expands to `assert_eq!` inside a module that glob-imports
    // its parent, which is ambiguous with `pretty_assertions::assert_eq` in scope.
    mod lookup {
        use super::{multiple_sizes, SectorTable};
        use test_case::test_case;

        #[test_case(0x800_4000 => (0x800_4000, 0x4000); "small sectors")]
        #[test_case(0x801_0000 => (0x801_0000, 0x1_0000); "medium sector")]
        #[test_case(0x806_1234 => (0x806_0000, 0x2_0000); "large sectors")]
        fn multiple_sizes_lookup(address: u64) -> (u64, u64) {
            let props = multiple_sizes();
            let sector = SectorTable::new(&props).sector_at(address).unwrap();
            (sector.base_address, sector.size)
        }
    }

    #[test]
    fn uniform_sectors_over_large_flash() {
        let props = properties(0x0..0x400_0000, &[(0x1000, 0x0)]);
        let table = SectorTable::new(&props);

        assert_eq!(table.sector_size_at(0x1500), Ok(0x1000));
        assert_eq!(table.align_down_to_sector(0x1500), Ok(0x1000));
        assert_eq!(
            table.sector_size_at(0x500_0000),
            Err(SectorError::OutOfRange {
                address: 0x500_0000,
                range: 0x0..0x400_0000
            })
        );
    }

    #[test]
    fn empty_table() {
        let props = properties(0x0..0x1000, &[]);

        assert_eq!(SectorTable::new(&props).sector_at(0x10), Err(SectorError::Empty));
    }

    #[test]
    fn every_address_is_inside_its_aligned_sector() {
        let props = multiple_sizes();
        let table = SectorTable::new(&props);

        for address in (props.address_range.start..props.address_range.end).step_by(0xfff) {
            let aligned = table.align_down_to_sector(address).unwrap();
            let size = table.sector_size_at(address).unwrap();
            assert!(aligned <= address && address < aligned + size, "{address:#x}");
        }
    }

    #[test]
    fn iterate_all_sectors() {
        let props = multiple_sizes();
        let got: Vec<(u64, u64)> = SectorTable::new(&props)
            .iter()
            .map(|s| (s.base_address, s.size))
            .collect();

        assert_eq!(
            got,
            vec![
                (0x800_0000, 0x4000),
                (0x800_4000, 0x4000),
                (0x800_8000, 0x4000),
                (0x800_c000, 0x4000),
                (0x801_0000, 0x1_0000),
                (0x802_0000, 0x2_0000),
                (0x804_0000, 0x2_0000),
                (0x806_0000, 0x2_0000),
            ]
        );
    }

    #[test]
    fn sectors_covering_spans_band_boundaries() {
        let props = multiple_sizes();
        let table = SectorTable::new(&props);

        let sectors: Vec<u64> = table
            .sectors_covering(0x800_c100, 0x1_4000)
            .unwrap()
            .map(|s| s.base_address)
            .collect();

        assert_eq!(sectors, vec![0x800_c000, 0x801_0000, 0x802_0000]);
    }

    #[test]
    fn sectors_covering_is_exact_and_restartable() {
        let props = multiple_sizes();
        let table = SectorTable::new(&props);

        for (start, length) in [(0x800_0000, 1), (0x800_3fff, 2), (0x800_1000, 0x7_f000), (0x807_ffff, 1)] {
            let iter = table.sectors_covering(start, length).unwrap();
            let sectors: Vec<SectorInfo> = iter.clone().collect();

            // Contiguous, no overlap.
            for pair in sectors.windows(2) {
                assert_eq!(pair[0].base_address + pair[0].size, pair[1].base_address);
            }

            let first = sectors.first().unwrap();
            let last = sectors.last().unwrap();
            assert!(first.base_address <= start);
            assert!(last.base_address < start + length);
            assert!(last.base_address + last.size >= start + length);

            assert_eq!(iter.collect::<Vec<_>>(), sectors);
        }
    }

    #[test]
    fn sectors_covering_zero_length() {
        let props = multiple_sizes();
        let table = SectorTable::new(&props);

        assert_eq!(table.sectors_covering(0x800_0000, 0).unwrap().count(), 0);
    }

    #[test]
    fn sectors_covering_out_of_range() {
        let props = multiple_sizes();
        let table = SectorTable::new(&props);

        assert!(table.sectors_covering(0x807_f000, 0x2000).is_err());
        assert!(table.sectors_covering(0x700_0000, 0x10).is_err());
    }

    #[test]
    fn page_lookup() {
        let props = properties(0x1008..0x2008, &[(0x100, 0x0)]);
        let table = SectorTable::new(&props);

        assert_eq!(
            table.page_at(0x1019),
            Ok(PageInfo {
                base_address: 0x1018,
                size: 0x10
            })
        );
    }

    #[test]
    fn validate_accepts_irregular_layout() {
        assert_eq!(SectorTable::new(&multiple_sizes()).validate("algo"), Ok(()));
    }

    #[test_case(&[(0x1000, 0x100)], 0; "first band not at zero")]
    #[test_case(&[(0x1000, 0x0), (0x1000, 0x1800)], 0x1800; "band not a multiple")]
    #[test_case(&[(0x1000, 0x0), (0x2000, 0x0)], 0x0; "unsorted")]
    #[test_case(&[(0x3000, 0x0)], 0x1_0000; "range not a multiple")]
    fn validate_rejects_gaps(sectors: &[(u64, u64)], offset: u64) {
        let props = properties(0x0..0x1_0000, sectors);

        assert_eq!(
            SectorTable::new(&props).validate("algo"),
            Err(ConfigurationError::SectorGap {
                algorithm: "algo".to_string(),
                offset
            })
        );
    }

    #[test]
    fn validate_rejects_page_size_mismatch() {
        let props = FlashProperties {
            page_size: 0x300,
            ..properties(0x0..0x1_0000, &[(0x1000, 0x0)])
        };

        assert_eq!(
            SectorTable::new(&props).validate("algo"),
            Err(ConfigurationError::PageSizeMismatch {
                algorithm: "algo".to_string(),
                page_size: 0x300,
                sector_size: 0x1000
            })
        );
    }
}
