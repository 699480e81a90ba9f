//! Derives granule-dependent geometry and control-register values from the
//! user's exception level, granule, and VA-width parameters.

use snafu::Snafu;

use crate::region::MemType;

/// Translation granule size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granule {
    Size4K,
    Size16K,
    Size64K,
}

impl Granule {
    pub const fn bytes(self) -> u64 {
        match self {
            Granule::Size4K => 4 * 1024,
            Granule::Size16K => 16 * 1024,
            Granule::Size64K => 64 * 1024,
        }
    }

    /// `TG0` field encoding for `TCR_ELn`.
    pub const fn tg0(self) -> u64 {
        match self {
            Granule::Size4K => 0,
            Granule::Size16K => 2,
            Granule::Size64K => 1,
        }
    }

    pub fn from_str_token(s: &str) -> Option<Granule> {
        Some(match s {
            "4K" => Granule::Size4K,
            "16K" => Granule::Size16K,
            "64K" => Granule::Size64K,
            _ => return None,
        })
    }
}

/// Exception level the translation regime is programmed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionLevel {
    EL1,
    EL2,
    EL3,
}

impl ExceptionLevel {
    pub const fn as_u8(self) -> u8 {
        match self {
            ExceptionLevel::EL1 => 1,
            ExceptionLevel::EL2 => 2,
            ExceptionLevel::EL3 => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<ExceptionLevel> {
        Some(match v {
            1 => ExceptionLevel::EL1,
            2 => ExceptionLevel::EL2,
            3 => ExceptionLevel::EL3,
            _ => return None,
        })
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ConfigError {
    #[snafu(display("table region size {tsz} bits is not one of 32, 36, 40, 48"))]
    InvalidTsz { tsz: u32 },
    #[snafu(display("table base address {ttbr:#x} is not aligned to the granule size"))]
    MisalignedTtbr { ttbr: u64 },
}

/// Derived MMU geometry and control-register values for one generation.
/// Immutable for the life of the generation.
#[derive(Debug, Clone)]
pub struct MmuConfig {
    pub el: ExceptionLevel,
    pub granule: Granule,
    pub tsz: u32,
    pub large_page: bool,
    pub ttbr: u64,

    pub entries_per_table: u64,
    pub block_offset_bits: u32,
    pub table_idx_bits: u32,
    pub table_idx_mask: u64,
    pub start_level: u8,
}

impl MmuConfig {
    pub fn try_new(
        el: ExceptionLevel,
        granule: Granule,
        tsz: u32,
        large_page: bool,
        ttbr: u64,
    ) -> Result<Self, ConfigError> {
        if !matches!(tsz, 32 | 36 | 40 | 48) {
            return Err(ConfigError::InvalidTsz { tsz });
        }
        if ttbr % granule.bytes() != 0 {
            return Err(ConfigError::MisalignedTtbr { ttbr });
        }

        let entries_per_table = granule.bytes() / 8;
        let block_offset_bits = granule.bytes().trailing_zeros();
        let table_idx_bits = entries_per_table.trailing_zeros();
        let table_idx_mask = entries_per_table - 1;

        let mut start_level = 3i32 - ((tsz - block_offset_bits) / table_idx_bits) as i32;
        if (tsz - block_offset_bits) % table_idx_bits == 0 {
            start_level += 1;
        }

        Ok(MmuConfig {
            el,
            granule,
            tsz,
            large_page,
            ttbr,
            entries_per_table,
            block_offset_bits,
            table_idx_bits,
            table_idx_mask,
            start_level: start_level as u8,
        })
    }

    /// The VA span covered by one entry of a table at `level`.
    pub fn chunk_at_level(&self, level: u8) -> u64 {
        self.granule.bytes() << ((3 - level as u32) * self.table_idx_bits)
    }

    /// `MAIR_ELn` value: each memory type's encoding in its 8-bit slot,
    /// indexed by ordinal.
    pub fn mair(&self) -> u64 {
        MemType::ALL
            .iter()
            .fold(0u64, |acc, mt| acc | ((mt.mair_encoding() as u64) << (mt.ordinal() * 8)))
    }

    /// `TCR_ELn` value.
    pub fn tcr(&self) -> u64 {
        let mut v: u64 = 0;
        let t0sz = (64 - self.tsz) as u64;
        v |= t0sz & 0x3f; // T0SZ, bits 5:0
        v |= 1 << 8; // IRGN0: WB RAWA
        v |= 1 << 10; // ORGN0: WB RAWA
        v |= 0b11 << 12; // SH0: Inner Shareable
        v |= self.granule.tg0() << 14; // TG0
        v |= 1 << 23; // RES1

        let ps = match self.tsz {
            32 => 0u64,
            36 => 1,
            40 => 2,
            48 => 5,
            _ => unreachable!("tsz validated in try_new"),
        };
        if self.el.as_u8() == 1 {
            v |= ps << 32;
        } else {
            v |= ps << 16;
            v |= 1 << 31; // RES1
        }
        v
    }

    /// `SCTLR_ELn` value: M, C, I all set.
    pub fn sctlr(&self) -> u64 {
        (1 << 0) | (1 << 2) | (1 << 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(tsz: u32, granule: Granule) -> MmuConfig {
        MmuConfig::try_new(ExceptionLevel::EL1, granule, tsz, false, 0x8000_0000).unwrap()
    }

    #[test]
    fn start_level_4k_tsz32() {
        // spec scenarios use TTBR=0x80000000, EL1, 4K granule, TSZ=32.
        let c = conf(32, Granule::Size4K);
        assert_eq!(c.start_level, 1);
        assert_eq!(c.entries_per_table, 512);
        assert_eq!(c.block_offset_bits, 12);
        assert_eq!(c.table_idx_bits, 9);
    }

    #[test]
    fn mair_matches_spec_encoding_table() {
        let c = conf(32, Granule::Size4K);
        let mair = c.mair();
        assert_eq!(mair & 0xff, 0x00);
        assert_eq!((mair >> 8) & 0xff, 0x04);
        assert_eq!((mair >> 16) & 0xff, 0x0c);
        assert_eq!((mair >> 24) & 0xff, 0x44);
        assert_eq!((mair >> 32) & 0xff, 0xbb);
        assert_eq!((mair >> 40) & 0xff, 0xff);
    }

    #[test]
    fn rejects_unsupported_tsz() {
        assert_eq!(
            MmuConfig::try_new(ExceptionLevel::EL1, Granule::Size4K, 33, false, 0x8000_0000),
            Err(ConfigError::InvalidTsz { tsz: 33 })
        );
    }

    #[test]
    fn rejects_misaligned_ttbr() {
        assert_eq!(
            MmuConfig::try_new(ExceptionLevel::EL1, Granule::Size4K, 32, false, 0x1001),
            Err(ConfigError::MisalignedTtbr { ttbr: 0x1001 })
        );
    }

    #[test]
    fn tcr_t0sz_and_ps_for_el1() {
        let c = conf(32, Granule::Size4K);
        let tcr = c.tcr();
        assert_eq!(tcr & 0x3f, 64 - 32);
        assert_eq!((tcr >> 32) & 0b111, 0); // PS=0 for tsz=32
        assert_eq!((tcr >> 23) & 1, 1); // RES1
    }
}
