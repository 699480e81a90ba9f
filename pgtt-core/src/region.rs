//! The region model: a single requested virtual-to-physical mapping.

use core::fmt;

/// The six AArch64 stage-1 memory types, ordinal-ordered to match their
/// slot in the MAIR register (bits 4:2 of a descriptor index this ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MemType {
    DeviceNGnRnE = 0,
    DeviceNGnRE = 1,
    DeviceGRE = 2,
    NormalNC = 3,
    NormalWT = 4,
    Normal = 5,
}

impl MemType {
    /// All variants in MAIR slot order.
    pub const ALL: [MemType; 6] = [
        MemType::DeviceNGnRnE,
        MemType::DeviceNGnRE,
        MemType::DeviceGRE,
        MemType::NormalNC,
        MemType::NormalWT,
        MemType::Normal,
    ];

    /// The MAIR attribute encoding byte for this memory type.
    pub const fn mair_encoding(self) -> u8 {
        match self {
            MemType::DeviceNGnRnE => 0x00,
            MemType::DeviceNGnRE => 0x04,
            MemType::DeviceGRE => 0x0c,
            MemType::NormalNC => 0x44,
            MemType::NormalWT => 0xbb,
            MemType::Normal => 0xff,
        }
    }

    /// The ordinal used for bits 4:2 (`AttrIndx`) of a descriptor.
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Parse the upstream memory-map document's type name (e.g.
    /// `"DEVICE_nGnRnE"`, `"NORMAL"`).
    pub fn from_name(name: &str) -> Option<MemType> {
        Some(match name {
            "DEVICE_nGnRnE" => MemType::DeviceNGnRnE,
            "DEVICE_nGnRE" => MemType::DeviceNGnRE,
            "DEVICE_GRE" => MemType::DeviceGRE,
            "NORMAL_NC" => MemType::NormalNC,
            "NORMAL_WT" => MemType::NormalWT,
            "NORMAL" => MemType::Normal,
            _ => return None,
        })
    }
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemType::DeviceNGnRnE => "DEVICE_nGnRnE",
            MemType::DeviceNGnRE => "DEVICE_nGnRE",
            MemType::DeviceGRE => "DEVICE_GRE",
            MemType::NormalNC => "NORMAL_NC",
            MemType::NormalWT => "NORMAL_WT",
            MemType::Normal => "NORMAL",
        };
        f.write_str(s)
    }
}

/// Access permission / execute-never / non-secure attributes parsed from a
/// region's attribute string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAttr {
    /// `AP[2:1]` as it lands in descriptor bits 7:6. EL0 access is always
    /// enabled by construction, so only two encodings are meaningful here.
    pub ap: u8,
    /// Execute-never.
    pub xn: bool,
    /// Non-secure.
    pub ns: bool,
}

impl MemAttr {
    /// `AP` encoding for a read-write region (EL0+EL1 read-write).
    pub const RW: u8 = 0b01;
    /// `AP` encoding for a read-only region (EL0+EL1 read-only).
    pub const RO: u8 = 0b11;

    /// A read-write, executable, secure region — the default when an
    /// attribute string carries none of `!w`, `!x`, `!s`.
    pub const fn default_rwx() -> Self {
        MemAttr {
            ap: Self::RW,
            xn: false,
            ns: false,
        }
    }
}

/// A single requested virtual-to-physical mapping.
///
/// Deliberately carries no `is_page`/`num_contig` fields: both are
/// properties of where a region ends up *placed* in the table tree, not
/// of the region's own identity, so the table builder wraps a `Region`
/// in a [`crate::table::Placement`] once it knows the placement level
/// instead of mutating the caller's region in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub label: String,
    pub lineno: usize,
    pub va: u64,
    pub pa: u64,
    pub size: u64,
    pub mem_type: MemType,
    pub mem_attr: MemAttr,
}

impl Region {
    pub fn new(
        label: impl Into<String>,
        lineno: usize,
        va: u64,
        pa: u64,
        size: u64,
        mem_type: MemType,
        mem_attr: MemAttr,
    ) -> Self {
        Region {
            label: label.into(),
            lineno,
            va,
            pa,
            size,
            mem_type,
            mem_attr,
        }
    }

    /// A copy of this region describing a sub-range `[va, va+size)`,
    /// carrying the same label/type/attributes.
    pub fn sub_range(&self, va: u64, pa: u64, size: u64) -> Region {
        Region {
            va,
            pa,
            size,
            ..self.clone()
        }
    }
}
