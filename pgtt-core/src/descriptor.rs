//! The descriptor templater: produces a 64-bit descriptor prototype for a
//! region's `(type, attrs, block-vs-page)` triple. The output-address bits
//! are filled in by the placement algorithm, not here.

use crate::region::{MemAttr, MemType};

/// Selects between the architecturally-intended reading of descriptor bits
/// 53/54 and the upstream tool's reading, for anyone diffing output
/// against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompatMode {
    /// PXN/XN sourced from the region's execute-never attribute. This is
    /// what the architecture intends and what this crate defaults to.
    #[default]
    Default,
    /// PXN/XN sourced from the region's non-secure attribute, reproducing
    /// the upstream Python tool's `entry_template` byte-for-byte. The
    /// upstream source parses `xn` from the attribute string but never
    /// routes it into the descriptor; this mode preserves that divergence
    /// rather than silently fixing it.
    OriginalTool,
}

/// Build the 64-bit descriptor prototype for a leaf entry.
///
/// Bit layout (AArch64 VMSA stage-1, ARM DDI 0487 D5-2445):
/// - bit 0: valid
/// - bit 1: 1 for page/table, 0 for block
/// - bits 4:2: `AttrIndx` (MAIR ordinal)
/// - bit 5: NS
/// - bits 7:6: AP
/// - bits 9:8: SH, fixed to Inner Shareable
/// - bit 10: AF, fixed to disable Access Flag faults
/// - bits 53, 54: PXN, XN
pub fn descriptor_template(
    mem_type: MemType,
    mem_attr: MemAttr,
    is_page: bool,
    compat: CompatMode,
) -> u64 {
    let mut v: u64 = 0;
    v |= 1; // VALID
    v |= (is_page as u64) << 1;
    v |= (mem_type.ordinal() as u64) << 2;
    v |= (mem_attr.ns as u64) << 5;
    v |= (mem_attr.ap as u64) << 6;
    v |= 0b11 << 8; // Inner Shareable
    v |= 1 << 10; // AF

    let execute_never_bit = match compat {
        CompatMode::Default => mem_attr.xn as u64,
        CompatMode::OriginalTool => mem_attr.ns as u64,
    };
    v |= execute_never_bit << 53; // PXN
    v |= execute_never_bit << 54; // XN

    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_mapping_scenario() {
        // spec scenario 6: "!w!x!s" on a Normal region.
        let attr = MemAttr {
            ap: MemAttr::RO,
            xn: true,
            ns: true,
        };
        let v = descriptor_template(MemType::Normal, attr, false, CompatMode::Default);
        assert_eq!((v >> 6) & 0b11, 0b11); // AP
        assert_eq!((v >> 54) & 1, 1); // XN
        assert_eq!((v >> 5) & 1, 1); // NS
    }

    #[test]
    fn default_mode_reads_xn_not_ns() {
        let attr = MemAttr {
            ap: MemAttr::RW,
            xn: true,
            ns: false,
        };
        let v = descriptor_template(MemType::Normal, attr, true, CompatMode::Default);
        assert_eq!((v >> 53) & 1, 1);
        assert_eq!((v >> 54) & 1, 1);
    }

    #[test]
    fn compat_mode_reads_ns_not_xn() {
        let attr = MemAttr {
            ap: MemAttr::RW,
            xn: true,
            ns: false,
        };
        let v = descriptor_template(MemType::Normal, attr, true, CompatMode::OriginalTool);
        assert_eq!((v >> 53) & 1, 0);
        assert_eq!((v >> 54) & 1, 0);
    }

    #[test]
    fn valid_and_shareability_and_af_always_set() {
        let v = descriptor_template(
            MemType::DeviceNGnRnE,
            MemAttr::default_rwx(),
            false,
            CompatMode::Default,
        );
        assert_eq!(v & 1, 1);
        assert_eq!((v >> 8) & 0b11, 0b11);
        assert_eq!((v >> 10) & 1, 1);
    }
}
