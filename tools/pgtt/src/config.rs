//! Reads the JSON memory-map document and converts it into the validated
//! domain types the builder operates on.

use serde::Deserialize;
use snafu::ResultExt;

use pgtt_core::{ExceptionLevel, Granule, MemAttr, MemType, MmuConfig, Region};

use crate::error::{self, LoadError};

/// Drop any line that, after leading whitespace, starts with `//`. A
/// trailing `// comment` on a line carrying real content is left alone —
/// this mirrors the upstream tool's comment stripper exactly, quirks
/// included.
fn strip_comments(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_addr(value: &str) -> Result<u64, LoadError> {
    let upper = value.to_uppercase();
    let parsed = if let Some(hex) = upper.strip_prefix("0X") {
        u64::from_str_radix(hex, 16)
    } else {
        upper.parse::<u64>()
    };
    parsed.map_err(|_| LoadError::BadAddress {
        value: value.to_string(),
    })
}

fn parse_size(value: &str) -> Result<u64, LoadError> {
    let upper = value.to_uppercase();
    let (digits, unit) = upper
        .char_indices()
        .find(|(_, c)| matches!(c, 'K' | 'M' | 'G' | 'T'))
        .map(|(idx, c)| (&upper[..idx], c))
        .ok_or_else(|| LoadError::BadSize {
            value: value.to_string(),
        })?;
    let qty: u64 = digits.parse().map_err(|_| LoadError::BadSize {
        value: value.to_string(),
    })?;
    let power = match unit {
        'K' => 1,
        'M' => 2,
        'G' => 3,
        'T' => 4,
        _ => unreachable!(),
    };
    Ok(qty * 1024u64.pow(power))
}

#[derive(Debug, Deserialize)]
pub struct RawDocument {
    pub pagetables: Vec<RawPageTable>,
}

#[derive(Debug, Deserialize)]
pub struct RawPageTable {
    pub table_base_addr: String,
    #[serde(rename = "excepiton_level")]
    pub exception_level: u8,
    pub granule: String,
    pub table_region_size: u32,
    pub large_page: bool,
    pub gen_table_runtime: bool,
    pub maps: Vec<RawMap>,
}

#[derive(Debug, Deserialize)]
pub struct RawMap {
    pub va: String,
    pub pa: String,
    pub size: String,
    #[serde(rename = "type")]
    pub mem_type: String,
    pub attr: String,
    pub description: String,
}

/// One page table configuration ready for the builder: a derived MMU
/// geometry plus the granule-aligned regions to map into it.
pub struct PageTableSpec {
    pub mmu: MmuConfig,
    pub regions: Vec<Region>,
}

pub fn load_document(raw_json: &str) -> Result<RawDocument, LoadError> {
    let stripped = strip_comments(raw_json);
    serde_json::from_str(&stripped).context(error::JsonSnafu {
        path: "<config>".to_string(),
    })
}

pub fn build_page_table_spec(raw: &RawPageTable) -> Result<PageTableSpec, LoadError> {
    let ttbr = parse_addr(&raw.table_base_addr)?;
    let granule = Granule::from_str_token(&raw.granule).ok_or_else(|| LoadError::BadGranule {
        value: raw.granule.clone(),
    })?;
    let el = ExceptionLevel::from_u8(raw.exception_level).ok_or_else(|| {
        LoadError::BadExceptionLevel {
            value: raw.exception_level.to_string(),
        }
    })?;
    let mmu = MmuConfig::try_new(el, granule, raw.table_region_size, raw.large_page, ttbr)
        .context(error::MmuConfigSnafu)?;

    let regions = raw
        .maps
        .iter()
        .enumerate()
        .map(|(lineno, m)| build_region(m, lineno, granule.bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PageTableSpec { mmu, regions })
}

/// Round the requested region down/up to the granule the way the spec's
/// prose describes: `va` rounds down, `va+size` rounds up, and `pa` shifts
/// by the same amount `va` did, so the VA-to-PA offset is preserved. The
/// original tool only ever grows `size` and never moves `va` downward,
/// which silently breaks that offset whenever `va` isn't already
/// granule-aligned; this implementation follows the documented, symmetric
/// rule instead (see DESIGN.md).
fn align_region(va: u64, pa: u64, size: u64, granule: u64) -> (u64, u64, u64) {
    let down = va % granule;
    let aligned_va = va - down;
    let aligned_pa = pa - down;
    let end = va + size;
    let up = end % granule;
    let aligned_end = if up == 0 { end } else { end + (granule - up) };
    (aligned_va, aligned_pa, aligned_end - aligned_va)
}

fn build_region(raw: &RawMap, lineno: usize, granule_bytes: u64) -> Result<Region, LoadError> {
    let va = parse_addr(&raw.va)?;
    let pa = parse_addr(&raw.pa)?;
    let size = parse_size(&raw.size)?;
    let (va, pa, size) = align_region(va, pa, size, granule_bytes);

    let mem_type = MemType::from_name(&raw.mem_type).ok_or_else(|| LoadError::BadMemType {
        value: raw.mem_type.clone(),
    })?;
    let mem_attr: MemAttr =
        pgtt_core::parse_attr_string(&raw.attr).context(error::BadAttrSnafu {
            label: raw.description.clone(),
        })?;

    log::debug!(
        "maps[{lineno}] \"{}\": va={va:#x} pa={pa:#x} size={size:#x}",
        raw.description
    );

    Ok(Region::new(raw.description.clone(), lineno, va, pa, size, mem_type, mem_attr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_comment_lines_only() {
        let raw = "// a header comment\n{\n  \"x\": 1 // trailing, kept\n}\n";
        let stripped = strip_comments(raw);
        assert!(!stripped.contains("a header comment"));
        assert!(stripped.contains("trailing, kept"));
    }

    #[test]
    fn parses_hex_and_decimal_addresses() {
        assert_eq!(parse_addr("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_addr("4096").unwrap(), 4096);
    }

    #[test]
    fn parses_size_suffixes() {
        assert_eq!(parse_size("4K").unwrap(), 4 * 1024);
        assert_eq!(parse_size("128M").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn align_region_rounds_va_down_and_end_up() {
        let (va, pa, size) = align_region(0x1001, 0x2001, 0x1000, 0x1000);
        assert_eq!(va, 0x1000);
        assert_eq!(pa, 0x2000);
        assert_eq!(size, 0x2000);
    }
}
