use std::io::{self, Write};

use crate::descriptor::{descriptor_template, CompatMode};
use crate::mmu_config::MmuConfig;
use crate::table::{Allocator, Entry};

/// Write the binary table image: `granule * tables.len()` bytes,
/// little-endian 64-bit descriptors at `table_index*granule + entry_index*8`.
pub fn emit_binary(
    alloc: &Allocator,
    mmu: &MmuConfig,
    compat: CompatMode,
    out: &mut impl Write,
) -> io::Result<()> {
    let granule = mmu.granule.bytes() as usize;
    let mut buf = vec![0u8; granule * alloc.tables().len()];

    for table in alloc.tables() {
        let table_offset = (table.addr - alloc.ttbr()) as usize;

        for (&idx, entry) in table.entries.iter() {
            match entry {
                Entry::Table(child_id) => {
                    let child_addr = alloc.tables()[*child_id].addr;
                    let word = child_addr | 0x3;
                    let off = table_offset + idx * 8;
                    buf[off..off + 8].copy_from_slice(&word.to_le_bytes());
                }
                Entry::Leaf(placement) => {
                    let template = descriptor_template(
                        placement.region.mem_type,
                        placement.region.mem_attr,
                        placement.is_page,
                        compat,
                    );
                    for k in 0..placement.num_contig as u64 {
                        // Bitwise OR and addition coincide here: the template
                        // occupies bits disjoint from the output-address
                        // field by construction of granule-aligned addresses.
                        let word = placement.region.pa + k * table.chunk + template;
                        let off = table_offset + (idx as u64 + k) as usize * 8;
                        buf[off..off + 8].copy_from_slice(&word.to_le_bytes());
                    }
                }
            }
        }
    }

    out.write_all(&buf)
}
