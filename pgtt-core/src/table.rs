//! The table builder: recursively allocates translation tables and places
//! block/page entries, splitting regions that do not align to a chunk.
//!
//! This is the pivotal algorithm the rest of the system relies on. It
//! replaces the upstream tool's process-wide, ever-growing list of
//! allocated tables with an explicit [`Allocator`] value constructed fresh
//! per generation — nothing survives between invocations, and nothing
//! needs to be reset.

use std::collections::BTreeMap;

use crate::error::BuildError;
use crate::mmu_config::{Granule, MmuConfig};
use crate::region::Region;

/// A leaf placement: a region together with the placement-local
/// properties that depend on *where* it ended up, not on the region
/// itself. The same `Region` could, in principle, appear in more than
/// one placement.
#[derive(Debug, Clone)]
pub struct Placement {
    pub region: Region,
    /// Count of consecutive table entries, starting at this placement's
    /// index, that describe one physically contiguous run. Entries
    /// `index+1 ..= index+num_contig-1` are absent from the table's entry
    /// map; they are reconstructed from this head entry on emission.
    pub num_contig: u32,
    /// True iff this placement was made at level 3 (a page), false for a
    /// block entry at level 1 or 2.
    pub is_page: bool,
}

/// One entry in a translation table: either a leaf placement or a pointer
/// to a child table.
#[derive(Debug, Clone)]
pub enum Entry {
    Table(TableId),
    Leaf(Placement),
}

/// Index into an [`Allocator`]'s table arena. Tables are never freed
/// within one generation, so this index is stable for the arena's
/// lifetime.
pub type TableId = usize;

/// A translation table at some level.
#[derive(Debug)]
pub struct TableNode {
    /// Physical base address. The k-th allocated table sits at
    /// `ttbr + k * granule`.
    pub addr: u64,
    pub level: u8,
    /// VA span covered by each entry of this table.
    pub chunk: u64,
    /// VA mapped by entry 0.
    pub va_base: u64,
    pub entries: BTreeMap<usize, Entry>,
}

/// Owns every table allocated during one generation and hands out their
/// physical addresses in allocation order.
pub struct Allocator {
    ttbr: u64,
    granule_bytes: u64,
    table_limit: Option<usize>,
    tables: Vec<TableNode>,
}

impl Allocator {
    pub fn new(ttbr: u64, granule_bytes: u64, table_limit: Option<usize>) -> Self {
        Allocator {
            ttbr,
            granule_bytes,
            table_limit,
            tables: Vec::new(),
        }
    }

    pub fn ttbr(&self) -> u64 {
        self.ttbr
    }

    pub fn tables(&self) -> &[TableNode] {
        &self.tables
    }

    fn allocate(&mut self, level: u8, chunk: u64, va_base: u64) -> Result<TableId, BuildError> {
        if let Some(limit) = self.table_limit {
            if self.tables.len() >= limit {
                return Err(BuildError::TableBudgetExceeded { limit });
            }
        }
        let addr = self.ttbr + (self.tables.len() as u64) * self.granule_bytes;
        let id = self.tables.len();
        self.tables.push(TableNode {
            addr,
            level,
            chunk,
            va_base,
            entries: BTreeMap::new(),
        });
        Ok(id)
    }

    /// Allocate the root table for one generation.
    pub fn build_root(&mut self, mmu: &MmuConfig) -> Result<TableId, BuildError> {
        let chunk = mmu.chunk_at_level(mmu.start_level);
        self.allocate(mmu.start_level, chunk, 0)
    }
}

/// A level is splittable into a child table of pages/blocks when the
/// granule permits it and the level isn't already the leaf level.
fn can_split_level(granule: Granule, level: u8) -> bool {
    let min_splittable = match granule {
        Granule::Size4K => 1,
        Granule::Size16K | Granule::Size64K => 2,
    };
    level >= min_splittable && level < 3
}

fn ensure_child(
    alloc: &mut Allocator,
    mmu: &MmuConfig,
    table: TableId,
    idx: usize,
    va_base_override: Option<u64>,
) -> Result<TableId, BuildError> {
    if let Some(entry) = alloc.tables[table].entries.get(&idx) {
        return match entry {
            Entry::Table(id) => Ok(*id),
            Entry::Leaf(p) => Err(BuildError::Overlap {
                label: p.region.label.clone(),
                table_addr: alloc.tables[table].addr,
                index: idx,
            }),
        };
    }

    let (level, chunk, va_base) = {
        let parent = &alloc.tables[table];
        (parent.level, parent.chunk, parent.va_base)
    };
    let child_level = level + 1;
    let child_chunk = chunk / mmu.entries_per_table;
    let child_va_base = va_base_override.unwrap_or(va_base + idx as u64 * chunk);

    let child = alloc.allocate(child_level, child_chunk, child_va_base)?;
    alloc.tables[table].entries.insert(idx, Entry::Table(child));
    Ok(child)
}

fn insert_leaf(
    alloc: &mut Allocator,
    table: TableId,
    idx: usize,
    placement: Placement,
) -> Result<(), BuildError> {
    if alloc.tables[table].entries.contains_key(&idx) {
        return Err(BuildError::Overlap {
            label: placement.region.label,
            table_addr: alloc.tables[table].addr,
            index: idx,
        });
    }
    alloc.tables[table].entries.insert(idx, Entry::Leaf(placement));
    Ok(())
}

/// Map `region` into `table`, splitting and dispatching to child tables as
/// required. Called on the root table with each user region, in input
/// order.
///
/// Preconditions: `region.va >= table.va_base` and
/// `region.va + region.size <= table.va_base + entries_per_table * table.chunk`.
/// Regions must already be granule-aligned by the caller.
pub fn map(alloc: &mut Allocator, mmu: &MmuConfig, table: TableId, region: Region) -> Result<(), BuildError> {
    let (level, chunk, va_base) = {
        let t = &alloc.tables[table];
        (t.level, t.chunk, t.va_base)
    };

    if region.va < va_base || region.va + region.size > va_base + mmu.entries_per_table * chunk {
        return Err(BuildError::GeometryViolation {
            label: region.label,
            va: region.va,
        });
    }

    let shift = (3 - level as u32) * mmu.table_idx_bits + mmu.block_offset_bits;
    let mut start_idx = ((region.va >> shift) & mmu.table_idx_mask) as usize;

    // Floating region: the entire region lies inside one chunk.
    if region.size < chunk {
        log::debug!(
            "level {level}: floating region '{}' at {:#x}, descending",
            region.label,
            region.va
        );
        let child = ensure_child(alloc, mmu, table, start_idx, None)?;
        return map(alloc, mmu, child, region);
    }

    let mut region = region;

    // Underflow: region.va is not chunk-aligned.
    let underflow = region.va % chunk;
    if underflow != 0 {
        let delta = chunk - underflow;
        log::debug!(
            "level {level}: underflow {delta:#x} in region '{}', dispatching head chunk",
            region.label
        );
        let head = region.sub_range(region.va, region.pa, delta);
        let child = ensure_child(alloc, mmu, table, start_idx, None)?;
        map(alloc, mmu, child, head)?;
        start_idx += 1;
        region.va += delta;
        region.pa += delta;
        region.size -= delta;
    }

    // Overflow: region.va + region.size is not chunk-aligned. end_va/end_pa
    // are invariant under the underflow adjustment above (va and pa each
    // moved forward by exactly the amount size shrank), so recomputing them
    // here handles a region straddling both a leading and trailing partial
    // chunk correctly without extra bookkeeping.
    let end_va = region.va + region.size;
    let end_pa = region.pa + region.size;
    let overflow = end_va % chunk;
    if overflow != 0 {
        let final_idx = ((end_va >> shift) & mmu.table_idx_mask) as usize;
        let tail_va = (end_va / chunk) * chunk;
        let tail_pa = end_pa - (end_va - tail_va);
        log::debug!(
            "level {level}: overflow {overflow:#x} in region '{}', dispatching tail chunk",
            region.label
        );
        let tail = region.sub_range(tail_va, tail_pa, overflow);
        let child = ensure_child(alloc, mmu, table, final_idx, Some(tail_va))?;
        map(alloc, mmu, child, tail)?;
        // Shrink by exactly the dispatched tail (`overflow`), not
        // `chunk - overflow`: the remainder must be a whole multiple of
        // `chunk` starting at the (unchanged) `start_idx`. Subtracting
        // `chunk - overflow` instead silently drops whole chunks whenever
        // `overflow < chunk/2` — see the `overflow_split_preserves_all_whole_chunks`
        // regression test below.
        region.size -= overflow;
    }

    // Remaining whole chunks.
    let num_chunks = (region.size / chunk) as usize;
    let can_split = can_split_level(mmu.granule, level) && !mmu.large_page;
    let mut count = 0u32;

    for i in start_idx..start_idx + num_chunks {
        let va_i = va_base + i as u64 * chunk;
        let pa_i = region.pa + (i - start_idx) as u64 * chunk;

        if can_split {
            log::debug!("level {level}: pushing whole chunk at index {i} down a level");
            let child = ensure_child(alloc, mmu, table, i, None)?;
            let r = region.sub_range(va_i, pa_i, chunk);
            map(alloc, mmu, child, r)?;
        } else if i == start_idx {
            log::debug!("level {level}: placing block/page run starting at index {i}");
            let r = region.sub_range(va_i, pa_i, chunk);
            insert_leaf(
                alloc,
                table,
                i,
                Placement {
                    region: r,
                    num_contig: 1,
                    is_page: level == 3,
                },
            )?;
        }
        count += 1;
    }

    if !can_split && count > 0 {
        if let Some(Entry::Leaf(p)) = alloc.tables[table].entries.get_mut(&start_idx) {
            p.num_contig = count;
        }
    }

    Ok(())
}
