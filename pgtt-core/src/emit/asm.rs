use core::fmt;

use crate::descriptor::{descriptor_template, CompatMode};
use crate::mmu_config::MmuConfig;
use crate::table::{Allocator, Entry};

fn mk_table(table_idx: usize, addr: u64, chunk: u64) -> String {
    format!(
        "\n\
    program_table_{table_idx}:\n\n\
        LDR     x8, ={addr:#x}          // base address of this table\n\
        LDR     x9, ={chunk:#x}         // chunk size"
    )
}

fn mk_blocks(table_idx: usize, entry_idx_start: usize, num_contig: u32, pa: u64, template: u64) -> String {
    let label_suffix = if num_contig > 1 {
        format!("_to_{}", entry_idx_start as u32 + num_contig - 1)
    } else {
        String::new()
    };
    format!(
        "\n\n\
    program_table_{table_idx}_entry_{entry_idx_start}{label_suffix}:\n\n\
        LDR     x10, ={entry_idx_start}                 // idx\n\
        LDR     x11, ={num_contig}        // number of contiguous entries\n\
        LDR     x12, ={pa:#x}         // output address of entry[idx]\n\
        LDR     x13, ={template:#x}\n\
    1:\n\
        ORR     x12, x12, x13    // merge output address with template\n\
        STR     X12, [x8, x10, lsl #3]      // write entry into table\n\
        ADD     x10, x10, #1                // prepare for next entry idx+1\n\
        ADD     x12, x12, x9                // add chunk to address\n\
        SUBS    x11, x11, #1                // loop as required\n\
        B.NE    1b"
    )
}

fn mk_next_level_table(parent_table_idx: usize, entry_idx: usize, child_addr: u64) -> String {
    format!(
        "\n\n\
    program_table_{parent_table_idx}_entry_{entry_idx}:\n\n\
        LDR     x10, ={entry_idx}                 // idx\n\
        LDR     x11, ={child_addr:#x}    // next-level table address\n\
        ORR     x11, x11, #0x3              // next-level table descriptor\n\
        STR     x11, [x8, x10, lsl #3]      // write entry into table"
    )
}

fn mk_tables_body(alloc: &Allocator, compat: CompatMode) -> String {
    let mut s = String::new();
    for (table_idx, table) in alloc.tables().iter().enumerate() {
        s.push_str(&mk_table(table_idx, table.addr, table.chunk));
        // `entries` only carries the head index of a contiguous run, so
        // ascending iteration already skips the indices a run subsumes.
        for (&idx, entry) in table.entries.iter() {
            match entry {
                Entry::Table(child_id) => {
                    let child_addr = alloc.tables()[*child_id].addr;
                    s.push_str(&mk_next_level_table(table_idx, idx, child_addr));
                }
                Entry::Leaf(placement) => {
                    let template = descriptor_template(
                        placement.region.mem_type,
                        placement.region.mem_attr,
                        placement.is_page,
                        compat,
                    );
                    s.push_str(&mk_blocks(table_idx, idx, placement.num_contig, placement.region.pa, template));
                }
            }
        }
    }
    s
}

/// Pad the code portion of every line containing `//` so the comment starts
/// at column 41, skipping ` * ` block-comment continuation lines (those
/// contain an unrelated `//` inside a URL, not a trailing comment).
fn align_comments(text: &str) -> String {
    let mut out = String::new();
    for line in text.split('\n') {
        if line.contains("//") && !line.contains(" * ") {
            let idx = line.find("//").unwrap();
            let code = line[..idx].trim_end();
            let comment = &line[idx..];
            out.push_str(code);
            let pad = 41usize.saturating_sub(code.len());
            for _ in 0..pad {
                out.push(' ');
            }
            out.push_str(comment);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Render the AArch64 assembly that programs `alloc`'s tables at runtime.
///
/// When `gen_table_runtime` is false, the per-table/per-entry programming
/// block is omitted but the lock, init flag, zeroing loop and
/// register-programming epilogue remain.
pub fn emit_assembly(
    alloc: &Allocator,
    mmu: &MmuConfig,
    compat: CompatMode,
    gen_table_runtime: bool,
    out: &mut impl fmt::Write,
) -> fmt::Result {
    let ttbr = alloc.ttbr();
    let table_region_len = mmu.granule.bytes() * alloc.tables().len() as u64;
    let el = mmu.el.as_u8();
    let tables_body = if gen_table_runtime {
        mk_tables_body(alloc, compat)
    } else {
        String::new()
    };

    let raw = format!(
        r#"
    /*
     * Generated AArch64 stage-1 translation table programming routine.
     *
     * The memory region containing these translation tables must itself be
     * mapped as Normal memory.
     */

        .section .data.mmu
        .balign 2

        mmu_lock: .4byte 0                  // lock to ensure only 1 CPU runs init
        #define LOCKED 1

        mmu_init: .4byte 0                  // whether init has been run
        #define INITIALISED 1

        .section .text.mmu_on
        .balign 2
        .global mmu_on
        .type mmu_on, @function

    mmu_on:

        ADRP    x0, mmu_lock                // get page containing mmu_lock
        ADD     x0, x0, :lo12:mmu_lock      // restore low 12 bits lost by ADRP
        MOV     w1, #LOCKED
        SEVL                                // first pass won't sleep
    1:
        WFE                                 // sleep on retry
        LDAXR   w2, [x0]                    // read mmu_lock
        CBNZ    w2, 1b                       // not available, go back to sleep
        STXR    w3, w1, [x0]                // try to acquire mmu_lock
        CBNZ    w3, 1b                       // failed, go back to sleep

    check_already_initialised:

        ADRP    x1, mmu_init                // get page containing mmu_init
        ADD     x1, x1, :lo12:mmu_init      // restore low 12 bits lost by ADRP
        LDR     w2, [x1]                    // read mmu_init
        CBNZ    w2, end                      // init already done, skip to the end

    zero_out_tables:

        LDR     x2, ={ttbr_hex}        // address of first table
        LDR     x3, ={len_hex}   // combined length of all tables
        LSR     x3, x3, #5                  // number of required STP instructions
        FMOV    d0, xzr                      // clear q0
    1:
        STP     q0, q0, [x2], #32           // zero out 4 table entries at a time
        SUBS    x3, x3, #1
        B.NE    1b

    {tables_body}

    init_done:

        MOV     w2, #INITIALISED
        STR     w2, [x1]

    end:

        LDR     x1, ={ttbr_dec}             // program ttbr0 on this CPU
        MSR     ttbr0_el{el}, x1
        LDR     x1, ={mair_hex}             // program mair on this CPU
        MSR     mair_el{el}, x1
        LDR     x1, ={tcr_hex}              // program tcr on this CPU
        MSR     tcr_el{el}, x1
        ISB
        MRS     x2, tcr_el{el}              // verify CPU supports desired config
        CMP     x2, x1
        B.NE    .
        LDR     x1, ={sctlr_hex}            // program sctlr on this CPU
        MSR     sctlr_el{el}, x1
        ISB                                  // synchronize context on this CPU
        STLR    wzr, [x0]                   // release mmu_lock
        RET                                  // done!
    "#,
        ttbr_hex = format!("{:#x}", ttbr),
        len_hex = format!("{:#x}", table_region_len),
        tables_body = tables_body,
        ttbr_dec = ttbr,
        mair_hex = format!("{:#x}", mmu.mair()),
        tcr_hex = format!("{:#x}", mmu.tcr()),
        sctlr_hex = format!("{:#x}", mmu.sctlr()),
        el = el,
    );

    out.write_str(&align_comments(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu_config::ExceptionLevel;
    use crate::region::{MemAttr, MemType, Region};
    use crate::table::map;
    use crate::Granule;

    fn build_single_block() -> (Allocator, MmuConfig) {
        let mmu = MmuConfig::try_new(ExceptionLevel::EL1, Granule::Size4K, 32, true, 0x8000_0000)
            .unwrap();
        let mut alloc = Allocator::new(mmu.ttbr, mmu.granule.bytes(), None);
        let root = alloc.build_root(&mmu).unwrap();
        let region = Region::new(
            "dram",
            0,
            0x4000_0000,
            0x4000_0000,
            0x4000_0000,
            MemType::Normal,
            MemAttr::default_rwx(),
        );
        map(&mut alloc, &mmu, root, region).unwrap();
        (alloc, mmu)
    }

    #[test]
    fn comments_land_on_column_41() {
        let text = align_comments("        MOV     w1, #LOCKED\n");
        let idx = text.find("//");
        assert!(idx.is_none()); // no comment on this particular line
        let text = align_comments("    CBNZ    w2, 1b // not available\n");
        let idx = text.find("//").unwrap();
        assert_eq!(idx, 41);
    }

    #[test]
    fn block_comment_urls_are_left_alone() {
        let text = align_comments("     * See: https://example.com/tool\n");
        assert!(text.contains("https://example.com/tool"));
    }

    #[test]
    fn emits_table_and_entry_labels() {
        let (alloc, mmu) = build_single_block();
        let mut out = String::new();
        emit_assembly(&alloc, &mmu, CompatMode::Default, true, &mut out).unwrap();
        assert!(out.contains("program_table_0:"));
        assert!(out.contains("program_table_0_entry_1:"));
        assert!(out.contains("mmu_on:"));
        assert!(out.contains("STLR    wzr, [x0]"));
    }

    #[test]
    fn omits_table_body_when_runtime_programming_disabled() {
        let (alloc, mmu) = build_single_block();
        let mut out = String::new();
        emit_assembly(&alloc, &mmu, CompatMode::Default, false, &mut out).unwrap();
        assert!(!out.contains("program_table_0:"));
        assert!(out.contains("mmu_on:"));
        assert!(out.contains("zero_out_tables:"));
    }

    #[test]
    fn contiguous_run_gets_a_range_label() {
        let mmu = MmuConfig::try_new(ExceptionLevel::EL1, Granule::Size4K, 32, true, 0x8000_0000)
            .unwrap();
        let mut alloc = Allocator::new(mmu.ttbr, mmu.granule.bytes(), None);
        let root = alloc.build_root(&mmu).unwrap();
        let region = Region::new(
            "ram2",
            0,
            0x1_0000_0000,
            0x1_0000_0000,
            0x800_0000,
            MemType::Normal,
            MemAttr::default_rwx(),
        );
        map(&mut alloc, &mmu, root, region).unwrap();
        let mut out = String::new();
        emit_assembly(&alloc, &mmu, CompatMode::Default, true, &mut out).unwrap();
        assert!(out.contains("_entry_0_to_63:"));
    }
}
