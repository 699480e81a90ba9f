//! Renders a built `pgtt_core::Allocator` as a console report. Purely
//! informational; gated behind the CLI's `--summary` flag. Lives in the
//! binary crate, not `pgtt-core`, since the core library takes no
//! dependency beyond a generic byte/text sink.

use prettytable::{row, Table};

use pgtt_core::Allocator;

/// Print one row per allocated table to stdout: index, level, physical
/// address, VA base, chunk size, and the number of entries actually used.
pub fn print_table_summary(alloc: &Allocator) {
    let mut table = Table::new();
    table.set_titles(row!["#", "level", "phys addr", "va base", "chunk", "entries"]);
    for (i, t) in alloc.tables().iter().enumerate() {
        table.add_row(row![
            i,
            t.level,
            format!("{:#x}", t.addr),
            format!("{:#x}", t.va_base),
            format!("{:#x}", t.chunk),
            t.entries.len(),
        ]);
    }
    table.printstd();
}
