//! Errors raised while building the translation table tree.

use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum BuildError {
    #[snafu(display(
        "region '{label}' at {va:#x} falls outside the root table's virtual address window"
    ))]
    GeometryViolation { label: String, va: u64 },

    #[snafu(display(
        "region '{label}' overlaps an already-placed entry at table {table_addr:#x} index {index}"
    ))]
    Overlap {
        label: String,
        table_addr: u64,
        index: usize,
    },

    #[snafu(display("translation table budget of {limit} tables exceeded"))]
    TableBudgetExceeded { limit: usize },
}
