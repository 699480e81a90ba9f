//! Errors raised while loading and converting a memory-map document. Table
//! construction errors (`pgtt_core::BuildError`) and MMU geometry errors
//! (`pgtt_core::ConfigError`) are wrapped here rather than duplicated.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    #[snafu(display("could not read config file {path}: {source}"))]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("malformed JSON in {path}: {source}"))]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display("invalid address '{value}'"))]
    BadAddress { value: String },

    #[snafu(display("invalid size '{value}', expected <N><K|M|G|T>"))]
    BadSize { value: String },

    #[snafu(display("unrecognised granule '{value}', expected 4K, 16K, or 64K"))]
    BadGranule { value: String },

    #[snafu(display("invalid excepiton_level '{value}', expected 1, 2, or 3"))]
    BadExceptionLevel { value: String },

    #[snafu(display("unrecognised memory type '{value}'"))]
    BadMemType { value: String },

    #[snafu(display("bad attribute string on region '{label}': {source}"))]
    BadAttr {
        label: String,
        source: pgtt_core::AttrError,
    },

    #[snafu(display("invalid MMU configuration: {source}"))]
    MmuConfig { source: pgtt_core::ConfigError },

    #[snafu(display("failed to build translation tables: {source}"))]
    Build { source: pgtt_core::BuildError },

    #[snafu(display("could not write output file {path}: {source}"))]
    Write {
        path: String,
        source: std::io::Error,
    },
}
