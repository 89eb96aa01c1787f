//! Snapshot script assembly.
//!
//! Turns the modules selected by a graph walk into one self-contained script
//! that a host runtime can execute ahead of time and freeze into a startup
//! snapshot, together with a row index mapping script lines back to the
//! original files.
//!
//! [`generate_snapshot_script`] is the entry point; the assembler, source map
//! decoder and row index are public for hosts that need them separately.

#![warn(missing_docs)]

pub mod assembler;
pub mod error;
pub mod esm;
pub mod generate;
pub mod row_index;
pub mod source_map;

pub use assembler::{host_platform, AssemblerOptions, ScriptAssembler};
pub use error::{GenerateError, ModuleSyntaxError, ScriptError, SourceMapError};
pub use esm::lower_module_syntax;
pub use generate::{generate_snapshot_script, GenerateOptions, SnapshotArtifact};
pub use row_index::{RowIndex, RowRange, TranslatedRow, EMBEDDED, SECTIONS_FIELD};
pub use source_map::{Mapping, SourceMap};
