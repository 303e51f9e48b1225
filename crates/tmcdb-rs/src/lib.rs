// crates/tmcdb-rs/src/lib.rs

//! Generates EPICS record databases from annotated TwinCAT TMC files.
//!
//! A compiled controller project carries free-form `pytmc` pragmas on its
//! declarations; this library parses the project XML, reconstructs the
//! data-type graph, walks every annotated root→leaf chain, merges the
//! per-level configurations, and renders fully-populated record
//! definitions plus an archiver descriptor:
//!
//! - [`TmcProject::parse`]: load a TMC document.
//! - [`generate`]: build, validate, and render everything in one pass.
//! - [`save_database_to_string`] / [`save_archive_to_string`]: render a
//!   package list produced by [`build_record_packages`].

// --- Crate Modules ---

mod builder;
mod chain;
mod error;
mod generate;
mod linter;
mod parser;
mod pragma;
mod record;
mod resolver;
mod types;

// --- Public API Re-exports ---

// Functions
pub use builder::{save_archive_to_string, save_database_to_string};
pub use chain::chains_from_symbol;
pub use generate::{build_record_packages, generate, lint_and_filter};
pub use linter::lint_packages;
pub use pragma::{
    normalize_io, parse_archive_settings, parse_array_selector, parse_pragma,
    parse_update_rate, serialize_pragma,
};

// Public Types
pub use chain::{AutosaveSpec, MergedConfig, SingularChain};
pub use error::TmcDbError;
pub use generate::{BuildOptions, BuildResult, GeneratedDatabase};
pub use linter::{DbdFile, LintMessage, Severity};
pub use parser::{NodeId, Tag, XmlTree};
pub use pragma::{
    ArchiveMethod, ArchiveSettings, IoDirection, UpdateMethod, UpdateRate,
};
pub use record::{
    ArchiveDescriptor, EpicsRecord, FieldMap, RecordPackage, MAX_RECORD_LENGTH,
};
pub use resolver::{TmcProject, TypeRegistry};
pub use types::{
    ArrayInfo, BuiltinType, DataType, EnumValue, ResolvedType, SubItem, Symbol, TypeRef,
};
