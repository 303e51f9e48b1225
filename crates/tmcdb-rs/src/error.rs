// crates/tmcdb-rs/src/error.rs

use core::fmt;

/// Errors that can occur while turning an annotated TMC project into
/// record definitions.
///
/// `MalformedXml` and `InternalInvariant` abort the whole pass; every other
/// variant is local to one chain or one record and is normally collected as
/// a diagnostic so that the remaining chains still emit.
#[derive(Debug, Clone, PartialEq)]
pub enum TmcDbError {
    /// The project XML could not be parsed at all.
    MalformedXml(String),

    /// A pragma had attribute framing that could not be unwrapped, or a
    /// line that is not a `key: value` pair.
    MalformedPragma {
        /// Path of the annotated item within the XML tree.
        path: String,
        detail: String,
    },

    /// A referenced data type exists neither in the project nor as a
    /// built-in.
    UnresolvedType { type_name: String, path: String },

    /// A chain merged into something that cannot become a record: no `pv`,
    /// conflicting `array`/`expand` keys, an oversized record name, or an
    /// invalid normalizer value.
    InvalidChain { tcname: String, detail: String },

    /// The leaf data type has no record representation (64-bit integers,
    /// date/time types).
    UnsupportedType { tcname: String, type_name: String },

    /// The record-definition file itself could not be parsed.
    MalformedDefinition(String),

    /// A rendered record failed validation against the record-definition
    /// grammar.
    Lint { record: String, detail: String },

    /// Two chains produced the same record name.
    DuplicateRecord { pvname: String },

    /// A pipeline-internal invariant did not hold.
    InternalInvariant(&'static str),
}

impl fmt::Display for TmcDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedXml(detail) => write!(f, "Malformed project XML: {detail}"),
            Self::MalformedPragma { path, detail } => {
                write!(f, "Malformed pragma at {path}: {detail}")
            }
            Self::UnresolvedType { type_name, path } => {
                write!(f, "Unresolved data type {type_name:?} referenced from {path}")
            }
            Self::InvalidChain { tcname, detail } => {
                write!(f, "Invalid chain {tcname}: {detail}")
            }
            Self::UnsupportedType { tcname, type_name } => {
                write!(f, "Unsupported data type {type_name} in chain {tcname}")
            }
            Self::MalformedDefinition(detail) => {
                write!(f, "Malformed record-definition file: {detail}")
            }
            Self::Lint { record, detail } => write!(f, "Record {record}: {detail}"),
            Self::DuplicateRecord { pvname } => {
                write!(f, "Duplicate record name {pvname}")
            }
            Self::InternalInvariant(detail) => {
                write!(f, "Internal invariant violated: {detail}")
            }
        }
    }
}

impl std::error::Error for TmcDbError {}

impl From<quick_xml::Error> for TmcDbError {
    fn from(e: quick_xml::Error) -> Self {
        TmcDbError::MalformedXml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for TmcDbError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        TmcDbError::MalformedXml(e.to_string())
    }
}

impl TmcDbError {
    /// Whether the error aborts the whole pass rather than one chain.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TmcDbError::MalformedXml(_) | TmcDbError::InternalInvariant(_)
        )
    }
}
