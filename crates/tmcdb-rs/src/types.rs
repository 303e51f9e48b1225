// crates/tmcdb-rs/src/types.rs

//! Public data model reconstructed from the project XML: symbols, composite
//! data types, members, array bounds, and enumerations.

/// A reference to a data type, as written at a use site (symbol base type,
/// sub-item type, or extension marker).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRef {
    /// Bare type name, without a namespace.
    pub name: String,
    pub namespace: Option<String>,
    /// Globally-unique id, when the toolchain emitted one.
    pub guid: Option<String>,
    /// 0 = plain value, 1 = POINTER TO, 2 = POINTER TO POINTER TO, ...
    pub pointer_depth: u32,
    pub is_reference: bool,
}

impl TypeRef {
    pub fn named(name: &str) -> TypeRef {
        TypeRef {
            name: name.to_string(),
            ..TypeRef::default()
        }
    }

    /// The base type name, including the namespace.
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }
}

/// Array bounds, one `(lower, upper)` pair per dimension, inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub dims: Vec<(i64, i64)>,
}

impl ArrayInfo {
    pub fn new(dims: Vec<(i64, i64)>) -> ArrayInfo {
        ArrayInfo { dims }
    }

    /// Total element count; multidimensional arrays are the full
    /// cross-product.
    pub fn element_count(&self) -> u64 {
        self.dims
            .iter()
            .map(|(low, high)| (high - low + 1).max(0) as u64)
            .product()
    }

    /// Bounds of the first dimension.
    pub fn bounds(&self) -> (i64, i64) {
        self.dims.first().copied().unwrap_or((0, 0))
    }
}

/// One enumeration state: integer value and display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub value: i64,
    pub text: String,
}

/// A named member of a [`DataType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubItem {
    pub name: String,
    pub type_ref: TypeRef,
    pub bit_size: u32,
    pub bit_offset: u32,
    pub array_info: Option<ArrayInfo>,
    /// Raw pragma text, when the member is annotated.
    pub pragma: Option<String>,
}

/// A named composite type: members, optional single extension, optional
/// enumeration states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub name: String,
    pub namespace: Option<String>,
    pub guid: Option<String>,
    pub bit_size: u32,
    pub extends: Option<TypeRef>,
    pub sub_items: Vec<SubItem>,
    pub enum_values: Vec<EnumValue>,
    pub array_info: Option<ArrayInfo>,
}

impl DataType {
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_enum(&self) -> bool {
        !self.enum_values.is_empty()
    }
}

/// A named top-level datum within a runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Fully-qualified name, e.g. `Main.scale`.
    pub name: String,
    pub type_ref: TypeRef,
    pub bit_size: u32,
    pub bit_offset: u32,
    /// Name of the module the symbol lives in.
    pub module: Option<String>,
    /// Data-transport port of the owning module.
    pub ads_port: u16,
    pub array_info: Option<ArrayInfo>,
    pub pragma: Option<String>,
    /// Element path within the source XML, for diagnostics.
    pub xml_path: String,
}

/// A built-in (non-composite) source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinType {
    Bool,
    Byte,
    Sint,
    Usint,
    Word,
    Int,
    Uint,
    Dword,
    Dint,
    Udint,
    Lword,
    Lint,
    Ulint,
    Real,
    Lreal,
    /// `STRING(n)`; the default length is 80 characters.
    String(u32),
    /// A recognized source type with no record representation (date/time
    /// and alias types). The original spelling is kept for diagnostics.
    Unsupported(String),
}

/// Source types that are recognized but cannot be surfaced as records.
const KNOWN_BAD_TYPES: &[&str] = &[
    "ALIAS",
    "DATE",
    "DATE_AND_TIME",
    "DT",
    "TIME",
    "TIME_OF_DAY",
    "TOD",
];

impl BuiltinType {
    /// Parse a built-in type name, including `STRING(n)` forms.
    pub fn parse(name: &str) -> Option<BuiltinType> {
        if let Some(rest) = name.strip_prefix("STRING") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Some(BuiltinType::String(80));
            }
            let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
            return inner.trim().parse().ok().map(BuiltinType::String);
        }

        let builtin = match name {
            "BOOL" | "BIT" => BuiltinType::Bool,
            "BYTE" => BuiltinType::Byte,
            "SINT" => BuiltinType::Sint,
            "USINT" => BuiltinType::Usint,
            "WORD" => BuiltinType::Word,
            "INT" => BuiltinType::Int,
            "UINT" => BuiltinType::Uint,
            "DWORD" => BuiltinType::Dword,
            "DINT" => BuiltinType::Dint,
            "UDINT" => BuiltinType::Udint,
            "LWORD" => BuiltinType::Lword,
            "LINT" => BuiltinType::Lint,
            "ULINT" => BuiltinType::Ulint,
            "REAL" => BuiltinType::Real,
            "LREAL" => BuiltinType::Lreal,
            other if KNOWN_BAD_TYPES.contains(&other) => {
                BuiltinType::Unsupported(other.to_string())
            }
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &str {
        match self {
            BuiltinType::Bool => "BOOL",
            BuiltinType::Byte => "BYTE",
            BuiltinType::Sint => "SINT",
            BuiltinType::Usint => "USINT",
            BuiltinType::Word => "WORD",
            BuiltinType::Int => "INT",
            BuiltinType::Uint => "UINT",
            BuiltinType::Dword => "DWORD",
            BuiltinType::Dint => "DINT",
            BuiltinType::Udint => "UDINT",
            BuiltinType::Lword => "LWORD",
            BuiltinType::Lint => "LINT",
            BuiltinType::Ulint => "ULINT",
            BuiltinType::Real => "REAL",
            BuiltinType::Lreal => "LREAL",
            BuiltinType::String(_) => "STRING",
            BuiltinType::Unsupported(name) => name,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, BuiltinType::String(_))
    }

    /// String character capacity.
    pub fn string_length(&self) -> Option<u32> {
        match self {
            BuiltinType::String(length) => Some(*length),
            _ => None,
        }
    }
}

/// A use-site type reference resolved against the project: either a
/// built-in descriptor or a composite from the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedType<'a> {
    Builtin(BuiltinType),
    Data(&'a DataType),
}

impl<'a> ResolvedType<'a> {
    pub fn name(&self) -> &str {
        match self {
            ResolvedType::Builtin(builtin) => builtin.name(),
            ResolvedType::Data(data_type) => &data_type.name,
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, ResolvedType::Data(data_type) if data_type.is_enum())
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ResolvedType::Builtin(builtin) if builtin.is_string())
    }

    /// Composite non-enum types are traversed further by the chain walker;
    /// everything else terminates a chain.
    pub fn is_complex(&self) -> bool {
        match self {
            ResolvedType::Builtin(_) => false,
            ResolvedType::Data(data_type) => !data_type.is_enum(),
        }
    }
}
