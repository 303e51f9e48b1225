// crates/tmcdb-rs/src/resolver.rs

//! Resolves the generic XML tree into the public data model: a symbol list
//! plus a registry of composite types that can answer use-site references.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::TmcDbError;
use crate::parser::{NodeId, Tag, XmlTree};
use crate::types::{
    ArrayInfo, BuiltinType, DataType, EnumValue, ResolvedType, SubItem, Symbol, TypeRef,
};

/// Pragma names accepted on a declaration.
const PRAGMA_NAMES: &[&str] = &["pytmc", "plcAttribute_pytmc"];

/// Default data-transport port when the module does not declare one.
const DEFAULT_ADS_PORT: u16 = 851;

const TRUE_VALUES: &[&str] = &["true", "1"];

fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| TRUE_VALUES.contains(&v.to_ascii_lowercase().as_str()))
}

fn parse_or_zero(text: Option<&str>) -> u32 {
    text.and_then(|t| t.trim().parse().ok()).unwrap_or(0)
}

/// Registry of composite data types, queryable by GUID, fully-qualified
/// name, or bare name. Read-only once the project is loaded.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<DataType>,
    by_guid: BTreeMap<String, usize>,
    by_qualified: BTreeMap<String, usize>,
    by_bare: BTreeMap<String, usize>,
    /// Library aliases for built-ins, e.g. `Tc2_System.T_MaxString`.
    aliases: BTreeMap<String, BuiltinType>,
}

impl TypeRegistry {
    fn insert(&mut self, data_type: DataType) {
        let index = self.types.len();
        if let Some(guid) = &data_type.guid {
            self.by_guid.insert(guid.clone(), index);
        }
        self.by_qualified
            .insert(data_type.qualified_name(), index);
        self.by_bare.entry(data_type.name.clone()).or_insert(index);
        self.types.push(data_type);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, qualified_name: &str) -> Option<&DataType> {
        self.by_qualified
            .get(qualified_name)
            .map(|&index| &self.types[index])
    }

    /// Resolve a use-site type reference.
    ///
    /// Resolution prefers the GUID when the reference carries one, then the
    /// fully-qualified name, then built-ins, and finally the bare name as a
    /// warned last resort. Pointers and references of positive depth are
    /// surfaced as 32-bit integers for record-emission purposes.
    pub fn resolve<'a>(
        &'a self,
        type_ref: &TypeRef,
        context: &str,
    ) -> Result<ResolvedType<'a>, TmcDbError> {
        if type_ref.is_pointer() || type_ref.is_reference {
            return Ok(ResolvedType::Builtin(BuiltinType::Dword));
        }

        if let Some(guid) = &type_ref.guid {
            if let Some(&index) = self.by_guid.get(guid) {
                return Ok(ResolvedType::Data(&self.types[index]));
            }
        }

        let qualified = type_ref.qualified_name();
        if let Some(&index) = self.by_qualified.get(&qualified) {
            return Ok(ResolvedType::Data(&self.types[index]));
        }
        if let Some(builtin) = self.aliases.get(&qualified) {
            return Ok(ResolvedType::Builtin(builtin.clone()));
        }

        if let Some(builtin) = BuiltinType::parse(&type_ref.name) {
            return Ok(ResolvedType::Builtin(builtin));
        }

        if let Some(&index) = self.by_bare.get(&type_ref.name) {
            warn!(
                "Resolved {qualified:?} by bare name only (from {context})"
            );
            return Ok(ResolvedType::Data(&self.types[index]));
        }

        Err(TmcDbError::UnresolvedType {
            type_name: qualified,
            path: context.to_string(),
        })
    }

    /// The members of a type, with single-inheritance extension chains
    /// flattened in (base members first). A visited set guards against
    /// extension cycles.
    pub fn effective_sub_items<'a>(&'a self, data_type: &'a DataType) -> Vec<&'a SubItem> {
        let mut members = Vec::new();
        let mut visited = Vec::new();
        self.collect_sub_items(data_type, &mut members, &mut visited);
        members
    }

    fn collect_sub_items<'a>(
        &'a self,
        data_type: &'a DataType,
        members: &mut Vec<&'a SubItem>,
        visited: &mut Vec<String>,
    ) {
        let qualified = data_type.qualified_name();
        if visited.contains(&qualified) {
            warn!("Extension cycle through {qualified}; not descending");
            return;
        }
        visited.push(qualified);

        if let Some(extends) = &data_type.extends {
            match self.resolve(extends, &data_type.name) {
                Ok(ResolvedType::Data(base)) => {
                    self.collect_sub_items(base, members, visited)
                }
                Ok(ResolvedType::Builtin(_)) => {}
                Err(error) => {
                    warn!("Skipping unresolvable extension of {}: {error}", data_type.name)
                }
            }
        }

        members.extend(data_type.sub_items.iter());
    }
}

/// A parsed controller project: the symbol table plus the type registry.
/// Both are read-only once built; the pipeline never mutates its input.
#[derive(Debug)]
pub struct TmcProject {
    pub registry: TypeRegistry,
    pub symbols: Vec<Symbol>,
    pub ads_port: u16,
}

impl TmcProject {
    /// Parse a TMC document and resolve it into a project.
    pub fn parse(source: &str) -> Result<TmcProject, TmcDbError> {
        let tree = XmlTree::parse(source)?;
        TmcProject::from_tree(&tree)
    }

    pub fn from_tree(tree: &XmlTree) -> Result<TmcProject, TmcDbError> {
        let mut registry = TypeRegistry::default();
        registry.aliases.insert(
            "Tc2_System.T_MaxString".to_string(),
            BuiltinType::String(255),
        );

        for node in tree.find(Tag::DataType) {
            if let Some(data_type) = read_data_type(tree, node) {
                registry.insert(data_type);
            }
        }

        let mut symbols = Vec::new();
        let mut ads_port = DEFAULT_ADS_PORT;
        for node in tree.find(Tag::Symbol) {
            if let Some(symbol) = read_symbol(tree, node) {
                ads_port = symbol.ads_port;
                symbols.push(symbol);
            }
        }

        debug!(
            "Loaded {} data types and {} symbols (port {ads_port})",
            registry.len(),
            symbols.len()
        );

        Ok(TmcProject {
            registry,
            symbols,
            ads_port,
        })
    }

    /// Top-level symbols eligible for record generation: annotated, and
    /// named `<program>.<datum>`.
    pub fn annotated_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(|symbol| symbol.pragma.as_deref().is_some_and(|p| !p.trim().is_empty()))
            .filter(|symbol| symbol.name.matches('.').count() == 1)
    }

    /// Fabricate a root symbol for a data type that is to be summarized on
    /// its own, outside any data area.
    pub fn virtual_symbol(
        &self,
        qualified_type_name: &str,
        symbol_name: &str,
        pragma: &str,
    ) -> Result<Symbol, TmcDbError> {
        let data_type = self.registry.get(qualified_type_name).ok_or_else(|| {
            TmcDbError::UnresolvedType {
                type_name: qualified_type_name.to_string(),
                path: format!("virtual symbol {symbol_name}"),
            }
        })?;

        Ok(Symbol {
            name: symbol_name.to_string(),
            type_ref: TypeRef {
                name: data_type.name.clone(),
                namespace: data_type.namespace.clone(),
                guid: data_type.guid.clone(),
                ..TypeRef::default()
            },
            bit_size: data_type.bit_size,
            bit_offset: 0,
            module: None,
            ads_port: self.ads_port,
            array_info: None,
            pragma: Some(pragma.to_string()),
            xml_path: format!("<virtual>/{symbol_name}"),
        })
    }
}

/// Read a `Type`/`BaseType`/`ExtendsType` element into a [`TypeRef`].
fn read_type_ref(tree: &XmlTree, node: NodeId) -> TypeRef {
    TypeRef {
        name: tree.text(node).unwrap_or_default().to_string(),
        namespace: tree.attr(node, "Namespace").map(str::to_string),
        guid: tree.attr(node, "GUID").map(str::to_string),
        pointer_depth: parse_or_zero(tree.attr(node, "PointerTo")),
        is_reference: is_true(tree.attr(node, "ReferenceTo")),
    }
}

/// Collect the dimensions of all `ArrayInfo` children, in declaration
/// order. `UBound` defaults to `LBound + Elements - 1`.
fn read_array_info(tree: &XmlTree, node: NodeId) -> Option<ArrayInfo> {
    let mut dims = Vec::new();
    for info in tree.children_by_tag(node, "ArrayInfo") {
        let lower = tree
            .child_text(*info, "LBound")
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or(0);
        let elements = tree
            .child_text(*info, "Elements")
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or(1);
        let upper = tree
            .child_text(*info, "UBound")
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or(lower + elements - 1);
        dims.push((lower, upper));
    }
    if dims.is_empty() {
        None
    } else {
        Some(ArrayInfo::new(dims))
    }
}

/// Pull the pragma text off an annotated element's property list. Multiple
/// matching properties are joined with newlines.
fn read_pragma(tree: &XmlTree, node: NodeId) -> Option<String> {
    let properties = tree.first_child(node, "Properties")?;
    let mut texts = Vec::new();
    for property in tree.children_by_tag(properties, "Property") {
        let name = tree
            .child_text(*property, "Name")
            .or_else(|| tree.attr(*property, "Name"));
        if name.is_some_and(|n| PRAGMA_NAMES.contains(&n)) {
            if let Some(value) = tree.child_text(*property, "Value").or_else(|| tree.text(*property))
            {
                texts.push(value.to_string());
            }
        }
    }
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

fn read_sub_item(tree: &XmlTree, node: NodeId) -> Option<SubItem> {
    let name = tree.child_text(node, "Name")?.to_string();
    let type_node = tree.first_child(node, "Type")?;
    Some(SubItem {
        name,
        type_ref: read_type_ref(tree, type_node),
        bit_size: parse_or_zero(tree.child_text(node, "BitSize")),
        bit_offset: parse_or_zero(tree.child_text(node, "BitOffs")),
        array_info: read_array_info(tree, node),
        pragma: read_pragma(tree, node),
    })
}

fn read_data_type(tree: &XmlTree, node: NodeId) -> Option<DataType> {
    let name_node = tree.first_child(node, "Name")?;
    let name = tree.text(name_node)?.to_string();

    let sub_items: Vec<SubItem> = tree
        .children_by_tag(node, "SubItem")
        .iter()
        .filter_map(|&child| read_sub_item(tree, child))
        .collect();

    let mut enum_values = Vec::new();
    for info in tree.children_by_tag(node, "EnumInfo") {
        let text = tree.child_text(*info, "Text").unwrap_or_default();
        match tree.child_text(*info, "Enum").and_then(|t| t.parse::<i64>().ok()) {
            Some(value) => enum_values.push(EnumValue {
                value,
                text: text.to_string(),
            }),
            None => warn!(
                "Enumeration {name} is missing a value for state {text:?}; state skipped"
            ),
        }
    }

    let extends = tree
        .first_child(node, "ExtendsType")
        .map(|child| read_type_ref(tree, child));

    let data_type = DataType {
        namespace: tree.attr(name_node, "Namespace").map(str::to_string),
        guid: tree.attr(name_node, "GUID").map(str::to_string),
        bit_size: parse_or_zero(tree.child_text(node, "BitSize")),
        extends,
        sub_items,
        enum_values,
        array_info: read_array_info(tree, node),
        name,
    };

    check_layout(&data_type);
    Some(data_type)
}

/// Structural sanity of a composite: member offsets must be monotonically
/// non-decreasing and contained within the declared bit size. Violations
/// come from the controller toolchain, so they warn rather than abort.
fn check_layout(data_type: &DataType) {
    let mut last_offset = 0;
    let mut max_extent = 0;
    for sub_item in &data_type.sub_items {
        if sub_item.bit_offset < last_offset {
            warn!(
                "Data type {}: member {} offset moves backwards",
                data_type.name, sub_item.name
            );
        }
        last_offset = sub_item.bit_offset;
        max_extent = max_extent.max(sub_item.bit_offset + sub_item.bit_size);
    }
    if data_type.bit_size != 0 && data_type.bit_size < max_extent {
        warn!(
            "Data type {}: bit size {} smaller than member extent {}",
            data_type.name, data_type.bit_size, max_extent
        );
    }
}

fn read_symbol(tree: &XmlTree, node: NodeId) -> Option<Symbol> {
    let name = tree.child_text(node, "Name")?.to_string();
    let base_type = tree.first_child(node, "BaseType")?;

    let module_node = tree.ancestor(node, Tag::Module);
    let module = module_node.and_then(|m| tree.child_text(m, "Name").map(str::to_string));
    let ads_port = module_node
        .and_then(|m| read_module_port(tree, m))
        .unwrap_or(DEFAULT_ADS_PORT);

    Some(Symbol {
        type_ref: read_type_ref(tree, base_type),
        bit_size: parse_or_zero(tree.child_text(node, "BitSize")),
        bit_offset: parse_or_zero(tree.child_text(node, "BitOffs")),
        module,
        ads_port,
        array_info: read_array_info(tree, node),
        pragma: read_pragma(tree, node),
        xml_path: tree.path(node),
        name,
    })
}

/// The transport port is encoded in the module's `ApplicationName`
/// property, e.g. `Port_851`.
fn read_module_port(tree: &XmlTree, module: NodeId) -> Option<u16> {
    let properties = tree.first_child(module, "Properties")?;
    for property in tree.children_by_tag(properties, "Property") {
        if tree.child_text(*property, "Name") == Some("ApplicationName") {
            let value = tree.child_text(*property, "Value")?;
            return value.split("Port_").nth(1)?.trim().parse().ok();
        }
    }
    None
}
