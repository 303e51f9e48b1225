// crates/tmcdb-rs/src/parser.rs

//! Generic tagged tree over the project XML.
//!
//! TMC, tsproj, and XTI files share the same element soup; this module
//! parses any of them into an arena of [`Node`]s with a static tag→variant
//! dispatch. Unknown tags fall back to [`Tag::Generic`] and keep their
//! children, so nothing in the document is lost.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::TmcDbError;

/// Handle to a node in an [`XmlTree`] arena.
///
/// Parent back-references are handles, not owning links; the arena owns
/// every node and the root owns the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Known element kinds. Dispatch is a fixed mapping from the stripped
/// element name; anything else becomes [`Tag::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Symbol,
    DataType,
    DataTypes,
    DataArea,
    DataAreas,
    SubItem,
    ArrayInfo,
    EnumInfo,
    ExtendsType,
    BaseType,
    Type,
    BitSize,
    BitOffs,
    Name,
    Properties,
    Property,
    Value,
    Module,
    LBound,
    UBound,
    Elements,
    Text,
    Enum,
    Comment,
    Box,
    Axis,
    Link,
    Generic,
}

impl Tag {
    fn from_name(name: &str) -> Tag {
        match name {
            "Symbol" => Tag::Symbol,
            "DataType" => Tag::DataType,
            "DataTypes" => Tag::DataTypes,
            "DataArea" => Tag::DataArea,
            "DataAreas" => Tag::DataAreas,
            "SubItem" => Tag::SubItem,
            "ArrayInfo" => Tag::ArrayInfo,
            "EnumInfo" => Tag::EnumInfo,
            "ExtendsType" => Tag::ExtendsType,
            "BaseType" => Tag::BaseType,
            "Type" => Tag::Type,
            "BitSize" => Tag::BitSize,
            "BitOffs" => Tag::BitOffs,
            "Name" => Tag::Name,
            "Properties" => Tag::Properties,
            "Property" => Tag::Property,
            "Value" => Tag::Value,
            "Module" => Tag::Module,
            "LBound" => Tag::LBound,
            "UBound" => Tag::UBound,
            "Elements" => Tag::Elements,
            "Text" => Tag::Text,
            "Enum" => Tag::Enum,
            "Comment" => Tag::Comment,
            "Box" => Tag::Box,
            "Axis" => Tag::Axis,
            "Link" => Tag::Link,
            _ => Tag::Generic,
        }
    }
}

/// A single XML element: stripped name, attributes, text body, and child
/// handles. Children are registered under a per-node tag index at
/// construction time.
#[derive(Debug)]
pub struct Node {
    pub tag: Tag,
    /// Element name with any namespace prefix stripped.
    pub name: String,
    attributes: Vec<(String, String)>,
    text: Vec<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    by_tag: BTreeMap<String, Vec<NodeId>>,
}

impl Node {
    fn new(name: String, attributes: Vec<(String, String)>, parent: Option<NodeId>) -> Self {
        Node {
            tag: Tag::from_name(&name),
            name,
            attributes,
            text: Vec::new(),
            parent,
            children: Vec::new(),
            by_tag: BTreeMap::new(),
        }
    }
}

/// The parsed document. Nodes are stored in document (pre-)order.
#[derive(Debug)]
pub struct XmlTree {
    nodes: Vec<Node>,
    root: NodeId,
}

/// Strip `{namespace}` or `prefix:` qualifiers from an element name.
fn strip_namespace(name: &str) -> &str {
    if let Some(rest) = name.strip_prefix('{') {
        if let Some(idx) = rest.find('}') {
            return &rest[idx + 1..];
        }
    }
    match name.rfind(':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

impl XmlTree {
    /// Parse an XML document into a tree.
    ///
    /// Any well-formedness problem is fatal; the pipeline does not attempt
    /// to recover from malformed XML.
    pub fn parse(source: &str) -> Result<XmlTree, TmcDbError> {
        let mut reader = Reader::from_str(source);
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let id = push_node(&mut nodes, &mut stack, &start, root.is_some())?;
                    if root.is_none() {
                        root = Some(id);
                    }
                    stack.push(id);
                }
                Event::Empty(start) => {
                    let id = push_node(&mut nodes, &mut stack, &start, root.is_some())?;
                    if root.is_none() {
                        root = Some(id);
                    }
                }
                Event::End(_) => {
                    if stack.pop().is_none() {
                        return Err(TmcDbError::MalformedXml(
                            "unmatched closing element".into(),
                        ));
                    }
                }
                Event::Text(text) => {
                    if let Some(&parent) = stack.last() {
                        let piece = text.unescape()?;
                        if !piece.trim().is_empty() {
                            nodes[parent.0].text.push(piece.trim().to_string());
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(&parent) = stack.last() {
                        let piece = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        if !piece.trim().is_empty() {
                            nodes[parent.0].text.push(piece.trim().to_string());
                        }
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(TmcDbError::MalformedXml("unclosed element".into()));
        }

        let root = root.ok_or_else(|| TmcDbError::MalformedXml("empty document".into()))?;
        Ok(XmlTree { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn tag(&self, id: NodeId) -> Tag {
        self.nodes[id.0].tag
    }

    /// Attribute lookup. Names are matched case-exactly.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The concatenated, trimmed text body of an element.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.nodes[id.0].text.as_slice() {
            [] => None,
            [single] => Some(single.as_str()),
            // Mixed content does not occur in these documents; keep the
            // first piece.
            [first, ..] => Some(first.as_str()),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// All direct children with the given (stripped) element name.
    pub fn children_by_tag(&self, id: NodeId, name: &str) -> &[NodeId] {
        self.nodes[id.0]
            .by_tag
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children_by_tag(id, name).first().copied()
    }

    /// Text of the first child with the given name, e.g. `<Name>` bodies.
    pub fn child_text(&self, id: NodeId, name: &str) -> Option<&str> {
        self.first_child(id, name).and_then(|child| self.text(child))
    }

    /// All descendants (document order) with the given tag.
    pub fn find(&self, tag: Tag) -> impl Iterator<Item = NodeId> + '_ {
        // Nodes are stored in document order, so a linear scan is a
        // pre-order traversal of the whole tree.
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.tag == tag)
            .map(|(idx, _)| NodeId(idx))
    }

    /// Nearest ancestor with the given tag.
    pub fn ancestor(&self, id: NodeId, tag: Tag) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.tag(node) == tag {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Slash-joined element path from the root, for diagnostics.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = vec![self.nodes[id.0].name.as_str()];
        let mut current = self.parent(id);
        while let Some(node) = current {
            parts.push(self.nodes[node.0].name.as_str());
            current = self.parent(node);
        }
        parts.reverse();
        parts.join("/")
    }
}

fn push_node(
    nodes: &mut Vec<Node>,
    stack: &mut [NodeId],
    start: &quick_xml::events::BytesStart<'_>,
    have_root: bool,
) -> Result<NodeId, TmcDbError> {
    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let name = strip_namespace(&raw_name).to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| TmcDbError::MalformedXml(e.to_string()))?
            .into_owned();
        attributes.push((strip_namespace(&key).to_string(), value));
    }

    let parent = stack.last().copied();
    if parent.is_none() && have_root {
        return Err(TmcDbError::MalformedXml(
            "multiple top-level elements".into(),
        ));
    }

    let id = NodeId(nodes.len());
    nodes.push(Node::new(name, attributes, parent));

    if let Some(parent) = parent {
        let child_name = nodes[id.0].name.clone();
        nodes[parent.0].children.push(id);
        nodes[parent.0]
            .by_tag
            .entry(child_name)
            .or_default()
            .push(id);
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <Root xmlns="http://example.invalid/schema">
            <DataType>
                <Name Namespace="Lib">ST_Example</Name>
                <BitSize>64</BitSize>
                <SubItem>
                    <Name>value</Name>
                    <Type>DINT</Type>
                </SubItem>
                <SubItem>
                    <Name>other</Name>
                    <Type>LREAL</Type>
                </SubItem>
            </DataType>
            <Oddball attr="kept"><Child/></Oddball>
        </Root>
    "#;

    #[test]
    fn test_tag_dispatch_and_fallback() {
        let tree = XmlTree::parse(SAMPLE).unwrap();
        let data_type = tree.find(Tag::DataType).next().unwrap();
        assert_eq!(tree.tag(data_type), Tag::DataType);

        // Unknown tags keep their name and their children.
        let oddball = tree
            .children(tree.root())
            .iter()
            .copied()
            .find(|&id| tree.node(id).name == "Oddball")
            .unwrap();
        assert_eq!(tree.tag(oddball), Tag::Generic);
        assert_eq!(tree.children(oddball).len(), 1);
        assert_eq!(tree.attr(oddball, "attr"), Some("kept"));
    }

    #[test]
    fn test_children_by_tag_index() {
        let tree = XmlTree::parse(SAMPLE).unwrap();
        let data_type = tree.find(Tag::DataType).next().unwrap();
        assert_eq!(tree.children_by_tag(data_type, "SubItem").len(), 2);
        assert_eq!(tree.children_by_tag(data_type, "EnumInfo").len(), 0);
        assert_eq!(tree.child_text(data_type, "BitSize"), Some("64"));
    }

    #[test]
    fn test_attributes_are_case_exact() {
        let tree = XmlTree::parse(SAMPLE).unwrap();
        let data_type = tree.find(Tag::DataType).next().unwrap();
        let name = tree.first_child(data_type, "Name").unwrap();
        assert_eq!(tree.attr(name, "Namespace"), Some("Lib"));
        assert_eq!(tree.attr(name, "namespace"), None);
    }

    #[test]
    fn test_parent_and_path() {
        let tree = XmlTree::parse(SAMPLE).unwrap();
        let sub_item = tree.find(Tag::SubItem).next().unwrap();
        assert_eq!(tree.tag(tree.parent(sub_item).unwrap()), Tag::DataType);
        assert_eq!(tree.path(sub_item), "Root/DataType/SubItem");
        assert_eq!(tree.ancestor(sub_item, Tag::DataType).is_some(), true);
    }

    #[test]
    fn test_motion_and_io_tags_dispatch() {
        let tree = XmlTree::parse("<Io><Box Id=\"1\"><Axis Id=\"2\"/><Link VarA=\"a\"/></Box></Io>")
            .unwrap();
        let io_box = tree.children(tree.root())[0];
        assert_eq!(tree.tag(io_box), Tag::Box);
        assert_eq!(tree.tag(tree.children(io_box)[0]), Tag::Axis);
        assert_eq!(tree.tag(tree.children(io_box)[1]), Tag::Link);
        assert_eq!(tree.attr(tree.children(io_box)[1], "VarA"), Some("a"));
    }

    #[test]
    fn test_namespace_prefixes_are_stripped() {
        let tree = XmlTree::parse("<ns:Symbol xmlns:ns='x'><ns:Name>a</ns:Name></ns:Symbol>")
            .unwrap();
        assert_eq!(tree.tag(tree.root()), Tag::Symbol);
        assert_eq!(tree.child_text(tree.root(), "Name"), Some("a"));
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        assert!(matches!(
            XmlTree::parse("<a><b></a>"),
            Err(TmcDbError::MalformedXml(_))
        ));
        assert!(matches!(
            XmlTree::parse(""),
            Err(TmcDbError::MalformedXml(_))
        ));
    }
}
