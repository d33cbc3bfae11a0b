use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::index::key::EntryKind;
use crate::numbering::node_id::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u16);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque locator into the primary document store, carried through untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StorageAddress(pub u64);

impl StorageAddress {
    pub const UNKNOWN: StorageAddress = StorageAddress(u64::MAX);

    pub fn new(page: u32, tid: u16) -> Self {
        StorageAddress(((page as u64) << 16) | tid as u64)
    }

    pub fn page(&self) -> u32 {
        (self.0 >> 16) as u32
    }

    pub fn tid(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.page(), self.tid())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Element,
    Attribute,
    Text,
    CData,
    ProcessingInstruction,
    Comment,
    Document,
}

/// Qualified element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    pub local_name: String,
    pub namespace_uri: String,
    pub prefix: Option<String>,
    pub name_type: EntryKind,
}

impl QName {
    pub fn element(local_name: &str, namespace_uri: &str) -> Self {
        QName {
            local_name: local_name.to_string(),
            namespace_uri: namespace_uri.to_string(),
            prefix: None,
            name_type: EntryKind::Element,
        }
    }

    pub fn attribute(local_name: &str, namespace_uri: &str) -> Self {
        QName {
            name_type: EntryKind::Attribute,
            ..QName::element(local_name, namespace_uri)
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => write!(f, "{}:{}", prefix, self.local_name),
            _ if !self.namespace_uri.is_empty() => write!(f, "{{{}}}{}", self.namespace_uri, self.local_name),
            _ => write!(f, "{}", self.local_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub collection: CollectionId,
    pub uri: String,
}

impl Document {
    pub fn new(id: DocId, collection: CollectionId, uri: &str) -> Self {
        Document { id, collection, uri: uri.to_string() }
    }
}

/// Set of documents a query runs against, looked up by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSet {
    docs: BTreeMap<DocId, Document>,
}

impl DocumentSet {
    pub fn new() -> Self {
        DocumentSet { docs: BTreeMap::new() }
    }

    pub fn add(&mut self, doc: Document) {
        self.docs.insert(doc.id, doc);
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.docs.get(&id)
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    /// Distinct collections, ascending
    pub fn collections(&self) -> BTreeSet<CollectionId> {
        self.docs.values().map(|d| d.collection).collect()
    }
}

impl FromIterator<Document> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        let mut set = DocumentSet::new();
        for doc in iter {
            set.add(doc);
        }
        set
    }
}

/// Provenance entry: which context node a match was reached from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextItem {
    pub context_id: u32,
    pub node: NodeId,
}

/// Reference to a stored node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeProxy {
    pub doc_id: DocId,
    pub node_id: NodeId,
    pub address: StorageAddress,
    pub node_type: Option<NodeType>,
    pub context: Vec<ContextItem>,
}

impl NodeProxy {
    pub fn new(doc_id: DocId, node_id: NodeId) -> Self {
        NodeProxy {
            doc_id,
            node_id,
            address: StorageAddress::UNKNOWN,
            node_type: None,
            context: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: StorageAddress) -> Self {
        self.address = address;
        self
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    /// Inherit the ancestor's context list
    pub fn copy_context(&mut self, ancestor: &NodeProxy) {
        for item in &ancestor.context {
            self.add_context(item.clone());
        }
    }

    /// Inherit the ancestor's context and record the ancestor itself under `context_id`
    pub fn deep_copy_context(&mut self, ancestor: &NodeProxy, context_id: u32) {
        self.copy_context(ancestor);
        self.add_context(ContextItem { context_id, node: ancestor.node_id.clone() });
    }

    pub fn add_context(&mut self, item: ContextItem) {
        if !self.context.contains(&item) {
            self.context.push(item);
        }
    }
}
