use std::fmt;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::symbols::SymbolTable;
use crate::core::types::{CollectionId, NodeType, QName};

/// Which family of names an index key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Element,
    Attribute,
    /// Attribute looked up by raw local name (id-style lookups)
    AttributeId,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [EntryKind::Element, EntryKind::Attribute, EntryKind::AttributeId];

    pub fn as_byte(self) -> u8 {
        match self {
            EntryKind::Element => 0,
            EntryKind::Attribute => 1,
            EntryKind::AttributeId => 2,
        }
    }

    pub fn node_type(self) -> NodeType {
        match self {
            EntryKind::Element => NodeType::Element,
            EntryKind::Attribute | EntryKind::AttributeId => NodeType::Attribute,
        }
    }
}

impl TryFrom<u8> for EntryKind {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(EntryKind::Element),
            1 => Ok(EntryKind::Attribute),
            2 => Ok(EntryKind::AttributeId),
            other => Err(Error::new(ErrorKind::InvalidArgument, format!("invalid index entry kind {}", other))),
        }
    }
}

// kind:u8 | collection:u16 BE | symbol:u16 BE | ns symbol:u16 BE
const PREFIX_LEN: usize = 3;
const SYMBOL_KEY_LEN: usize = 7;

/// Byte-comparable key of one name within one collection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Bytes);

impl IndexKey {
    pub fn element(collection: CollectionId, symbol: u16, ns_symbol: u16) -> Self {
        Self::symbolic(EntryKind::Element, collection, symbol, ns_symbol)
    }

    pub fn attribute(collection: CollectionId, symbol: u16, ns_symbol: u16) -> Self {
        Self::symbolic(EntryKind::Attribute, collection, symbol, ns_symbol)
    }

    /// Local name bytes are embedded as-is, no symbol table round trip
    pub fn attribute_id(collection: CollectionId, local_name: &str) -> Self {
        let mut buf = BytesMut::with_capacity(PREFIX_LEN + local_name.len());
        Self::put_prefix(&mut buf, EntryKind::AttributeId, collection);
        buf.put_slice(local_name.as_bytes());
        IndexKey(buf.freeze())
    }

    pub fn symbolic(kind: EntryKind, collection: CollectionId, symbol: u16, ns_symbol: u16) -> Self {
        let mut buf = BytesMut::with_capacity(SYMBOL_KEY_LEN);
        Self::put_prefix(&mut buf, kind, collection);
        buf.put_u16(symbol);
        buf.put_u16(ns_symbol);
        IndexKey(buf.freeze())
    }

    /// Key for `qname` looked up as `kind`
    pub fn for_qname(
        kind: EntryKind,
        collection: CollectionId,
        qname: &QName,
        symbols: &dyn SymbolTable,
    ) -> Result<Self> {
        match kind {
            EntryKind::AttributeId => Ok(Self::attribute_id(collection, &qname.local_name)),
            _ => {
                let symbol = symbols.symbol(&qname.local_name)?;
                let ns_symbol = symbols.ns_symbol(&qname.namespace_uri)?;
                Ok(Self::symbolic(kind, collection, symbol, ns_symbol))
            }
        }
    }

    /// `(kind, collection)` prefix selecting every name of that kind
    pub fn collection_prefix(kind: EntryKind, collection: CollectionId) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREFIX_LEN);
        Self::put_prefix(&mut buf, kind, collection);
        buf
    }

    fn put_prefix<B: BufMut>(buf: &mut B, kind: EntryKind, collection: CollectionId) {
        buf.put_u8(kind.as_byte());
        buf.put_u16(collection.0);
    }

    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        if bytes.len() < PREFIX_LEN {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("index key too short: {} bytes", bytes.len())));
        }
        let key = IndexKey(bytes);
        match key.kind()? {
            EntryKind::AttributeId => {}
            _ if key.0.len() != SYMBOL_KEY_LEN => {
                return Err(Error::new(ErrorKind::InvalidArgument, format!("symbolic key has {} bytes", key.0.len())));
            }
            _ => {}
        }
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn kind(&self) -> Result<EntryKind> {
        EntryKind::try_from(self.0[0])
    }

    pub fn collection(&self) -> CollectionId {
        CollectionId(u16::from_be_bytes([self.0[1], self.0[2]]))
    }

    /// `(symbol, ns_symbol)` for element/attribute keys
    pub fn symbols(&self) -> Option<(u16, u16)> {
        if self.0.len() != SYMBOL_KEY_LEN || self.0[0] == EntryKind::AttributeId.as_byte() {
            return None;
        }
        Some((
            u16::from_be_bytes([self.0[3], self.0[4]]),
            u16::from_be_bytes([self.0[5], self.0[6]]),
        ))
    }

    /// Raw local name for attribute-id keys
    pub fn local_name(&self) -> Option<&[u8]> {
        (self.0[0] == EntryKind::AttributeId.as_byte()).then(|| &self.0[PREFIX_LEN..])
    }
}

impl AsRef<[u8]> for IndexKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.symbols(), self.local_name()) {
            (Some((sym, ns)), _) => write!(f, "{:?}/{}/{}:{}", self.kind().ok(), self.collection(), sym, ns),
            (None, Some(name)) => write!(f, "id/{}/{}", self.collection(), String::from_utf8_lossy(name)),
            _ => write!(f, "{:?}", self.0),
        }
    }
}
