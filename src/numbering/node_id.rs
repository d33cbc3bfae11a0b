use std::fmt;
use std::str::FromStr;
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use crate::compression::vbyte::{VByteEncoder, VByteReader};
use crate::core::error::{Error, ErrorKind, Result};

/// How a node relates to a presumed ancestor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Child,
    Descendant,
    SelfNode,
}

/// Dynamic level number: one positive ordinal per tree level, root is `1`.
///
/// Derived ordering is lexicographic over the levels with a prefix sorting
/// first, which is exactly document (pre)order. Encoded as a vbyte level count
/// followed by one vbyte per level; a zero level count is the
/// [`NodeId::END_OF_DOCUMENT`] terminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    levels: Vec<u32>,
}

impl NodeId {
    /// Stream terminator, never a valid node
    pub const END_OF_DOCUMENT: NodeId = NodeId { levels: Vec::new() };

    pub fn root() -> Self {
        NodeId { levels: vec![1] }
    }

    pub fn from_levels(levels: Vec<u32>) -> Result<Self> {
        if levels.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "node id needs at least one level".to_string()));
        }
        if levels.contains(&0) {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("level numbers start at 1: {:?}", levels)));
        }
        Ok(NodeId { levels })
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_end_of_document(&self) -> bool {
        self.levels.is_empty()
    }

    /// The `n`-th child (1-based)
    pub fn new_child(&self, n: u32) -> Result<Self> {
        let mut levels = self.levels.clone();
        levels.push(n);
        NodeId::from_levels(levels)
    }

    pub fn next_sibling(&self) -> Option<Self> {
        let (last, prefix) = self.levels.split_last()?;
        let mut levels = prefix.to_vec();
        levels.push(last.checked_add(1)?);
        Some(NodeId { levels })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.levels.len() < 2 {
            return None;
        }
        Some(NodeId { levels: self.levels[..self.levels.len() - 1].to_vec() })
    }

    pub fn is_descendant_of(&self, ancestor: &NodeId) -> bool {
        !ancestor.is_end_of_document()
            && self.levels.len() > ancestor.levels.len()
            && self.levels.starts_with(&ancestor.levels)
    }

    pub fn is_descendant_or_self_of(&self, ancestor: &NodeId) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    pub fn is_child_of(&self, parent: &NodeId) -> bool {
        self.levels.len() == parent.levels.len() + 1 && self.is_descendant_of(parent)
    }

    /// Relation of `self` to `ancestor`, `None` when unrelated
    pub fn compute_relation(&self, ancestor: &NodeId) -> Option<Relation> {
        if ancestor.is_end_of_document() || !self.levels.starts_with(&ancestor.levels) {
            return None;
        }
        match self.levels.len() - ancestor.levels.len() {
            0 => Some(Relation::SelfNode),
            1 => Some(Relation::Child),
            _ => Some(Relation::Descendant),
        }
    }

    pub fn encoded_len(&self) -> usize {
        VByteEncoder::encoded_len_u32(self.levels.len() as u32)
            + self.levels.iter().map(|&l| VByteEncoder::encoded_len_u32(l)).sum::<usize>()
    }

    pub fn write<B: BufMut>(&self, out: &mut B) {
        VByteEncoder::encode_u32(out, self.levels.len() as u32);
        for &level in &self.levels {
            VByteEncoder::encode_u32(out, level);
        }
    }

    pub fn write_end_of_document<B: BufMut>(out: &mut B) {
        VByteEncoder::encode_u32(out, 0);
    }

    /// Read a node id or the terminator
    pub fn read(input: &mut VByteReader<'_>) -> Result<NodeId> {
        let count = input.read_u32()? as usize;
        if count > input.available() {
            return Err(Error::malformed(format!("node id claims {} levels, stream too short", count)));
        }
        let mut levels = Vec::with_capacity(count);
        for _ in 0..count {
            let level = input.read_u32()?;
            if level == 0 {
                return Err(Error::malformed("zero level number in node id"));
            }
            levels.push(level);
        }
        Ok(NodeId { levels })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_end_of_document() {
            return write!(f, "<end>");
        }
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", level)?;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let levels = s.split('.')
            .map(|part| part.parse::<u32>()
                .map_err(|e| Error::new(ErrorKind::Parse, format!("bad node id '{}': {}", s, e))))
            .collect::<Result<Vec<_>>>()?;
        NodeId::from_levels(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    #[test]
    fn order_is_preorder() {
        let mut ids = vec![id("2"), id("1.2"), id("1"), id("1.1.5"), id("1.10"), id("1.1")];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|n| n.to_string()).collect();
        assert_eq!(rendered, ["1", "1.1", "1.1.5", "1.2", "1.10", "2"]);
    }

    #[test]
    fn relations() {
        assert_eq!(id("1.1").compute_relation(&id("1")), Some(Relation::Child));
        assert_eq!(id("1.1.3").compute_relation(&id("1")), Some(Relation::Descendant));
        assert_eq!(id("1.1").compute_relation(&id("1.1")), Some(Relation::SelfNode));
        assert_eq!(id("2.1").compute_relation(&id("1")), None);
        assert_eq!(id("1").compute_relation(&id("1.1")), None);
        assert!(id("1.12").compute_relation(&id("1.1")).is_none());
        assert!(id("1.1.3").is_descendant_of(&id("1.1")));
        assert!(!id("1.1").is_descendant_of(&id("1.1")));
        assert!(id("1.1").is_child_of(&id("1")));
        assert!(!id("1.1.1").is_child_of(&id("1")));
    }

    #[test]
    fn nothing_relates_to_end_of_document() {
        assert!(id("1").compute_relation(&NodeId::END_OF_DOCUMENT).is_none());
        assert!(!id("1").is_descendant_of(&NodeId::END_OF_DOCUMENT));
    }

    #[test]
    fn binary_form_and_terminator() {
        let mut out = Vec::new();
        let node = id("1.200.3");
        node.write(&mut out);
        NodeId::write_end_of_document(&mut out);
        assert_eq!(out.len(), node.encoded_len() + 1);

        let mut reader = VByteReader::new(&out);
        assert_eq!(NodeId::read(&mut reader).unwrap(), node);
        assert!(NodeId::read(&mut reader).unwrap().is_end_of_document());
        assert!(reader.is_empty());
    }

    #[test]
    fn truncated_node_id_is_malformed() {
        let mut out = Vec::new();
        id("1.2.3").write(&mut out);
        out.truncate(out.len() - 1);
        let err = NodeId::read(&mut VByteReader::new(&out)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedStream);
    }

    #[test]
    fn construction_rejects_invalid_levels() {
        assert!(NodeId::from_levels(vec![]).is_err());
        assert!(NodeId::from_levels(vec![1, 0]).is_err());
        assert!("1..2".parse::<NodeId>().is_err());
        assert_eq!(id("1.4").parent(), Some(id("1")));
        assert_eq!(id("1.4").next_sibling(), Some(id("1.5")));
        assert_eq!(id("1").new_child(3).unwrap(), id("1.3"));
    }
}
