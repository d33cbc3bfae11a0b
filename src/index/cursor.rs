use crate::compression::vbyte::VByteReader;
use crate::core::error::{Error, Result};
use crate::index::block::NodeEntry;

/// Lazily decoding cursor over the body of one block.
///
/// The cursor always sits on a current entry (or past the terminator).
/// `mark` remembers where the current entry starts; `reset_to_mark` makes the
/// marked entry current again so a nested ancestor can rescan descendants
/// that were already passed.
pub struct DescendantCursor<'a> {
    input: VByteReader<'a>,
    current: Option<NodeEntry>,
    current_pos: usize,
    mark: usize,
}

impl<'a> DescendantCursor<'a> {
    /// Position on the first entry of `body`
    pub fn new(body: &'a [u8]) -> Result<Self> {
        let mut cursor = DescendantCursor {
            input: VByteReader::new(body),
            current: None,
            current_pos: 0,
            mark: 0,
        };
        cursor.read_current()?;
        Ok(cursor)
    }

    fn read_current(&mut self) -> Result<()> {
        self.current_pos = self.input.position();
        self.current = NodeEntry::read(&mut self.input)?;
        Ok(())
    }

    pub fn current(&self) -> Option<&NodeEntry> {
        self.current.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// Move to the next entry, `None` once the terminator is reached
    pub fn advance(&mut self) -> Result<Option<&NodeEntry>> {
        if self.current.is_none() {
            return Ok(None);
        }
        self.read_current()?;
        Ok(self.current.as_ref())
    }

    /// Offset of the current entry within the block body
    pub fn position(&self) -> usize {
        self.current_pos
    }

    pub fn mark(&mut self) {
        self.mark = self.current_pos;
    }

    pub fn marked_position(&self) -> usize {
        self.mark
    }

    pub fn reset_to_mark(&mut self) -> Result<()> {
        self.input.seek(self.mark)?;
        self.read_current()?;
        if self.current.is_none() {
            return Err(Error::malformed(format!("mark at {} points past the last entry", self.mark)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use crate::core::error::ErrorKind;
    use crate::core::types::{DocId, StorageAddress};
    use crate::index::block::{BlockEncoder, BlockReader, OrderFlag};
    use crate::numbering::node_id::NodeId;

    fn block(ids: &[&str]) -> BytesMut {
        let entries: Vec<NodeEntry> = ids.iter()
            .enumerate()
            .map(|(i, id)| NodeEntry { node_id: id.parse().unwrap(), address: StorageAddress(i as u64) })
            .collect();
        let mut out = BytesMut::new();
        BlockEncoder::encode_entries(&mut out, DocId(1), OrderFlag::Ordered, &entries);
        out
    }

    fn current(cursor: &DescendantCursor<'_>) -> String {
        cursor.current().map(|e| e.node_id.to_string()).unwrap_or_default()
    }

    #[test]
    fn walks_to_terminator() {
        let value = block(&["1.1", "1.2", "2.1"]);
        let raw = BlockReader::new(&value).next().unwrap().unwrap();
        let mut cursor = raw.cursor().unwrap();
        assert_eq!(current(&cursor), "1.1");
        assert_eq!(cursor.advance().unwrap().unwrap().node_id, "1.2".parse::<NodeId>().unwrap());
        cursor.advance().unwrap();
        assert_eq!(current(&cursor), "2.1");
        assert!(cursor.advance().unwrap().is_none());
        assert!(cursor.is_exhausted());
        assert!(cursor.advance().unwrap().is_none());
    }

    #[test]
    fn reset_returns_to_marked_entry() {
        let value = block(&["1.1", "1.2", "1.3", "1.4"]);
        let raw = BlockReader::new(&value).next().unwrap().unwrap();
        let mut cursor = raw.cursor().unwrap();
        cursor.advance().unwrap();
        cursor.mark();
        let marked = cursor.position();
        cursor.advance().unwrap();
        cursor.advance().unwrap();
        cursor.advance().unwrap();
        assert!(cursor.is_exhausted());
        cursor.reset_to_mark().unwrap();
        assert_eq!(cursor.position(), marked);
        assert_eq!(current(&cursor), "1.2");
    }

    #[test]
    fn empty_block_starts_exhausted() {
        let value = block(&[]);
        let raw = BlockReader::new(&value).next().unwrap().unwrap();
        let mut cursor = raw.cursor().unwrap();
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.reset_to_mark().unwrap_err().kind, ErrorKind::MalformedStream);
    }

    #[test]
    fn body_without_terminator_is_malformed() {
        let value = block(&["1.1", "1.2"]);
        let raw = BlockReader::new(&value).next().unwrap().unwrap();
        let body = &raw.body[..raw.body.len() - 1];
        let mut cursor = DescendantCursor::new(body).unwrap();
        cursor.advance().unwrap();
        let err = cursor.advance().err().unwrap();
        assert_eq!(err.kind, ErrorKind::MalformedStream);
    }
}
