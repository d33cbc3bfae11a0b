use bytes::{BufMut, BytesMut};
use crate::compression::vbyte::{VByteEncoder, VByteReader};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, StorageAddress};
use crate::index::cursor::DescendantCursor;
use crate::numbering::node_id::NodeId;

/// Whether the node ids inside a block are ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderFlag {
    Ordered,
    Unordered,
}

impl OrderFlag {
    pub fn as_byte(self) -> u8 {
        match self {
            OrderFlag::Ordered => 0,
            OrderFlag::Unordered => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(OrderFlag::Ordered),
            1 => Ok(OrderFlag::Unordered),
            other => Err(Error::malformed(format!("invalid order flag {}", other))),
        }
    }

    pub fn is_ordered(self) -> bool {
        self == OrderFlag::Ordered
    }
}

/// One `(node id, address)` pair of a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_id: NodeId,
    pub address: StorageAddress,
}

impl NodeEntry {
    pub fn read(input: &mut VByteReader<'_>) -> Result<Option<NodeEntry>> {
        let node_id = NodeId::read(input)?;
        if node_id.is_end_of_document() {
            return Ok(None);
        }
        let address = StorageAddress(input.read_fixed_u64()?);
        Ok(Some(NodeEntry { node_id, address }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub doc_id: DocId,
    pub order: OrderFlag,
    pub count: u32,
    pub byte_len: u32,  // First node id through terminator
}

/// A block as stored, borrowed from the value it was read from
#[derive(Debug, Clone, Copy)]
pub struct RawBlock<'a> {
    pub header: BlockHeader,
    pub raw: &'a [u8],   // Header and body
    pub body: &'a [u8],
}

impl<'a> RawBlock<'a> {
    /// Copy the block verbatim
    pub fn copy_to(&self, out: &mut BytesMut) {
        out.put_slice(self.raw);
    }

    pub fn cursor(&self) -> Result<DescendantCursor<'a>> {
        DescendantCursor::new(self.body)
    }

    /// Decode all entries, checking count and terminator
    pub fn entries(&self) -> Result<Vec<NodeEntry>> {
        // every entry takes at least one byte of the body
        if self.header.count as usize > self.body.len() {
            return Err(Error::malformed(format!(
                "block of document {} declares {} nodes in {} bytes",
                self.header.doc_id, self.header.count, self.body.len()
            )));
        }
        let mut input = VByteReader::new(self.body);
        let mut entries = Vec::with_capacity(self.header.count as usize);
        while let Some(entry) = NodeEntry::read(&mut input)? {
            entries.push(entry);
        }
        if entries.len() != self.header.count as usize {
            return Err(Error::malformed(format!(
                "block of document {} declares {} nodes, found {}",
                self.header.doc_id, self.header.count, entries.len()
            )));
        }
        if !input.is_empty() {
            return Err(Error::malformed(format!(
                "{} stray bytes after terminator in block of document {}",
                input.available(), self.header.doc_id
            )));
        }
        Ok(entries)
    }
}

/// Iterates the blocks of one stored value.
///
/// Reaching the end of the value between blocks is the normal end; running out
/// inside a header or body is a [`MalformedStream`](crate::core::error::ErrorKind::MalformedStream) error.
pub struct BlockReader<'a> {
    input: VByteReader<'a>,
    data: &'a [u8],
    failed: bool,
}

impl<'a> BlockReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BlockReader { input: VByteReader::new(data), data, failed: false }
    }

    fn read_block(&mut self) -> Result<RawBlock<'a>> {
        let start = self.input.position();
        let doc_id = DocId(self.input.read_u32()?);
        let order = OrderFlag::from_byte(self.input.read_u8()?)?;
        let count = self.input.read_u32()?;
        let byte_len = self.input.read_fixed_u32()?;
        let body = self.input.read_raw(byte_len as usize)?;
        Ok(RawBlock {
            header: BlockHeader { doc_id, order, count, byte_len },
            raw: &self.data[start..self.input.position()],
            body,
        })
    }
}

impl<'a> Iterator for BlockReader<'a> {
    type Item = Result<RawBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.input.is_empty() {
            return None;
        }
        let block = self.read_block();
        self.failed = block.is_err();
        Some(block)
    }
}

/// Writes blocks in the on-disk format
pub struct BlockEncoder;

impl BlockEncoder {
    pub fn encode<'n, I>(out: &mut BytesMut, doc_id: DocId, order: OrderFlag, entries: I)
    where
        I: ExactSizeIterator<Item = (&'n NodeId, StorageAddress)>,
    {
        VByteEncoder::encode_u32(out, doc_id.0);
        out.put_u8(order.as_byte());
        VByteEncoder::encode_u32(out, entries.len() as u32);
        let len_offset = out.len();
        out.put_u32_le(0);
        Self::encode_body(out, entries);
        let byte_len = (out.len() - len_offset - 4) as u32;
        out[len_offset..len_offset + 4].copy_from_slice(&byte_len.to_le_bytes());
    }

    pub fn encode_entries(out: &mut BytesMut, doc_id: DocId, order: OrderFlag, entries: &[NodeEntry]) {
        Self::encode(out, doc_id, order, entries.iter().map(|e| (&e.node_id, e.address)));
    }

    /// Entries and terminator only, as a cursor reads them
    pub fn encode_body<'n, I>(out: &mut BytesMut, entries: I)
    where
        I: IntoIterator<Item = (&'n NodeId, StorageAddress)>,
    {
        for (node_id, address) in entries {
            node_id.write(out);
            out.put_u64_le(address.0);
        }
        NodeId::write_end_of_document(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn entry(id: &str, address: u64) -> NodeEntry {
        NodeEntry { node_id: id.parse().unwrap(), address: StorageAddress(address) }
    }

    fn encode(doc: u32, entries: &[NodeEntry]) -> BytesMut {
        let mut out = BytesMut::new();
        BlockEncoder::encode_entries(&mut out, DocId(doc), OrderFlag::Ordered, entries);
        out
    }

    #[test]
    fn byte_len_covers_body_through_terminator() {
        let entries = [entry("1.1", 10), entry("1.2.1", 11)];
        let out = encode(5, &entries);
        let block = BlockReader::new(&out).next().unwrap().unwrap();
        let expected: usize = entries.iter().map(|e| e.node_id.encoded_len() + 8).sum::<usize>() + 1;
        assert_eq!(block.header.byte_len as usize, expected);
        assert_eq!(block.body.len(), expected);
        assert_eq!(block.raw.len(), out.len());
        assert_eq!(block.entries().unwrap(), entries);
    }

    #[test]
    fn reader_walks_concatenated_blocks() {
        let mut value = encode(1, &[entry("1", 1)]);
        value.extend_from_slice(&encode(2, &[entry("1.1", 2), entry("1.3", 3)]));
        let mut out = BytesMut::new();
        BlockEncoder::encode_entries(&mut out, DocId(3), OrderFlag::Unordered, &[]);
        value.extend_from_slice(&out);

        let blocks: Vec<_> = BlockReader::new(&value).collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].header.doc_id, DocId(2));
        assert_eq!(blocks[1].header.count, 2);
        assert_eq!(blocks[2].header.order, OrderFlag::Unordered);
        assert!(blocks[2].entries().unwrap().is_empty());
    }

    #[test]
    fn truncated_value_is_malformed_not_end() {
        let value = encode(1, &[entry("1.1", 1), entry("1.2", 2)]);
        let truncated = &value[..value.len() - 3];
        let results: Vec<_> = BlockReader::new(truncated).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().kind, ErrorKind::MalformedStream);
    }

    #[test]
    fn count_mismatch_is_detected() {
        let mut out = BytesMut::new();
        VByteEncoder::encode_u32(&mut out, 1);
        out.put_u8(0);
        VByteEncoder::encode_u32(&mut out, 3); // claims three nodes
        let mut body = BytesMut::new();
        let node: NodeId = "1.1".parse().unwrap();
        node.write(&mut body);
        body.put_u64_le(9);
        NodeId::write_end_of_document(&mut body);
        out.put_u32_le(body.len() as u32);
        out.extend_from_slice(&body);

        let block = BlockReader::new(&out).next().unwrap().unwrap();
        assert_eq!(block.entries().unwrap_err().kind, ErrorKind::MalformedStream);
    }

    #[test]
    fn oversized_count_is_rejected_before_decoding() {
        let mut out = BytesMut::new();
        VByteEncoder::encode_u32(&mut out, 1);
        out.put_u8(0);
        VByteEncoder::encode_u32(&mut out, u32::MAX);
        let mut body = BytesMut::new();
        BlockEncoder::encode_body(&mut body, [entry("1.1", 9)].iter().map(|e| (&e.node_id, e.address)));
        out.put_u32_le(body.len() as u32);
        out.extend_from_slice(&body);

        let block = BlockReader::new(&out).next().unwrap().unwrap();
        assert_eq!(block.header.count, u32::MAX);
        let err = block.entries().unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedStream);
        assert!(err.context.contains("declares 4294967295 nodes"));
    }
}
