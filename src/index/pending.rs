use std::collections::BTreeMap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{CollectionId, Document, DocId, NodeProxy, QName};
use crate::index::block::OrderFlag;

/// Nodes collected while one document is loaded (or removed), keyed by name.
///
/// Owned by the load session and handed to
/// [`ElementIndex::flush`](crate::index::element_index::ElementIndex::flush) or
/// [`ElementIndex::remove_pending`](crate::index::element_index::ElementIndex::remove_pending).
#[derive(Debug, Clone)]
pub struct PendingBuffer {
    document: Document,
    order: OrderFlag,
    pending: BTreeMap<QName, Vec<NodeProxy>>,
}

impl PendingBuffer {
    /// Buffer for the first load of a document; flushing it fails once the
    /// document has a block under the same name
    pub fn new(document: Document) -> Self {
        PendingBuffer {
            document,
            order: OrderFlag::Ordered,
            pending: BTreeMap::new(),
        }
    }

    /// Buffer for nodes added to an already indexed document; its blocks are written unordered
    pub fn new_update_mode(document: Document) -> Self {
        PendingBuffer {
            order: OrderFlag::Unordered,
            ..PendingBuffer::new(document)
        }
    }

    pub fn register(&mut self, qname: QName, proxy: NodeProxy) -> Result<()> {
        if proxy.doc_id != self.document.id {
            return Err(Error::new(
                ErrorKind::DocumentMismatch,
                format!("document id ('{}') and proxy id ('{}') differ", self.document.id, proxy.doc_id),
            ));
        }
        self.pending.entry(qname).or_insert_with(|| Vec::with_capacity(50)).push(proxy);
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn doc_id(&self) -> DocId {
        self.document.id
    }

    pub fn collection(&self) -> CollectionId {
        self.document.collection
    }

    pub fn order(&self) -> OrderFlag {
        self.order
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn qnames(&self) -> Vec<QName> {
        self.pending.keys().cloned().collect()
    }

    pub fn nodes(&self, qname: &QName) -> Option<&[NodeProxy]> {
        self.pending.get(qname).map(Vec::as_slice)
    }

    pub(crate) fn take(&mut self, qname: &QName) -> Option<Vec<NodeProxy>> {
        self.pending.remove(qname)
    }

    pub(crate) fn restore(&mut self, qname: QName, nodes: Vec<NodeProxy>) {
        self.pending.insert(qname, nodes);
    }

    /// Drop everything without writing
    pub fn discard(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(DocId(42), CollectionId(1), "/db/test/a.xml")
    }

    #[test]
    fn groups_by_name_in_insertion_order() {
        let mut buffer = PendingBuffer::new(doc());
        let q = QName::element("Q", "");
        buffer.register(q.clone(), NodeProxy::new(DocId(42), "1.3".parse().unwrap())).unwrap();
        buffer.register(q.clone(), NodeProxy::new(DocId(42), "1.1".parse().unwrap())).unwrap();
        buffer.register(QName::element("R", ""), NodeProxy::new(DocId(42), "1".parse().unwrap())).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.node_count(), 3);
        let nodes = buffer.nodes(&q).unwrap();
        assert_eq!(nodes[0].node_id.to_string(), "1.3");
        assert_eq!(nodes[1].node_id.to_string(), "1.1");
    }

    #[test]
    fn foreign_document_is_rejected() {
        let mut buffer = PendingBuffer::new(doc());
        let err = buffer
            .register(QName::element("Q", ""), NodeProxy::new(DocId(7), "1".parse().unwrap()))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DocumentMismatch);
        assert!(buffer.is_empty());
    }

    #[test]
    fn update_mode_writes_unordered() {
        let buffer = PendingBuffer::new_update_mode(doc());
        assert_eq!(buffer.order(), OrderFlag::Unordered);
        assert_eq!(PendingBuffer::new(doc()).order(), OrderFlag::Ordered);
    }
}
