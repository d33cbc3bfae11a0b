use bytes::BytesMut;
use crate::core::error::Result;
use crate::core::types::{Document, DocumentSet, NodeProxy, NodeType, QName};
use crate::index::block::{BlockEncoder, BlockReader, RawBlock};
use crate::index::cursor::DescendantCursor;
use crate::index::element_index::ElementIndex;
use crate::index::key::EntryKind;
use crate::index::node_set::NodeSet;
use crate::numbering::node_id::Relation;

/// Navigation step evaluated by [`ElementIndex::find_descendants`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    DescendantAttribute,
}

impl Axis {
    pub fn accepts(self, relation: Relation) -> bool {
        match self {
            Axis::Child | Axis::Attribute => relation == Relation::Child,
            Axis::Descendant | Axis::DescendantAttribute => {
                matches!(relation, Relation::Child | Relation::Descendant)
            }
            Axis::DescendantOrSelf => true,
        }
    }
}

struct JoinTarget<'a> {
    document: &'a Document,
    node_type: NodeType,
    axis: Axis,
    context_id: Option<u32>,
}

impl JoinTarget<'_> {
    fn matched(&self, cursor: &DescendantCursor<'_>, ancestor: &NodeProxy) -> Option<NodeProxy> {
        let entry = cursor.current()?;
        let mut node = NodeProxy::new(self.document.id, entry.node_id.clone())
            .with_address(entry.address)
            .with_type(self.node_type);
        match self.context_id {
            Some(context_id) => node.deep_copy_context(ancestor, context_id),
            None => node.copy_context(ancestor),
        }
        Some(node)
    }
}

impl ElementIndex {
    /// Nodes named `qname` standing in `axis` relation to a node of `context`.
    ///
    /// Ancestors and stored descendants are both in document order, so each
    /// document is one merge pass over its block. A cursor mark is kept at the
    /// first descendant of the outermost ancestor still in play; nested
    /// ancestors rewind to it instead of searching the block again.
    ///
    /// With `context_id` set, every result records the ancestor it was reached
    /// from under that id; otherwise only the ancestors' own context is passed on.
    pub fn find_descendants(
        &self,
        kind: EntryKind,
        qname: &QName,
        axis: Axis,
        docs: &DocumentSet,
        context: &NodeSet,
        context_id: Option<u32>,
    ) -> Result<NodeSet> {
        let node_type = kind.node_type();
        let mut result = NodeSet::new();
        let mut same_doc_set = true;
        let mut resorted = BytesMut::new();

        for collection in docs.collections() {
            let key = self.key_for(kind, collection, qname)?;
            let lock = self.store.lock();
            // held through the join of every block
            let token = lock.read()?;
            let Some(value) = self.store.get(&token, key.as_bytes())? else {
                same_doc_set = false;
                continue;
            };
            for block in BlockReader::new(&value.data) {
                let block = block?;
                let Some(document) = docs.get(block.header.doc_id) else { continue };
                let ancestors = context.sorted_nodes(document.id);
                if ancestors.is_empty() {
                    continue;
                }
                let mut cursor = if block.header.order.is_ordered() {
                    block.cursor()?
                } else {
                    Self::sorted_body(&block, &mut resorted)?;
                    DescendantCursor::new(&resorted)?
                };
                let target = JoinTarget { document, node_type, axis, context_id };
                join_block(&mut cursor, &ancestors, &target, &mut result)?;
            }
        }

        result.sort();
        if same_doc_set && result.document_count() == docs.len() {
            result.set_document_set(docs.clone());
        }
        Ok(result)
    }

    // Blocks written in update mode are put in document order before joining
    fn sorted_body(block: &RawBlock<'_>, out: &mut BytesMut) -> Result<()> {
        let mut entries = block.entries()?;
        entries.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        entries.dedup_by(|a, b| a.node_id == b.node_id);
        out.clear();
        BlockEncoder::encode_body(out, entries.iter().map(|e| (&e.node_id, e.address)));
        Ok(())
    }
}

fn join_block(
    cursor: &mut DescendantCursor<'_>,
    ancestors: &[NodeProxy],
    target: &JoinTarget<'_>,
    result: &mut NodeSet,
) -> Result<()> {
    let Some(first) = ancestors.first() else { return Ok(()) };
    if cursor.is_exhausted() {
        return Ok(());
    }
    let mut index = 0;
    let mut ancestor = first;
    let mut window = first;
    cursor.mark();

    while let Some(entry) = cursor.current() {
        match entry.node_id.compute_relation(&ancestor.node_id) {
            Some(relation) => {
                if target.axis.accepts(relation) {
                    if let Some(node) = target.matched(cursor, ancestor) {
                        result.add(node);
                    }
                }
                if cursor.advance()?.is_none() && !rescan_nested(cursor, ancestors, &mut index, &mut ancestor)? {
                    break;
                }
            }
            None if ancestor.node_id < entry.node_id => {
                // Past everything below this ancestor
                let Some(next) = ancestors.get(index + 1) else { break };
                index += 1;
                if next.node_id.is_descendant_of(&ancestor.node_id) {
                    cursor.reset_to_mark()?;
                } else if !next.node_id.is_descendant_of(&window.node_id) {
                    window = next;
                    cursor.mark();
                }
                ancestor = next;
            }
            None => {
                if cursor.advance()?.is_none() && !rescan_nested(cursor, ancestors, &mut index, &mut ancestor)? {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// At the end of the block only an ancestor nested in the current one can still match
fn rescan_nested<'n>(
    cursor: &mut DescendantCursor<'_>,
    ancestors: &'n [NodeProxy],
    index: &mut usize,
    ancestor: &mut &'n NodeProxy,
) -> Result<bool> {
    match ancestors.get(*index + 1) {
        Some(next) if next.node_id.is_descendant_of(&ancestor.node_id) => {
            *index += 1;
            *ancestor = next;
            cursor.reset_to_mark()?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::core::config::Config;
    use crate::core::symbols::MemorySymbolTable;
    use crate::core::types::{CollectionId, DocId, StorageAddress};
    use crate::index::pending::PendingBuffer;
    use crate::storage::memory_store::MemoryStore;
    use crate::storage::store::KeyValueStore;

    fn index() -> ElementIndex {
        let config = Config::default();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new("elements", &config));
        ElementIndex::new(store, Arc::new(MemorySymbolTable::new()), &config)
    }

    fn doc() -> Document {
        Document::new(DocId(1), CollectionId(1), "/db/t.xml")
    }

    fn store(index: &ElementIndex, qname: &QName, ids: &[&str]) {
        let mut buffer = PendingBuffer::new(doc());
        for (i, id) in ids.iter().enumerate() {
            let proxy = NodeProxy::new(DocId(1), id.parse().unwrap()).with_address(StorageAddress(i as u64));
            buffer.register(qname.clone(), proxy).unwrap();
        }
        index.flush(&mut buffer, None).unwrap();
    }

    fn context(ids: &[&str]) -> NodeSet {
        NodeSet::from_nodes(ids.iter().map(|id| NodeProxy::new(DocId(1), id.parse().unwrap())))
    }

    fn ids(set: &NodeSet) -> Vec<String> {
        set.iter().map(|n| n.node_id.to_string()).collect()
    }

    fn find(index: &ElementIndex, qname: &QName, axis: Axis, ctx: &[&str]) -> NodeSet {
        let docs: DocumentSet = [doc()].into_iter().collect();
        index.find_descendants(EntryKind::Element, qname, axis, &docs, &context(ctx), Some(1)).unwrap()
    }

    #[test]
    fn axis_acceptance() {
        assert!(Axis::Child.accepts(Relation::Child));
        assert!(!Axis::Child.accepts(Relation::Descendant));
        assert!(!Axis::Attribute.accepts(Relation::Descendant));
        assert!(Axis::Descendant.accepts(Relation::Descendant));
        assert!(!Axis::Descendant.accepts(Relation::SelfNode));
        assert!(Axis::DescendantOrSelf.accepts(Relation::SelfNode));
    }

    #[test]
    fn descendants_of_single_ancestor() {
        let index = index();
        let q = QName::element("b", "");
        store(&index, &q, &["1.1", "1.2", "2.1"]);
        let result = find(&index, &q, Axis::Descendant, &["1"]);
        assert_eq!(ids(&result), ["1.1", "1.2"]);
        let node = result.iter().next().unwrap();
        assert_eq!(node.context[0].node.to_string(), "1");
        assert_eq!(node.node_type, Some(NodeType::Element));
    }

    #[test]
    fn nested_ancestors_rescan() {
        let index = index();
        let q = QName::element("b", "");
        store(&index, &q, &["1.1", "1.1.1", "1.1.1.1", "1.2"]);
        let result = find(&index, &q, Axis::Child, &["1", "1.1", "1.1.1"]);
        assert_eq!(ids(&result), ["1.1", "1.1.1", "1.1.1.1", "1.2"]);

        let result = find(&index, &q, Axis::Descendant, &["1", "1.1"]);
        let deep = result.get(DocId(1), &"1.1.1".parse().unwrap()).unwrap();
        assert_eq!(deep.context.len(), 2);
    }

    #[test]
    fn descendant_or_self_includes_ancestor() {
        let index = index();
        let q = QName::element("b", "");
        store(&index, &q, &["1.2", "1.2.3", "1.4"]);
        assert_eq!(ids(&find(&index, &q, Axis::DescendantOrSelf, &["1.2"])), ["1.2", "1.2.3"]);
        assert_eq!(ids(&find(&index, &q, Axis::Descendant, &["1.2"])), ["1.2.3"]);
    }

    #[test]
    fn unordered_blocks_are_sorted_first() {
        let index = index();
        let q = QName::element("b", "");
        store(&index, &q, &["1.1"]);
        let mut buffer = PendingBuffer::new_update_mode(doc());
        for id in ["1.3.1", "1.2"] {
            buffer.register(q.clone(), NodeProxy::new(DocId(1), id.parse().unwrap())).unwrap();
        }
        index.flush(&mut buffer, None).unwrap();
        let result = find(&index, &q, Axis::Child, &["1"]);
        assert_eq!(ids(&result), ["1.1", "1.2"]);
    }

    #[test]
    fn missing_key_gives_empty_result_without_document_set() {
        let index = index();
        let result = find(&index, &QName::element("none", ""), Axis::Descendant, &["1"]);
        assert!(result.is_empty());
        assert!(result.document_set().is_none());
    }
}
