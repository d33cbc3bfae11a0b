use std::borrow::Cow;
use std::collections::BTreeMap;
use crate::core::types::{DocId, DocumentSet, NodeProxy};
use crate::numbering::node_id::NodeId;

#[derive(Debug, Clone, Default)]
struct DocumentNodes {
    nodes: Vec<NodeProxy>,
    sorted: bool,
}

/// Node proxies grouped by document.
///
/// Each document carries a `sorted` flag telling consumers whether its nodes
/// are already in document order; [`NodeSet::sort`] only touches documents
/// where it is false.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    docs: BTreeMap<DocId, DocumentNodes>,
    document_set: Option<DocumentSet>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sorted set from arbitrary proxies
    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeProxy>) -> Self {
        let mut set = NodeSet::new();
        for node in nodes {
            set.add(node);
        }
        set.sort();
        set
    }

    /// Append a node. Documents first seen here are assumed ordered until told otherwise.
    pub fn add(&mut self, node: NodeProxy) {
        let doc = self.docs.entry(node.doc_id).or_insert_with(|| DocumentNodes {
            nodes: Vec::new(),
            sorted: true,
        });
        if doc.sorted {
            if let Some(last) = doc.nodes.last() {
                if last.node_id >= node.node_id {
                    doc.sorted = false;
                }
            }
        }
        doc.nodes.push(node);
    }

    /// Record whether a document's nodes arrived in order
    pub fn set_sorted(&mut self, doc_id: DocId, sorted: bool) {
        if let Some(doc) = self.docs.get_mut(&doc_id) {
            doc.sorted = doc.sorted && sorted;
        }
    }

    pub fn is_sorted(&self, doc_id: DocId) -> bool {
        self.docs.get(&doc_id).map(|d| d.sorted).unwrap_or(true)
    }

    /// Sort unsorted documents, merging duplicate node ids (contexts are combined)
    pub fn sort(&mut self) {
        for doc in self.docs.values_mut() {
            if !doc.sorted {
                Self::sort_document(doc);
            }
        }
    }

    fn sort_document(doc: &mut DocumentNodes) {
        doc.nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        let mut merged: Vec<NodeProxy> = Vec::with_capacity(doc.nodes.len());
        for node in doc.nodes.drain(..) {
            match merged.last_mut() {
                Some(last) if last.node_id == node.node_id => {
                    for item in node.context {
                        last.add_context(item);
                    }
                }
                _ => merged.push(node),
            }
        }
        doc.nodes = merged;
        doc.sorted = true;
    }

    /// A document's nodes in document order, sorting a copy if needed
    pub fn sorted_nodes(&self, doc_id: DocId) -> Cow<'_, [NodeProxy]> {
        match self.docs.get(&doc_id) {
            None => Cow::Borrowed(&[]),
            Some(doc) if doc.sorted => Cow::Borrowed(doc.nodes.as_slice()),
            Some(doc) => {
                let mut copy = doc.clone();
                Self::sort_document(&mut copy);
                Cow::Owned(copy.nodes)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.docs.values().map(|d| d.nodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.values().all(|d| d.nodes.is_empty())
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.iter().filter(|(_, d)| !d.nodes.is_empty()).map(|(id, _)| *id)
    }

    pub fn document_count(&self) -> usize {
        self.document_ids().count()
    }

    pub fn nodes(&self, doc_id: DocId) -> &[NodeProxy] {
        self.docs.get(&doc_id).map(|d| d.nodes.as_slice()).unwrap_or(&[])
    }

    pub fn node_ids(&self, doc_id: DocId) -> Vec<NodeId> {
        self.nodes(doc_id).iter().map(|n| n.node_id.clone()).collect()
    }

    pub fn get(&self, doc_id: DocId, node_id: &NodeId) -> Option<&NodeProxy> {
        let nodes = self.nodes(doc_id);
        if self.is_sorted(doc_id) {
            nodes.binary_search_by(|n| n.node_id.cmp(node_id)).ok().map(|i| &nodes[i])
        } else {
            nodes.iter().find(|n| &n.node_id == node_id)
        }
    }

    /// All nodes, documents ascending
    pub fn iter(&self) -> impl Iterator<Item = &NodeProxy> {
        self.docs.values().flat_map(|d| d.nodes.iter())
    }

    /// Documents the nodes come from; only known when a lookup proved it equal to its input
    pub fn document_set(&self) -> Option<&DocumentSet> {
        self.document_set.as_ref()
    }

    pub fn set_document_set(&mut self, docs: DocumentSet) {
        self.document_set = Some(docs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ContextItem;

    fn proxy(doc: u32, id: &str) -> NodeProxy {
        NodeProxy::new(DocId(doc), id.parse().unwrap())
    }

    #[test]
    fn out_of_order_add_clears_sorted_flag() {
        let mut set = NodeSet::new();
        set.add(proxy(1, "1.1"));
        set.add(proxy(1, "1.2"));
        assert!(set.is_sorted(DocId(1)));
        set.add(proxy(1, "1.1.1"));
        assert!(!set.is_sorted(DocId(1)));
        set.sort();
        assert!(set.is_sorted(DocId(1)));
        let ids: Vec<String> = set.node_ids(DocId(1)).iter().map(|n| n.to_string()).collect();
        assert_eq!(ids, ["1.1", "1.1.1", "1.2"]);
    }

    #[test]
    fn sort_merges_duplicates_and_contexts() {
        let mut set = NodeSet::new();
        let mut a = proxy(2, "1.3");
        a.add_context(ContextItem { context_id: 1, node: "1".parse().unwrap() });
        let mut b = proxy(2, "1.3");
        b.add_context(ContextItem { context_id: 1, node: "1.3".parse().unwrap() });
        set.add(a);
        set.add(b);
        set.sort();
        assert_eq!(set.len(), 1);
        assert_eq!(set.nodes(DocId(2))[0].context.len(), 2);
    }

    #[test]
    fn declared_unordered_documents_get_sorted() {
        let mut set = NodeSet::new();
        set.add(proxy(1, "1.1"));
        set.add(proxy(1, "1.5"));
        set.set_sorted(DocId(1), false);
        assert!(!set.is_sorted(DocId(1)));
        set.set_sorted(DocId(1), true);
        assert!(!set.is_sorted(DocId(1)));
        assert!(set.get(DocId(1), &"1.5".parse().unwrap()).is_some());
    }
}
