use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use bytes::BytesMut;
use parking_lot::{Mutex, MutexGuard};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{IndexStatistics, Occurrences};
use crate::core::symbols::SymbolTable;
use crate::core::types::{CollectionId, DocId, Document, DocumentSet, NodeProxy, NodeType, QName, StorageAddress};
use crate::index::block::{BlockEncoder, BlockReader, NodeEntry, OrderFlag};
use crate::index::key::{EntryKind, IndexKey};
use crate::index::node_set::NodeSet;
use crate::index::pending::PendingBuffer;
use crate::index::progress::{ProgressIndicator, ProgressObserver};
use crate::numbering::node_id::NodeId;
use crate::storage::store::{KeyValueStore, LockToken, RangeQuery};

/// Decides whether a stored node takes part in a lookup result
pub trait NodeSelector {
    fn select(&self, document: &Document, node_id: &NodeId) -> Option<NodeProxy>;
}

impl<F> NodeSelector for F
where
    F: Fn(&Document, &NodeId) -> Option<NodeProxy>,
{
    fn select(&self, document: &Document, node_id: &NodeId) -> Option<NodeProxy> {
        self(document, node_id)
    }
}

/// What the document store knows about a node the index points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub node_type: NodeType,
    pub local_name: String,
}

/// Loads nodes from the document store for consistency checks
pub trait NodeResolver {
    fn resolve(&self, document: &Document, node_id: &NodeId, address: StorageAddress) -> Option<ResolvedNode>;
}

/// Outcome of writing a pending buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub names: usize,
    pub nodes: usize,
}

/// Structural index over element and attribute names.
///
/// For every `(kind, collection, name)` the store holds one value made of
/// per-document blocks:
///
/// ```text
/// docId:vbyte | order:u8 | count:vbyte | byteLength:u32 LE | (nodeId addr:u64 LE)* | 0
/// ```
///
/// Writers collect nodes in a [`PendingBuffer`] and append one block per name
/// on flush. Removal rewrites a document's blocks into a single ordered block;
/// other documents' blocks are copied through byte for byte.
pub struct ElementIndex {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) symbols: Arc<dyn SymbolTable>,
    scratch: Mutex<BytesMut>,
    scratch_high_water: usize,
    progress_step: usize,
}

impl ElementIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, symbols: Arc<dyn SymbolTable>, config: &Config) -> Self {
        ElementIndex {
            store,
            symbols,
            scratch: Mutex::new(BytesMut::with_capacity(4096)),
            scratch_high_water: config.scratch_high_water,
            progress_step: config.progress_step_percent,
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn symbols(&self) -> &Arc<dyn SymbolTable> {
        &self.symbols
    }

    pub(crate) fn key_for(&self, kind: EntryKind, collection: CollectionId, qname: &QName) -> Result<IndexKey> {
        IndexKey::for_qname(kind, collection, qname, self.symbols.as_ref())
    }

    fn scratch(&self) -> MutexGuard<'_, BytesMut> {
        let mut scratch = self.scratch.lock();
        scratch.clear();
        scratch
    }

    // Oversized buffers left behind by a big document are given back
    fn release_scratch(&self, mut scratch: MutexGuard<'_, BytesMut>) {
        if scratch.capacity() > self.scratch_high_water {
            tracing::debug!(capacity = scratch.capacity(), "releasing scratch buffer");
            *scratch = BytesMut::new();
        }
    }

    /// Write every pending name of `buffer` as one block appended to its key.
    ///
    /// Names are written in order; a name leaves the buffer only once its
    /// block is in the store. On error the failing name and all names after
    /// it stay pending, so the flush can be retried.
    ///
    /// A key holds at most one ordered block per document. An ordered buffer
    /// for a document that already has a block under one of its keys fails
    /// with [`ErrorKind::InvalidState`]; nodes added to an indexed document
    /// go through [`PendingBuffer::new_update_mode`].
    pub fn flush(&self, buffer: &mut PendingBuffer, observer: Option<&dyn ProgressObserver>) -> Result<FlushSummary> {
        let mut summary = FlushSummary::default();
        if buffer.is_empty() {
            return Ok(summary);
        }
        let qnames = buffer.qnames();
        let mut progress = ProgressIndicator::new(qnames.len(), self.progress_step);
        let mut scratch = self.scratch();

        for (done, qname) in qnames.into_iter().enumerate() {
            let key = match self.key_for(qname.name_type, buffer.collection(), &qname) {
                Ok(key) => key,
                Err(e) => {
                    tracing::error!(name = %qname, error = %e, "failed to build index key");
                    return Err(e);
                }
            };
            let Some(mut nodes) = buffer.take(&qname) else { continue };
            nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

            scratch.clear();
            BlockEncoder::encode(
                &mut scratch,
                buffer.doc_id(),
                buffer.order(),
                nodes.iter().map(|n| (&n.node_id, n.address)),
            );
            if let Err(e) = self.append_block(&key, buffer.doc_id(), buffer.order(), &scratch) {
                tracing::error!(
                    name = %qname,
                    doc_id = %buffer.doc_id(),
                    error = %e,
                    "failed to flush structural index"
                );
                buffer.restore(qname, nodes);
                return Err(e);
            }
            summary.names += 1;
            summary.nodes += nodes.len();

            progress.set_value(done + 1);
            if progress.changed() {
                if let Some(observer) = observer {
                    observer.progress(&progress);
                }
            }
        }

        progress.finish();
        if let Some(observer) = observer {
            observer.progress(&progress);
        }
        tracing::debug!(
            doc_id = %buffer.doc_id(),
            names = summary.names,
            nodes = summary.nodes,
            "flushed structural index"
        );
        self.release_scratch(scratch);
        Ok(summary)
    }

    fn append_block(&self, key: &IndexKey, doc_id: DocId, order: OrderFlag, block: &[u8]) -> Result<()> {
        let lock = self.store.lock();
        let token = lock.write()?;
        if order.is_ordered() {
            if let Some(existing) = self.store.get(&token, key.as_bytes())? {
                for stored in BlockReader::new(&existing.data) {
                    if stored?.header.doc_id == doc_id {
                        return Err(Error::new(
                            ErrorKind::InvalidState,
                            format!("document {} is already indexed under {}, flush in update mode", doc_id, key),
                        ));
                    }
                }
            }
        }
        self.store.append(&token, key.as_bytes(), block)?;
        Ok(())
    }

    /// Remove `removed` from the document's nodes under `qname`.
    ///
    /// All blocks of the document are merged into one ordered block; the
    /// value is written back even when that block ends up empty.
    pub fn remove_from_document(&self, document: &Document, qname: &QName, removed: &[NodeId]) -> Result<()> {
        let key = self.key_for(qname.name_type, document.collection, qname)?;
        let removed: HashSet<&NodeId> = removed.iter().collect();
        let mut scratch = self.scratch();

        let lock = self.store.lock();
        let token = lock.write()?;
        let previous = self.store.get(&token, key.as_bytes())?;

        let mut survivors: Vec<NodeEntry> = Vec::new();
        if let Some(previous) = &previous {
            for block in BlockReader::new(&previous.data) {
                let block = block?;
                if block.header.doc_id != document.id {
                    block.copy_to(&mut scratch);
                    continue;
                }
                survivors.extend(block.entries()?.into_iter().filter(|e| !removed.contains(&e.node_id)));
            }
        }
        if !survivors.is_empty() {
            survivors.sort_by(|a, b| a.node_id.cmp(&b.node_id));
            survivors.dedup_by(|a, b| a.node_id == b.node_id);
            BlockEncoder::encode_entries(&mut scratch, document.id, OrderFlag::Ordered, &survivors);
        }

        let result = match previous {
            None => self.store.put(&token, key.as_bytes(), &scratch),
            Some(previous) => self.store.update(&token, previous.address, key.as_bytes(), &scratch),
        };
        if let Err(e) = result {
            tracing::error!(name = %qname, doc_id = %document.id, error = %e, "failed to rewrite structural index");
            return Err(e);
        }
        drop(token);
        self.release_scratch(scratch);
        Ok(())
    }

    /// Remove every node registered in `buffer` from the index, then clear it
    pub fn remove_pending(&self, buffer: &mut PendingBuffer) -> Result<()> {
        let document = buffer.document().clone();
        for qname in buffer.qnames() {
            let Some(nodes) = buffer.take(&qname) else { continue };
            let ids: Vec<NodeId> = nodes.iter().map(|n| n.node_id.clone()).collect();
            if let Err(e) = self.remove_from_document(&document, &qname, &ids) {
                buffer.restore(qname, nodes);
                return Err(e);
            }
        }
        buffer.discard();
        Ok(())
    }

    /// Remove every key of the collection, all entry kinds
    pub fn drop_collection(&self, collection: CollectionId) -> Result<usize> {
        let lock = self.store.lock();
        let token = lock.write()?;
        let mut removed = 0;
        for kind in EntryKind::ALL {
            let query = RangeQuery::prefix(IndexKey::collection_prefix(kind, collection));
            removed += self.store.remove_all(&token, &query)?;
        }
        tracing::debug!(%collection, keys = removed, "dropped collection from structural index");
        Ok(removed)
    }

    /// Strip the document's blocks from every key of its collection
    pub fn drop_document(&self, document: &Document) -> Result<usize> {
        self.drop_document_with(document, &|| false)
    }

    /// Like [`drop_document`](Self::drop_document), checking `should_stop`
    /// before each key. Stopping yields [`ErrorKind::Terminated`] with the keys
    /// rewritten so far left in place.
    pub fn drop_document_with(&self, document: &Document, should_stop: &dyn Fn() -> bool) -> Result<usize> {
        let mut scratch = self.scratch();
        let result = self.drop_document_locked(&mut scratch, document, should_stop);
        self.release_scratch(scratch);
        match &result {
            Ok(rewritten) => tracing::debug!(doc_id = %document.id, keys = rewritten, "dropped document from structural index"),
            Err(e) if e.kind == ErrorKind::Terminated => tracing::warn!(doc_id = %document.id, "document removal terminated"),
            Err(e) => tracing::error!(doc_id = %document.id, error = %e, "failed to drop document from structural index"),
        }
        result
    }

    fn drop_document_locked(
        &self,
        scratch: &mut BytesMut,
        document: &Document,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<usize> {
        let lock = self.store.lock();
        let token = lock.write()?;
        let mut rewritten = 0;
        for kind in EntryKind::ALL {
            let query = RangeQuery::prefix(IndexKey::collection_prefix(kind, document.collection));
            for key in self.store.find_keys(&token, &query)? {
                if should_stop() {
                    return Err(Error::new(
                        ErrorKind::Terminated,
                        format!("removal of document {} stopped after {} keys", document.uri, rewritten),
                    ));
                }
                let Some(value) = self.store.get(&token, &key)? else { continue };
                scratch.clear();
                let mut changed = false;
                for block in BlockReader::new(&value.data) {
                    let block = block?;
                    if block.header.doc_id == document.id {
                        changed = true;
                    } else {
                        block.copy_to(scratch);
                    }
                }
                if changed {
                    self.store.update(&token, value.address, &key, scratch)?;
                    rewritten += 1;
                }
            }
        }
        Ok(rewritten)
    }

    /// All nodes named `qname` in `docs`, optionally filtered by `selector`.
    ///
    /// The result remembers `docs` as its document set only when every input
    /// document produced nodes and nothing was filtered out.
    pub fn find_by_tag_name(
        &self,
        kind: EntryKind,
        docs: &DocumentSet,
        qname: &QName,
        selector: Option<&dyn NodeSelector>,
    ) -> Result<NodeSet> {
        let node_type = kind.node_type();
        let mut result = NodeSet::new();
        let mut same_doc_set = true;

        for collection in docs.collections() {
            let key = self.key_for(kind, collection, qname)?;
            let lock = self.store.lock();
            // held until the last block of the value is decoded
            let token = lock.read()?;
            let Some(value) = self.store.get(&token, key.as_bytes())? else {
                same_doc_set = false;
                continue;
            };
            for block in BlockReader::new(&value.data) {
                let block = block?;
                let Some(doc) = docs.get(block.header.doc_id) else { continue };
                for entry in block.entries()? {
                    let node = match selector {
                        None => NodeProxy::new(doc.id, entry.node_id),
                        Some(selector) => match selector.select(doc, &entry.node_id) {
                            Some(node) => node,
                            None => {
                                same_doc_set = false;
                                continue;
                            }
                        },
                    };
                    result.add(node.with_address(entry.address).with_type(node_type));
                }
                result.set_sorted(doc.id, block.header.order.is_ordered());
            }
        }

        if same_doc_set && result.document_count() == docs.len() {
            result.set_document_set(docs.clone());
        }
        Ok(result)
    }

    fn qname_of(&self, key: &IndexKey) -> Result<QName> {
        let kind = key.kind()?;
        if let Some(local_name) = key.local_name() {
            let local_name = String::from_utf8_lossy(local_name);
            return Ok(QName { name_type: kind, ..QName::attribute(&local_name, "") });
        }
        let (symbol, ns_symbol) = key.symbols()
            .ok_or_else(|| Error::new(ErrorKind::Corrupted, format!("index key {} carries no name", key)))?;
        let local_name = self.symbols.name(symbol)
            .ok_or_else(|| Error::new(ErrorKind::Corrupted, format!("unknown symbol {} in key {}", symbol, key)))?;
        let namespace = self.symbols.namespace(ns_symbol)
            .ok_or_else(|| Error::new(ErrorKind::Corrupted, format!("unknown namespace {} in key {}", ns_symbol, key)))?;
        Ok(QName { name_type: kind, ..QName::element(&local_name, &namespace) })
    }

    fn collection_entries(&self, token: &LockToken<'_>, collection: CollectionId) -> Result<Vec<(IndexKey, bytes::Bytes)>> {
        let mut entries = Vec::new();
        for kind in EntryKind::ALL {
            let query = RangeQuery::prefix(IndexKey::collection_prefix(kind, collection));
            for (key, value) in self.store.find_entries(token, &query)? {
                entries.push((IndexKey::from_bytes(key)?, value));
            }
        }
        Ok(entries)
    }

    /// Every name indexed in `collections` with its node and document counts
    pub fn scan_indexed_elements(&self, collections: &[CollectionId]) -> Result<Vec<Occurrences>> {
        let mut occurrences: BTreeMap<QName, Occurrences> = BTreeMap::new();
        let lock = self.store.lock();
        let token = lock.read()?;
        for &collection in collections {
            for (key, value) in self.collection_entries(&token, collection)? {
                let qname = self.qname_of(&key)?;
                let entry = occurrences.entry(qname.clone()).or_insert_with(|| Occurrences::new(qname));
                for block in BlockReader::new(&value) {
                    entry.add_occurrences(block?.header.count);
                }
            }
        }
        Ok(occurrences.into_values().collect())
    }

    /// Resolve every indexed node of `document` and compare it with its key.
    ///
    /// Returns one report line per name; the first mismatch aborts with
    /// [`ErrorKind::Corrupted`].
    pub fn consistency_check(&self, document: &Document, resolver: &dyn NodeResolver) -> Result<Vec<String>> {
        let lock = self.store.lock();
        let token = lock.read()?;
        let mut report = Vec::new();
        for (key, value) in self.collection_entries(&token, document.collection)? {
            let qname = self.qname_of(&key)?;
            let expected = qname.name_type.node_type();
            let mut line = format!("Checking {}: ", qname.local_name);
            let mut seen = false;
            for block in BlockReader::new(&value) {
                let block = block?;
                if block.header.doc_id != document.id {
                    continue;
                }
                seen = true;
                for entry in block.entries()? {
                    let node = resolver.resolve(document, &entry.node_id, entry.address).ok_or_else(|| {
                        Error::new(
                            ErrorKind::Corrupted,
                            format!("node {} in document {} not found", entry.node_id, document.uri),
                        )
                    })?;
                    if !matches!(node.node_type, NodeType::Element | NodeType::Attribute) {
                        return Err(Error::new(
                            ErrorKind::Corrupted,
                            format!("node {} in document {} is {:?}, expected element or attribute", entry.node_id, document.uri, node.node_type),
                        ));
                    }
                    if node.node_type != expected || node.local_name != qname.local_name {
                        return Err(Error::new(
                            ErrorKind::Corrupted,
                            format!(
                                "node {} in document {} is {:?} '{}', index says {:?} '{}'",
                                entry.node_id, document.uri, node.node_type, node.local_name, expected, qname.local_name
                            ),
                        ));
                    }
                    line.push_str(&entry.address.to_string());
                    line.push(' ');
                }
            }
            if seen {
                tracing::debug!("{}", line);
                report.push(line);
            }
        }
        Ok(report)
    }

    pub fn statistics(&self, collection: CollectionId) -> Result<IndexStatistics> {
        let lock = self.store.lock();
        let token = lock.read()?;
        let mut stats = IndexStatistics::new(collection);
        for (_, value) in self.collection_entries(&token, collection)? {
            stats.keys += 1;
            stats.value_bytes += value.len() as u64;
            for block in BlockReader::new(&value) {
                let header = block?.header;
                stats.blocks += 1;
                stats.nodes += header.count as u64;
                if !header.order.is_ordered() {
                    stats.unordered_blocks += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Flush the backing store
    pub fn sync(&self) -> Result<()> {
        let lock = self.store.lock();
        let token = lock.write()?;
        self.store.flush(&token)
    }
}
