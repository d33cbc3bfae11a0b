use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use elemdex::core::config::Config;
use elemdex::core::symbols::MemorySymbolTable;
use elemdex::core::types::{CollectionId, DocId, Document, DocumentSet, NodeProxy, QName, StorageAddress};
use elemdex::index::element_index::ElementIndex;
use elemdex::index::key::EntryKind;
use elemdex::index::node_set::NodeSet;
use elemdex::index::pending::PendingBuffer;
use elemdex::index::structural_join::Axis;
use elemdex::numbering::node_id::NodeId;
use elemdex::storage::memory_store::MemoryStore;
use elemdex::storage::store::KeyValueStore;
use rand::Rng;
use std::sync::Arc;

// Random document tree, node ids in document order
fn random_tree(rng: &mut impl Rng, nodes: usize) -> Vec<NodeId> {
    let mut ids = vec![NodeId::root()];
    while ids.len() < nodes {
        let parent = ids[rng.gen_range(0..ids.len())].clone();
        let child = parent.new_child(rng.gen_range(1..20)).unwrap();
        ids.push(child);
    }
    ids.sort();
    ids.dedup();
    ids
}

fn setup(nodes: usize) -> (ElementIndex, Document, Vec<NodeId>) {
    let config = Config::default();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new("bench.dbx", &config));
    let index = ElementIndex::new(store, Arc::new(MemorySymbolTable::new()), &config);
    let doc = Document::new(DocId(1), CollectionId(1), "/db/bench.xml");

    let mut rng = rand::thread_rng();
    let ids = random_tree(&mut rng, nodes);
    let mut buffer = PendingBuffer::new(doc.clone());
    for (i, id) in ids.iter().enumerate() {
        let qname = if i % 3 == 0 { QName::element("section", "") } else { QName::element("para", "") };
        let proxy = NodeProxy::new(doc.id, id.clone()).with_address(StorageAddress(i as u64));
        buffer.register(qname, proxy).unwrap();
    }
    index.flush(&mut buffer, None).unwrap();
    (index, doc, ids)
}

fn bench_find_by_tag_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_tag_name");
    for nodes in [1_000, 10_000, 50_000] {
        let (index, doc, _) = setup(nodes);
        let docs: DocumentSet = [doc].into_iter().collect();
        let para = QName::element("para", "");
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &nodes, |b, _| {
            b.iter(|| {
                let result = index.find_by_tag_name(EntryKind::Element, &docs, black_box(&para), None).unwrap();
                black_box(result.len())
            });
        });
    }
    group.finish();
}

fn bench_find_descendants(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_descendants");
    for nodes in [1_000, 10_000, 50_000] {
        let (index, doc, ids) = setup(nodes);
        let docs: DocumentSet = [doc.clone()].into_iter().collect();
        let para = QName::element("para", "");
        let sections = NodeSet::from_nodes(
            ids.iter().step_by(3).map(|id| NodeProxy::new(doc.id, id.clone())),
        );
        for axis in [Axis::Child, Axis::Descendant] {
            group.bench_with_input(BenchmarkId::new(format!("{:?}", axis), nodes), &nodes, |b, _| {
                b.iter(|| {
                    let result = index
                        .find_descendants(EntryKind::Element, &para, axis, &docs, black_box(&sections), Some(1))
                        .unwrap();
                    black_box(result.len())
                });
            });
        }
    }
    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let config = Config::default();
    let mut rng = rand::thread_rng();
    let ids = random_tree(&mut rng, 5_000);

    c.bench_function("flush_5000_nodes", |b| {
        b.iter(|| {
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new("bench.dbx", &config));
            let index = ElementIndex::new(store, Arc::new(MemorySymbolTable::new()), &config);
            let mut buffer = PendingBuffer::new(Document::new(DocId(1), CollectionId(1), "/db/bench.xml"));
            for id in &ids {
                let proxy = NodeProxy::new(DocId(1), id.clone());
                buffer.register(QName::element("para", ""), proxy).unwrap();
            }
            black_box(index.flush(&mut buffer, None).unwrap())
        });
    });
}

criterion_group!(benches, bench_find_by_tag_name, bench_find_descendants, bench_flush);
criterion_main!(benches);
