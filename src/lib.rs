pub mod core;
pub mod numbering;
pub mod compression;
pub mod storage;
pub mod index;
pub mod collection;
pub mod memory;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              ELEMDEX STRUCT ARCHITECTURE                                    │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────────── INDEX LAYER ────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                            struct ElementIndex                                      │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ store: Arc<dyn KeyValueStore>     // Ordered byte-keyed store               │ │    │
│  │  │ symbols: Arc<dyn SymbolTable>     // Name <-> u16 symbol codes              │ │    │
│  │  │ scratch: Mutex<BytesMut>          // Block encoder buffer                   │ │    │
│  │  │ scratch_high_water: usize         // Released above this capacity           │ │    │
│  │  │ progress_step: usize              // Flush progress granularity             │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  │  flush / remove_from_document / remove_pending                                     │    │
│  │  drop_collection / drop_document_with                                              │    │
│  │  find_by_tag_name / find_descendants (structural join)                             │    │
│  │  scan_indexed_elements / consistency_check / statistics / sync                     │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌───────────────────────────────┐    │
│  │ struct PendingBuffer │  │ struct NodeSet       │  │ struct DescendantCursor       │    │
│  │ • document           │  │ • docs: BTreeMap<    │  │ • input: VByteReader          │    │
│  │ • order: OrderFlag   │  │   DocId, nodes+sort> │  │ • current: NodeEntry          │    │
│  │ • pending: BTreeMap< │  │ • document_set       │  │ • mark / reset_to_mark        │    │
│  │   QName, Vec<Proxy>> │  └──────────────────────┘  └───────────────────────────────┘    │
│  └──────────────────────┘                                                                   │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── ON-DISK LAYOUT ──────────────────────────────────────┐
│                                                                                              │
│  Key:    kind:u8 | collection:u16 BE | symbol:u16 BE | ns:u16 BE     (by-id: raw local name) │
│                                                                                              │
│  Value:  block | block | ...                                                                 │
│  Block:  docId:vbyte | order:u8 | count:vbyte | byteLength:u32 LE                            │
│          | (nodeId:vbyte levels | address:u64 LE) * count | 0                                │
│  NodeId: level count:vbyte | level:vbyte *   (1.3.2 -> 03 01 03 02, terminator -> 00)       │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── COLLECTION LAYER ─────────────────────────────────────┐
│                                                                                              │
│  ┌───────────────────────────┐      ┌──────────────────────────────┐                        │
│  │ struct CollectionStore    │─────▶│ struct CollectionCache       │                        │
│  │ • store: Arc<dyn KVStore> │      │ • items: Vec<Option<Arc<..>>>│                        │
│  │ • cache: Mutex<Cache>     │      │ • map: key -> slot           │                        │
│  └───────────────────────────┘      │ • names: name -> key         │    ┌──────────────────┐│
│                                      │ • hooks: EvictionHooks       │───▶│ trait            ││
│                                      │ • cache_manager              │    │ CacheManager     ││
│                                      └──────────────────────────────┘    │ request_memory() ││
│  eviction: min ref_count / (total_references - timestamp)                 └──────────────────┘│
│            over collections whose lock try_read() succeeds and allow_unload()               │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────────── STORAGE ───────────────────────────────────────────┐
│  trait KeyValueStore: get / put / update / append / find_keys / find_entries / remove_all   │
│  every call carries a LockToken from StoreLock::read() / write() (bounded wait)              │
│  struct MemoryStore: BTreeMap<Vec<u8>, Slot> + crc32 checked bincode snapshot               │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
