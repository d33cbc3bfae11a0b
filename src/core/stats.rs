use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::core::types::{CollectionId, QName};

/// How often a name occurs in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrences {
    pub qname: QName,
    pub occurrences: u64,   // Node entries across all blocks
    pub documents: u32,     // Blocks, i.e. documents using the name
}

impl Occurrences {
    pub fn new(qname: QName) -> Self {
        Occurrences { qname, occurrences: 0, documents: 0 }
    }

    pub fn add_occurrences(&mut self, count: u32) {
        self.occurrences += count as u64;
        self.documents += 1;
    }
}

/// Size snapshot of one collection's structural index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub collection: CollectionId,
    pub generated_at: DateTime<Utc>,

    pub keys: usize,
    pub blocks: usize,
    pub unordered_blocks: usize,
    pub nodes: u64,
    pub value_bytes: u64,
}

impl IndexStatistics {
    pub fn new(collection: CollectionId) -> Self {
        IndexStatistics {
            collection,
            generated_at: Utc::now(),
            keys: 0,
            blocks: 0,
            unordered_blocks: 0,
            nodes: 0,
            value_bytes: 0,
        }
    }

    pub fn avg_nodes_per_block(&self) -> f64 {
        if self.blocks == 0 {
            0.0
        } else {
            self.nodes as f64 / self.blocks as f64
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
