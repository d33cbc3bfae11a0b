use std::collections::HashMap;
use parking_lot::RwLock;
use crate::core::error::{Error, ErrorKind, Result};

/// Maps element/attribute names and namespace URIs to small integer codes.
/// Namespace symbol 0 is reserved for the empty namespace.
pub trait SymbolTable: Send + Sync {
    fn symbol(&self, local_name: &str) -> Result<u16>;
    fn ns_symbol(&self, namespace_uri: &str) -> Result<u16>;
    fn name(&self, symbol: u16) -> Option<String>;
    fn namespace(&self, ns_symbol: u16) -> Option<String>;
}

#[derive(Default)]
struct Symbols {
    names: Vec<String>,
    by_name: HashMap<String, u16>,
}

impl Symbols {
    fn intern(&mut self, value: &str, first: u16) -> Result<u16> {
        if let Some(&sym) = self.by_name.get(value) {
            return Ok(sym);
        }
        let sym = u16::try_from(self.names.len() + first as usize)
            .map_err(|_| Error::new(ErrorKind::InvalidState, "symbol table exhausted".to_string()))?;
        self.names.push(value.to_string());
        self.by_name.insert(value.to_string(), sym);
        Ok(sym)
    }

    fn lookup(&self, sym: u16, first: u16) -> Option<String> {
        sym.checked_sub(first)
            .and_then(|i| self.names.get(i as usize))
            .cloned()
    }
}

/// In-process symbol table, assigns codes on first use
#[derive(Default)]
pub struct MemorySymbolTable {
    names: RwLock<Symbols>,
    namespaces: RwLock<Symbols>,
}

impl MemorySymbolTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SymbolTable for MemorySymbolTable {
    fn symbol(&self, local_name: &str) -> Result<u16> {
        if let Some(&sym) = self.names.read().by_name.get(local_name) {
            return Ok(sym);
        }
        self.names.write().intern(local_name, 1)
    }

    fn ns_symbol(&self, namespace_uri: &str) -> Result<u16> {
        if namespace_uri.is_empty() {
            return Ok(0);
        }
        if let Some(&sym) = self.namespaces.read().by_name.get(namespace_uri) {
            return Ok(sym);
        }
        self.namespaces.write().intern(namespace_uri, 1)
    }

    fn name(&self, symbol: u16) -> Option<String> {
        self.names.read().lookup(symbol, 1)
    }

    fn namespace(&self, ns_symbol: u16) -> Option<String> {
        if ns_symbol == 0 {
            return Some(String::new());
        }
        self.namespaces.read().lookup(ns_symbol, 1)
    }
}
