use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tracing::trace;

use crate::ast::Program;
use crate::error::CompileError;

/// In-memory cache of lowered units keyed by the SHA-256 of their source.
/// Oldest entries are evicted first once `capacity` is reached.
#[derive(Debug)]
pub struct CompileCache {
    capacity: usize,
    entries: HashMap<String, Rc<Program>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl CompileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&mut self, source: &str) -> Option<Rc<Program>> {
        let hash = Self::compute_hash(source);
        match self.entries.get(&hash) {
            Some(program) => {
                self.hits += 1;
                Some(program.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, source: &str, program: Rc<Program>) {
        if self.capacity == 0 {
            return;
        }
        let hash = Self::compute_hash(source);
        if self.entries.insert(hash.clone(), program).is_none() {
            self.order.push_back(hash);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    /// Cached program for `source`, compiling and storing it on a miss.
    /// Failed compiles are not cached.
    pub fn get_or_compile<F>(&mut self, source: &str, compile: F) -> Result<Rc<Program>, CompileError>
    where
        F: FnOnce(&str) -> Result<Program, CompileError>,
    {
        if let Some(program) = self.get(source) {
            trace!("compile cache hit");
            return Ok(program);
        }
        let program = Rc::new(compile(source)?);
        self.insert(source, program.clone());
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::compile_program;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(
            CompileCache::compute_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_second_compile_is_a_hit() {
        let mut cache = CompileCache::new(4);
        let first = cache.get_or_compile("const a = 1;", compile_program).unwrap();
        let second = cache.get_or_compile("const a = 1;", compile_program).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut cache = CompileCache::new(2);
        for source in ["const a = 1;", "const b = 2;", "const c = 3;"] {
            cache.get_or_compile(source, compile_program).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("const a = 1;").is_none());
        assert!(cache.get("const c = 3;").is_some());
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut cache = CompileCache::new(2);
        assert!(cache.get_or_compile("const = ;", compile_program).is_err());
        assert!(cache.is_empty());
    }
}
