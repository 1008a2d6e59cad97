/*!
 * Binder Cache
 * Per-executor cache of bound callables keyed by library path
 */

use crate::core::errors::RuntimeResult;
use crate::ffi::{BindingDescriptor, LibraryBinder, NativeFunction, RawCallables};
use ahash::AHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Bound callables reused across calls on one worker or helper
pub struct BinderCache {
    binder: Arc<dyn LibraryBinder>,
    capacity: usize,
    entries: AHashMap<String, RawCallables>,
    order: VecDeque<String>,
}

impl BinderCache {
    pub fn new(binder: Arc<dyn LibraryBinder>, capacity: usize) -> Self {
        Self {
            binder,
            capacity: capacity.max(1),
            entries: AHashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Find `name`, binding the library again when the cache misses.
    /// Returns `None` when the descriptor does not declare the function.
    pub fn resolve(
        &mut self,
        library_path: &str,
        descriptor: &BindingDescriptor,
        name: &str,
    ) -> RuntimeResult<Option<Arc<dyn NativeFunction>>> {
        if let Some(function) = self.entries.get(library_path).and_then(|c| c.get(name)) {
            return Ok(Some(Arc::clone(function)));
        }
        if !descriptor.contains(name) {
            return Ok(None);
        }

        debug!(library = %library_path, function = %name, "binder cache miss");
        let bound = self.binder.bind(library_path, descriptor)?;

        if !self.entries.contains_key(library_path) {
            self.evict_if_full();
            self.order.push_back(library_path.to_string());
        }
        let callables = self.entries.entry(library_path.to_string()).or_default();
        callables.extend(bound);
        Ok(callables.get(name).cloned())
    }

    fn evict_if_full(&mut self) {
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    info!(library = %oldest, "evicting bound library from cache");
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
