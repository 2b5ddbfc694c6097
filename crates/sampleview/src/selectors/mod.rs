//! Per thread-view derived values, memoized against [`ViewState`].

mod thread;

pub use thread::ThreadSelectors;

use crate::ops::{StandardOps, ThreadOps};
use crate::profile::ThreadsKey;
use crate::state::ViewState;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Registry of [`ThreadSelectors`], one per thread key, created on first use
/// and kept for the registry's lifetime.
pub struct Selectors {
    ops: Rc<dyn ThreadOps>,
    by_key: RefCell<HashMap<ThreadsKey, Rc<ThreadSelectors>>>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self::new()
    }
}

impl Selectors {
    pub fn new() -> Self {
        Self::with_ops(Rc::new(StandardOps))
    }

    /// Registry whose pipelines call `ops` for every thread operation.
    pub fn with_ops(ops: Rc<dyn ThreadOps>) -> Self {
        Self {
            ops,
            by_key: RefCell::new(HashMap::new()),
        }
    }

    pub fn for_thread(&self, key: &ThreadsKey) -> Rc<ThreadSelectors> {
        if let Some(existing) = self.by_key.borrow().get(key) {
            return existing.clone();
        }
        log::debug!("creating selectors for thread {key}");
        let selectors = Rc::new(ThreadSelectors::new(key.clone(), self.ops.clone()));
        self.by_key
            .borrow_mut()
            .insert(key.clone(), selectors.clone());
        selectors
    }

    /// Selectors of every thread key the view could show: each thread on its
    /// own, in profile order.
    pub fn for_each_thread(&self, state: &ViewState) -> Vec<Rc<ThreadSelectors>> {
        (0..state.profile().threads.len())
            .map(|index| self.for_thread(&ThreadsKey::single(index)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.borrow().is_empty()
    }
}

impl std::fmt::Debug for Selectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selectors")
            .field("threads", &self.by_key.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
