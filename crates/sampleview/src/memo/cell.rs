use super::{CacheStats, Identity};
use crate::error::Result;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Instant;

/// Single-slot memoizer around one pure function.
///
/// Only the most recent `(args, result)` pair is kept. A failed invocation
/// leaves the slot as it was.
pub struct MemoCell<A, R> {
    name: &'static str,
    func: Box<dyn Fn(&A) -> Result<R>>,
    slot: RefCell<Option<(A, R)>>,
    stats: Cell<CacheStats>,
}

impl<A: Identity, R: Clone> MemoCell<A, R> {
    pub fn new(name: &'static str, func: impl Fn(&A) -> Result<R> + 'static) -> Self {
        Self {
            name,
            func: Box::new(func),
            slot: RefCell::new(None),
            stats: Cell::new(CacheStats::default()),
        }
    }

    /// Return the cached result if `args` matches the previous call, otherwise
    /// invoke the wrapped function and remember its result.
    pub fn get(&self, args: A) -> Result<R> {
        {
            let slot = self.slot.borrow();
            if let Some((previous, result)) = slot.as_ref()
                && previous.same(&args)
            {
                self.stats.set(self.stats.get().hit());
                log::trace!("memo hit: {}", self.name);
                return Ok(result.clone());
            }
        }

        // The borrow is released before calling out: the function may query
        // other cells, and must never observe this slot half-written.
        let started = Instant::now();
        let result = (self.func)(&args)?;
        self.stats.set(self.stats.get().miss());
        log::debug!(
            "memo recompute: {} ({:.2?})",
            self.name,
            started.elapsed()
        );

        *self.slot.borrow_mut() = Some((args, result.clone()));
        Ok(result)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get()
    }
}

impl<A, R> fmt::Debug for MemoCell<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCell")
            .field("name", &self.name)
            .field("stats", &self.stats.get())
            .field("filled", &self.slot.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::rc::Rc;

    fn counting_cell() -> (MemoCell<(Rc<Vec<u32>>, u32), u32>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let cell = MemoCell::new("sum_plus", move |(values, extra): &(Rc<Vec<u32>>, u32)| {
            counter.set(counter.get() + 1);
            Ok(values.iter().sum::<u32>() + extra)
        });
        (cell, calls)
    }

    #[test]
    fn same_arguments_reuse_result() {
        let (cell, calls) = counting_cell();
        let values = Rc::new(vec![1, 2, 3]);

        for _ in 0..5 {
            assert_eq!(cell.get((values.clone(), 4)).unwrap(), 10);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cell.stats(), CacheStats { hits: 4, misses: 1 });
    }

    #[test]
    fn equal_but_distinct_allocation_recomputes() {
        let (cell, calls) = counting_cell();
        cell.get((Rc::new(vec![1]), 0)).unwrap();
        cell.get((Rc::new(vec![1]), 0)).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn only_the_latest_call_is_remembered() {
        let (cell, calls) = counting_cell();
        let values = Rc::new(vec![5]);
        cell.get((values.clone(), 1)).unwrap();
        cell.get((values.clone(), 2)).unwrap();
        cell.get((values.clone(), 1)).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn failures_are_not_cached() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let cell = MemoCell::new("fails_on_zero", move |value: &u32| {
            counter.set(counter.get() + 1);
            if *value == 0 {
                Err(Error::InvalidArgument("zero".into()))
            } else {
                Ok(*value * 2)
            }
        });

        assert_eq!(cell.get(3).unwrap(), 6);
        assert!(cell.get(0).is_err());
        assert!(cell.get(0).is_err());
        // The successful slot survived the failures.
        assert_eq!(cell.get(3).unwrap(), 6);
        assert_eq!(calls.get(), 3);
    }
}
