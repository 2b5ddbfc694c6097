use crate::error::{Error, Result};
use crate::profile::{NativeAllocationsTable, StackIndex, Thread, WeightType};
use crate::summary::CallTreeSummaryStrategy;
use std::collections::HashMap;

/// The uniform row shape call trees are summarized from, whichever table the
/// rows originally came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplesLikeTable {
    pub time: Vec<f64>,
    pub stack: Vec<Option<StackIndex>>,
    pub weight: Vec<f64>,
    pub weight_type: WeightType,
    pub thread_cpu_delta: Option<Vec<Option<f64>>>,
}

impl SamplesLikeTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.weight.iter().sum()
    }

    fn bytes() -> Self {
        Self {
            weight_type: WeightType::Bytes,
            ..Default::default()
        }
    }

    fn push(&mut self, time: f64, stack: Option<StackIndex>, weight: f64) {
        self.time.push(time);
        self.stack.push(stack);
        self.weight.push(weight);
    }
}

pub fn extract_samples_like_table(
    thread: &Thread,
    strategy: CallTreeSummaryStrategy,
) -> Result<SamplesLikeTable> {
    use crate::summary::CallTreeSummaryStrategy::*;

    match strategy {
        Timing => {
            let samples = &thread.samples;
            Ok(SamplesLikeTable {
                time: samples.time.clone(),
                stack: samples.stack.clone(),
                weight: (0..samples.len()).map(|i| samples.weight_at(i)).collect(),
                weight_type: samples.weight_type,
                thread_cpu_delta: samples.thread_cpu_delta.clone(),
            })
        }
        JsAllocations => {
            let Some(js) = &thread.js_allocations else {
                return Err(missing(thread, "JS allocations"));
            };
            Ok(SamplesLikeTable {
                time: js.time.clone(),
                stack: js.stack.clone(),
                weight: js.weight.clone(),
                ..SamplesLikeTable::bytes()
            })
        }
        NativeAllocations | NativeDeallocationsSites => {
            let native = native_table(thread)?;
            let want_allocations = strategy == NativeAllocations;
            let mut out = SamplesLikeTable::bytes();
            for i in 0..native.len() {
                let weight = native.weight[i];
                if (want_allocations && weight > 0.0) || (!want_allocations && weight < 0.0) {
                    out.push(native.time[i], native.stack[i], weight);
                }
            }
            Ok(out)
        }
        NativeRetainedAllocations => {
            let native = balanced_native_table(thread)?;
            let matches = match_deallocations(native);
            let mut out = SamplesLikeTable::bytes();
            for i in 0..native.len() {
                if native.weight[i] > 0.0 && matches.freed_by[i].is_none() {
                    out.push(native.time[i], native.stack[i], native.weight[i]);
                }
            }
            Ok(out)
        }
        NativeDeallocationsMemory => {
            let native = balanced_native_table(thread)?;
            let matches = match_deallocations(native);
            let mut out = SamplesLikeTable::bytes();
            for i in 0..native.len() {
                if let Some(allocation) = matches.allocated_by[i] {
                    out.push(native.time[i], native.stack[allocation], native.weight[i]);
                }
            }
            Ok(out)
        }
    }
}

fn missing(thread: &Thread, table: &'static str) -> Error {
    Error::MissingTable {
        thread: thread.name.clone(),
        table,
    }
}

fn native_table(thread: &Thread) -> Result<&NativeAllocationsTable> {
    thread
        .native_allocations
        .as_deref()
        .ok_or_else(|| missing(thread, "native allocations"))
}

fn balanced_native_table(thread: &Thread) -> Result<&NativeAllocationsTable> {
    let native = native_table(thread)?;
    if !native.is_balanced() {
        return Err(Error::UnbalancedNativeAllocations {
            thread: thread.name.clone(),
        });
    }
    Ok(native)
}

/// Allocation/deallocation pairs of a balanced table, indexed by row.
struct Matches {
    /// For an allocation row, the deallocation row that freed it.
    freed_by: Vec<Option<usize>>,
    /// For a deallocation row, the allocation row whose memory it freed.
    allocated_by: Vec<Option<usize>>,
}

fn match_deallocations(native: &NativeAllocationsTable) -> Matches {
    let mut matches = Matches {
        freed_by: vec![None; native.len()],
        allocated_by: vec![None; native.len()],
    };
    let Some(addresses) = &native.memory_address else {
        return matches;
    };

    let mut live: HashMap<u64, usize> = HashMap::new();
    for (row, &address) in addresses.iter().enumerate() {
        if native.weight[row] > 0.0 {
            live.insert(address, row);
        } else if native.weight[row] < 0.0
            && let Some(allocation) = live.remove(&address)
        {
            matches.freed_by[allocation] = Some(row);
            matches.allocated_by[row] = Some(allocation);
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;
    use crate::summary::CallTreeSummaryStrategy::*;

    fn balanced() -> Thread {
        ThreadBuilder::new("Main")
            .native_allocation_at(0.0, "main;alloc_a", 100.0, 0x1)
            .native_allocation_at(1.0, "main;alloc_b", 40.0, 0x2)
            .native_allocation_at(2.0, "main;free", -100.0, 0x1)
            .native_allocation_at(3.0, "main;free", -8.0, 0x9)
            .build()
    }

    fn names(thread: &Thread, table: &SamplesLikeTable) -> Vec<String> {
        table
            .stack
            .iter()
            .map(|&s| thread.stack_func_names(s).join(";"))
            .collect()
    }

    #[test]
    fn allocation_sites_split_by_sign() {
        let thread = balanced();
        let allocations = extract_samples_like_table(&thread, NativeAllocations).unwrap();
        assert_eq!(allocations.weight, vec![100.0, 40.0]);
        assert_eq!(allocations.weight_type, WeightType::Bytes);

        let frees = extract_samples_like_table(&thread, NativeDeallocationsSites).unwrap();
        assert_eq!(frees.weight, vec![-100.0, -8.0]);
    }

    #[test]
    fn retained_memory_excludes_freed_blocks() {
        let thread = balanced();
        let retained = extract_samples_like_table(&thread, NativeRetainedAllocations).unwrap();
        assert_eq!(names(&thread, &retained), ["main;alloc_b"]);
        assert_eq!(retained.total_weight(), 40.0);
    }

    #[test]
    fn freed_memory_is_charged_to_the_allocating_stack() {
        let thread = balanced();
        let freed = extract_samples_like_table(&thread, NativeDeallocationsMemory).unwrap();
        assert_eq!(names(&thread, &freed), ["main;alloc_a"]);
        assert_eq!(freed.time, vec![2.0]);
        assert_eq!(freed.weight, vec![-100.0]);
    }

    #[test]
    fn unbalanced_and_missing_tables_are_errors() {
        let unbalanced = ThreadBuilder::new("Main")
            .native_allocation(0.0, "main", 10.0)
            .build();
        assert!(matches!(
            extract_samples_like_table(&unbalanced, NativeRetainedAllocations),
            Err(Error::UnbalancedNativeAllocations { .. })
        ));

        let plain = ThreadBuilder::new("Main").sample(0.0, "main").build();
        assert!(matches!(
            extract_samples_like_table(&plain, JsAllocations),
            Err(Error::MissingTable { .. })
        ));
    }

    #[test]
    fn timing_defaults_to_unit_weights() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "A")
            .sample(1.0, "B")
            .build();
        let table = extract_samples_like_table(&thread, Timing).unwrap();
        assert_eq!(table.weight, vec![1.0, 1.0]);
        assert_eq!(table.weight_type, WeightType::Samples);
    }
}
