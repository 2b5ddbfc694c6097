use super::tables::{
    FrameTable, FuncTable, JsAllocationsTable, JsTracerTable, NativeAllocationsTable,
    RawMarkerTable, ResourceTable, SamplesTable, StackIndex, StackTable, StringTable,
};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Immutable snapshot of one (possibly merged) thread.
///
/// Tables sit behind `Rc` so that a derived thread shares every table it did
/// not rewrite with the thread it was derived from.
#[derive(Debug, Clone, Default)]
pub struct Thread {
    pub name: String,
    pub process_name: Option<String>,
    pub process_type: String,
    pub pid: u32,
    pub tid: Option<u64>,
    pub is_main_thread: bool,
    pub register_time: f64,
    pub unregister_time: Option<f64>,

    pub strings: Rc<StringTable>,
    pub resources: Rc<ResourceTable>,
    pub funcs: Rc<FuncTable>,
    pub frames: Rc<FrameTable>,
    pub stacks: Rc<StackTable>,
    pub samples: Rc<SamplesTable>,
    pub native_allocations: Option<Rc<NativeAllocationsTable>>,
    pub js_allocations: Option<Rc<JsAllocationsTable>>,
    pub markers: Rc<RawMarkerTable>,
    pub js_tracer: Option<Rc<JsTracerTable>>,
}

impl Thread {
    /// Func index of the frame at the top of `stack`.
    pub fn func_of_stack(&self, stack: StackIndex) -> usize {
        self.frames.func[self.stacks.frame[stack]]
    }

    pub fn func_name(&self, func: usize) -> &str {
        self.strings.get_or_empty(self.funcs.name[func])
    }

    /// Function names along `stack`, root first.
    pub fn stack_func_names(&self, stack: Option<StackIndex>) -> Vec<&str> {
        let mut names: Vec<&str> = stack
            .into_iter()
            .flat_map(|leaf| self.stacks.ancestors(leaf))
            .map(|s| self.func_name(self.func_of_stack(s)))
            .collect();
        names.reverse();
        names
    }

    pub fn sample_func_names(&self, sample: usize) -> Vec<&str> {
        self.stack_func_names(self.samples.stack[sample])
    }

    /// Same thread with every stack column rewritten through `map`, which is
    /// indexed by old stack index. Sample rows are kept 1:1.
    pub fn with_stack_map(&self, stacks: Rc<StackTable>, map: &[Option<StackIndex>]) -> Thread {
        let remap =
            |column: &[Option<StackIndex>]| -> Vec<Option<StackIndex>> {
                column.iter().map(|s| s.and_then(|s| map[s])).collect()
            };

        Thread {
            stacks,
            samples: Rc::new(self.samples.with_stacks(remap(&self.samples.stack))),
            native_allocations: self
                .native_allocations
                .as_ref()
                .map(|t| Rc::new(t.with_stacks(remap(&t.stack)))),
            js_allocations: self
                .js_allocations
                .as_ref()
                .map(|t| Rc::new(t.with_stacks(remap(&t.stack)))),
            ..self.clone()
        }
    }

    /// Verify that every cross-table index resolves inside this thread.
    pub fn check_indices(&self, category_count: usize) -> Result<()> {
        let fail = |what: String| Err(Error::MalformedThread(format!("{}: {what}", self.name)));

        for (i, &name) in self.resources.name.iter().enumerate() {
            if name >= self.strings.len() {
                return fail(format!("resource {i} name string {name} out of range"));
            }
        }

        for i in 0..self.funcs.len() {
            if self.funcs.name[i] >= self.strings.len() {
                return fail(format!("func {i} name out of range"));
            }
            if let Some(file) = self.funcs.file_name[i]
                && file >= self.strings.len()
            {
                return fail(format!("func {i} file name out of range"));
            }
            if let Some(resource) = self.funcs.resource[i]
                && resource >= self.resources.len()
            {
                return fail(format!("func {i} resource {resource} out of range"));
            }
        }

        for i in 0..self.frames.len() {
            if self.frames.func[i] >= self.funcs.len() {
                return fail(format!("frame {i} func out of range"));
            }
            if let Some(category) = self.frames.category[i]
                && category >= category_count
            {
                return fail(format!("frame {i} category {category} out of range"));
            }
        }

        for i in 0..self.stacks.len() {
            if self.stacks.frame[i] >= self.frames.len() {
                return fail(format!("stack {i} frame out of range"));
            }
            if let Some(prefix) = self.stacks.prefix[i]
                && prefix >= i
            {
                return fail(format!("stack {i} prefix {prefix} does not precede it"));
            }
            if self.stacks.category[i] >= category_count {
                return fail(format!("stack {i} category out of range"));
            }
        }

        let check_stacks = |table: &str, column: &[Option<StackIndex>]| -> Result<()> {
            match column
                .iter()
                .flatten()
                .find(|&&s| s >= self.stacks.len())
            {
                Some(s) => fail(format!("{table} references stack {s}")),
                None => Ok(()),
            }
        };
        check_stacks("samples", &self.samples.stack)?;
        if let Some(native) = &self.native_allocations {
            check_stacks("native allocations", &native.stack)?;
        }
        if let Some(js) = &self.js_allocations {
            check_stacks("js allocations", &js.stack)?;
            if js.class_name.iter().any(|&s| s >= self.strings.len()) {
                return fail("js allocation class name out of range".to_string());
            }
        }

        if self.markers.name.iter().any(|&s| s >= self.strings.len()) {
            return fail("marker name out of range".to_string());
        }
        if let Some(tracer) = &self.js_tracer
            && tracer.event.iter().any(|&s| s >= self.strings.len())
        {
            return fail("js tracer event name out of range".to_string());
        }

        Ok(())
    }
}

/// One logical thread view, backed by one or more thread indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadsKey(BTreeSet<usize>);

impl ThreadsKey {
    pub fn single(index: usize) -> Self {
        Self(BTreeSet::from([index]))
    }

    pub fn new(indexes: impl IntoIterator<Item = usize>) -> Result<Self> {
        let set: BTreeSet<usize> = indexes.into_iter().collect();
        if set.is_empty() {
            return Err(Error::InvalidArgument(
                "a thread key needs at least one thread index".to_string(),
            ));
        }
        Ok(Self(set))
    }

    pub fn indexes(&self) -> &BTreeSet<usize> {
        &self.0
    }

    pub fn is_merged(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for ThreadsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for ThreadsKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let indexes = s
            .split(',')
            .map(|part| {
                part.trim().parse::<usize>().map_err(|_| {
                    Error::InvalidArgument(format!("invalid thread index '{part}' in '{s}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_key_round_trips_through_text() {
        let key: ThreadsKey = "3, 1,1".parse().unwrap();
        assert_eq!(key.to_string(), "1,3");
        assert!(key.is_merged());
        assert!(!ThreadsKey::single(0).is_merged());
        assert!("".parse::<ThreadsKey>().is_err());
        assert!("a".parse::<ThreadsKey>().is_err());
    }

    #[test]
    fn dangling_stack_is_reported() {
        let mut stacks = StackTable::default();
        stacks.push(None, 0, 0);
        let thread = Thread {
            name: "broken".into(),
            stacks: Rc::new(stacks),
            samples: Rc::new(SamplesTable {
                time: vec![0.0],
                stack: vec![Some(4)],
                ..Default::default()
            }),
            ..Default::default()
        };
        // Frame 0 is also missing; whichever check trips first, it must fail.
        assert!(matches!(
            thread.check_indices(1),
            Err(Error::MalformedThread(_))
        ));
    }
}
