//! Column-oriented tables that make up a [`Thread`](super::Thread).
//!
//! Rows reference each other by plain indexes. Every table is immutable once
//! it is attached to a thread; filters build new tables instead of editing.

use std::collections::HashMap;

pub type StringIndex = usize;
pub type ResourceIndex = usize;
pub type FuncIndex = usize;
pub type FrameIndex = usize;
pub type StackIndex = usize;
pub type CategoryIndex = usize;
pub type InnerWindowId = u64;

/// Interned strings, addressed by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringTable {
    strings: Vec<String>,
    lookup: HashMap<String, StringIndex>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value`, adding it if it is not present yet.
    pub fn intern(&mut self, value: &str) -> StringIndex {
        if let Some(&index) = self.lookup.get(value) {
            return index;
        }
        let index = self.strings.len();
        self.strings.push(value.to_string());
        self.lookup.insert(value.to_string(), index);
        index
    }

    pub fn get(&self, index: StringIndex) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    /// Like [`get`](Self::get), with an empty string for dangling indexes.
    pub fn get_or_empty(&self, index: StringIndex) -> &str {
        self.get(index).unwrap_or("")
    }

    pub fn index_of(&self, value: &str) -> Option<StringIndex> {
        self.lookup.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

/// Libraries or scripts functions were loaded from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTable {
    pub name: Vec<StringIndex>,
}

impl ResourceTable {
    pub fn push(&mut self, name: StringIndex) -> ResourceIndex {
        self.name.push(name);
        self.name.len() - 1
    }

    pub fn len(&self) -> usize {
        self.name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// One function row, used to append to a [`FuncTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: StringIndex,
    pub is_js: bool,
    pub relevant_for_js: bool,
    pub resource: Option<ResourceIndex>,
    pub file_name: Option<StringIndex>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FuncTable {
    pub name: Vec<StringIndex>,
    pub is_js: Vec<bool>,
    pub relevant_for_js: Vec<bool>,
    pub resource: Vec<Option<ResourceIndex>>,
    pub file_name: Vec<Option<StringIndex>>,
    pub line: Vec<Option<u32>>,
}

impl FuncTable {
    pub fn push(&mut self, func: Func) -> FuncIndex {
        self.name.push(func.name);
        self.is_js.push(func.is_js);
        self.relevant_for_js.push(func.relevant_for_js);
        self.resource.push(func.resource);
        self.file_name.push(func.file_name);
        self.line.push(func.line);
        self.name.len() - 1
    }

    pub fn len(&self) -> usize {
        self.name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// One frame row, used to append to a [`FrameTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub func: FuncIndex,
    pub category: Option<CategoryIndex>,
    pub line: Option<u32>,
    pub address: Option<u64>,
    pub inner_window_id: Option<InnerWindowId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTable {
    pub func: Vec<FuncIndex>,
    pub category: Vec<Option<CategoryIndex>>,
    pub line: Vec<Option<u32>>,
    pub address: Vec<Option<u64>>,
    pub inner_window_id: Vec<Option<InnerWindowId>>,
}

impl FrameTable {
    pub fn push(&mut self, frame: Frame) -> FrameIndex {
        self.func.push(frame.func);
        self.category.push(frame.category);
        self.line.push(frame.line);
        self.address.push(frame.address);
        self.inner_window_id.push(frame.inner_window_id);
        self.func.len() - 1
    }

    pub fn len(&self) -> usize {
        self.func.len()
    }

    pub fn is_empty(&self) -> bool {
        self.func.is_empty()
    }
}

/// Call stacks as a prefix tree. A stack's prefix always has a smaller index
/// than the stack itself, so a single forward pass sees parents first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackTable {
    pub prefix: Vec<Option<StackIndex>>,
    pub frame: Vec<FrameIndex>,
    pub category: Vec<CategoryIndex>,
}

impl StackTable {
    pub fn push(
        &mut self,
        prefix: Option<StackIndex>,
        frame: FrameIndex,
        category: CategoryIndex,
    ) -> StackIndex {
        self.prefix.push(prefix);
        self.frame.push(frame);
        self.category.push(category);
        self.frame.len() - 1
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    /// Stack indexes from `stack` up to its root, leaf first.
    pub fn ancestors(&self, stack: StackIndex) -> impl Iterator<Item = StackIndex> + '_ {
        std::iter::successors(Some(stack), move |&s| self.prefix[s])
    }

    pub fn depth(&self, stack: StackIndex) -> usize {
        self.ancestors(stack).count()
    }
}

/// What one unit of sample weight means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WeightType {
    #[default]
    Samples,
    TracingMs,
    Bytes,
}

impl WeightType {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightType::Samples => "samples",
            WeightType::TracingMs => "tracing-ms",
            WeightType::Bytes => "bytes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "samples" => Some(WeightType::Samples),
            "tracing-ms" => Some(WeightType::TracingMs),
            "bytes" => Some(WeightType::Bytes),
            _ => None,
        }
    }
}

/// One row per sampling event, sorted by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplesTable {
    pub time: Vec<f64>,
    pub stack: Vec<Option<StackIndex>>,
    pub weight: Option<Vec<f64>>,
    pub weight_type: WeightType,
    pub thread_cpu_delta: Option<Vec<Option<f64>>>,
    pub event_delay: Option<Vec<Option<f64>>>,
}

impl SamplesTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn weight_at(&self, index: usize) -> f64 {
        self.weight.as_ref().map_or(1.0, |w| w[index])
    }

    /// Same table with the stack column replaced.
    pub fn with_stacks(&self, stack: Vec<Option<StackIndex>>) -> Self {
        Self {
            stack,
            ..self.clone()
        }
    }

    /// Rows `start..end`, every column sliced consistently.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            time: self.time[start..end].to_vec(),
            stack: self.stack[start..end].to_vec(),
            weight: self.weight.as_ref().map(|w| w[start..end].to_vec()),
            weight_type: self.weight_type,
            thread_cpu_delta: self
                .thread_cpu_delta
                .as_ref()
                .map(|c| c[start..end].to_vec()),
            event_delay: self.event_delay.as_ref().map(|d| d[start..end].to_vec()),
        }
    }
}

/// Native (malloc/free) allocation events. Deallocations carry negative
/// weights. The table is "balanced" when every row carries the address of the
/// memory block, which makes retained-memory analysis possible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeAllocationsTable {
    pub time: Vec<f64>,
    pub stack: Vec<Option<StackIndex>>,
    pub weight: Vec<f64>,
    pub memory_address: Option<Vec<u64>>,
}

impl NativeAllocationsTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn is_balanced(&self) -> bool {
        self.memory_address.is_some()
    }

    pub fn with_stacks(&self, stack: Vec<Option<StackIndex>>) -> Self {
        Self {
            stack,
            ..self.clone()
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            time: self.time[start..end].to_vec(),
            stack: self.stack[start..end].to_vec(),
            weight: self.weight[start..end].to_vec(),
            memory_address: self
                .memory_address
                .as_ref()
                .map(|a| a[start..end].to_vec()),
        }
    }
}

/// JS engine allocation events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsAllocationsTable {
    pub time: Vec<f64>,
    pub stack: Vec<Option<StackIndex>>,
    pub weight: Vec<f64>,
    pub class_name: Vec<StringIndex>,
}

impl JsAllocationsTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn with_stacks(&self, stack: Vec<Option<StackIndex>>) -> Self {
        Self {
            stack,
            ..self.clone()
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            time: self.time[start..end].to_vec(),
            stack: self.stack[start..end].to_vec(),
            weight: self.weight[start..end].to_vec(),
            class_name: self.class_name[start..end].to_vec(),
        }
    }
}

/// Structured marker data, interpreted through a marker schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerPayload {
    pub schema: String,
    pub fields: Vec<(String, String)>,
}

impl MarkerPayload {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Instant (no end) and interval markers, sorted by start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMarkerTable {
    pub name: Vec<StringIndex>,
    pub start: Vec<f64>,
    pub end: Vec<Option<f64>>,
    pub category: Vec<CategoryIndex>,
    pub data: Vec<Option<MarkerPayload>>,
}

impl RawMarkerTable {
    pub fn push(
        &mut self,
        name: StringIndex,
        start: f64,
        end: Option<f64>,
        category: CategoryIndex,
        data: Option<MarkerPayload>,
    ) -> usize {
        self.name.push(name);
        self.start.push(start);
        self.end.push(end);
        self.category.push(category);
        self.data.push(data);
        self.name.len() - 1
    }

    pub fn len(&self) -> usize {
        self.name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Markers overlapping `[start, end)`; instants must fall inside it.
    pub fn retain_range(&self, start: f64, end: f64) -> Self {
        let mut out = Self::default();
        for i in 0..self.len() {
            let keep = match self.end[i] {
                Some(marker_end) => self.start[i] < end && marker_end >= start,
                None => self.start[i] >= start && self.start[i] < end,
            };
            if keep {
                out.push(
                    self.name[i],
                    self.start[i],
                    self.end[i],
                    self.category[i],
                    self.data[i].clone(),
                );
            }
        }
        out
    }
}

/// Function entry/exit events recorded by the JS tracer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsTracerTable {
    pub event: Vec<StringIndex>,
    pub timestamp: Vec<f64>,
    pub duration: Vec<Option<f64>>,
    pub line: Vec<Option<u32>>,
}

impl JsTracerTable {
    pub fn push(&mut self, event: StringIndex, timestamp: f64, duration: Option<f64>) -> usize {
        self.event.push(event);
        self.timestamp.push(timestamp);
        self.duration.push(duration);
        self.line.push(None);
        self.event.len() - 1
    }

    pub fn len(&self) -> usize {
        self.event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_table_interns_once() {
        let mut strings = StringTable::new();
        let a = strings.intern("main");
        let b = strings.intern("work");
        assert_eq!(strings.intern("main"), a);
        assert_ne!(a, b);
        assert_eq!(strings.get(b), Some("work"));
        assert_eq!(strings.get(7), None);
        assert_eq!(strings.len(), 2);
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let mut stacks = StackTable::default();
        let root = stacks.push(None, 0, 0);
        let mid = stacks.push(Some(root), 1, 0);
        let leaf = stacks.push(Some(mid), 2, 0);
        assert_eq!(stacks.ancestors(leaf).collect::<Vec<_>>(), vec![leaf, mid, root]);
        assert_eq!(stacks.depth(leaf), 3);
    }

    #[test]
    fn interval_markers_overlapping_a_range_survive() {
        let mut markers = RawMarkerTable::default();
        markers.push(0, 0.0, Some(5.0), 0, None);
        markers.push(0, 6.0, None, 0, None);
        markers.push(0, 20.0, Some(30.0), 0, None);
        let kept = markers.retain_range(4.0, 10.0);
        assert_eq!(kept.start, vec![0.0, 6.0]);
    }
}
