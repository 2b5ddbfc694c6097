//! Build profiles from text call stacks.
//!
//! A stack is written root first with `;` between frames, e.g.
//! `"main;parse;lex"`. A frame name may carry bracketed annotations:
//!
//! | annotation        | effect                                   |
//! |-------------------|------------------------------------------|
//! | `[js]`            | JS function                              |
//! | `[relevant]`      | native function relevant for JS          |
//! | `[lib:NAME]`      | function belongs to resource `NAME`      |
//! | `[file:NAME]`     | source file                              |
//! | `[line:N]`        | frame line number                        |
//! | `[cat:NAME]`      | frame category (one of the defaults)     |
//! | `[win:ID]`        | inner window id of the frame             |
//! | `[addr:0xHEX]`    | frame address                            |
//!
//! Rows must be added in time order.

use super::tables::*;
use super::{Category, CpuDeltaUnit, MarkerSchema, Page, Profile, ProfileMeta, Thread};
use std::collections::HashMap;
use std::rc::Rc;

/// Categories every built profile carries, in index order.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Other", "grey"),
    ("Idle", "transparent"),
    ("Layout", "purple"),
    ("JavaScript", "yellow"),
    ("GC / CC", "orange"),
    ("Network", "lightblue"),
    ("DOM", "blue"),
];

pub struct ProfileBuilder {
    meta: ProfileMeta,
    schemas: HashMap<String, MarkerSchema>,
    pages: Vec<Page>,
    threads: Vec<Thread>,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileBuilder {
    pub fn new() -> Self {
        let categories = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, color)| Category::new(name, color))
            .collect();
        Self {
            meta: ProfileMeta {
                product: "sampleview".to_string(),
                interval: 1.0,
                categories: Rc::new(categories),
                ..Default::default()
            },
            schemas: HashMap::new(),
            pages: Vec::new(),
            threads: Vec::new(),
        }
    }

    pub fn product(mut self, product: &str) -> Self {
        self.meta.product = product.to_string();
        self
    }

    pub fn interval(mut self, interval_ms: f64) -> Self {
        self.meta.interval = interval_ms;
        self
    }

    pub fn cpu_delta_unit(mut self, unit: CpuDeltaUnit) -> Self {
        self.meta.cpu_delta_unit = Some(unit);
        self
    }

    pub fn marker_schema(mut self, name: &str, searchable: &[&str]) -> Self {
        self.schemas.insert(
            name.to_string(),
            MarkerSchema {
                name: name.to_string(),
                searchable: searchable.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn page(mut self, tab_id: u64, inner_window_id: InnerWindowId, url: &str) -> Self {
        self.pages.push(Page {
            tab_id,
            inner_window_id,
            url: url.to_string(),
        });
        self
    }

    pub fn thread(mut self, thread: ThreadBuilder) -> Self {
        self.threads.push(thread.build());
        self
    }

    pub fn build(self) -> Profile {
        Profile {
            meta: ProfileMeta {
                marker_schema: Rc::new(self.schemas),
                pages: Rc::new(self.pages),
                ..self.meta
            },
            threads: self.threads.into_iter().map(Rc::new).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ThreadBuilder {
    thread: Thread,
    strings: StringTable,
    resources: ResourceTable,
    funcs: FuncTable,
    frames: FrameTable,
    stacks: StackTable,
    func_lookup: HashMap<String, FuncIndex>,
    resource_lookup: HashMap<String, ResourceIndex>,
    frame_lookup: HashMap<String, FrameIndex>,
    stack_lookup: HashMap<(Option<StackIndex>, FrameIndex), StackIndex>,
    samples: SamplesTable,
    weights: Vec<f64>,
    cpu_deltas: Vec<Option<f64>>,
    event_delays: Vec<Option<f64>>,
    native: Option<(NativeAllocationsTable, Vec<Option<u64>>)>,
    js: Option<JsAllocationsTable>,
    markers: RawMarkerTable,
    tracer: Option<JsTracerTable>,
}

impl ThreadBuilder {
    pub fn new(name: &str) -> Self {
        let mut builder = Self::default();
        builder.thread.name = name.to_string();
        builder.thread.process_type = "default".to_string();
        builder
    }

    pub fn process(mut self, process_name: &str, pid: u32, process_type: &str) -> Self {
        self.thread.process_name = Some(process_name.to_string());
        self.thread.pid = pid;
        self.thread.process_type = process_type.to_string();
        self
    }

    pub fn tid(mut self, tid: u64) -> Self {
        self.thread.tid = Some(tid);
        self
    }

    pub fn main_thread(mut self) -> Self {
        self.thread.is_main_thread = true;
        self
    }

    pub fn sample(self, time: f64, stack: &str) -> Self {
        self.sample_full(time, stack, None, None, None)
    }

    pub fn sample_weighted(self, time: f64, stack: &str, weight: f64) -> Self {
        self.sample_full(time, stack, Some(weight), None, None)
    }

    pub fn sample_with_cpu(self, time: f64, stack: &str, cpu_delta: Option<f64>) -> Self {
        self.sample_full(time, stack, None, Some(cpu_delta), None)
    }

    pub fn sample_with_event_delay(self, time: f64, stack: &str, delay: Option<f64>) -> Self {
        self.sample_full(time, stack, None, None, Some(delay))
    }

    fn sample_full(
        mut self,
        time: f64,
        stack: &str,
        weight: Option<f64>,
        cpu_delta: Option<Option<f64>>,
        event_delay: Option<Option<f64>>,
    ) -> Self {
        let stack = self.stack(stack);
        let row = self.samples.time.len();
        self.samples.time.push(time);
        self.samples.stack.push(stack);

        if let Some(weight) = weight {
            self.weights.resize(row, 1.0);
            self.weights.push(weight);
        } else if !self.weights.is_empty() {
            self.weights.push(1.0);
        }
        if let Some(delta) = cpu_delta {
            self.cpu_deltas.resize(row, None);
            self.cpu_deltas.push(delta);
        } else if !self.cpu_deltas.is_empty() {
            self.cpu_deltas.push(None);
        }
        if let Some(delay) = event_delay {
            self.event_delays.resize(row, None);
            self.event_delays.push(delay);
        } else if !self.event_delays.is_empty() {
            self.event_delays.push(None);
        }
        self
    }

    /// Allocation without an address; the table stays unbalanced unless every
    /// row has one.
    pub fn native_allocation(self, time: f64, stack: &str, bytes: f64) -> Self {
        self.push_native(time, stack, bytes, None)
    }

    pub fn native_allocation_at(self, time: f64, stack: &str, bytes: f64, address: u64) -> Self {
        self.push_native(time, stack, bytes, Some(address))
    }

    fn push_native(mut self, time: f64, stack: &str, bytes: f64, address: Option<u64>) -> Self {
        let stack = self.stack(stack);
        let (table, addresses) = self.native.get_or_insert_with(Default::default);
        table.time.push(time);
        table.stack.push(stack);
        table.weight.push(bytes);
        addresses.push(address);
        self
    }

    /// Declare an empty native allocations table.
    pub fn with_native_allocations(mut self) -> Self {
        self.native.get_or_insert_with(Default::default);
        self
    }

    pub fn js_allocation(mut self, time: f64, stack: &str, bytes: f64, class_name: &str) -> Self {
        let stack = self.stack(stack);
        let class_name = self.strings.intern(class_name);
        let table = self.js.get_or_insert_with(Default::default);
        table.time.push(time);
        table.stack.push(stack);
        table.weight.push(bytes);
        table.class_name.push(class_name);
        self
    }

    pub fn marker(mut self, name: &str, start: f64, end: Option<f64>) -> Self {
        let name = self.strings.intern(name);
        self.markers.push(name, start, end, 0, None);
        self
    }

    pub fn marker_with_data(
        mut self,
        name: &str,
        start: f64,
        end: Option<f64>,
        schema: &str,
        fields: &[(&str, &str)],
    ) -> Self {
        let name = self.strings.intern(name);
        let payload = MarkerPayload {
            schema: schema.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.markers.push(name, start, end, 0, Some(payload));
        self
    }

    pub fn tracer_event(mut self, name: &str, start: f64, duration: f64) -> Self {
        let name = self.strings.intern(name);
        self.tracer
            .get_or_insert_with(Default::default)
            .push(name, start, Some(duration));
        self
    }

    /// Intern a `;`-separated stack; an empty string is the empty stack.
    fn stack(&mut self, text: &str) -> Option<StackIndex> {
        let mut prefix = None;
        for frame_text in text.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            let frame = self.frame(frame_text);
            let category = self.frames.category[frame]
                .or_else(|| prefix.map(|p: StackIndex| self.stacks.category[p]))
                .unwrap_or(0);
            let stack = match self.stack_lookup.get(&(prefix, frame)) {
                Some(&stack) => stack,
                None => {
                    let stack = self.stacks.push(prefix, frame, category);
                    self.stack_lookup.insert((prefix, frame), stack);
                    stack
                }
            };
            prefix = Some(stack);
        }
        prefix
    }

    fn frame(&mut self, text: &str) -> FrameIndex {
        if let Some(&frame) = self.frame_lookup.get(text) {
            return frame;
        }

        let (name, annotations) = split_annotations(text);
        let mut func = Func {
            name: self.strings.intern(name),
            is_js: false,
            relevant_for_js: false,
            resource: None,
            file_name: None,
            line: None,
        };
        let mut frame = Frame {
            func: 0,
            category: None,
            line: None,
            address: None,
            inner_window_id: None,
        };

        for annotation in annotations {
            let (key, value) = annotation.split_once(':').unwrap_or((annotation, ""));
            match key {
                "js" => func.is_js = true,
                "relevant" => func.relevant_for_js = true,
                "lib" => func.resource = Some(self.resource(value)),
                "file" => func.file_name = Some(self.strings.intern(value)),
                "line" => frame.line = value.parse().ok(),
                "cat" => {
                    frame.category = DEFAULT_CATEGORIES.iter().position(|(n, _)| *n == value)
                }
                "win" => frame.inner_window_id = value.parse().ok(),
                "addr" => {
                    frame.address = u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
                }
                _ => log::warn!("ignoring unknown frame annotation '{annotation}'"),
            }
        }
        if func.is_js && frame.category.is_none() {
            frame.category = DEFAULT_CATEGORIES
                .iter()
                .position(|(n, _)| *n == "JavaScript");
        }

        frame.func = match self.func_lookup.get(name) {
            Some(&existing) => existing,
            None => {
                let index = self.funcs.push(func);
                self.func_lookup.insert(name.to_string(), index);
                index
            }
        };
        let index = self.frames.push(frame);
        self.frame_lookup.insert(text.to_string(), index);
        index
    }

    fn resource(&mut self, name: &str) -> ResourceIndex {
        if let Some(&index) = self.resource_lookup.get(name) {
            return index;
        }
        let string = self.strings.intern(name);
        let index = self.resources.push(string);
        self.resource_lookup.insert(name.to_string(), index);
        index
    }

    pub fn build(self) -> Thread {
        let mut samples = self.samples;
        if !self.weights.is_empty() {
            samples.weight = Some(self.weights);
            samples.weight_type = WeightType::TracingMs;
        }
        if !self.cpu_deltas.is_empty() {
            samples.thread_cpu_delta = Some(self.cpu_deltas);
        }
        if !self.event_delays.is_empty() {
            samples.event_delay = Some(self.event_delays);
        }

        let native_allocations = self.native.map(|(mut table, addresses)| {
            if !addresses.is_empty() && addresses.iter().all(Option::is_some) {
                table.memory_address = Some(addresses.into_iter().flatten().collect());
            }
            Rc::new(table)
        });

        Thread {
            register_time: samples.time.first().copied().unwrap_or(0.0),
            strings: Rc::new(self.strings),
            resources: Rc::new(self.resources),
            funcs: Rc::new(self.funcs),
            frames: Rc::new(self.frames),
            stacks: Rc::new(self.stacks),
            samples: Rc::new(samples),
            native_allocations,
            js_allocations: self.js.map(Rc::new),
            markers: Rc::new(self.markers),
            js_tracer: self.tracer.map(Rc::new),
            ..self.thread
        }
    }
}

fn split_annotations(text: &str) -> (&str, Vec<&str>) {
    match text.find('[') {
        Some(open) => {
            let annotations = text[open..]
                .split(['[', ']'])
                .filter(|a| !a.is_empty())
                .collect();
            (&text[..open], annotations)
        }
        None => (text, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_prefixes_share_stacks() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "A;B;C")
            .sample(1.0, "A;B;D")
            .sample(2.0, "")
            .build();

        assert_eq!(thread.stacks.len(), 4);
        assert_eq!(thread.funcs.len(), 4);
        let c = thread.samples.stack[0].unwrap();
        let d = thread.samples.stack[1].unwrap();
        assert_eq!(thread.stacks.prefix[c], thread.stacks.prefix[d]);
        assert_eq!(thread.samples.stack[2], None);
        thread.check_indices(DEFAULT_CATEGORIES.len()).unwrap();
    }

    #[test]
    fn annotations_fill_func_and_frame_columns() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "main[lib:libxul.so];run[js][win:7][file:app.js]")
            .build();

        let leaf = thread.samples.stack[0].unwrap();
        let frame = thread.stacks.frame[leaf];
        let func = thread.frames.func[frame];
        assert!(thread.funcs.is_js[func]);
        assert_eq!(thread.frames.inner_window_id[frame], Some(7));
        assert_eq!(thread.strings.get(thread.funcs.file_name[func].unwrap()), Some("app.js"));
        assert_eq!(thread.stacks.category[leaf], 3);

        let root_func = thread.func_of_stack(thread.stacks.prefix[leaf].unwrap());
        assert_eq!(thread.funcs.resource[root_func], Some(0));
        assert_eq!(thread.func_name(root_func), "main");
    }

    #[test]
    fn optional_columns_backfill() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "A")
            .sample_with_cpu(1.0, "A", Some(0.5))
            .native_allocation_at(0.5, "A", 16.0, 0x10)
            .build();
        assert_eq!(thread.samples.thread_cpu_delta, Some(vec![None, Some(0.5)]));
        assert!(thread.native_allocations.unwrap().is_balanced());
    }
}
