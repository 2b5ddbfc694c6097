use crate::error::{Error, Result};
use crate::profile::{
    FrameTable, FuncTable, JsAllocationsTable, JsTracerTable, NativeAllocationsTable,
    RawMarkerTable, ResourceTable, SamplesTable, StackTable, StringTable, Thread,
};
use std::rc::Rc;

/// Index offsets of one source thread inside the merged tables.
struct Offsets {
    strings: Vec<usize>,
    resources: usize,
    funcs: usize,
    frames: usize,
    stacks: usize,
}

/// Merge several threads into one synthetic thread.
///
/// Stack-shaped tables are concatenated with index offsets; time-ordered
/// tables are interleaved by time. Optional sample columns survive only when
/// every source thread carries them.
pub fn merge_threads(threads: &[Rc<Thread>]) -> Result<Thread> {
    let Some(first) = threads.first() else {
        return Err(Error::InvalidArgument(
            "cannot merge an empty list of threads".to_string(),
        ));
    };

    let mut strings = StringTable::new();
    let mut resources = ResourceTable::default();
    let mut funcs = FuncTable::default();
    let mut frames = FrameTable::default();
    let mut stacks = StackTable::default();
    let mut offsets = Vec::with_capacity(threads.len());

    for thread in threads {
        let offset = Offsets {
            strings: thread.strings.iter().map(|s| strings.intern(s)).collect(),
            resources: resources.len(),
            funcs: funcs.len(),
            frames: frames.len(),
            stacks: stacks.len(),
        };

        for &name in &thread.resources.name {
            resources.push(offset.strings[name]);
        }
        for i in 0..thread.funcs.len() {
            funcs.name.push(offset.strings[thread.funcs.name[i]]);
            funcs.is_js.push(thread.funcs.is_js[i]);
            funcs.relevant_for_js.push(thread.funcs.relevant_for_js[i]);
            funcs
                .resource
                .push(thread.funcs.resource[i].map(|r| r + offset.resources));
            funcs
                .file_name
                .push(thread.funcs.file_name[i].map(|s| offset.strings[s]));
            funcs.line.push(thread.funcs.line[i]);
        }
        for i in 0..thread.frames.len() {
            frames.func.push(thread.frames.func[i] + offset.funcs);
            frames.category.push(thread.frames.category[i]);
            frames.line.push(thread.frames.line[i]);
            frames.address.push(thread.frames.address[i]);
            frames.inner_window_id.push(thread.frames.inner_window_id[i]);
        }
        for i in 0..thread.stacks.len() {
            stacks.push(
                thread.stacks.prefix[i].map(|p| p + offset.stacks),
                thread.stacks.frame[i] + offset.frames,
                thread.stacks.category[i],
            );
        }
        offsets.push(offset);
    }

    let samples = merge_samples(threads, &offsets);
    let native_allocations = merge_native_allocations(threads, &offsets);
    let js_allocations = merge_js_allocations(threads, &offsets);
    let markers = merge_markers(threads, &offsets);
    let js_tracer = merge_js_tracer(threads, &offsets);

    let names: Vec<&str> = threads.iter().map(|t| t.name.as_str()).collect();
    let register_time = threads
        .iter()
        .map(|t| t.register_time)
        .fold(f64::INFINITY, f64::min);
    let unregister_time = threads
        .iter()
        .map(|t| t.unregister_time)
        .collect::<Option<Vec<f64>>>()
        .map(|times| times.into_iter().fold(f64::NEG_INFINITY, f64::max));

    log::debug!(
        "merged {} threads: {} samples, {} stacks",
        threads.len(),
        samples.len(),
        stacks.len()
    );

    Ok(Thread {
        name: names.join(", "),
        process_name: first.process_name.clone(),
        process_type: first.process_type.clone(),
        pid: first.pid,
        tid: None,
        is_main_thread: threads.iter().any(|t| t.is_main_thread),
        register_time,
        unregister_time,
        strings: Rc::new(strings),
        resources: Rc::new(resources),
        funcs: Rc::new(funcs),
        frames: Rc::new(frames),
        stacks: Rc::new(stacks),
        samples: Rc::new(samples),
        native_allocations,
        js_allocations,
        markers: Rc::new(markers),
        js_tracer,
    })
}

/// `(thread, row)` pairs of all `times` columns in ascending time order.
/// Rows with equal times keep thread order.
fn interleave<'a>(times: impl Iterator<Item = (usize, &'a [f64])>) -> Vec<(usize, usize, f64)> {
    let mut rows: Vec<(usize, usize, f64)> = times
        .flat_map(|(thread, column)| column.iter().enumerate().map(move |(row, &t)| (thread, row, t)))
        .collect();
    rows.sort_by(|a, b| a.2.total_cmp(&b.2));
    rows
}

fn merge_samples(threads: &[Rc<Thread>], offsets: &[Offsets]) -> SamplesTable {
    let order = interleave(threads.iter().enumerate().map(|(i, t)| (i, t.samples.time.as_slice())));
    let any_weight = threads.iter().any(|t| t.samples.weight.is_some());
    let all_cpu = threads.iter().all(|t| t.samples.thread_cpu_delta.is_some());
    let all_delay = threads.iter().all(|t| t.samples.event_delay.is_some());

    let mut out = SamplesTable {
        weight_type: threads[0].samples.weight_type,
        weight: any_weight.then(Vec::new),
        thread_cpu_delta: all_cpu.then(Vec::new),
        event_delay: all_delay.then(Vec::new),
        ..Default::default()
    };

    for (thread, row, time) in order {
        let samples = &threads[thread].samples;
        out.time.push(time);
        out.stack
            .push(samples.stack[row].map(|s| s + offsets[thread].stacks));
        if let Some(weight) = &mut out.weight {
            weight.push(samples.weight_at(row));
        }
        if let (Some(out_cpu), Some(cpu)) = (&mut out.thread_cpu_delta, &samples.thread_cpu_delta) {
            out_cpu.push(cpu[row]);
        }
        if let (Some(out_delay), Some(delay)) = (&mut out.event_delay, &samples.event_delay) {
            out_delay.push(delay[row]);
        }
    }
    out
}

fn merge_native_allocations(
    threads: &[Rc<Thread>],
    offsets: &[Offsets],
) -> Option<Rc<NativeAllocationsTable>> {
    let tables: Vec<(usize, &NativeAllocationsTable)> = threads
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.native_allocations.as_deref().map(|n| (i, n)))
        .collect();
    if tables.is_empty() {
        return None;
    }

    let balanced = tables.iter().all(|(_, t)| t.is_balanced());
    let order = interleave(tables.iter().map(|(i, t)| (*i, t.time.as_slice())));
    let mut out = NativeAllocationsTable {
        memory_address: balanced.then(Vec::new),
        ..Default::default()
    };
    for (thread, row, time) in order {
        let Some(table) = threads[thread].native_allocations.as_deref() else {
            continue;
        };
        out.time.push(time);
        out.stack
            .push(table.stack[row].map(|s| s + offsets[thread].stacks));
        out.weight.push(table.weight[row]);
        if let (Some(out_addr), Some(addr)) = (&mut out.memory_address, &table.memory_address) {
            out_addr.push(addr[row]);
        }
    }
    Some(Rc::new(out))
}

fn merge_js_allocations(
    threads: &[Rc<Thread>],
    offsets: &[Offsets],
) -> Option<Rc<JsAllocationsTable>> {
    let order = interleave(threads.iter().enumerate().filter_map(|(i, t)| {
        t.js_allocations.as_deref().map(|js| (i, js.time.as_slice()))
    }));
    if threads.iter().all(|t| t.js_allocations.is_none()) {
        return None;
    }

    let mut out = JsAllocationsTable::default();
    for (thread, row, time) in order {
        let Some(table) = threads[thread].js_allocations.as_deref() else {
            continue;
        };
        out.time.push(time);
        out.stack
            .push(table.stack[row].map(|s| s + offsets[thread].stacks));
        out.weight.push(table.weight[row]);
        out.class_name
            .push(offsets[thread].strings[table.class_name[row]]);
    }
    Some(Rc::new(out))
}

fn merge_markers(threads: &[Rc<Thread>], offsets: &[Offsets]) -> RawMarkerTable {
    let order = interleave(
        threads
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.markers.start.as_slice())),
    );
    let mut out = RawMarkerTable::default();
    for (thread, row, start) in order {
        let markers = &threads[thread].markers;
        out.push(
            offsets[thread].strings[markers.name[row]],
            start,
            markers.end[row],
            markers.category[row],
            markers.data[row].clone(),
        );
    }
    out
}

fn merge_js_tracer(threads: &[Rc<Thread>], offsets: &[Offsets]) -> Option<Rc<JsTracerTable>> {
    if threads.iter().all(|t| t.js_tracer.is_none()) {
        return None;
    }
    let order = interleave(threads.iter().enumerate().filter_map(|(i, t)| {
        t.js_tracer.as_deref().map(|tracer| (i, tracer.timestamp.as_slice()))
    }));

    let mut out = JsTracerTable::default();
    for (thread, row, timestamp) in order {
        let Some(tracer) = threads[thread].js_tracer.as_deref() else {
            continue;
        };
        out.event.push(offsets[thread].strings[tracer.event[row]]);
        out.timestamp.push(timestamp);
        out.duration.push(tracer.duration[row]);
        out.line.push(tracer.line[row]);
    }
    Some(Rc::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{DEFAULT_CATEGORIES, ThreadBuilder};

    #[test]
    fn interleaves_samples_by_time() {
        let a = Rc::new(
            ThreadBuilder::new("A")
                .sample(0.0, "main;a")
                .sample(2.0, "main;a")
                .build(),
        );
        let b = Rc::new(
            ThreadBuilder::new("B")
                .sample(1.0, "main;b")
                .sample(3.0, "main")
                .build(),
        );

        let merged = merge_threads(&[a, b]).unwrap();
        assert_eq!(merged.name, "A, B");
        assert_eq!(merged.samples.time, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(merged.sample_func_names(1), ["main", "b"]);
        assert_eq!(merged.sample_func_names(2), ["main", "a"]);
        // "main" is interned once even though both threads define it.
        assert_eq!(merged.strings.len(), 3);
        merged.check_indices(DEFAULT_CATEGORIES.len()).unwrap();
    }

    #[test]
    fn optional_columns_need_every_thread() {
        let a = Rc::new(ThreadBuilder::new("A").sample_with_cpu(0.0, "x", Some(1.0)).build());
        let b = Rc::new(ThreadBuilder::new("B").sample(1.0, "y").build());
        let merged = merge_threads(&[a, b]).unwrap();
        assert!(merged.samples.thread_cpu_delta.is_none());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(merge_threads(&[]).is_err());
    }
}
