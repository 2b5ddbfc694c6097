use super::schema::{self, SCHEMA_VERSION};
use crate::error::Result;
use crate::profile::{Profile, Thread};
use rusqlite::{Connection, Transaction, params};
use std::path::Path;
use std::time::Instant;

/// Write `profile` to a new database at `path`, replacing any previous
/// contents.
pub fn write_profile(path: &Path, profile: &Profile) -> Result<()> {
    let mut conn = Connection::open(path)?;
    save_profile(&mut conn, profile)
}

/// Replace the contents of `conn` with `profile`, in one transaction.
pub fn save_profile(conn: &mut Connection, profile: &Profile) -> Result<()> {
    let started = Instant::now();
    schema::create_tables(conn)?;

    let tx = conn.transaction()?;
    let meta = &profile.meta;
    schema::set_meta(&tx, "version", &SCHEMA_VERSION.to_string())?;
    schema::set_meta(&tx, "product", &meta.product)?;
    schema::set_meta(&tx, "interval", &meta.interval.to_string())?;
    schema::set_meta(&tx, "start_time", &meta.start_time.to_string())?;
    schema::set_meta(&tx, "created", &chrono::Utc::now().to_rfc3339())?;
    if let Some(unit) = meta.cpu_delta_unit {
        schema::set_meta(&tx, "cpu_delta_unit", unit.as_str())?;
    }

    {
        let mut stmt =
            tx.prepare_cached("INSERT INTO categories (idx, name, color) VALUES (?, ?, ?)")?;
        for (i, category) in meta.categories.iter().enumerate() {
            stmt.execute(params![i as i64, &category.name, &category.color])?;
        }
    }

    {
        let mut stmt =
            tx.prepare_cached("INSERT INTO marker_schemas (name, searchable) VALUES (?, ?)")?;
        for schema in meta.marker_schema.values() {
            stmt.execute(params![&schema.name, schema.searchable.join(",")])?;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO pages (idx, tab_id, inner_window_id, url) VALUES (?, ?, ?, ?)",
        )?;
        for (i, page) in meta.pages.iter().enumerate() {
            stmt.execute(params![
                i as i64,
                page.tab_id as i64,
                page.inner_window_id as i64,
                &page.url
            ])?;
        }
    }

    for (id, thread) in profile.threads.iter().enumerate() {
        write_thread(&tx, id as i64, thread)?;
    }

    tx.commit()?;
    log::debug!(
        "saved {} threads in {:.2?}",
        profile.threads.len(),
        started.elapsed()
    );
    Ok(())
}

fn write_thread(tx: &Transaction<'_>, id: i64, thread: &Thread) -> Result<()> {
    let samples = &thread.samples;
    tx.execute(
        "INSERT INTO threads (id, name, process_name, process_type, pid, tid, is_main_thread, \
         register_time, unregister_time, weight_type, has_weight, has_cpu_delta, has_event_delay, \
         has_native_allocations, native_balanced, has_js_allocations, has_js_tracer) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id,
            &thread.name,
            &thread.process_name,
            &thread.process_type,
            thread.pid as i64,
            thread.tid.map(|t| t as i64),
            thread.is_main_thread,
            thread.register_time,
            thread.unregister_time,
            samples.weight_type.as_str(),
            samples.weight.is_some(),
            samples.thread_cpu_delta.is_some(),
            samples.event_delay.is_some(),
            thread.native_allocations.is_some(),
            thread
                .native_allocations
                .as_ref()
                .is_some_and(|n| n.is_balanced()),
            thread.js_allocations.is_some(),
            thread.js_tracer.is_some(),
        ],
    )?;

    {
        let mut stmt =
            tx.prepare_cached("INSERT INTO strings (thread_id, idx, value) VALUES (?, ?, ?)")?;
        for (i, value) in thread.strings.iter().enumerate() {
            stmt.execute(params![id, i as i64, value])?;
        }
    }

    {
        let mut stmt =
            tx.prepare_cached("INSERT INTO resources (thread_id, idx, name) VALUES (?, ?, ?)")?;
        for (i, &name) in thread.resources.name.iter().enumerate() {
            stmt.execute(params![id, i as i64, name as i64])?;
        }
    }

    {
        let funcs = &thread.funcs;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO funcs (thread_id, idx, name, is_js, relevant_for_js, resource, file_name, line) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..funcs.len() {
            stmt.execute(params![
                id,
                i as i64,
                funcs.name[i] as i64,
                funcs.is_js[i],
                funcs.relevant_for_js[i],
                funcs.resource[i].map(|r| r as i64),
                funcs.file_name[i].map(|f| f as i64),
                funcs.line[i],
            ])?;
        }
    }

    {
        let frames = &thread.frames;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO frames (thread_id, idx, func, category, line, address, inner_window_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..frames.len() {
            stmt.execute(params![
                id,
                i as i64,
                frames.func[i] as i64,
                frames.category[i].map(|c| c as i64),
                frames.line[i],
                frames.address[i].map(|a| a as i64),
                frames.inner_window_id[i].map(|w| w as i64),
            ])?;
        }
    }

    {
        let stacks = &thread.stacks;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO stacks (thread_id, idx, prefix, frame, category) VALUES (?, ?, ?, ?, ?)",
        )?;
        for i in 0..stacks.len() {
            stmt.execute(params![
                id,
                i as i64,
                stacks.prefix[i].map(|p| p as i64),
                stacks.frame[i] as i64,
                stacks.category[i] as i64,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO samples (thread_id, idx, time, stack, weight, cpu_delta, event_delay) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..samples.len() {
            stmt.execute(params![
                id,
                i as i64,
                samples.time[i],
                samples.stack[i].map(|s| s as i64),
                samples.weight.as_ref().map(|w| w[i]),
                samples.thread_cpu_delta.as_ref().and_then(|c| c[i]),
                samples.event_delay.as_ref().and_then(|d| d[i]),
            ])?;
        }
    }

    if let Some(native) = &thread.native_allocations {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO native_allocations (thread_id, idx, time, stack, weight, memory_address) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..native.len() {
            stmt.execute(params![
                id,
                i as i64,
                native.time[i],
                native.stack[i].map(|s| s as i64),
                native.weight[i],
                native.memory_address.as_ref().map(|a| a[i] as i64),
            ])?;
        }
    }

    if let Some(js) = &thread.js_allocations {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO js_allocations (thread_id, idx, time, stack, weight, class_name) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..js.len() {
            stmt.execute(params![
                id,
                i as i64,
                js.time[i],
                js.stack[i].map(|s| s as i64),
                js.weight[i],
                js.class_name[i] as i64,
            ])?;
        }
    }

    {
        let markers = &thread.markers;
        let mut marker_stmt = tx.prepare_cached(
            "INSERT INTO markers (thread_id, idx, name, start_time, end_time, category, schema) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        let mut field_stmt = tx.prepare_cached(
            "INSERT INTO marker_fields (thread_id, marker, position, key, value) VALUES (?, ?, ?, ?, ?)",
        )?;
        for i in 0..markers.len() {
            let data = markers.data[i].as_ref();
            marker_stmt.execute(params![
                id,
                i as i64,
                markers.name[i] as i64,
                markers.start[i],
                markers.end[i],
                markers.category[i] as i64,
                data.map(|d| d.schema.as_str()),
            ])?;
            for (position, (key, value)) in data.iter().flat_map(|d| &d.fields).enumerate() {
                field_stmt.execute(params![id, i as i64, position as i64, key, value])?;
            }
        }
    }

    if let Some(tracer) = &thread.js_tracer {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO js_tracer_events (thread_id, idx, event, timestamp, duration, line) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..tracer.len() {
            stmt.execute(params![
                id,
                i as i64,
                tracer.event[i] as i64,
                tracer.timestamp[i],
                tracer.duration[i],
                tracer.line[i],
            ])?;
        }
    }

    Ok(())
}
