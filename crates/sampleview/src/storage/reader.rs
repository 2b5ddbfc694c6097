use super::schema::{self, SCHEMA_VERSION};
use crate::error::{Error, Result};
use crate::profile::{
    Category, CpuDeltaUnit, Frame, FrameTable, Func, FuncTable, JsAllocationsTable,
    JsTracerTable, MarkerPayload, MarkerSchema, NativeAllocationsTable, Page, Profile,
    ProfileMeta, RawMarkerTable, ResourceTable, SamplesTable, StackTable, StringTable, Thread,
    WeightType,
};
use rusqlite::{Connection, OpenFlags, Row};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

/// Open an existing profile database read-only.
pub fn open_profile(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::ProfileNotFound(path.display().to_string()));
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

/// Load the whole profile stored in `conn`.
pub fn load_profile(conn: &Connection) -> Result<Profile> {
    let started = Instant::now();
    check_version(conn)?;

    let meta = load_meta(conn)?;
    let mut threads = Vec::new();
    let ids = query_all(conn, "SELECT id FROM threads ORDER BY id", [], |row| {
        row.get::<_, i64>(0)
    })?;
    for id in ids {
        let thread = load_thread(conn, id)?;
        thread.check_indices(meta.categories.len())?;
        threads.push(Rc::new(thread));
    }

    log::debug!(
        "loaded {} threads in {:.2?}",
        threads.len(),
        started.elapsed()
    );
    Ok(Profile { meta, threads })
}

/// Stored schema version, `None` for a database that is not a profile.
pub fn schema_version(conn: &Connection) -> Result<Option<i32>> {
    let version = match schema::get_meta(conn, "version") {
        Ok(version) => version,
        // No meta table at all
        Err(rusqlite::Error::SqliteFailure(..)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(version.and_then(|v| v.parse().ok()))
}

fn check_version(conn: &Connection) -> Result<()> {
    match schema_version(conn)? {
        Some(SCHEMA_VERSION) => Ok(()),
        found => Err(Error::SchemaVersion {
            found: found.unwrap_or(0),
            expected: SCHEMA_VERSION,
        }),
    }
}

fn load_meta(conn: &Connection) -> Result<ProfileMeta> {
    let number = |key: &str| -> Result<f64> {
        Ok(schema::get_meta(conn, key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0))
    };

    let cpu_delta_unit = match schema::get_meta(conn, "cpu_delta_unit")? {
        Some(unit) => {
            let parsed = CpuDeltaUnit::parse(&unit);
            if parsed.is_none() {
                log::warn!("ignoring unknown CPU delta unit '{unit}'");
            }
            parsed
        }
        None => None,
    };

    let categories = query_all(
        conn,
        "SELECT name, color FROM categories ORDER BY idx",
        [],
        |row| {
            Ok(Category {
                name: row.get(0)?,
                color: row.get(1)?,
            })
        },
    )?;

    let marker_schema = query_all(
        conn,
        "SELECT name, searchable FROM marker_schemas",
        [],
        |row| {
            let name: String = row.get(0)?;
            let searchable: String = row.get(1)?;
            Ok(MarkerSchema {
                name,
                searchable: searchable
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
        },
    )?
    .into_iter()
    .map(|schema| (schema.name.clone(), schema))
    .collect();

    let pages = query_all(
        conn,
        "SELECT tab_id, inner_window_id, url FROM pages ORDER BY idx",
        [],
        |row| {
            Ok(Page {
                tab_id: row.get::<_, i64>(0)? as u64,
                inner_window_id: row.get::<_, i64>(1)? as u64,
                url: row.get(2)?,
            })
        },
    )?;

    Ok(ProfileMeta {
        product: schema::get_meta(conn, "product")?.unwrap_or_default(),
        interval: number("interval")?,
        start_time: number("start_time")?,
        cpu_delta_unit,
        categories: Rc::new(categories),
        marker_schema: Rc::new(marker_schema),
        pages: Rc::new(pages),
    })
}

/// Columns of the `threads` row that shape the rest of the load.
struct ThreadHeader {
    thread: Thread,
    weight_type: WeightType,
    has_weight: bool,
    has_cpu_delta: bool,
    has_event_delay: bool,
    has_native_allocations: bool,
    native_balanced: bool,
    has_js_allocations: bool,
    has_js_tracer: bool,
}

fn load_thread(conn: &Connection, id: i64) -> Result<Thread> {
    let header = conn.query_row(
        "SELECT name, process_name, process_type, pid, tid, is_main_thread, register_time, \
         unregister_time, weight_type, has_weight, has_cpu_delta, has_event_delay, \
         has_native_allocations, native_balanced, has_js_allocations, has_js_tracer \
         FROM threads WHERE id = ?",
        [id],
        |row| {
            let weight_type: String = row.get(8)?;
            Ok(ThreadHeader {
                thread: Thread {
                    name: row.get(0)?,
                    process_name: row.get(1)?,
                    process_type: row.get(2)?,
                    pid: row.get::<_, i64>(3)? as u32,
                    tid: row.get::<_, Option<i64>>(4)?.map(|t| t as u64),
                    is_main_thread: row.get(5)?,
                    register_time: row.get(6)?,
                    unregister_time: row.get(7)?,
                    ..Default::default()
                },
                weight_type: WeightType::parse(&weight_type).unwrap_or_default(),
                has_weight: row.get(9)?,
                has_cpu_delta: row.get(10)?,
                has_event_delay: row.get(11)?,
                has_native_allocations: row.get(12)?,
                native_balanced: row.get(13)?,
                has_js_allocations: row.get(14)?,
                has_js_tracer: row.get(15)?,
            })
        },
    )?;

    let mut strings = StringTable::new();
    for value in query_all(
        conn,
        "SELECT value FROM strings WHERE thread_id = ? ORDER BY idx",
        [id],
        |row| row.get::<_, String>(0),
    )? {
        strings.intern(&value);
    }

    let resources = ResourceTable {
        name: query_all(
            conn,
            "SELECT name FROM resources WHERE thread_id = ? ORDER BY idx",
            [id],
            |row| index(row, 0),
        )?,
    };

    let mut funcs = FuncTable::default();
    for func in query_all(
        conn,
        "SELECT name, is_js, relevant_for_js, resource, file_name, line \
         FROM funcs WHERE thread_id = ? ORDER BY idx",
        [id],
        |row| {
            Ok(Func {
                name: index(row, 0)?,
                is_js: row.get(1)?,
                relevant_for_js: row.get(2)?,
                resource: optional_index(row, 3)?,
                file_name: optional_index(row, 4)?,
                line: row.get(5)?,
            })
        },
    )? {
        funcs.push(func);
    }

    let mut frames = FrameTable::default();
    for frame in query_all(
        conn,
        "SELECT func, category, line, address, inner_window_id \
         FROM frames WHERE thread_id = ? ORDER BY idx",
        [id],
        |row| {
            Ok(Frame {
                func: index(row, 0)?,
                category: optional_index(row, 1)?,
                line: row.get(2)?,
                address: row.get::<_, Option<i64>>(3)?.map(|a| a as u64),
                inner_window_id: row.get::<_, Option<i64>>(4)?.map(|w| w as u64),
            })
        },
    )? {
        frames.push(frame);
    }

    let mut stacks = StackTable::default();
    for (prefix, frame, category) in query_all(
        conn,
        "SELECT prefix, frame, category FROM stacks WHERE thread_id = ? ORDER BY idx",
        [id],
        |row| Ok((optional_index(row, 0)?, index(row, 1)?, index(row, 2)?)),
    )? {
        stacks.push(prefix, frame, category);
    }

    let samples = load_samples(conn, id, &header)?;
    check_sorted(&header.thread.name, "samples", &samples.time)?;

    let native_allocations = if header.has_native_allocations {
        let rows = query_all(
            conn,
            "SELECT time, stack, weight, memory_address \
             FROM native_allocations WHERE thread_id = ? ORDER BY idx",
            [id],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    optional_index(row, 1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )?;
        let mut table = NativeAllocationsTable::default();
        let mut addresses = Vec::with_capacity(rows.len());
        for (time, stack, weight, address) in rows {
            table.time.push(time);
            table.stack.push(stack);
            table.weight.push(weight);
            addresses.push(address.unwrap_or_default() as u64);
        }
        if header.native_balanced {
            table.memory_address = Some(addresses);
        }
        check_sorted(&header.thread.name, "native_allocations", &table.time)?;
        Some(Rc::new(table))
    } else {
        None
    };

    let js_allocations = if header.has_js_allocations {
        let mut table = JsAllocationsTable::default();
        for (time, stack, weight, class_name) in query_all(
            conn,
            "SELECT time, stack, weight, class_name \
             FROM js_allocations WHERE thread_id = ? ORDER BY idx",
            [id],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    optional_index(row, 1)?,
                    row.get::<_, f64>(2)?,
                    index(row, 3)?,
                ))
            },
        )? {
            table.time.push(time);
            table.stack.push(stack);
            table.weight.push(weight);
            table.class_name.push(class_name);
        }
        check_sorted(&header.thread.name, "js_allocations", &table.time)?;
        Some(Rc::new(table))
    } else {
        None
    };

    let markers = load_markers(conn, id)?;

    let js_tracer = if header.has_js_tracer {
        let mut table = JsTracerTable::default();
        for (event, timestamp, duration, line) in query_all(
            conn,
            "SELECT event, timestamp, duration, line \
             FROM js_tracer_events WHERE thread_id = ? ORDER BY idx",
            [id],
            |row| {
                Ok((
                    index(row, 0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                ))
            },
        )? {
            let row = table.push(event, timestamp, duration);
            table.line[row] = line;
        }
        Some(Rc::new(table))
    } else {
        None
    };

    Ok(Thread {
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
        ..header.thread
    })
}

fn load_samples(conn: &Connection, id: i64, header: &ThreadHeader) -> Result<SamplesTable> {
    let rows = query_all(
        conn,
        "SELECT time, stack, weight, cpu_delta, event_delay \
         FROM samples WHERE thread_id = ? ORDER BY idx",
        [id],
        |row| {
            Ok((
                row.get::<_, f64>(0)?,
                optional_index(row, 1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
            ))
        },
    )?;

    let mut samples = SamplesTable {
        weight_type: header.weight_type,
        ..Default::default()
    };
    let mut weight = Vec::with_capacity(rows.len());
    let mut cpu_delta = Vec::with_capacity(rows.len());
    let mut event_delay = Vec::with_capacity(rows.len());
    for (time, stack, w, cpu, delay) in rows {
        samples.time.push(time);
        samples.stack.push(stack);
        weight.push(w.unwrap_or(1.0));
        cpu_delta.push(cpu);
        event_delay.push(delay);
    }
    samples.weight = header.has_weight.then_some(weight);
    samples.thread_cpu_delta = header.has_cpu_delta.then_some(cpu_delta);
    samples.event_delay = header.has_event_delay.then_some(event_delay);
    Ok(samples)
}

fn load_markers(conn: &Connection, id: i64) -> Result<RawMarkerTable> {
    let mut fields: HashMap<usize, Vec<(String, String)>> = HashMap::new();
    for (marker, key, value) in query_all(
        conn,
        "SELECT marker, key, value FROM marker_fields WHERE thread_id = ? ORDER BY marker, position",
        [id],
        |row| Ok((index(row, 0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
    )? {
        fields.entry(marker).or_default().push((key, value));
    }

    let mut markers = RawMarkerTable::default();
    for (i, (name, start, end, category, schema)) in query_all(
        conn,
        "SELECT name, start_time, end_time, category, schema \
         FROM markers WHERE thread_id = ? ORDER BY idx",
        [id],
        |row| {
            Ok((
                index(row, 0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, Option<f64>>(2)?,
                index(row, 3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        },
    )?
    .into_iter()
    .enumerate()
    {
        let data = schema.map(|schema| MarkerPayload {
            schema,
            fields: fields.remove(&i).unwrap_or_default(),
        });
        markers.push(name, start, end, category, data);
    }
    Ok(markers)
}

/// Range filtering binary-searches every time column.
fn check_sorted(thread: &str, table: &str, times: &[f64]) -> Result<()> {
    match times.windows(2).position(|w| w[1] < w[0]) {
        Some(row) => Err(Error::MalformedThread(format!(
            "{table} of thread '{thread}' are not sorted by time (row {})",
            row + 1
        ))),
        None => Ok(()),
    }
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
}

fn index(row: &Row<'_>, column: usize) -> rusqlite::Result<usize> {
    Ok(row.get::<_, i64>(column)? as usize)
}

fn optional_index(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<usize>> {
    Ok(row.get::<_, Option<i64>>(column)?.map(|v| v as usize))
}
