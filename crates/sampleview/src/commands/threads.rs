use super::view::{self, OpenedView};
use crate::cli::ViewArgs;
use crate::error::Result;
use crate::profile::ThreadsKey;
use crate::selectors::ThreadSelectors;
use crate::state::ViewState;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{CellAlignment, ContentArrangement, Table};
use std::path::Path;

/// One line of the thread listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRow {
    pub key: ThreadsKey,
    pub name: String,
    pub process: String,
    pub samples_in_range: usize,
    pub start: f64,
    pub end: f64,
    pub timing: bool,
    pub js_allocations: bool,
    pub native_allocations: bool,
    pub retained_memory: bool,
}

pub fn thread_row(selectors: &ThreadSelectors, state: &ViewState) -> Result<ThreadRow> {
    let thread = selectors.thread(state)?;
    let range = selectors.thread_range(state)?;
    let process = match &thread.process_name {
        Some(name) => format!("{name} ({})", thread.pid),
        None => thread.process_type.clone(),
    };
    Ok(ThreadRow {
        key: selectors.key().clone(),
        name: selectors.friendly_thread_name(state)?.to_string(),
        process,
        samples_in_range: selectors.range_filtered_thread(state)?.samples.len(),
        start: range.start,
        end: range.end,
        timing: selectors.has_useful_timing_samples(state)?,
        js_allocations: selectors.has_useful_js_allocations(state)?,
        native_allocations: selectors.has_useful_native_allocations(state)?,
        retained_memory: selectors.can_show_retained_memory(state)?,
    })
}

/// Run the threads command
pub fn run(file: &Path, args: &ViewArgs) -> Result<()> {
    let OpenedView {
        state, registry, ..
    } = view::open(file, args)?;

    let rows = registry
        .for_each_thread(&state)
        .iter()
        .map(|selectors| thread_row(selectors, &state))
        .collect::<Result<Vec<_>>>()?;

    if rows.is_empty() {
        println!("No threads in {}", file.display());
        return Ok(());
    }

    let flag = |set: bool| if set { "yes" } else { "-" };
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "#", "THREAD", "PROCESS", "SAMPLES", "RANGE (ms)", "TIMING", "JS ALLOC",
            "NATIVE ALLOC", "RETAINED",
        ]);
    for row in &rows {
        table.add_row(vec![
            row.key.to_string(),
            row.name.clone(),
            row.process.clone(),
            row.samples_in_range.to_string(),
            format!("{:.1}..{:.1}", row.start, row.end),
            flag(row.timing).to_string(),
            flag(row.js_allocations).to_string(),
            flag(row.native_allocations).to_string(),
            flag(row.retained_memory).to_string(),
        ]);
    }
    if let Some(column) = table.column_mut(3) {
        column.set_cell_alignment(CellAlignment::Right);
    }

    println!("# {}", file.display());
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileBuilder, ThreadBuilder};
    use crate::selectors::Selectors;
    use std::rc::Rc;

    #[test]
    fn rows_describe_each_thread() {
        let profile = ProfileBuilder::new()
            .thread(
                ThreadBuilder::new("GeckoMain")
                    .process("Browser", 1, "parent")
                    .main_thread()
                    .sample(0.0, "A")
                    .sample(1.0, "A"),
            )
            .thread(
                ThreadBuilder::new("Alloc")
                    .native_allocation_at(0.0, "A", 8.0, 1)
                    .js_allocation(0.5, "A", 4.0, "Array"),
            )
            .build();
        let state = ViewState::new(Rc::new(profile));
        let registry = Selectors::new();
        let rows: Vec<ThreadRow> = registry
            .for_each_thread(&state)
            .iter()
            .map(|s| thread_row(s, &state).unwrap())
            .collect();

        assert_eq!(rows[0].name, "Browser");
        assert_eq!(rows[0].process, "Browser (1)");
        assert_eq!(rows[0].samples_in_range, 2);
        assert!(rows[0].timing && !rows[0].native_allocations);
        assert!(!rows[1].timing);
        assert!(rows[1].js_allocations && rows[1].native_allocations && rows[1].retained_memory);
    }
}
