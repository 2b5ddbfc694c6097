use super::format::{
    csv_escape, format_weight, function_location, function_name, json_escape, percent,
};
use super::view::{self, OpenedView};
use crate::calltree::CallTree;
use crate::cli::{OutputArgs, ViewArgs};
use crate::error::Result;
use crate::profile::{Thread, WeightType};
use std::path::Path;

/// One row of the top functions table.
#[derive(Debug, Clone, PartialEq)]
pub struct TopEntry {
    pub self_weight: f64,
    pub total_weight: f64,
    pub self_percent: f64,
    pub total_percent: f64,
    pub location: String,
    pub function: String,
}

/// The `limit` heaviest functions by self weight, at least `threshold`
/// percent each.
pub fn top_entries(thread: &Thread, tree: &CallTree, limit: usize, threshold: f64) -> Vec<TopEntry> {
    let total = tree.total_weight();
    tree.functions()
        .iter()
        .map(|f| TopEntry {
            self_weight: f.self_weight,
            total_weight: f.total_weight,
            self_percent: percent(f.self_weight, total),
            total_percent: percent(f.total_weight, total),
            location: function_location(thread, f.func),
            function: function_name(thread, f.func),
        })
        .filter(|e| e.self_percent >= threshold)
        .take(limit)
        .collect()
}

/// Run the top command
pub fn run(
    file: &Path,
    args: &ViewArgs,
    limit: usize,
    threshold: f64,
    output: OutputArgs,
) -> Result<()> {
    let OpenedView {
        state, selectors, ..
    } = view::open(file, args)?;
    view::check_summary(&selectors, &state)?;

    let thread = selectors.preview_filtered_thread(&state)?;
    let samples = selectors.preview_filtered_samples_for_call_tree(&state)?;
    let tree = CallTree::build(&thread, &samples);
    let entries = top_entries(&thread, &tree, limit, threshold);
    view::log_cache_stats(&selectors);

    let weight_type = tree.weight_type();
    if output.json {
        print_json(file, &tree, &entries);
    } else if output.csv {
        print_csv(&entries);
    } else {
        let range = state.committed_range();
        println!("# {}", file.display());
        println!(
            "# Thread: {} | Range: {:.1}..{:.1}ms | Samples: {} | Total: {}",
            selectors.friendly_thread_name(&state)?,
            range.start,
            range.end,
            samples.len(),
            format_weight(tree.total_weight(), weight_type)
        );
        println!();
        print_table(&entries, weight_type);
    }
    Ok(())
}

fn print_table(entries: &[TopEntry], weight_type: WeightType) {
    println!(
        "{:>6}  {:>6}  {:>10}  {:<30}  FUNCTION",
        "SELF%", "TOTAL%", "SELF", "LOCATION"
    );
    println!("{}", "-".repeat(80));
    for entry in entries {
        println!(
            "{:>5.1}%  {:>5.1}%  {:>10}  {:<30}  {}",
            entry.self_percent,
            entry.total_percent,
            format_weight(entry.self_weight, weight_type),
            entry.location,
            entry.function
        );
    }
}

fn print_json(file: &Path, tree: &CallTree, entries: &[TopEntry]) {
    println!("{{");
    println!("  \"file\": \"{}\",", json_escape(&file.display().to_string()));
    println!("  \"weight_type\": \"{}\",", tree.weight_type().as_str());
    println!("  \"total\": {},", tree.total_weight());
    println!("  \"entries\": [");
    for (i, entry) in entries.iter().enumerate() {
        let comma = if i + 1 < entries.len() { "," } else { "" };
        println!(
            "    {{ \"self_pct\": {:.1}, \"total_pct\": {:.1}, \"self\": {}, \"total\": {}, \"location\": \"{}\", \"function\": \"{}\" }}{}",
            entry.self_percent,
            entry.total_percent,
            entry.self_weight,
            entry.total_weight,
            json_escape(&entry.location),
            json_escape(&entry.function),
            comma
        );
    }
    println!("  ]");
    println!("}}");
}

fn print_csv(entries: &[TopEntry]) {
    println!("self_pct,total_pct,self,total,location,function");
    for entry in entries {
        println!(
            "{:.1},{:.1},{},{},{},{}",
            entry.self_percent,
            entry.total_percent,
            entry.self_weight,
            entry.total_weight,
            csv_escape(&entry.location),
            csv_escape(&entry.function)
        );
    }
}
