use super::format::{csv_escape, format_weight, function_name, json_escape, percent};
use super::view::{self, OpenedView};
use crate::calltree::CallTree;
use crate::cli::{OutputArgs, ViewArgs};
use crate::error::Result;
use crate::profile::Thread;
use std::path::Path;

/// One printed call node.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLine {
    pub depth: usize,
    pub total: f64,
    pub self_weight: f64,
    pub total_percent: f64,
    pub function: String,
}

/// Call nodes in display order, skipping subtrees below `threshold` percent.
pub fn tree_lines(
    thread: &Thread,
    tree: &CallTree,
    max_depth: Option<usize>,
    threshold: f64,
) -> Vec<TreeLine> {
    let total = tree.total_weight();
    let mut lines = Vec::new();
    let mut skipped_depth: Option<usize> = None;
    for index in tree.walk(max_depth) {
        let node = tree.node(index);
        if let Some(depth) = skipped_depth {
            if node.depth > depth {
                continue;
            }
            skipped_depth = None;
        }
        let total_percent = percent(node.total_weight, total);
        if total_percent < threshold {
            skipped_depth = Some(node.depth);
            continue;
        }
        lines.push(TreeLine {
            depth: node.depth,
            total: node.total_weight,
            self_weight: node.self_weight,
            total_percent,
            function: function_name(thread, node.func),
        });
    }
    lines
}

/// Run the tree command
pub fn run(
    file: &Path,
    args: &ViewArgs,
    max_depth: Option<usize>,
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
    let lines = tree_lines(&thread, &tree, max_depth, threshold);
    view::log_cache_stats(&selectors);

    if output.json {
        print_json(file, &tree, &lines);
    } else if output.csv {
        print_csv(&lines);
    } else {
        let name = selectors.friendly_thread_name(&state)?;
        let strategy = selectors.summary_strategy(&state)?;
        println!("# {}", file.display());
        println!(
            "# Thread: {} | Summary: {} | Total: {}",
            name,
            strategy,
            format_weight(tree.total_weight(), tree.weight_type())
        );
        println!();
        print_text(&tree, &lines);
    }
    Ok(())
}

fn print_text(tree: &CallTree, lines: &[TreeLine]) {
    println!("{:>7}  {:>10}  {:>10}  TREE", "TOTAL%", "TOTAL", "SELF");
    println!("{}", "-".repeat(80));
    for line in lines {
        println!(
            "{:>6.1}%  {:>10}  {:>10}  {}{}",
            line.total_percent,
            format_weight(line.total, tree.weight_type()),
            format_weight(line.self_weight, tree.weight_type()),
            "  ".repeat(line.depth),
            line.function
        );
    }
}

fn print_json(file: &Path, tree: &CallTree, lines: &[TreeLine]) {
    println!("{{");
    println!("  \"file\": \"{}\",", json_escape(&file.display().to_string()));
    println!("  \"weight_type\": \"{}\",", tree.weight_type().as_str());
    println!("  \"total\": {},", tree.total_weight());
    println!("  \"nodes\": [");
    for (i, line) in lines.iter().enumerate() {
        let comma = if i + 1 < lines.len() { "," } else { "" };
        println!(
            "    {{ \"depth\": {}, \"total\": {}, \"self\": {}, \"total_pct\": {:.1}, \"function\": \"{}\" }}{}",
            line.depth,
            line.total,
            line.self_weight,
            line.total_percent,
            json_escape(&line.function),
            comma
        );
    }
    println!("  ]");
    println!("}}");
}

fn print_csv(lines: &[TreeLine]) {
    println!("depth,total,self,total_pct,function");
    for line in lines {
        println!(
            "{},{},{},{:.1},{}",
            line.depth,
            line.total,
            line.self_weight,
            line.total_percent,
            csv_escape(&line.function)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::extract_samples_like_table;
    use crate::profile::ThreadBuilder;
    use crate::summary::CallTreeSummaryStrategy;

    #[test]
    fn light_subtrees_are_skipped() {
        let mut builder = ThreadBuilder::new("Main");
        for i in 0..9 {
            builder = builder.sample(i as f64, "main;hot;leaf");
        }
        let thread = builder.sample(9.0, "main;cold;leaf").build();
        let samples = extract_samples_like_table(&thread, CallTreeSummaryStrategy::Timing).unwrap();
        let tree = CallTree::build(&thread, &samples);

        let all: Vec<String> = tree_lines(&thread, &tree, None, 0.0)
            .into_iter()
            .map(|l| format!("{}{}", " ".repeat(l.depth), l.function))
            .collect();
        assert_eq!(all, ["main", " hot", "  leaf", " cold", "  leaf"]);

        let heavy = tree_lines(&thread, &tree, None, 50.0);
        assert_eq!(heavy.len(), 3);
        assert_eq!(heavy[1].total_percent, 90.0);

        assert_eq!(tree_lines(&thread, &tree, Some(2), 0.0).len(), 3);
    }
}
