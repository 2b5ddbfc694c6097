use super::stack_rewrite::drop_samples_by_stack;
use crate::profile::Thread;

/// Keep the samples whose stack mentions any of `search_strings`.
///
/// Matching is a case-insensitive substring test against each function's
/// name, file name and resource name.
pub fn filter_thread_to_search_strings(thread: &Thread, search_strings: &[String]) -> Thread {
    let needles: Vec<String> = search_strings
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if needles.is_empty() {
        return thread.clone();
    }

    let hit = |text: &str| {
        let text = text.to_lowercase();
        needles.iter().any(|needle| text.contains(needle.as_str()))
    };
    let func_matches: Vec<bool> = (0..thread.funcs.len())
        .map(|func| {
            hit(thread.func_name(func))
                || thread.funcs.file_name[func]
                    .is_some_and(|file| hit(thread.strings.get_or_empty(file)))
                || thread.funcs.resource[func].is_some_and(|resource| {
                    hit(thread.strings.get_or_empty(thread.resources.name[resource]))
                })
        })
        .collect();

    let mut stack_matches: Vec<bool> = Vec::with_capacity(thread.stacks.len());
    for stack in 0..thread.stacks.len() {
        let inherited = thread.stacks.prefix[stack].is_some_and(|p| stack_matches[p]);
        stack_matches.push(inherited || func_matches[thread.func_of_stack(stack)]);
    }

    drop_samples_by_stack(thread, |stack| stack_matches[stack])
}
