use super::stack_rewrite::StackRewriter;
use crate::profile::{CategoryIndex, StackIndex, Thread};
use std::rc::Rc;

/// Turn every stack upside down so that its leaf frame becomes the root.
pub fn invert_call_stack(thread: &Thread, default_category: CategoryIndex) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = vec![None; old.len()];

    let used = thread
        .samples
        .stack
        .iter()
        .chain(thread.native_allocations.iter().flat_map(|t| t.stack.iter()))
        .chain(thread.js_allocations.iter().flat_map(|t| t.stack.iter()))
        .flatten();

    for &leaf in used {
        if map[leaf].is_some() {
            continue;
        }
        let mut prefix = None;
        for stack in old.ancestors(leaf) {
            prefix = Some(rewriter.push_with_category(prefix, old.frame[stack], old.category[stack]));
        }
        map[leaf] = prefix;
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;

    #[test]
    fn leaves_become_roots() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "main;a;leaf")
            .sample(1.0, "main;b;leaf")
            .sample(2.0, "")
            .build();
        let inverted = invert_call_stack(&thread, 0);

        assert_eq!(inverted.sample_func_names(0), ["leaf", "a", "main"]);
        assert_eq!(inverted.sample_func_names(1), ["leaf", "b", "main"]);
        assert_eq!(inverted.samples.stack[2], None);
        // Both inverted stacks share the "leaf" root.
        let root = |s: usize| inverted.stacks.ancestors(inverted.samples.stack[s].unwrap()).last();
        assert_eq!(root(0), root(1));
        inverted.check_indices(7).unwrap();
    }
}
