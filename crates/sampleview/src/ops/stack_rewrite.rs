//! Shared plumbing for operations that rebuild the stack table.

use crate::profile::{CategoryIndex, FrameIndex, StackIndex, StackTable, Thread};
use std::collections::HashMap;
use std::rc::Rc;

/// Builds a fresh stack table, interning `(prefix, frame)` pairs so that
/// equal paths collapse onto one stack.
pub struct StackRewriter<'a> {
    thread: &'a Thread,
    default_category: CategoryIndex,
    stacks: StackTable,
    lookup: HashMap<(Option<StackIndex>, FrameIndex), StackIndex>,
}

impl<'a> StackRewriter<'a> {
    pub fn new(thread: &'a Thread, default_category: CategoryIndex) -> Self {
        Self {
            thread,
            default_category,
            stacks: StackTable::default(),
            lookup: HashMap::new(),
        }
    }

    /// Intern a stack whose category is inherited the usual way: the frame's
    /// own category, else the prefix's, else the default.
    pub fn push(&mut self, prefix: Option<StackIndex>, frame: FrameIndex) -> StackIndex {
        let category = self.thread.frames.category[frame]
            .or_else(|| prefix.map(|p| self.stacks.category[p]))
            .unwrap_or(self.default_category);
        self.push_with_category(prefix, frame, category)
    }

    pub fn push_with_category(
        &mut self,
        prefix: Option<StackIndex>,
        frame: FrameIndex,
        category: CategoryIndex,
    ) -> StackIndex {
        if let Some(&stack) = self.lookup.get(&(prefix, frame)) {
            return stack;
        }
        let stack = self.stacks.push(prefix, frame, category);
        self.lookup.insert((prefix, frame), stack);
        stack
    }

    pub fn finish(self) -> StackTable {
        self.stacks
    }
}

/// Remove every frame for which `keep` is false from every stack. A stack made
/// only of removed frames becomes the empty stack; sample rows stay in place.
pub fn filter_frames(
    thread: &Thread,
    default_category: CategoryIndex,
    keep: impl Fn(FrameIndex) -> bool,
) -> Thread {
    filter_stacks(thread, default_category, |stack| keep(thread.stacks.frame[stack]))
}

/// Like [`filter_frames`], deciding per stack node instead of per frame.
pub fn filter_stacks(
    thread: &Thread,
    default_category: CategoryIndex,
    keep: impl Fn(StackIndex) -> bool,
) -> Thread {
    let old = &thread.stacks;
    let mut rewriter = StackRewriter::new(thread, default_category);
    let mut map: Vec<Option<StackIndex>> = Vec::with_capacity(old.len());

    for stack in 0..old.len() {
        let new_prefix = old.prefix[stack].and_then(|p| map[p]);
        let mapped = if keep(stack) {
            Some(rewriter.push_with_category(new_prefix, old.frame[stack], old.category[stack]))
        } else {
            new_prefix
        };
        map.push(mapped);
    }

    thread.with_stack_map(Rc::new(rewriter.finish()), &map)
}

/// Empty the stack of every sample and allocation row whose stack fails
/// `keep`. The stack table itself is shared untouched.
pub fn drop_samples_by_stack(thread: &Thread, keep: impl Fn(StackIndex) -> bool) -> Thread {
    let map: Vec<Option<StackIndex>> = (0..thread.stacks.len())
        .map(|s| keep(s).then_some(s))
        .collect();
    thread.with_stack_map(thread.stacks.clone(), &map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ThreadBuilder;

    #[test]
    fn filtered_frames_collapse_shared_paths() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "A;X;B")
            .sample(1.0, "A;B")
            .sample(2.0, "X")
            .build();
        let x = thread.strings.index_of("X").unwrap();
        let filtered = filter_frames(&thread, 0, |frame| {
            thread.funcs.name[thread.frames.func[frame]] != x
        });

        assert_eq!(filtered.sample_func_names(0), ["A", "B"]);
        assert_eq!(filtered.samples.stack[0], filtered.samples.stack[1]);
        assert_eq!(filtered.samples.stack[2], None);
        assert_eq!(filtered.samples.len(), 3);
        assert!(Rc::ptr_eq(&filtered.frames, &thread.frames));
        filtered.check_indices(7).unwrap();
    }

    #[test]
    fn dropping_samples_shares_the_stack_table() {
        let thread = ThreadBuilder::new("Main")
            .sample(0.0, "A")
            .sample(1.0, "B")
            .build();
        let dropped = drop_samples_by_stack(&thread, |s| s == 0);
        assert!(Rc::ptr_eq(&dropped.stacks, &thread.stacks));
        assert_eq!(dropped.samples.stack, vec![Some(0), None]);
    }
}
