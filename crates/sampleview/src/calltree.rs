//! Call trees summarized from a [`SamplesLikeTable`].

use crate::ops::SamplesLikeTable;
use crate::profile::{FuncIndex, StackIndex, Thread, WeightType};
use crate::transforms::CallNodePath;
use std::collections::HashMap;

/// One node of a [`CallTree`]: a distinct path of functions from a root.
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub func: FuncIndex,
    pub parent: Option<usize>,
    pub depth: usize,
    pub self_weight: f64,
    pub total_weight: f64,
    /// Sorted by total weight, heaviest first.
    pub children: Vec<usize>,
}

/// Per-function totals across the whole tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSummary {
    pub func: FuncIndex,
    pub self_weight: f64,
    /// Weight of samples with the function anywhere on the stack, counted
    /// once per sample even under recursion.
    pub total_weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CallTree {
    nodes: Vec<CallNode>,
    roots: Vec<usize>,
    total_weight: f64,
    weight_type: WeightType,
    functions: Vec<FunctionSummary>,
}

impl CallTree {
    /// Build the tree of `samples`, whose stacks index into `thread`.
    pub fn build(thread: &Thread, samples: &SamplesLikeTable) -> Self {
        let stacks = &thread.stacks;
        let mut nodes: Vec<CallNode> = Vec::new();
        let mut roots = Vec::new();
        let mut lookup: HashMap<(Option<usize>, FuncIndex), usize> = HashMap::new();
        let mut node_of_stack: Vec<usize> = Vec::with_capacity(stacks.len());

        // Prefixes precede their stacks, so parents always exist already.
        for stack in 0..stacks.len() {
            let func = thread.func_of_stack(stack);
            let parent = stacks.prefix[stack].map(|p| node_of_stack[p]);
            let node = *lookup.entry((parent, func)).or_insert_with(|| {
                let index = nodes.len();
                let depth = parent.map_or(0, |p| nodes[p].depth + 1);
                nodes.push(CallNode {
                    func,
                    parent,
                    depth,
                    self_weight: 0.0,
                    total_weight: 0.0,
                    children: Vec::new(),
                });
                match parent {
                    Some(p) => nodes[p].children.push(index),
                    None => roots.push(index),
                }
                index
            });
            node_of_stack.push(node);
        }

        let mut functions: HashMap<FuncIndex, FunctionSummary> = HashMap::new();
        let mut seen: Vec<FuncIndex> = Vec::new();
        let mut total_weight = 0.0;
        for (stack, &weight) in samples.stack.iter().zip(&samples.weight) {
            let Some(stack) = *stack else { continue };
            total_weight += weight;
            nodes[node_of_stack[stack]].self_weight += weight;

            seen.clear();
            for (depth, ancestor) in stacks.ancestors(stack).enumerate() {
                let func = thread.func_of_stack(ancestor);
                let summary = functions.entry(func).or_insert(FunctionSummary {
                    func,
                    self_weight: 0.0,
                    total_weight: 0.0,
                });
                if depth == 0 {
                    summary.self_weight += weight;
                }
                if !seen.contains(&func) {
                    seen.push(func);
                    summary.total_weight += weight;
                }
            }
        }

        for index in (0..nodes.len()).rev() {
            nodes[index].total_weight += nodes[index].self_weight;
            if let Some(parent) = nodes[index].parent {
                let total = nodes[index].total_weight;
                nodes[parent].total_weight += total;
            }
        }

        let by_total = |nodes: &[CallNode], list: &mut Vec<usize>| {
            list.sort_by(|&a, &b| nodes[b].total_weight.total_cmp(&nodes[a].total_weight));
        };
        for index in 0..nodes.len() {
            let mut children = std::mem::take(&mut nodes[index].children);
            by_total(&nodes, &mut children);
            nodes[index].children = children;
        }
        by_total(&nodes, &mut roots);

        let mut functions: Vec<FunctionSummary> = functions.into_values().collect();
        functions.sort_by(|a, b| {
            b.self_weight
                .total_cmp(&a.self_weight)
                .then(b.total_weight.total_cmp(&a.total_weight))
                .then(a.func.cmp(&b.func))
        });

        log::debug!(
            "call tree for '{}': {} nodes from {} samples",
            thread.name,
            nodes.len(),
            samples.len()
        );

        Self {
            nodes,
            roots,
            total_weight,
            weight_type: samples.weight_type,
            functions,
        }
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, index: usize) -> &CallNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn weight_type(&self) -> WeightType {
        self.weight_type
    }

    /// Functions sorted by self weight, heaviest first.
    pub fn functions(&self) -> &[FunctionSummary] {
        &self.functions
    }

    /// Func path from the root down to `index`.
    pub fn path(&self, index: usize) -> CallNodePath {
        let mut path: CallNodePath =
            std::iter::successors(Some(index), |&i| self.nodes[i].parent)
                .map(|i| self.nodes[i].func)
                .collect();
        path.reverse();
        path
    }

    pub fn find(&self, path: &[FuncIndex]) -> Option<usize> {
        let (&first, rest) = path.split_first()?;
        let mut current = *self.roots.iter().find(|&&r| self.nodes[r].func == first)?;
        for &func in rest {
            current = *self.nodes[current]
                .children
                .iter()
                .find(|&&c| self.nodes[c].func == func)?;
        }
        Some(current)
    }

    /// Nodes in depth-first order, heaviest child first, down to `max_depth`.
    pub fn walk(&self, max_depth: Option<usize>) -> Vec<usize> {
        let mut out = Vec::new();
        let mut pending: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = pending.pop() {
            out.push(index);
            if max_depth.is_some_and(|max| self.nodes[index].depth + 1 >= max) {
                continue;
            }
            pending.extend(self.nodes[index].children.iter().rev());
        }
        out
    }

    /// The node whose stack is `stack`, if the tree came from that thread.
    pub fn node_of_stack(&self, thread: &Thread, stack: StackIndex) -> Option<usize> {
        let mut path: Vec<FuncIndex> = thread
            .stacks
            .ancestors(stack)
            .map(|s| thread.func_of_stack(s))
            .collect();
        path.reverse();
        self.find(&path)
    }
}
