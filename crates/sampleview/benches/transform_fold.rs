use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use sampleview::ops::StandardOps;
use sampleview::profile::{ProfileBuilder, Thread, ThreadBuilder};
use sampleview::transforms::{Transform, TransformCache, TransformContext};
use std::rc::Rc;

/// A thread with `samples` samples spread over a few deep stacks.
fn deep_thread(samples: usize) -> (Rc<Thread>, Rc<TransformContext>) {
    let stacks = [
        "main;run;dispatch;parse;lex;next_token",
        "main;run;dispatch;parse;expr;binary;lex",
        "main;run;dispatch;eval;call;eval;call;eval",
        "main;run;idle",
        "main;run;dispatch;eval;alloc[lib:libc.so];malloc[lib:libc.so]",
    ];
    let mut thread = ThreadBuilder::new("GeckoMain");
    for i in 0..samples {
        thread = thread.sample(i as f64, stacks[i % stacks.len()]);
    }
    let profile = ProfileBuilder::new().thread(thread).build();
    let thread = profile.threads[0].clone();
    let context = Rc::new(TransformContext::for_thread(&thread, &profile.meta));
    (thread, context)
}

fn func(thread: &Thread, name: &str) -> usize {
    (0..thread.funcs.len())
        .find(|&f| thread.func_name(f) == name)
        .unwrap_or(0)
}

fn stack(thread: &Thread) -> Vec<Transform> {
    vec![
        Transform::MergeFunction {
            func: func(thread, "dispatch"),
        },
        Transform::CollapseRecursion {
            func: func(thread, "eval"),
        },
        Transform::CollapseResource { resource: 0 },
        Transform::FocusFunction {
            func: func(thread, "run"),
        },
    ]
}

pub fn fold_cold(c: &mut Criterion) {
    let (thread, context) = deep_thread(50_000);
    let transforms = stack(&thread);
    c.bench_function("transform fold/cold", |b| {
        b.iter_batched(
            TransformCache::new,
            |cache| {
                black_box(
                    cache
                        .apply_stack(&StandardOps, &thread, &transforms, &context)
                        .unwrap(),
                )
            },
            BatchSize::LargeInput,
        )
    });
}

pub fn fold_one_more(c: &mut Criterion) {
    let (thread, context) = deep_thread(50_000);
    let transforms = stack(&thread);
    let (prefix, _) = transforms.split_at(transforms.len() - 1);
    c.bench_function("transform fold/push one", |b| {
        b.iter_batched(
            || {
                let cache = TransformCache::new();
                cache
                    .apply_stack(&StandardOps, &thread, prefix, &context)
                    .unwrap();
                cache
            },
            |cache| {
                black_box(
                    cache
                        .apply_stack(&StandardOps, &thread, &transforms, &context)
                        .unwrap(),
                )
            },
            BatchSize::LargeInput,
        )
    });
}

pub fn fold_warm(c: &mut Criterion) {
    let (thread, context) = deep_thread(50_000);
    let transforms = stack(&thread);
    let cache = TransformCache::new();
    cache
        .apply_stack(&StandardOps, &thread, &transforms, &context)
        .unwrap();
    c.bench_function("transform fold/warm", |b| {
        b.iter(|| {
            black_box(
                cache
                    .apply_stack(&StandardOps, &thread, &transforms, &context)
                    .unwrap(),
            )
        })
    });
}

criterion_group!(benches, fold_cold, fold_one_more, fold_warm);
criterion_main!(benches);
