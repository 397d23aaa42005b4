use criterion::{Criterion, criterion_group, criterion_main};
use jscoro::{
    JSFunction, UnhandledRejectionPolicy, Value, async_generator_from_values, async_generator_next, promise_all, promise_catch,
    promise_reject, promise_resolve, promise_then, run_jobs, set_unhandled_rejection_policy,
};
use std::hint::black_box;

// cargo bench --profile dev

// Initialize logger for benchmark so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_bench_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).try_init();
}

fn add(n: f64) -> JSFunction {
    JSFunction::new("add", move |args| match args.first() {
        Some(Value::Number(x)) => Ok(Value::Number(x + n)),
        _ => Ok(Value::Undefined),
    })
}

fn benchmark_promise_operations(c: &mut Criterion) {
    set_unhandled_rejection_policy(UnhandledRejectionPolicy::Ignore);

    c.bench_function("promise_basic_resolution", |b| {
        b.iter(|| {
            let p = promise_then(&promise_resolve(Value::Number(42.0)), Some(add(1.0)), None);
            let _ = black_box(run_jobs());
            black_box(p);
        })
    });

    c.bench_function("promise_chaining", |b| {
        b.iter(|| {
            let mut p = promise_resolve(Value::Number(1.0));
            for _ in 0..4 {
                p = promise_then(&p, Some(add(1.0)), None);
            }
            let _ = black_box(run_jobs());
            black_box(p);
        })
    });

    c.bench_function("promise_rejection_catch", |b| {
        b.iter(|| {
            let p = promise_catch(&promise_reject(Value::from("error")), Some(add(0.0)));
            let _ = black_box(run_jobs());
            black_box(p);
        })
    });

    c.bench_function("promise_all_multiple", |b| {
        b.iter(|| {
            let inputs: Vec<Value> = (0..8).map(|i| Value::Promise(promise_resolve(Value::Number(i as f64)))).collect();
            let p = promise_all(&inputs);
            let _ = black_box(run_jobs());
            black_box(p);
        })
    });

    c.bench_function("promise_deep_chain", |b| {
        b.iter(|| {
            let mut p = promise_resolve(Value::Number(0.0));
            for _ in 0..1000 {
                p = promise_then(&p, Some(add(1.0)), None);
            }
            let _ = black_box(run_jobs());
            black_box(p);
        })
    });
}

fn benchmark_async_generator(c: &mut Criterion) {
    c.bench_function("async_generator_queued_nexts", |b| {
        b.iter(|| {
            let values: Vec<Value> = (0..64).map(|i| Value::Promise(promise_resolve(Value::Number(i as f64)))).collect();
            let generator = async_generator_from_values(values);
            let requests: Vec<_> = (0..65).map(|_| async_generator_next(&generator, Value::Undefined)).collect();
            let _ = black_box(run_jobs());
            black_box(requests);
        })
    });
}

criterion_group!(benches, benchmark_promise_operations, benchmark_async_generator);
criterion_main!(benches);
