use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use structuremap::*;
use std::sync::Arc;

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let mut registry = Registry::new();
    registry.for_type::<u64>().singleton().use_value(Arc::new(42));
    let container = registry.build();

    // Prime the singleton
    let _ = container.get_instance::<u64>().unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = container.get_instance::<u64>().unwrap();
            black_box(v);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    c.bench_function("singleton_cold_expensive", |b| {
        b.iter_batched(
            || {
                let mut registry = Registry::new();
                registry.for_type::<ExpensiveToCreate>().singleton().use_factory(|_| {
                    Ok(Arc::new(ExpensiveToCreate {
                        data: (0..1000).collect(),
                    }))
                });
                registry.build()
            },
            |container| {
                let v = container.get_instance::<ExpensiveToCreate>().unwrap();
                black_box(v.data.len());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

struct Engine {
    cylinders: u32,
}

impl Pluggable for Engine {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|args| {
            Ok(Engine {
                cylinders: args.value::<u32>("cylinders")?,
            })
        })
        .value::<u32>("cylinders");
    }
}

struct Car {
    engine: Arc<Engine>,
}

impl Pluggable for Car {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|args| Ok(Car { engine: args.get::<Engine>("engine")? }))
            .dependency::<Engine>("engine");
    }
}

fn bench_constructed_vs_factory(c: &mut Criterion) {
    let mut group = c.benchmark_group("constructed_vs_factory");

    let mut registry = Registry::new();
    registry.for_type::<Engine>().use_type::<Engine>().ctor_value("cylinders", 4u32);
    registry.for_type::<Car>().use_type::<Car>();
    let constructed = registry.build();

    group.bench_function("constructed_plan", |b| {
        b.iter(|| {
            let car = constructed.get_instance::<Car>().unwrap();
            black_box(car.engine.cylinders);
        })
    });

    let mut registry = Registry::new();
    registry
        .for_type::<Engine>()
        .use_factory(|_| Ok(Arc::new(Engine { cylinders: 4 })));
    registry.for_type::<Car>().use_factory(|session| {
        Ok(Arc::new(Car {
            engine: session.get_instance::<Engine>()?,
        }))
    });
    let factory = registry.build();

    group.bench_function("factory", |b| {
        b.iter(|| {
            let car = factory.get_instance::<Car>().unwrap();
            black_box(car.engine.cylinders);
        })
    });

    group.finish();
}

fn bench_get_all_scaling(c: &mut Criterion) {
    trait Handler: Send + Sync {
        fn id(&self) -> usize;
    }

    struct HandlerImpl(usize);
    impl Handler for HandlerImpl {
        fn id(&self) -> usize {
            self.0
        }
    }

    let mut group = c.benchmark_group("get_all");

    for &count in &[1, 4, 16, 64] {
        let mut registry = Registry::new();
        for i in 0..count {
            registry
                .for_type::<dyn Handler>()
                .singleton()
                .add_value(Arc::new(HandlerImpl(i)) as Arc<dyn Handler>);
        }
        let container = registry.build();

        group.bench_with_input(BenchmarkId::new("get_all", count), &count, |b, _| {
            b.iter(|| {
                let handlers = container.get_all_instances::<dyn Handler>().unwrap();
                black_box(handlers.iter().map(|h| h.id()).sum::<usize>());
            })
        });
    }

    group.finish();
}

fn bench_nested_containers(c: &mut Criterion) {
    struct UnitOfWork {
        data: Vec<u8>,
    }

    let mut group = c.benchmark_group("nested_container");

    let empty = Registry::new().build();
    group.bench_function("empty_create_drop", |b| {
        b.iter(|| {
            let nested = empty.get_nested_container();
            black_box(&nested);
        })
    });

    let mut registry = Registry::new();
    registry
        .for_type::<UnitOfWork>()
        .use_factory(|_| Ok(Arc::new(UnitOfWork { data: vec![0; 1024] })));
    let container = registry.build();

    group.bench_function("with_transient", |b| {
        b.iter(|| {
            let nested = container.get_nested_container();
            let work = nested.get_instance::<UnitOfWork>().unwrap();
            black_box(work.data.len());
        })
    });

    group.finish();
}

fn bench_plan_compilation(c: &mut Criterion) {
    c.bench_function("first_resolve_compiles_plans", |b| {
        b.iter_batched(
            || {
                let mut registry = Registry::new();
                registry.for_type::<Engine>().use_type::<Engine>().ctor_value("cylinders", 8u32);
                registry.build()
            },
            |container| {
                let car = container.get_concrete::<Car>().unwrap();
                black_box(car.engine.cylinders);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");

    let mut registry = Registry::new();
    registry.for_type::<u64>().singleton().use_value(Arc::new(42));
    let container = registry.build();

    // Prime the singleton
    let _ = container.get_instance::<u64>().unwrap();

    for &thread_count in &[1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("singleton_threads", thread_count),
            &thread_count,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let start = std::time::Instant::now();
                    crossbeam_utils::thread::scope(|s| {
                        for _ in 0..threads {
                            let container = &container;
                            s.spawn(move |_| {
                                for _ in 0..iters / threads as u64 {
                                    let v = container.get_instance::<u64>().unwrap();
                                    black_box(v);
                                }
                            });
                        }
                    })
                    .unwrap();
                    start.elapsed()
                })
            },
        );
    }

    group.finish();
}

// ===== Macro Benchmarks =====

fn bench_mixed_workload(c: &mut Criterion) {
    // 70% singleton hits, 20% context hits, 10% transient builds
    struct SingletonService(u64);
    struct ContextService(u64);
    struct TransientService(u64);

    let mut registry = Registry::new();
    registry
        .for_type::<SingletonService>()
        .singleton()
        .use_value(Arc::new(SingletonService(1)));
    registry
        .for_type::<ContextService>()
        .context_scoped()
        .use_factory(|_| Ok(Arc::new(ContextService(2))));
    registry
        .for_type::<TransientService>()
        .use_factory(|_| Ok(Arc::new(TransientService(3))));

    let container = registry.build();
    let request = container.with_context(ContextKey::new());

    let _ = container.get_instance::<SingletonService>().unwrap();
    let _ = request.get_instance::<ContextService>().unwrap();

    c.bench_function("mixed_workload_realistic", |b| {
        b.iter(|| {
            for _ in 0..7 {
                let v = container.get_instance::<SingletonService>().unwrap();
                black_box(v.0);
            }
            for _ in 0..2 {
                let v = request.get_instance::<ContextService>().unwrap();
                black_box(v.0);
            }
            let v = container.get_instance::<TransientService>().unwrap();
            black_box(v.0);
        })
    });
}

criterion_group!(
    micro_benches,
    bench_singleton_hit,
    bench_singleton_cold,
    bench_constructed_vs_factory,
    bench_get_all_scaling,
    bench_nested_containers,
    bench_plan_compilation,
    bench_contention
);

criterion_group!(macro_benches, bench_mixed_workload);

criterion_main!(micro_benches, macro_benches);
