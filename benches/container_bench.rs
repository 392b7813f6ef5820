#![allow(dead_code)]
//! 容器解析的性能基准测试

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::thread;
use wirebox::{Container, Definition, Input, Scope, Type};

/// 测试用的简单服务
struct SimpleService {
    value: i32,
}

/// 测试用的复杂服务（包含依赖）
struct ComplexService {
    simple: Arc<SimpleService>,
    peers: Vec<Arc<SimpleService>>,
}

fn simple_definition(name: String, scope: Scope, value: i32) -> Definition {
    Definition::builder(name, Type::of::<SimpleService>())
        .scope(scope)
        .constructor(move |_| Ok(SimpleService { value }))
        .build()
        .unwrap()
}

fn complex_definition() -> Definition {
    Definition::builder("complex", Type::of::<ComplexService>())
        .prototype()
        .input(Input::of(Type::of::<SimpleService>()).named("simple-0"))
        .input(Input::of(Type::sequence(Type::of::<SimpleService>())))
        .constructor(|args| {
            Ok(ComplexService {
                simple: args.get::<SimpleService>(0)?,
                peers: args.all::<SimpleService>(1)?,
            })
        })
        .build()
        .unwrap()
}

/// 基准测试：共享实例的缓存命中
fn bench_shared_resolution(c: &mut Criterion) {
    let container = Container::new();
    container
        .register(simple_definition("simple".to_string(), Scope::Shared, 1))
        .unwrap();
    container.get("simple").unwrap();

    c.bench_function("shared_cached_get", |b| {
        b.iter(|| black_box(container.get(black_box("simple")).unwrap()))
    });
}

/// 基准测试：原型实例的构造
fn bench_prototype_resolution(c: &mut Criterion) {
    let container = Container::new();
    container
        .register(simple_definition("simple".to_string(), Scope::Prototype, 1))
        .unwrap();

    c.bench_function("prototype_get", |b| {
        b.iter(|| black_box(container.get(black_box("simple")).unwrap()))
    });
}

/// 基准测试：带集合依赖的构造，按注册数量分组
fn bench_collection_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_resolution");

    for count in [1, 10, 100].iter() {
        let container = Container::new();
        for i in 0..*count {
            container
                .register(simple_definition(format!("simple-{}", i), Scope::Shared, i))
                .unwrap();
        }
        container.register(complex_definition()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(container.get("complex").unwrap()))
        });
    }

    group.finish();
}

/// 基准测试：并发解析同一个共享实例
fn bench_concurrent_resolution(c: &mut Criterion) {
    let container = Arc::new(Container::new());
    container
        .register(simple_definition("simple".to_string(), Scope::Shared, 1))
        .unwrap();

    c.bench_function("concurrent_shared_get", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let container = container.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            black_box(container.get("simple").unwrap());
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_shared_resolution,
    bench_prototype_resolution,
    bench_collection_resolution,
    bench_concurrent_resolution
);
criterion_main!(benches);
