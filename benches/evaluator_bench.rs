//! Criterion benchmarks for the operon-core evaluator.
//!
//! Measures evaluation of prebuilt node trees, path parsing and the path-set
//! operations. Trees are built once; literal subtrees are memoized after the
//! first iteration, so `memoized_literal_100` measures the cached path.
//!
//! Run:
//!   cargo bench
//!   cargo bench -- evaluation   # one group

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use operon_core::{pathset, value, Ast, BinaryOp, Evaluator, NodeId, ObjectValue, Path, Value};

// ── Data builders ─────────────────────────────────────────────────────────────

/// 100 simple product objects: {id, name, price, inStock}.
fn products_100() -> Value {
    let products: Vec<Value> = (0..100_usize)
        .map(|i| {
            let mut obj = ObjectValue::new();
            obj.set("id", Value::from(i));
            obj.set("name", Value::from(format!("Product {i}")));
            obj.set("price", Value::from(10.0 + i as f64 * 2.5));
            obj.set("inStock", Value::Bool(i % 2 == 0));
            Value::object(obj)
        })
        .collect();
    let mut root = ObjectValue::new();
    root.set("products", Value::array(products));
    Value::object(root)
}

/// `{"name": $.name, "age": $.age :: $ > 0, "adult": _.age > 17}`
fn person_template(ast: &mut Ast) -> NodeId {
    let current = ast.current_value();
    let name = ast.navigate(current, Path::parse(".name").unwrap());
    let name_pair = ast.pair("name", name);

    let current = ast.current_value();
    let age = ast.navigate(current, Path::parse(".age").unwrap());
    let constrained = ast.current_value();
    let zero = ast.number(0.0);
    let positive = ast.binary(BinaryOp::Gt, constrained, zero);
    let age_pair = ast.constrained_pair("age", age, positive, "$ > 0");

    let underscore = ast.variable("_");
    let sibling_age = ast.navigate(underscore, Path::parse(".age").unwrap());
    let limit = ast.number(17.0);
    let adult = ast.binary(BinaryOp::Gt, sibling_age, limit);
    let adult_pair = ast.pair("adult", adult);

    ast.object(vec![name_pair, age_pair, adult_pair])
}

// ── Bench groups ──────────────────────────────────────────────────────────────

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");
    group.sample_size(300);

    // Ambient-dependent object: re-evaluated on every call
    {
        let mut ast = Ast::new();
        let root = person_template(&mut ast);
        let mut evaluator = Evaluator::new();
        let input = value!({"name": "Alice", "age": 30});
        group.bench_function("constrained_object", |b| {
            b.iter(|| black_box(evaluator.evaluate(&mut ast, root, black_box(input.clone()))))
        });
    }

    // Literal tree: memoized after the first call
    {
        let mut ast = Ast::new();
        let items: Vec<NodeId> = (0..100).map(|i| ast.number(i as f64)).collect();
        let root = ast.array(items);
        let mut evaluator = Evaluator::new();
        group.bench_function("memoized_literal_100", |b| {
            b.iter(|| black_box(evaluator.evaluate(&mut ast, root, Value::Null)))
        });
    }

    // Generic dispatch through the function registry
    {
        let mut ast = Ast::new();
        let root = ast.call("", "count", vec![]);
        let mut evaluator = Evaluator::new();
        let input = products_100();
        group.bench_function("generic_count", |b| {
            b.iter(|| black_box(evaluator.evaluate(&mut ast, root, black_box(input.clone()))))
        });
    }

    group.finish();
}

fn bench_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths");

    group.bench_function("parse", |b| {
        b.iter(|| black_box(Path::parse(black_box(".products[42].\"in stock\".name"))))
    });

    let data = products_100();
    group.bench_function("all_paths_100", |b| {
        b.iter(|| black_box(pathset::all_paths(black_box(&data))))
    });

    for added in [1_usize, 10, 50] {
        let mut modified = data.clone();
        for i in 0..added {
            let path = Path::parse(&format!(".products[{}].discount", i + 1)).unwrap();
            let _ = modified.set_at(path.parts(), Value::from(0i64));
        }
        group.bench_with_input(BenchmarkId::new("diff", added), &modified, |b, modified| {
            b.iter(|| black_box(pathset::diff(black_box(&data), black_box(modified))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_evaluation, bench_paths);
criterion_main!(benches);
