//! Benchmarks for flowplan core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowplan::core::types::*;
use flowplan::core::{codegen, fingerprint, parser, planner};
use flowplan::{compile, SourceSet};

/// Flow of `n` steps; every third step is a parallel loop over one shared branch.
fn synthetic_flow(n: usize) -> Flow {
    let steps = (0..n)
        .map(|i| {
            let mut step = Step::new(&format!("step_{i}"), "bench.work".parse().unwrap());
            if i % 3 == 0 {
                step.parallel_loop = Some(ParallelLoopStatement {
                    var_name: "item".into(),
                    expression: "items".into(),
                });
                step.is_async = true;
                step.aggregate = vec![Output::new("all", "${ branches_context }")];
            }
            if i + 2 < n && i % 5 == 0 {
                step.navigation
                    .insert("SUCCESS".into(), format!("step_{}", i + 2));
            }
            step
        })
        .collect();
    Flow {
        name: "bench.main".parse().unwrap(),
        inputs: vec![],
        outputs: vec![],
        workflow: Workflow::new(steps),
    }
}

fn work_operation() -> Executable {
    Executable::Operation(Operation {
        name: "bench.work".parse().unwrap(),
        inputs: vec![],
        outputs: vec![],
        results: vec![],
        action: Action::Script {
            script: "pass".into(),
        },
    })
}

fn bench_yaml_parse(c: &mut Criterion) {
    let yaml = r#"
namespace: bench
imports:
  lib: bench.lib
flow:
  name: parallel_loop_aggregate
  inputs:
    - name: values
  workflow:
    - name: print_values
      do: lib.print_branch
      parallel_loop: {for: value, in: values}
      inputs:
        - {name: ID, value: "${value}"}
      publish:
        - {name: name, value: "${name}"}
        - {name: number, value: "${ int_output }"}
      aggregate:
        - {name: name_list, value: "${ map(lambda x:str(x['name']), branches_context) }"}
        - {name: number_from_last_branch, value: "${ branches_context[-1]['number'] }"}
      navigate:
        SUCCESS: print_list
    - name: print_list
      do: lib.print_list
  on_failure:
    name: report
    do: lib.report
"#;

    c.bench_function("yaml_parse_and_convert", |b| {
        b.iter(|| {
            let source = parser::parse_source(black_box(yaml), "bench.yaml").unwrap();
            black_box(parser::into_executable(&source, "bench.yaml").unwrap());
        });
    });
}

fn bench_lower_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("lower_flow");
    for size in [10, 100, 1000] {
        let flow = synthetic_flow(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &flow, |b, flow| {
            b.iter(|| black_box(planner::plan_flow(black_box(flow)).unwrap()));
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let candidates = SourceSet::from_executables([work_operation()]).unwrap();

    let mut group = c.benchmark_group("compile");
    for size in [10, 100, 1000] {
        let root = Executable::Flow(synthetic_flow(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &root, |b, root| {
            b.iter(|| black_box(compile(black_box(root), &candidates).unwrap()));
        });
    }
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let candidates = SourceSet::from_executables([work_operation()]).unwrap();
    let artifact = compile(&Executable::Flow(synthetic_flow(200)), &candidates).unwrap();

    c.bench_function("runtime_json_200", |b| {
        b.iter(|| black_box(codegen::runtime_json(black_box(&artifact))));
    });
    c.bench_function("fingerprint_200", |b| {
        b.iter(|| black_box(fingerprint::fingerprint(black_box(&artifact))));
    });
}

criterion_group!(
    benches,
    bench_yaml_parse,
    bench_lower_flow,
    bench_compile,
    bench_fingerprint
);
criterion_main!(benches);
