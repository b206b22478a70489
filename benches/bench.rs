use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use flowuni::{pointer, pointer::Options, Module, Signatures, UnificationOracle};

// ------------------------------------------------------------------
// Helpers

fn load(program: &str, dir: &str) -> Module {
    let path = format!("tests/pointer/{}/{}.json", dir, program);
    let s = std::fs::read_to_string(&path).unwrap();
    Module::from_json(&s).unwrap()
}

/// `n` functions, each calling the next with a pointer to a fresh cell in a
/// loop. The last one recurses into the first.
fn chain(n: usize, recursive: bool) -> Module {
    let functions: Vec<_> = (0..n)
        .map(|i| {
            let callee = if i + 1 < n {
                Some(format!("@f{}", i + 1))
            } else if recursive {
                Some("@f0".to_string())
            } else {
                None
            };
            let body = vec![
                json!({"name": "cell", "op": "alloca"}),
                json!({"name": "heap", "op": "malloc"}),
                json!({"op": "store", "pointer": "%cell", "value": "%p"}),
                json!({"op": "store", "pointer": "@g", "value": "%heap"}),
                json!({"op": "br", "targets": ["head"]}),
            ];
            let mut head = vec![json!({"name": "x", "op": "load", "pointer": "%cell"})];
            if let Some(c) = callee {
                head.push(json!({"name": "r", "op": "call", "callee": c, "args": ["%cell"]}));
                head.push(json!({"op": "store", "pointer": "%cell", "value": "%r"}));
            }
            head.push(json!({"op": "br", "targets": ["head", "exit"]}));
            json!({
                "name": format!("f{}", i),
                "params": [{"name": "p"}],
                "returns_pointer": true,
                "blocks": [
                    {"name": "entry", "instructions": body},
                    {"name": "head", "instructions": head},
                    {"name": "exit", "instructions": [{"op": "ret", "value": "%x"}]}
                ]
            })
        })
        .collect();
    let m = json!({"globals": [{"name": "g"}], "functions": functions});
    Module::from_json(&m.to_string()).unwrap()
}

fn run(m: &Module, sigs: &Signatures, opts: &Options) -> pointer::Outputs {
    let oracle = UnificationOracle::new(m, sigs);
    pointer::analysis(m, &oracle, sigs, opts)
}

// ------------------------------------------------------------------

pub fn locals(c: &mut Criterion) {
    let m = load("locals", "summaries");
    let sigs = Signatures::default();
    let opts = Options::default();
    c.bench_function("pointer::analysis(locals)", |b| {
        b.iter(|| run(black_box(&m), &sigs, &opts))
    });
}

pub fn chain_100(c: &mut Criterion) {
    let m = chain(100, false);
    let sigs = Signatures::default();
    let opts = Options::default();
    c.bench_function("pointer::analysis(chain-100)", |b| {
        b.iter(|| run(black_box(&m), &sigs, &opts))
    });
}

pub fn cycle_20(c: &mut Criterion) {
    let m = chain(20, true);
    let sigs = Signatures::default();
    let opts = Options::default();
    c.bench_function("pointer::analysis(cycle-20)", |b| {
        b.iter(|| run(black_box(&m), &sigs, &opts))
    });
}

pub fn cycle_20_unchecked(c: &mut Criterion) {
    let m = chain(20, true);
    let sigs = Signatures::default();
    let opts = Options {
        check_oracle: false,
        ..Options::default()
    };
    c.bench_function("pointer::analysis(cycle-20, unchecked)", |b| {
        b.iter(|| run(black_box(&m), &sigs, &opts))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = locals, chain_100, cycle_20, cycle_20_unchecked
}
criterion_main!(benches);
