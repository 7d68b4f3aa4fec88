// ========================================================================================
//
//                    MEDADMIT CYCLE SIMULATION BENCHMARK
//
// ========================================================================================
//
// Measures the correlated Monte-Carlo simulator and the list bootstrap as the school
// list grows. The per-cycle cost is linear in the number of schools, while pattern
// bookkeeping grows with the number of distinct accepted sets.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use medadmit::catalog::Catalog;
use medadmit::fixtures::average_applicant;
use medadmit::simulate::monte_carlo::{SchoolStageProbabilities, SimulationConfig, simulate_cycles};
use medadmit::simulate::uncertainty::{UncertaintyConfig, bootstrap_list};
use medadmit::two_stage::AdmissionModel;

const LIST_SIZES: [usize; 4] = [5, 10, 20, 40];
const ITERATIONS: usize = 10_000;

/// Synthetic list with stage probabilities spread over a realistic range.
fn synthetic_list(n: usize) -> Vec<SchoolStageProbabilities> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n.max(1) as f64;
            SchoolStageProbabilities {
                school_id: format!("school-{i:02}"),
                p_interview: 0.05 + 0.5 * t,
                p_accept_given_interview: 0.25 + 0.3 * (1.0 - t),
            }
        })
        .collect()
}

fn bench_simulate_cycles(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_cycles");
    group.throughput(Throughput::Elements(ITERATIONS as u64));
    for n in LIST_SIZES {
        let schools = synthetic_list(n);
        let config = SimulationConfig::seeded(ITERATIONS, 42);
        group.bench_with_input(BenchmarkId::from_parameter(n), &schools, |b, schools| {
            b.iter(|| simulate_cycles(black_box(schools), black_box(&config)))
        });
    }
    group.finish();
}

fn bench_bootstrap_list(c: &mut Criterion) {
    let model = AdmissionModel::builtin();
    let catalog = match Catalog::builtin() {
        Ok(catalog) => catalog,
        Err(e) => panic!("built-in catalog failed to load: {e}"),
    };
    let profile = average_applicant();
    let ids: Vec<String> = catalog.ids().map(str::to_string).collect();
    let config = UncertaintyConfig::seeded(200, 42);

    c.bench_function("bootstrap_list/builtin_catalog", |b| {
        b.iter(|| bootstrap_list(&model, black_box(&profile), &ids, &catalog, &config))
    });
}

criterion_group!(benches, bench_simulate_cycles, bench_bootstrap_list);
criterion_main!(benches);
