use criterion::Criterion;

use recoveryfit::{text, CurveFitEngine, FitTarget, PreparedSeries};


fn table_fitting(c: &mut Criterion) {
    let table = text::load_sample_table("test/data/recovery_trace.tsv").unwrap();
    let engine = CurveFitEngine::default();

    c.bench_function("prepare_series", |b| {
        b.iter(|| PreparedSeries::from_request(&table.to_request(FitTarget::BackgroundSubtracted)))
    });
    let prepared =
        PreparedSeries::from_request(&table.to_request(FitTarget::BackgroundSubtracted)).unwrap();
    c.bench_function("fit_prepared", |b| b.iter(|| engine.fit_prepared(&prepared)));
    c.bench_function("fit_raw_signal", |b| {
        b.iter(|| engine.fit(&table.to_request(FitTarget::RawSignal)))
    });
}


fn curve_sampling(c: &mut Criterion) {
    let table = text::load_sample_table("test/data/recovery_trace.tsv").unwrap();
    let result = table
        .fit_with(&CurveFitEngine::default(), FitTarget::BackgroundSubtracted, None)
        .unwrap();
    c.bench_function("curve_200", |b| b.iter(|| result.curve(200)));
}


fn fitting(c: &mut Criterion) {
    table_fitting(c);
    curve_sampling(c);
}


criterion::criterion_group!(benches, fitting);
criterion::criterion_main!(benches);
