use std::env;
use std::time::Instant;

use recoveryfit::{
    arrayops::gridspace, load_sample_table, CurveFitEngine, FitTarget, ModelParameters,
    SampleTable, TableError,
};

fn synthetic_table() -> SampleTable {
    let truth = ModelParameters::new(0.4, 5.0, 0.2, 40.0);
    let time = gridspace(0.0, 300.0, 120);
    let background = vec![100.0; time.len()];
    let signal = time
        .iter()
        .enumerate()
        .map(|(i, t)| truth.density(*t) * 1500.0 + 100.0 + (i as f64 * 0.7).sin() * 1.5)
        .collect();
    SampleTable {
        time,
        signal,
        background,
    }
}

fn main() -> Result<(), TableError> {
    let mut args = env::args().skip(1);
    let table = match args.next() {
        Some(path) => load_sample_table(path)?,
        None => {
            println!("No table given, fitting a synthetic trace");
            synthetic_table()
        }
    };
    let target = match args.next().as_deref() {
        Some("raw") => FitTarget::RawSignal,
        _ => FitTarget::BackgroundSubtracted,
    };

    let engine = CurveFitEngine::default();
    let start = Instant::now();
    let result = table.fit_with(&engine, target, None)?;
    println!(
        "Fit {} samples ({:?}) in {} microseconds",
        result.statistics.n_data,
        target,
        (Instant::now() - start).as_micros()
    );
    println!("{}", result);
    println!(
        "chi-square {:e}, r-squared {:.5}, {} evaluations",
        result.statistics.chi_square, result.statistics.r_squared, result.statistics.n_evaluations
    );
    Ok(())
}
