//! Timing report: stdout summary and the optional `query.csv` row.

use std::fs::OpenOptions;
use std::path::Path;

use strata_core::QueryStats;

/// Prints build time, per-kind query time and QPS, and the total.
pub fn print_summary(build_seconds: f64, search_seconds: f64, stats: &QueryStats) {
    let total = build_seconds + search_seconds;

    println!(
        "Build time: {build_seconds:.2}s ({:.1}%)",
        build_seconds * 100.0 / total
    );
    println!(
        "Query time: {search_seconds:.2}s ({:.1}%)",
        search_seconds * 100.0 / total
    );

    for kind in 0..4 {
        if stats.counts[kind] == 0 {
            continue;
        }
        println!(
            "  kind {kind}: {} queries in {:.3}s ({:.0} QPS)",
            stats.counts[kind],
            stats.seconds[kind],
            stats.qps(kind)
        );
    }

    println!("Total time: {total:.2}s");
}

/// Appends one row of per-kind QPS plus timings; writes the header when the
/// file is new or empty.
pub fn append_csv(
    path: impl AsRef<Path>,
    build_seconds: f64,
    search_seconds: f64,
    stats: &QueryStats,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let write_header = std::fs::metadata(path).map_or(true, |meta| meta.len() == 0);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if write_header {
        writer.write_record([
            "kind0_qps",
            "kind1_qps",
            "kind2_qps",
            "kind3_qps",
            "build_seconds",
            "search_seconds",
            "recorded_at",
        ])?;
    }

    let recorded_at = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
    let mut row: Vec<String> = (0..4).map(|kind| format!("{:.2}", stats.qps(kind))).collect();
    row.push(format!("{build_seconds:.3}"));
    row.push(format!("{search_seconds:.3}"));
    row.push(recorded_at);
    writer.write_record(&row)?;
    writer.flush()?;

    println!("Recorded row in {}", path.display());
    Ok(())
}
