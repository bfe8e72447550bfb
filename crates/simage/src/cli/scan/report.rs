//! Progress display and the end-of-scan summary.

use indicatif::{ProgressBar, ProgressStyle};
use simage_core::{ImageProducer, ResultSummary};
use std::time::Duration;

pub fn create_progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )?
        .progress_chars("##-"),
    );
    pb.set_message("loading...");
    Ok(pb)
}

/// Mirror the producer's progress onto `pb` until every submitted path has
/// been processed.
pub async fn follow_loading(producer: &ImageProducer, pb: &ProgressBar) {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        ticker.tick().await;
        let progress = producer.progress();
        pb.set_position(progress.processed);
        pb.set_message(format!("{} buffered", producer.buffered()));
        if progress.is_complete() {
            break;
        }
    }
}

/// Everything the summary reports.
pub struct ScanReport {
    pub discovered: u64,
    pub dispatched: u64,
    pub results: ResultSummary,
    pub pending: Vec<String>,
    pub elapsed: Duration,
}

pub fn print_summary(report: &ScanReport) {
    let not_dispatched = report.discovered.saturating_sub(report.dispatched);
    let rate = if report.elapsed.as_secs_f64() > 0.0 {
        report.results.recorded as f64 / report.elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ============ Summary ============");
    eprintln!("    Discovered:   {:>7}", report.discovered);
    eprintln!("    Dispatched:   {:>7}", report.dispatched);
    eprintln!("    Skipped:      {:>7}  (recorded or unreadable)", not_dispatched);
    eprintln!("    Recorded:     {:>7}", report.results.recorded);
    if report.results.corrupt > 0 {
        eprintln!("    Corrupt:      {:>7}", report.results.corrupt);
    }
    if report.results.failed > 0 {
        eprintln!("    Failed:       {:>7}", report.results.failed);
    }
    if !report.pending.is_empty() {
        eprintln!("    Pending:      {:>7}", report.pending.len());
    }
    eprintln!("    Duration:     {:>7.1}s", report.elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  =================================");
}
