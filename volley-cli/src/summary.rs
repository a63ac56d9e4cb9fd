//! Text summary of a run

use std::fmt::Write;
use volley_execution::RunResult;
use volley_metrics::{MetricSummary, Verdict};

const NAME_WIDTH: usize = 28;

/// Render the end-of-run report printed by `volley run`
pub fn render(result: &RunResult) -> String {
    let mut out = String::new();
    // Writing to a String never fails
    let _ = write_report(&mut out, result);
    out
}

fn write_report(out: &mut String, result: &RunResult) -> std::fmt::Result {
    writeln!(
        out,
        "Run {} after {:.1}s: {} iterations, {} errors, {} dropped",
        result.stop_reason,
        result.duration.as_secs_f64(),
        result.iterations,
        result.errors,
        result.dropped
    )?;

    if !result.scenarios.is_empty() {
        writeln!(out)?;
        writeln!(out, "Scenarios")?;
        for scenario in &result.scenarios {
            writeln!(
                out,
                "  {} ({}): offered {}, started {}, completed {}, abandoned {}, dropped {}, worker errors {}, peak workers {}",
                scenario.name,
                scenario.executor,
                scenario.offered,
                scenario.started,
                scenario.completed,
                scenario.abandoned,
                scenario.dropped,
                scenario.worker_errors,
                scenario.peak_workers
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Metrics")?;
    for (name, summary) in &result.snapshot.metrics {
        writeln!(out, "  {:.<width$} {}", format!("{} ", name), describe(summary), width = NAME_WIDTH)?;
    }

    if !result.thresholds.is_empty() {
        writeln!(out)?;
        writeln!(out, "Thresholds")?;
        for outcome in &result.thresholds {
            let mark = match outcome.verdict {
                Verdict::Pass => "PASS",
                Verdict::Fail => "FAIL",
                Verdict::Indeterminate => "N/A ",
            };
            match outcome.observed {
                Some(observed) => writeln!(
                    out,
                    "  [{}] {} (observed {})",
                    mark,
                    outcome.threshold,
                    number(observed)
                )?,
                None => writeln!(out, "  [{}] {} (no observations)", mark, outcome.threshold)?,
            }
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "Result: {}",
        if result.passed { "PASSED" } else { "FAILED" }
    )
}

fn describe(summary: &MetricSummary) -> String {
    match summary {
        MetricSummary::Counter { count, rate } => {
            format!("count={} rate={}/s", number(*count), number(*rate))
        }
        MetricSummary::Rate {
            passes,
            total,
            rate,
        } => format!("{:.2}% ({}/{})", rate * 100.0, passes, total),
        MetricSummary::Trend(trend) => format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} count={}",
            number(trend.avg),
            number(trend.min),
            number(trend.med),
            number(trend.max),
            number(trend.p90),
            number(trend.p95),
            number(trend.p99),
            trend.count
        ),
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
