//! Plain-text rendering of model output for the terminal.

use medadmit::calibrate::schools::{AuditReport, Severity};
use medadmit::calibrate::validation::{NamedCheck, ValidationReport};
use medadmit::simulate::monte_carlo::{OutcomePattern, SimulationResult};
use medadmit::simulate::uncertainty::{ListUncertainty, VarianceDecomposition};
use medadmit::two_stage::ListProbability;
use medadmit::types::CredibleEstimate;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

fn pct(p: f64) -> String {
    format!("{:5.1}%", 100.0 * p)
}

fn interval(e: &CredibleEstimate) -> String {
    format!("{} [{} - {}]", pct(e.mean), pct(e.ci80[0]), pct(e.ci80[1]))
}

fn rule<W: Write>(out: &mut W, width: usize) -> io::Result<()> {
    writeln!(out, "{}", "-".repeat(width))
}

pub fn write_predictions<W: Write>(out: &mut W, list: &ListProbability) -> io::Result<()> {
    writeln!(
        out,
        "{:<28} {:>4} {:>9} {:>11} {:>9}  {}",
        "school", "tier", "interview", "accept|int", "accept", "category"
    )?;
    rule(out, 80)?;
    for p in &list.predictions {
        writeln!(
            out,
            "{:<28} {:>4} {:>9} {:>11} {:>9}  {}",
            p.school_name,
            p.tier,
            pct(p.p_interview()),
            pct(p.p_accept_given_interview()),
            pct(p.p_accept()),
            p.category.as_str()
        )?;
    }
    rule(out, 80)?;
    writeln!(out, "P(at least one acceptance): {}", pct(list.p_at_least_one))?;
    writeln!(
        out,
        "Expected interviews: {:.2}   Expected acceptances: {:.2}",
        list.expected_interviews, list.expected_acceptances
    )?;
    if !list.omitted.is_empty() {
        writeln!(out, "Omitted (no calibrated parameters): {}", list.omitted.join(", "))?;
    }
    Ok(())
}

fn pattern_line(pattern: &Option<OutcomePattern>) -> String {
    match pattern {
        Some(p) if p.accepted.is_empty() => format!("no acceptances ({})", pct(p.frequency)),
        Some(p) => format!("{} ({})", p.accepted.join(", "), pct(p.frequency)),
        None => "n/a".to_string(),
    }
}

pub fn write_simulation<W: Write>(out: &mut W, result: &SimulationResult) -> io::Result<()> {
    writeln!(
        out,
        "Simulated {} application cycles{}",
        result.iterations,
        if result.reproducible { "" } else { " (unseeded)" }
    )?;
    writeln!(out, "P(at least one acceptance): {}", pct(result.p_at_least_one))?;
    writeln!(
        out,
        "Interviews:  {:.2} [{:.0} - {:.0}]",
        result.expected_interviews.mean,
        result.expected_interviews.ci80[0],
        result.expected_interviews.ci80[1]
    )?;
    writeln!(
        out,
        "Acceptances: {:.2} [{:.0} - {:.0}]",
        result.expected_acceptances.mean,
        result.expected_acceptances.ci80[0],
        result.expected_acceptances.ci80[1]
    )?;

    let b = &result.distribution_buckets;
    writeln!(out)?;
    writeln!(out, "Acceptances per cycle")?;
    for (label, share) in [("0", b.zero), ("1", b.one), ("2-3", b.two_three), ("4+", b.four_plus)] {
        writeln!(out, "  {:<4} {}  {}", label, pct(share), "#".repeat((share * 40.0).round() as usize))?;
    }

    let c = &result.correlation_diagnostics;
    writeln!(out)?;
    writeln!(
        out,
        "Mean pairwise correlation {:.3}; count variance {:.2} vs {:.2} if independent",
        c.mean_pairwise_correlation, c.acceptance_variance, c.independent_variance
    )?;
    writeln!(out, "Most common outcome: {}", pattern_line(&result.modal_outcome))?;
    writeln!(out, "Best outcome:        {}", pattern_line(&result.best_outcome))?;
    writeln!(out, "Worst outcome:       {}", pattern_line(&result.worst_outcome))?;

    writeln!(out)?;
    writeln!(out, "{:<28} {:>9} {:>9}", "school", "interview", "accept")?;
    rule(out, 48)?;
    for rate in &result.school_rates {
        writeln!(
            out,
            "{:<28} {:>9} {:>9}",
            rate.school_id,
            pct(rate.interview_rate),
            pct(rate.acceptance_rate)
        )?;
    }
    Ok(())
}

pub fn write_uncertainty<W: Write>(out: &mut W, list: &ListUncertainty) -> io::Result<()> {
    writeln!(
        out,
        "{} bootstrap draws{}",
        list.draws,
        if list.reproducible { "" } else { " (unseeded)" }
    )?;
    writeln!(out, "{:<28} {:>26} {:>26}", "school", "interview", "accept")?;
    rule(out, 82)?;
    for s in &list.schools {
        writeln!(
            out,
            "{:<28} {:>26} {:>26}",
            s.school_name,
            interval(&s.p_interview),
            interval(&s.p_accept)
        )?;
    }
    rule(out, 82)?;
    writeln!(out, "P(at least one acceptance): {}", interval(&list.p_at_least_one))?;
    writeln!(
        out,
        "Expected acceptances: {:.2} [{:.2} - {:.2}]",
        list.expected_acceptances.mean,
        list.expected_acceptances.ci80[0],
        list.expected_acceptances.ci80[1]
    )?;
    if !list.omitted.is_empty() {
        writeln!(out, "Omitted: {}", list.omitted.join(", "))?;
    }
    Ok(())
}

pub fn write_variance<W: Write>(out: &mut W, school_id: &str, v: &VarianceDecomposition) -> io::Result<()> {
    writeln!(out, "Variance of P(accept) at {school_id}")?;
    writeln!(out, "  parameter uncertainty: {:.6}", v.parameter)?;
    writeln!(out, "  random effects:        {:.6}", v.random_effect)?;
    writeln!(out, "  combined:              {:.6}", v.combined)?;
    writeln!(out, "  interaction:           {:+.6}", v.interaction)
}

fn write_checks<W: Write>(out: &mut W, title: &str, checks: &[NamedCheck]) -> io::Result<()> {
    writeln!(out, "{title}")?;
    for check in checks {
        writeln!(
            out,
            "  [{}] {:<34} {}",
            if check.passed { "ok" } else { "FAIL" },
            check.name,
            check.detail
        )?;
    }
    Ok(())
}

pub fn write_validation<W: Write>(out: &mut W, report: &ValidationReport) -> io::Result<()> {
    let s = &report.summary;
    writeln!(
        out,
        "Reference grid: RMSE {:.4}, r = {:.4}, max error {:.4} [{}]",
        s.grid_rmse,
        s.grid_correlation,
        s.grid_max_abs_error,
        if report.grid.passed { "ok" } else { "FAIL" }
    )?;
    writeln!(
        out,
        "School interview rates: MAE {:.4}, r = {:.4} over {} schools [{}]",
        s.school_mae,
        s.school_correlation,
        report.school_rates.rows.len(),
        if report.school_rates.passed { "ok" } else { "FAIL" }
    )?;
    writeln!(out)?;
    write_checks(out, "Sensitivity", &report.sensitivity)?;
    writeln!(out)?;
    write_checks(out, "Scenarios", &report.edge_cases)?;
    writeln!(out)?;
    writeln!(out, "{}/{} checks passed", s.checks_passed, s.checks_total)?;
    if !s.failed.is_empty() {
        writeln!(out, "Failed: {}", s.failed.join(", "))?;
    }
    Ok(())
}

pub fn write_audit<W: Write>(out: &mut W, audit: &AuditReport) -> io::Result<()> {
    writeln!(
        out,
        "Audited {} schools: {} errors, {} warnings",
        audit.checked,
        audit.errors().count(),
        audit.warnings().count()
    )?;
    for issue in &audit.issues {
        let tag = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        writeln!(out, "  {:<7} {:<24} {}", tag, issue.school_id, issue.message)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PredictionRow<'a> {
    school_id: &'a str,
    school_name: &'a str,
    tier: u8,
    p_interview: f64,
    p_accept_given_interview: f64,
    p_accept: f64,
    category: &'static str,
}

/// One CSV row per predicted school, in list order.
pub fn write_predictions_csv(path: &Path, list: &ListProbability) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for p in &list.predictions {
        writer.serialize(PredictionRow {
            school_id: &p.school_id,
            school_name: &p.school_name,
            tier: p.tier,
            p_interview: p.p_interview(),
            p_accept_given_interview: p.p_accept_given_interview(),
            p_accept: p.p_accept(),
            category: p.category.as_str(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
