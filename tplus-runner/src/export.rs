//! Result export: JSON report, order tape and equity curve as CSV, plain-text summary.
//!
//! Persisted reports carry a `schema_version`. Newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use tplus_core::domain::Order;
use tplus_core::engine::EquitySnapshot;

use crate::runner::{RunReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `RunReport` to pretty JSON.
pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

/// Deserialize a `RunReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn num(value: Decimal) -> String {
    value.normalize().to_string()
}

fn opt(value: Option<Decimal>) -> String {
    value.map(num).unwrap_or_default()
}

/// Export every order of the run, one row per order, in creation order.
///
/// `reason` holds the reject reason or the cancel reason, whichever applies.
pub fn export_orders_csv(orders: &[Order]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "symbol",
        "side",
        "quantity",
        "limit_price",
        "status",
        "filled_quantity",
        "filled_price",
        "commission",
        "tax",
        "slippage",
        "order_date",
        "fill_date",
        "settled_date",
        "reason",
    ])?;

    for o in orders {
        let reason = match (&o.reject_reason, &o.cancel_reason) {
            (Some(r), _) => r.to_string(),
            (None, Some(c)) => c.clone(),
            (None, None) => String::new(),
        };
        wtr.write_record([
            o.id.to_string(),
            o.symbol.clone(),
            o.side.to_string(),
            num(o.quantity),
            opt(o.limit_price),
            o.status.to_string(),
            num(o.filled_quantity),
            opt(o.filled_price),
            num(o.commission),
            num(o.tax),
            num(o.slippage),
            o.order_date.to_string(),
            o.fill_date.map(|d| d.to_string()).unwrap_or_default(),
            o.settled_date.map(|d| d.to_string()).unwrap_or_default(),
            reason,
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the per-session equity curve.
pub fn export_equity_csv(curve: &[EquitySnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["session", "cash", "total_value"])?;
    for point in curve {
        wtr.write_record([
            point.session.to_string(),
            num(point.cash),
            num(point.total_value),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one run under `output_dir/<run_id>/`:
/// `result.json`, `orders.csv` and `equity.csv`.
///
/// The directory name is the content-addressed run id, so re-running the
/// same config overwrites its own artifacts. Returns the directory path.
pub fn save_artifacts(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&report.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_json(report)?;
    std::fs::write(run_dir.join("result.json"), json)
        .with_context(|| format!("failed to write result.json in {}", run_dir.display()))?;

    let orders = export_orders_csv(&report.result.orders)?;
    std::fs::write(run_dir.join("orders.csv"), orders)
        .with_context(|| format!("failed to write orders.csv in {}", run_dir.display()))?;

    let equity = export_equity_csv(&report.result.equity_curve)?;
    std::fs::write(run_dir.join("equity.csv"), equity)
        .with_context(|| format!("failed to write equity.csv in {}", run_dir.display()))?;

    Ok(run_dir)
}

/// Load a `RunReport` from an artifact directory's result.json.
pub fn load_artifacts(dir: &Path) -> Result<RunReport> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Text summary ───────────────────────────────────────────────────

/// Short human-readable summary of a run, as printed by the CLI.
pub fn summary(report: &RunReport) -> String {
    let r = &report.result;
    let filled = r.orders.iter().filter(|o| o.fill_date.is_some()).count();
    let rejected = r.orders.iter().filter(|o| o.reject_reason.is_some()).count();

    let mut out = String::with_capacity(512);
    out.push_str(&format!("run        {}\n", report.run_id));
    out.push_str(&format!("strategy   {}\n", report.strategy));
    out.push_str(&format!(
        "period     {} to {} ({} sessions)\n",
        report.config.start_date, report.config.end_date, r.session_count
    ));
    out.push_str(&format!("initial    {}\n", r.initial_cash));
    out.push_str(&format!("final cash {}\n", r.final_cash));
    out.push_str(&format!("total      {}\n", r.total_value));
    out.push_str(&format!(
        "orders     {} ({} filled, {} rejected)\n",
        r.orders.len(),
        filled,
        rejected
    ));
    out.push_str(&format!(
        "costs      commission {} / tax {} / slippage {}\n",
        r.total_commission, r.total_tax, r.total_slippage
    ));
    if !r.positions.is_empty() {
        out.push_str("positions\n");
        for p in &r.positions {
            out.push_str(&format!(
                "  {:<12} {} @ {} = {}\n",
                p.symbol, p.quantity, p.current_price, p.market_value
            ));
        }
    }
    if !r.strategy_failures.is_empty() {
        out.push_str(&format!("strategy failures: {}\n", r.strategy_failures.len()));
    }
    if !report.missing_symbols.is_empty() {
        out.push_str(&format!("no data for: {}\n", report.missing_symbols.join(", ")));
    }
    out
}
