use std::fmt::Write as _;

use chrono::NaiveDate;

use canopy_contract::ImportReport;

use crate::calibration::CalibrationTable;
use crate::events::EventTotals;
use crate::finance::{event_gross, PriceSheet, RoiSummary};
use crate::types::{CruiseDesign, StandAggregate};

/// Everything the owner report renders from. The import report is optional
/// so the offline report command can run from a stand summary alone.
pub struct ReportContext<'a> {
    pub owner: &'a str,
    pub tract: &'a str,
    pub generated_on: NaiveDate,
    pub discount_rate: f64,
    pub design: CruiseDesign,
    pub species_col: &'a str,
    pub stands: &'a [StandAggregate],
    pub events: &'a [EventTotals],
    pub sheet: &'a PriceSheet,
    pub roi: &'a RoiSummary,
    pub calibration: &'a CalibrationTable,
    pub import: Option<&'a ImportReport>,
}

/// Renders the owner-facing report as a standalone HTML document: ROI
/// snapshot, stand summary, event schedule, assumptions, and a QA appendix.
pub fn render_owner_report(ctx: &ReportContext<'_>) -> String {
    let mut html = String::with_capacity(8 * 1024);
    let tract = escape(ctx.tract);
    let owner = escape(ctx.owner);

    let _ = write!(
        html,
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>Canopy Owner Report &mdash; {tract}</title>
  <style>
    body {{ font-family: Arial, Helvetica, sans-serif; margin: 24px; color: #222; }}
    h1 {{ margin: 0 0 8px 0; }}
    h2 {{ margin: 18px 0 8px 0; border-bottom: 2px solid #eee; padding-bottom: 4px; }}
    table {{ border-collapse: collapse; width: 100%; margin: 10px 0 18px 0; }}
    th, td {{ border: 1px solid #e8e8e8; padding: 8px; font-size: 13px; }}
    th {{ background: #f7f7f7; text-align: left; }}
    .small {{ font-size: 12px; color: #666; }}
  </style>
</head>
<body>
  <h1>Owner Report &mdash; {tract}</h1>
  <div class="small">Owner: {owner} &bull; Generated: {date}</div>
"#,
        date = ctx.generated_on.format("%Y-%m-%d"),
    );

    let irr_cell = match ctx.roi.irr_pct {
        Some(irr) => format!("{irr:.1}%"),
        None => String::new(),
    };
    let _ = write!(
        html,
        r#"
  <h2>ROI Snapshot</h2>
  <table>
    <tr><th>Discount Rate</th><td>{rate:.1}%</td></tr>
    <tr><th>NPV (net)</th><td>{npv}</td></tr>
    <tr><th>IRR</th><td>{irr_cell}</td></tr>
  </table>
"#,
        rate = ctx.discount_rate * 100.0,
        npv = money(ctx.roi.npv),
    );

    html.push_str(
        "\n  <h2>Stand Summary</h2>\n  <table>\n    \
         <tr><th>Stand</th><th>Acres</th><th>TPA</th><th>BA (ft&sup2;/ac)</th><th>QMD (in)</th></tr>\n",
    );
    for stand in ctx.stands {
        let _ = write!(
            html,
            "    <tr><td>{}</td><td>{}</td><td>{:.1}</td><td>{:.1}</td><td>{}</td></tr>\n",
            escape(&stand.stand_id),
            stand.acres.map(|a| format!("{a}")).unwrap_or_default(),
            stand.tpa_live,
            stand.ba_sqft_ac,
            stand.qmd_in.map(|q| format!("{q:.1}")).unwrap_or_default(),
        );
    }
    html.push_str("  </table>\n");

    html.push_str(
        "\n  <h2>Event Schedule (Totals)</h2>\n  <table>\n    \
         <tr><th>Event</th><th>Year</th><th>Pulp (t)</th><th>CNS (t)</th><th>Saw (t)</th>\
         <th>Export (t)</th><th>Gross ($)</th></tr>\n",
    );
    for event in ctx.events {
        let _ = write!(
            html,
            "    <tr><td>{}</td><td>{}</td><td>{:.0}</td><td>{:.0}</td><td>{:.0}</td><td>{:.0}</td><td>{}</td></tr>\n",
            escape(&event.event),
            event.year,
            event.pulp_t,
            event.cns_t,
            event.saw_t,
            event.export_t,
            money(event_gross(event, ctx.sheet)),
        );
    }
    html.push_str("  </table>\n");

    html.push_str(
        "\n  <h2>Assumptions</h2>\n  <ul>\n    \
         <li>Thin 1 removes ~28% BA, thin 2 ~33% BA; final harvest at target rotation ~30 \
         (auto-scheduled when stand ages are unknown).</li>\n    \
         <li>Product splits estimated from QMD; override by supplying an events file with \
         product tons.</li>\n    \
         <li>Calibration product factors applied per group for auto-generated events, or as \
         global factors for a supplied schedule.</li>\n    \
         <li>Logging, trucking, and consulting costs from the prices file when present; \
         otherwise $0.</li>\n  </ul>\n",
    );

    render_qa_appendix(&mut html, ctx);

    html.push_str("</body></html>\n");
    html
}

fn render_qa_appendix(html: &mut String, ctx: &ReportContext<'_>) {
    html.push_str("\n  <h2>QA Appendix</h2>\n  <table>\n");
    let _ = write!(
        html,
        "    <tr><th>Cruise design</th><td>{}</td></tr>\n",
        escape(&ctx.design.describe())
    );
    let _ = write!(
        html,
        "    <tr><th>Calibration species column</th><td>{}</td></tr>\n",
        escape(ctx.species_col)
    );
    if let Some(import) = ctx.import {
        let _ = write!(
            html,
            "    <tr><th>Rows imported</th><td>{}</td></tr>\n",
            import.rows
        );
        let _ = write!(
            html,
            "    <tr><th>Stands detected</th><td>{}</td></tr>\n",
            import.stands_detected.len()
        );
        let _ = write!(
            html,
            "    <tr><th>Source hash</th><td>{}</td></tr>\n",
            escape(&import.source_hash)
        );
        if !import.warnings.is_empty() {
            let _ = write!(
                html,
                "    <tr><th>Import warnings</th><td>{}</td></tr>\n",
                escape(&import.warnings.join("; "))
            );
        }
    }
    html.push_str("  </table>\n");

    if ctx.calibration.is_empty() {
        html.push_str("  <div class=\"small\">No calibration factors applied.</div>\n");
        return;
    }

    html.push_str(
        "  <table>\n    <tr><th>Calibration group</th><th>Factor</th><th>Value</th></tr>\n",
    );
    for (group, factors) in ctx.calibration.entries() {
        for (name, value) in factors {
            let _ = write!(
                html,
                "    <tr><td>{}</td><td>{}</td><td>{value}</td></tr>\n",
                escape(group),
                escape(name),
            );
        }
    }
    html.push_str("  </table>\n");
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `$1,234,567` style, rounded to whole dollars.
fn money(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = value.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if negative {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
