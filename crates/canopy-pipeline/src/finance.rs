use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Stage};
use crate::events::EventTotals;
use crate::types::Product;

/// Per-product stumpage prices and harvest costs, deserialized from the
/// prices JSON. Missing keys default to zero; unknown keys are ignored so a
/// richer pricing file keeps working.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceSheet {
    #[serde(default)]
    pub pulp: f64,
    #[serde(default)]
    pub cns: f64,
    #[serde(default)]
    pub saw: f64,
    #[serde(default)]
    pub export: f64,
    #[serde(default)]
    pub logging_cost_per_ton_pulp: f64,
    #[serde(default)]
    pub logging_cost_per_ton_cns: f64,
    #[serde(default)]
    pub logging_cost_per_ton_saw: f64,
    #[serde(default)]
    pub logging_cost_per_ton_export: f64,
    #[serde(default)]
    pub trucking_rate_per_ton: f64,
    #[serde(default)]
    pub consulting_fee_pct: f64,
}

impl PriceSheet {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn price(&self, product: Product) -> f64 {
        match product {
            Product::Pulp => self.pulp,
            Product::Cns => self.cns,
            Product::Saw => self.saw,
            Product::Export => self.export,
        }
    }

    pub fn logging_cost(&self, product: Product) -> f64 {
        match product {
            Product::Pulp => self.logging_cost_per_ton_pulp,
            Product::Cns => self.logging_cost_per_ton_cns,
            Product::Saw => self.logging_cost_per_ton_saw,
            Product::Export => self.logging_cost_per_ton_export,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cashflow {
    pub year: i32,
    pub gross: f64,
    pub net: f64,
    pub years_from_now: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoiSummary {
    pub cashflows: Vec<Cashflow>,
    pub npv: f64,
    pub irr_pct: Option<f64>,
}

pub fn event_gross(event: &EventTotals, sheet: &PriceSheet) -> f64 {
    Product::ALL
        .iter()
        .map(|product| event.tons(*product) * sheet.price(*product))
        .sum()
}

/// Discounted cashflow summary over the event schedule.
///
/// `discount_rate` is a fraction (0.05, not 5). Events in the past are
/// discounted as year zero rather than inflated.
pub fn compute_cashflows(
    events: &[EventTotals],
    sheet: &PriceSheet,
    discount_rate: f64,
    reference_year: i32,
) -> Result<RoiSummary, PipelineError> {
    if discount_rate <= -1.0 {
        return Err(PipelineError::stage(
            Stage::Report,
            "discount rate must be greater than -100%",
        ));
    }

    let mut cashflows = Vec::with_capacity(events.len());
    for event in events {
        let gross = event_gross(event, sheet);
        let logging: f64 = Product::ALL
            .iter()
            .map(|p| event.tons(*p) * sheet.logging_cost(*p))
            .sum();
        let trucking: f64 = Product::ALL
            .iter()
            .map(|p| event.tons(*p) * sheet.trucking_rate_per_ton)
            .sum();
        let consulting = sheet.consulting_fee_pct / 100.0 * gross;
        let net = gross - logging - trucking - consulting;
        let years_from_now = (event.year - reference_year).max(0) as u32;
        cashflows.push(Cashflow {
            year: event.year,
            gross,
            net,
            years_from_now,
        });
    }

    let npv = cashflows
        .iter()
        .map(|cf| cf.net / (1.0 + discount_rate).powi(cf.years_from_now as i32))
        .sum();

    let horizon = cashflows
        .iter()
        .map(|cf| cf.years_from_now as usize)
        .max()
        .unwrap_or(0);
    let mut series = vec![0.0; horizon + 1];
    for cf in &cashflows {
        series[cf.years_from_now as usize] += cf.net;
    }

    Ok(RoiSummary {
        cashflows,
        npv,
        irr_pct: irr(&series).map(|rate| rate * 100.0),
    })
}

/// Internal rate of return of a yearly cashflow series, by sign-change
/// bracketing and bisection. `None` when the series has no sign change (the
/// NPV polynomial then has no root to find).
fn irr(series: &[f64]) -> Option<f64> {
    let has_positive = series.iter().any(|v| *v > 0.0);
    let has_negative = series.iter().any(|v| *v < 0.0);
    if !has_positive || !has_negative {
        return None;
    }

    let npv_at = |rate: f64| -> f64 {
        series
            .iter()
            .enumerate()
            .map(|(t, value)| value / (1.0 + rate).powi(t as i32))
            .sum()
    };

    let mut lo = -0.9999;
    let mut hi = 10.0;
    let f_lo = npv_at(lo);
    let f_hi = npv_at(hi);
    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return None;
    }

    for _ in 0..200 {
        let mid = (lo + hi) / 2.0;
        let f_mid = npv_at(mid);
        if f_mid == 0.0 || (hi - lo) / 2.0 < 1e-9 {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some((lo + hi) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(year: i32, pulp_t: f64) -> EventTotals {
        EventTotals {
            event: "first_thin".to_string(),
            year,
            pulp_t,
            cns_t: 0.0,
            saw_t: 0.0,
            export_t: 0.0,
        }
    }

    #[test]
    fn npv_at_zero_discount_is_the_net_sum() {
        let sheet = PriceSheet {
            pulp: 10.0,
            ..PriceSheet::default()
        };
        let events = vec![event(2030, 100.0), event(2035, 50.0)];
        let roi = compute_cashflows(&events, &sheet, 0.0, 2026).unwrap();
        assert!((roi.npv - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn discounting_shrinks_future_events() {
        let sheet = PriceSheet {
            pulp: 10.0,
            ..PriceSheet::default()
        };
        let events = vec![event(2031, 100.0)];
        let roi = compute_cashflows(&events, &sheet, 0.05, 2026).unwrap();
        let expected = 1000.0 / 1.05_f64.powi(5);
        assert!((roi.npv - expected).abs() < 1e-9);
    }

    #[test]
    fn costs_reduce_net_but_not_gross() {
        let sheet = PriceSheet {
            pulp: 10.0,
            logging_cost_per_ton_pulp: 2.0,
            trucking_rate_per_ton: 1.0,
            consulting_fee_pct: 10.0,
            ..PriceSheet::default()
        };
        let events = vec![event(2026, 100.0)];
        let roi = compute_cashflows(&events, &sheet, 0.05, 2026).unwrap();
        let cf = &roi.cashflows[0];
        assert!((cf.gross - 1000.0).abs() < 1e-9);
        // 1000 - 200 logging - 100 trucking - 100 consulting
        assert!((cf.net - 600.0).abs() < 1e-9);
    }

    #[test]
    fn irr_is_none_without_a_sign_change() {
        assert_eq!(irr(&[0.0, 100.0, 50.0]), None);
        assert_eq!(irr(&[0.0, 0.0]), None);
    }

    #[test]
    fn irr_recovers_a_known_rate() {
        // -1000 now, +1100 in a year: IRR 10%.
        let rate = irr(&[-1000.0, 1100.0]).expect("sign change present");
        assert!((rate - 0.10).abs() < 1e-6);
    }

    #[test]
    fn pathological_discount_rate_is_a_report_stage_failure() {
        let sheet = PriceSheet::default();
        let err = compute_cashflows(&[event(2030, 1.0)], &sheet, -1.0, 2026).unwrap_err();
        assert_eq!(err.stage_name(), "report");
    }

    #[test]
    fn price_sheet_ignores_unknown_keys_and_defaults_missing_ones() {
        let sheet = PriceSheet::from_json(br#"{"SPP1": 10, "SPP2": 20, "saw": 35.5}"#).unwrap();
        assert_eq!(sheet.saw, 35.5);
        assert_eq!(sheet.pulp, 0.0);
        assert_eq!(sheet.consulting_fee_pct, 0.0);
    }
}
