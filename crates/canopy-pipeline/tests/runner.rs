use chrono::NaiveDate;

use canopy_contract::ImportContract;
use canopy_pipeline::{
    CruiseDesign, CruiseType, PipelineError, PipelineInput, PipelineRunner, RunParams,
};

const TREESUM: &str = "\
TractName,StandID,StandAcres,CruiseDate,CruiseType,Size_BAF,PlotNum,PlotID,Species,DBH,MerchHt,TopDIB,TreeClass\n\
T1,S1,25,2024-03-15,Plot,0.1,1,S1-P1,SPP1,9.5,48,6,Saw\n\
T1,S1,25,2024-03-15,Plot,0.1,1,S1-P1,SPP2,11.2,52,6,Saw\n\
T1,S2,40,2024-03-16,Plot,0.1,1,S2-P1,SPP1,7.8,40,4,Pulp\n";

fn params() -> RunParams {
    RunParams {
        design: CruiseDesign::new(CruiseType::Plot, 1.0).unwrap(),
        owner: "Acme".to_string(),
        tract: "T1".to_string(),
        discount_pct: 5.0,
        species_col: "CalSpecies".to_string(),
        reference_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
    }
}

fn input(prices: &str) -> PipelineInput {
    PipelineInput {
        treesum: TREESUM.as_bytes().to_vec(),
        prices: prices.as_bytes().to_vec(),
        events: None,
        calibration: None,
        params: params(),
    }
}

#[test]
fn full_run_produces_every_artifact() {
    let runner = PipelineRunner::new(ImportContract::builtin());
    let output = runner
        .run(&input(r#"{"SPP1": 10, "SPP2": 20}"#))
        .expect("run failed");

    let names: Vec<&str> = output.artifacts.iter().map(|a| a.name).collect();
    assert_eq!(
        names,
        vec![
            "out_treesum_normalized.csv",
            "out_canopy_treelevel.csv",
            "out_import_report.json",
            "out_stand_summary.csv",
            "out_event_schedule.csv",
            "out_owner_report.html",
        ]
    );

    assert_eq!(output.import_report.rows, 3);
    assert_eq!(output.stands.len(), 2);

    let report = output
        .artifacts
        .iter()
        .find(|a| a.name == output.report_name())
        .unwrap();
    let html = String::from_utf8(report.bytes.clone()).unwrap();
    assert!(html.contains("Owner Report"));
    assert!(html.contains("Acme"));
    assert!(html.contains("QA Appendix"));
    // Product-keyed prices carry no per-species stumpage, so value is zero.
    assert!(html.contains("$0"));
}

#[test]
fn identical_inputs_produce_identical_artifacts() {
    let runner = PipelineRunner::new(ImportContract::builtin());
    let prices = r#"{"pulp": 8, "saw": 30, "cns": 18, "export": 40}"#;
    let a = runner.run(&input(prices)).expect("first run failed");
    let b = runner.run(&input(prices)).expect("second run failed");

    for (left, right) in a.artifacts.iter().zip(&b.artifacts) {
        assert_eq!(left.name, right.name);
        assert_eq!(left.bytes, right.bytes, "artifact {} differs", left.name);
    }
    assert!((a.roi.npv - b.roi.npv).abs() < 1e-12);
}

#[test]
fn contract_violation_aborts_before_any_later_stage() {
    let runner = PipelineRunner::new(ImportContract::builtin());
    let mut bad = input(r#"{"pulp": 8}"#);
    bad.treesum = b"TractName,StandID\nT1,S1\n".to_vec();

    let err = runner.run(&bad).unwrap_err();
    let PipelineError::ContractViolation(report) = err else {
        panic!("expected ContractViolation, got {err}");
    };
    assert!(report
        .errors
        .iter()
        .any(|v| v.column.as_deref() == Some("Species")));
}

#[test]
fn invalid_prices_json_fails_the_report_stage() {
    let runner = PipelineRunner::new(ImportContract::builtin());
    let err = runner.run(&input("not json")).unwrap_err();
    assert_eq!(err.stage_name(), "report");
}

#[test]
fn supplied_events_override_the_auto_schedule() {
    let runner = PipelineRunner::new(ImportContract::builtin());
    let mut with_events = input(r#"{"pulp": 10}"#);
    with_events.events =
        Some(b"event,year,pulp_t,cns_t,saw_t,export_t\ncustom,2030,100,0,0,0\n".to_vec());

    let output = runner.run(&with_events).expect("run failed");
    let schedule = output
        .artifacts
        .iter()
        .find(|a| a.name == "out_event_schedule.csv")
        .unwrap();
    let text = String::from_utf8(schedule.bytes.clone()).unwrap();
    assert!(text.contains("custom,2030"));
    assert!(!text.contains("first_thin"));

    // 100 t of pulp at $10 in 2030, 5% discount from 2026.
    let expected = 1000.0 / 1.05_f64.powi(4);
    assert!((output.roi.npv - expected).abs() < 1e-9);
}

#[test]
fn calibration_scales_the_stand_summary() {
    let runner = PipelineRunner::new(ImportContract::builtin());
    let mut calibrated = input(r#"{"pulp": 10}"#);
    calibrated.calibration = Some(br#"{"ALL": {"ba_factor": 2.0}}"#.to_vec());

    let base = runner.run(&input(r#"{"pulp": 10}"#)).unwrap();
    let scaled = runner.run(&calibrated).unwrap();
    for (b, s) in base.stands.iter().zip(&scaled.stands) {
        assert!((s.ba_sqft_ac - b.ba_sqft_ac * 2.0).abs() < 1e-9);
    }
}
