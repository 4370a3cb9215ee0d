use canopy_pipeline::events::{auto_event_years, estimate_tons, product_split_from_qmd};
use canopy_pipeline::{
    build_auto_events, load_events_csv, write_events_csv, CalibrationTable, EventKind, Product,
    StandAggregate,
};

fn stand(id: &str, acres: f64, ba: f64, qmd: f64, group: &str) -> StandAggregate {
    StandAggregate {
        stand_id: id.to_string(),
        acres: Some(acres),
        trees_observed: 10,
        tpa_live: 100.0,
        ba_sqft_ac: ba,
        qmd_in: Some(qmd),
        calibration_group: group.to_string(),
    }
}

#[test]
fn unknown_age_schedules_the_fixed_ladder() {
    assert_eq!(auto_event_years(None, 2026), (2028, 2034, 2041));
}

#[test]
fn known_age_schedules_against_target_ages_and_stays_increasing() {
    // A 10-year-old stand: thin at 15 -> +5, thin at 21 -> +11, final at 30 -> +20.
    assert_eq!(auto_event_years(Some(10.0), 2026), (2031, 2037, 2046));
    // An over-mature stand clamps to an immediate, strictly increasing run.
    assert_eq!(auto_event_years(Some(35.0), 2026), (2026, 2027, 2028));
}

#[test]
fn product_split_boundaries() {
    assert_eq!(product_split_from_qmd(Some(5.0)).pulp, 0.9);
    assert_eq!(product_split_from_qmd(Some(6.0)).cns, 0.4);
    assert_eq!(product_split_from_qmd(Some(9.0)).saw, 0.3);
    assert_eq!(product_split_from_qmd(Some(12.0)).export, 0.1);
    // Unknown QMD behaves like a 7 in stand.
    assert_eq!(product_split_from_qmd(None).pulp, 0.5);
}

#[test]
fn thin_and_final_tonnage() {
    // First thin: ba * 0.28 * 0.12 * acres.
    let tons = estimate_tons(EventKind::FirstThin, 100.0, Some(25.0));
    assert!((tons - 100.0 * 0.28 * 0.12 * 25.0).abs() < 1e-9);

    // Final: clamp(ba * 1.2, 60, 150) per acre.
    let low = estimate_tons(EventKind::Final, 10.0, Some(10.0));
    assert!((low - 60.0 * 10.0).abs() < 1e-9);
    let high = estimate_tons(EventKind::Final, 200.0, Some(10.0));
    assert!((high - 150.0 * 10.0).abs() < 1e-9);

    // No usable acreage yields nothing.
    assert_eq!(estimate_tons(EventKind::Final, 100.0, None), 0.0);
    assert_eq!(estimate_tons(EventKind::Final, 100.0, Some(0.0)), 0.0);
}

#[test]
fn auto_events_sum_stands_by_event_year() {
    let stands = vec![
        stand("S1", 25.0, 100.0, 9.0, "ALL"),
        stand("S2", 40.0, 80.0, 9.0, "ALL"),
    ];
    let events = build_auto_events(&stands, &CalibrationTable::default(), 2026);

    // Same unknown-age ladder for both stands: three merged events.
    assert_eq!(events.len(), 3);
    let first_thin = events.iter().find(|e| e.event == "first_thin").unwrap();
    assert_eq!(first_thin.year, 2028);

    let expected_total =
        estimate_tons(EventKind::FirstThin, 100.0, Some(25.0))
            + estimate_tons(EventKind::FirstThin, 80.0, Some(40.0));
    let split = product_split_from_qmd(Some(9.0));
    assert!((first_thin.pulp_t - expected_total * split.pulp).abs() < 1e-9);
    assert!((first_thin.export_t - 0.0).abs() < 1e-9);
}

#[test]
fn auto_events_apply_group_product_factors() {
    let stands = vec![stand("S1", 25.0, 100.0, 9.0, "LP")];
    let calibration =
        CalibrationTable::from_json(br#"{"LP": {"pulp_factor": 2.0}}"#).unwrap();
    let baseline = build_auto_events(&stands, &CalibrationTable::default(), 2026);
    let scaled = build_auto_events(&stands, &calibration, 2026);

    for (base, scale) in baseline.iter().zip(&scaled) {
        assert!((scale.pulp_t - base.pulp_t * 2.0).abs() < 1e-9);
        assert!((scale.saw_t - base.saw_t).abs() < 1e-9);
    }
}

#[test]
fn supplied_events_apply_only_global_factors_and_round_trip() {
    let csv = "event,year,pulp_t,cns_t,saw_t,export_t\nfirst_thin,2030,100,50,25,0\n";
    let calibration = CalibrationTable::from_json(
        br#"{"ALL": {"pulp_factor": 1.5}, "LP": {"pulp_factor": 3.0}}"#,
    )
    .unwrap();
    let events = load_events_csv(csv.as_bytes(), &calibration).unwrap();

    assert_eq!(events.len(), 1);
    assert!((events[0].pulp_t - 150.0).abs() < 1e-9);
    assert!((events[0].cns_t - 50.0).abs() < 1e-9);
    assert_eq!(events[0].tons(Product::Saw), 25.0);

    let bytes = write_events_csv(&events).unwrap();
    let reread = load_events_csv(&bytes, &CalibrationTable::default()).unwrap();
    assert_eq!(reread, events);
}

#[test]
fn empty_events_file_is_a_report_stage_failure() {
    let err = load_events_csv(
        b"event,year,pulp_t,cns_t,saw_t,export_t\n",
        &CalibrationTable::default(),
    )
    .unwrap_err();
    assert_eq!(err.stage_name(), "report");
}
