//! Unit tests for the in-memory parts of obspack_daily
//!
//! Sources are built as in-memory datasets, which implement the same
//! `ObsSource` trait the netCDF reader does, so normalization, sampling and
//! daily selection run here without touching the filesystem.

use chrono::NaiveDate;
use ndarray::Array2;
use netcdf::AttributeValue;
use obspack_daily::{
    assembler::{derive_sampling_strategy, prepare_source, AssembledDataset, STRATEGY_VAR},
    cftime::{day_end, day_start},
    config::Domain,
    dataset::{Dataset, VarData, Variable},
    errors::{ObsPackError, Result},
    normalize::{normalize, QCFLAG_PLACEHOLDER},
    partition::{apply_daily_encoding, select_day, FLOAT_FILL},
    sampling::SENTINEL,
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// 2020-01-01T00:00:00Z
const T0: i64 = 1_577_836_800;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

/// One observation: time, latitude, longitude and the start-to-midpoint span
#[derive(Clone, Copy)]
struct Rec {
    time: i64,
    lat: f64,
    lon: f64,
    half_width: i64,
}

fn rec(time: i64, lat: f64, lon: f64) -> Rec {
    Rec {
        time,
        lat,
        lon,
        half_width: HOUR,
    }
}

fn domain() -> Domain {
    Domain {
        start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        lat_min: 10.0,
        lat_max: 60.0,
        lon_min: -130.0,
        lon_max: -60.0,
    }
}

fn obspack_source(project: &str, records: &[Rec]) -> Dataset {
    let n = records.len();
    let mut ds = Dataset::new();
    ds.attributes.insert(
        "dataset_project".into(),
        AttributeValue::Str(project.to_string()),
    );
    ds.attributes.insert(
        "dataset_name".into(),
        AttributeValue::Str(format!("co2_test_{}", project)),
    );
    ds.attributes
        .insert("site_utc2lst".into(), AttributeValue::Double(-5.0));

    let time: Vec<i64> = records.iter().map(|r| r.time).collect();
    let start: Vec<i64> = records.iter().map(|r| r.time - r.half_width).collect();
    ds.insert(Variable::time("time", time.clone())).unwrap();
    ds.insert(Variable::time("start_time", start)).unwrap();
    ds.insert(Variable::time("midpoint_time", time)).unwrap();
    ds.insert(Variable::new(
        "time_components",
        &["obs", "calendar_components"],
        VarData::Int(Array2::<i64>::zeros((n, 6)).into_dyn()),
    ))
    .unwrap();
    ds.insert(Variable::float("value", (0..n).map(|i| 400.0 + i as f64).collect()))
        .unwrap();
    ds.insert(Variable::float("latitude", records.iter().map(|r| r.lat).collect()))
        .unwrap();
    ds.insert(Variable::float("longitude", records.iter().map(|r| r.lon).collect()))
        .unwrap();
    ds.insert(Variable::float("altitude", vec![100.0; n])).unwrap();
    ds.insert(Variable::int("assimilation_concerns", vec![0; n]))
        .unwrap();
    ds.insert(Variable::text(
        "obspack_id",
        (0..n).map(|i| format!("obspack_co2_{}~{}", project, i)).collect(),
    ))
    .unwrap();
    ds.insert(Variable::int("obs_flag", vec![1; n])).unwrap();
    ds.insert(Variable::text("qcfilter", vec!["..P".to_string(); n]))
        .unwrap();
    ds
}

#[test]
fn test_error_types() {
    let var_err = ObsPackError::VariableNotFound {
        var: "value".to_string(),
    };
    assert!(format!("{}", var_err).contains("Variable 'value' not found"));
    assert!(var_err.is_schema_error());

    let attr_err = ObsPackError::AttributeNotFound {
        attr: "site_utc2lst".to_string(),
    };
    assert!(attr_err.is_schema_error());

    let generic_err = ObsPackError::Generic("Test error".to_string());
    assert_eq!(format!("{}", generic_err), "Test error");
    assert!(!generic_err.is_schema_error());
}

#[test]
fn test_normalize_applies_inclusive_domain() -> Result<()> {
    let records = [
        rec(T0, 10.0, -130.0),             // lower corner, inclusive
        rec(T0 + HOUR, 60.0, -60.0),       // upper corner, inclusive
        rec(T0 + 2 * DAY, 30.0, -100.0),   // end + 1 day, inclusive
        rec(T0 + 2 * DAY + 1, 30.0, -100.0),
        rec(T0 - 1, 30.0, -100.0),
        rec(T0 + HOUR, 9.9, -100.0),
        rec(T0 + HOUR, 30.0, -59.0),
    ];
    let source = obspack_source("surface-insitu", &records);

    let normalized = normalize(&source, &domain())?;
    assert_eq!(normalized.len(), 3);

    let (lower, upper) = domain().time_bounds();
    for t in normalized.require("time")?.to_epoch_seconds()? {
        assert!(t >= lower && t <= upper);
    }
    for lat in normalized.require("latitude")?.to_f64()? {
        assert!((10.0..=60.0).contains(&lat));
    }
    Ok(())
}

#[test]
fn test_normalize_derives_platform_and_placeholders() -> Result<()> {
    let source = obspack_source("aircraft-pfp", &[rec(T0, 40.0, -100.0), rec(T0 + HOUR, 41.0, -101.0)]);
    let normalized = normalize(&source, &domain())?;

    assert_eq!(normalized.require("platform")?.as_text()?, ["aircraft", "aircraft"]);
    assert_eq!(
        normalized.require("qcflag")?.as_text()?,
        [QCFLAG_PLACEHOLDER, QCFLAG_PLACEHOLDER]
    );
    assert_eq!(normalized.require("utc_conv")?.to_f64()?, vec![0.0, 0.0]);
    assert_eq!(normalized.require("qcfilter")?.as_text()?[0], "..P");
    Ok(())
}

#[test]
fn test_utc_conv_only_for_surface_and_tower() -> Result<()> {
    for (project, expected) in [
        ("surface-flask", -5.0),
        ("tower-insitu", -5.0),
        ("aircraft-insitu", 0.0),
        ("shipboard-flask", 0.0),
    ] {
        let source = obspack_source(project, &[rec(T0, 40.0, -100.0)]);
        let normalized = normalize(&source, &domain())?;
        assert_eq!(normalized.require("utc_conv")?.to_f64()?, vec![expected], "{}", project);
    }
    Ok(())
}

#[test]
fn test_fractional_utc_factor_is_kept() -> Result<()> {
    let mut source = obspack_source("tower-insitu", &[rec(T0, 40.0, -100.0)]);
    source
        .attributes
        .insert("site_utc2lst".into(), AttributeValue::Double(5.5));

    let normalized = normalize(&source, &domain())?;
    assert_eq!(normalized.require("utc_conv")?.to_f64()?, vec![5.5]);
    Ok(())
}

/// Collects everything a `fmt` subscriber writes
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Normalizes `source` with a subscriber capturing the log lines
fn normalize_logged(source: &Dataset) -> Result<String> {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || normalize(source, &domain()))?;
    Ok(logs.contents())
}

#[test]
fn test_fractional_utc_factor_is_logged() -> Result<()> {
    let mut source = obspack_source("tower-insitu", &[rec(T0, 40.0, -100.0)]);
    source
        .attributes
        .insert("site_utc2lst".into(), AttributeValue::Double(5.5));

    let logged = normalize_logged(&source)?;
    let line = logged
        .lines()
        .find(|line| line.contains("UTC CONVERSION FACTOR IS NOT AN INTEGER"))
        .expect("fractional factor should be reported");
    assert!(line.contains("WARN"));
    assert!(line.contains("co2_test_tower-insitu"));

    let whole = obspack_source("tower-insitu", &[rec(T0, 40.0, -100.0)]);
    assert!(!normalize_logged(&whole)?.contains("NOT AN INTEGER"));
    Ok(())
}

#[test]
fn test_missing_obs_flag_defaults_to_one() -> Result<()> {
    let mut source = obspack_source("surface-flask", &[rec(T0, 40.0, -100.0), rec(T0 + 1, 40.0, -100.0)]);
    source.remove("obs_flag");

    let normalized = normalize(&source, &domain())?;
    assert_eq!(normalized.require("obs_flag")?.to_f64()?, vec![1.0, 1.0]);
    assert!(normalized.contains("qcfilter"));
    Ok(())
}

#[test]
fn test_missing_optional_fields_tolerated() -> Result<()> {
    let mut source = obspack_source("surface-flask", &[rec(T0, 40.0, -100.0)]);
    source.drop_variables(&["obs_flag", "qcfilter"]);

    let normalized = normalize(&source, &domain())?;
    assert!(!normalized.contains("qcfilter"));
    assert_eq!(normalized.require("obs_flag")?.to_f64()?, vec![1.0]);
    Ok(())
}

#[test]
fn test_missing_required_field_is_schema_error() {
    let mut source = obspack_source("surface-flask", &[rec(T0, 40.0, -100.0)]);
    source.remove("altitude");

    let err = normalize(&source, &domain()).unwrap_err();
    assert!(err.is_schema_error());
    assert!(matches!(err, ObsPackError::VariableNotFound { ref var } if var == "altitude"));
}

#[test]
fn test_missing_utc_factor_only_matters_with_records() -> Result<()> {
    let mut source = obspack_source("surface-flask", &[rec(T0, 40.0, -100.0)]);
    source.attributes.remove("site_utc2lst");
    let err = normalize(&source, &domain()).unwrap_err();
    assert!(matches!(err, ObsPackError::AttributeNotFound { .. }));

    let mut outside = obspack_source("surface-flask", &[rec(T0 + 10 * DAY, 40.0, -100.0)]);
    outside.attributes.remove("site_utc2lst");
    assert!(normalize(&outside, &domain())?.is_empty());
    Ok(())
}

#[test]
fn test_sampling_strategy_ladder() -> Result<()> {
    // windows of 6, 4, 2, 1, 0.2, 0 and -2 hours
    let spans = [3 * HOUR, 2 * HOUR, HOUR, HOUR / 2, HOUR / 10, 0, -HOUR];
    let records: Vec<Rec> = spans
        .iter()
        .map(|&half_width| Rec {
            half_width,
            ..rec(T0, 40.0, -100.0)
        })
        .collect();
    let mut data = normalize(&obspack_source("aircraft-pfp", &records), &domain())?;

    derive_sampling_strategy(&mut data)?;

    let strategy = data.require(STRATEGY_VAR)?;
    assert!(matches!(strategy.data, VarData::Int(_)));
    assert_eq!(
        strategy.to_f64()?,
        vec![SENTINEL as f64, 1.0, 3.0, 2.0, 4.0, 4.0, SENTINEL as f64]
    );
    assert_eq!(strategy.encoding.fill_value, Some(-9.0));
    assert!(strategy.attributes.contains_key("long_name"));
    assert!(strategy.attributes.contains_key("values"));

    for helper in ["obs_length", "start_time", "midpoint_time"] {
        assert!(!data.contains(helper), "{} should be dropped", helper);
    }
    Ok(())
}

#[test]
fn test_assembled_segment_clears_attributes() -> Result<()> {
    let source = obspack_source("surface-flask", &[rec(T0, 40.0, -100.0)]);
    let prepared = prepare_source(&source, &domain())?.expect("one record in domain");
    assert!(prepared.attributes.is_empty());

    let mut assembled = AssembledDataset::new(domain());
    assert!(assembled.push_source(&source)?);
    assert_eq!(assembled.segments()[0].time_range, Some((T0, T0)));

    let outside = obspack_source("surface-flask", &[rec(T0 - DAY, 40.0, -100.0)]);
    assert!(prepare_source(&outside, &domain())?.is_none());
    assert!(!assembled.push_source(&outside)?);
    assert_eq!(assembled.segments().len(), 1);
    Ok(())
}

fn two_day_assembly() -> Result<AssembledDataset> {
    let surface = obspack_source(
        "surface-flask",
        &[
            rec(T0 + HOUR, 40.0, -100.0),
            rec(T0 + DAY - 1, 40.0, -100.0),
            rec(T0 + DAY, 40.0, -100.0),
            // six-hour window, unclassified
            Rec {
                half_width: 3 * HOUR,
                ..rec(T0 + 2 * HOUR, 40.0, -100.0)
            },
        ],
    );
    let mut aircraft = obspack_source("aircraft-pfp", &[rec(T0 + DAY + HOUR, 30.0, -90.0)]);
    aircraft.remove("qcfilter");

    let mut assembled = AssembledDataset::new(domain());
    for source in [&surface, &aircraft] {
        assembled.push_source(source)?;
    }
    Ok(assembled)
}

#[test]
fn test_select_day_partitions_records() -> Result<()> {
    let assembled = two_day_assembly()?;
    assert_eq!(assembled.len(), 5);

    let day1 = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    let first = select_day(&assembled, day1)?;
    let second = select_day(&assembled, day2)?;

    // the unclassified record on day 1 is left out
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);

    let mut ids: Vec<String> = Vec::new();
    for (day, date) in [(&first, day1), (&second, day2)] {
        for t in day.require("time")?.to_epoch_seconds()? {
            assert!(t >= day_start(date) && t < day_end(date));
        }
        ids.extend(day.require("obspack_id")?.as_text()?.iter().cloned());
    }
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total, "a record appeared in two days");
    Ok(())
}

#[test]
fn test_select_day_is_idempotent() -> Result<()> {
    let assembled = two_day_assembly()?;
    let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    let day = select_day(&assembled, date)?;

    let mut again = AssembledDataset::new(domain());
    again.push_dataset("day".to_string(), day.clone())?;
    let reselected = select_day(&again, date)?;
    assert_eq!(
        reselected.require("obspack_id")?.as_text()?,
        day.require("obspack_id")?.as_text()?
    );
    Ok(())
}

#[test]
fn test_concat_fills_missing_qcfilter() -> Result<()> {
    let assembled = two_day_assembly()?;
    let all = assembled.to_dataset()?;
    let qcfilter = all.require("qcfilter")?.as_text()?;
    assert_eq!(qcfilter.len(), 5);
    assert_eq!(qcfilter[4], "");
    assert_eq!(all.require("platform")?.as_text()?[4], "aircraft");
    Ok(())
}

#[test]
fn test_days_share_one_layout() -> Result<()> {
    let surface = obspack_source("surface-flask", &[rec(T0 + HOUR, 40.0, -100.0)]);
    let mut aircraft = obspack_source("aircraft-pfp", &[rec(T0 + DAY + HOUR, 30.0, -90.0)]);
    aircraft.remove("qcfilter");
    aircraft.insert(Variable::float("obs_flag", vec![0.5]))?;

    let mut assembled = AssembledDataset::new(domain());
    assembled.push_source(&surface)?;
    assembled.push_source(&aircraft)?;

    let first = select_day(&assembled, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())?;
    let second = select_day(&assembled, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap())?;
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);

    // day 2 comes only from the source lacking qcfilter
    assert_eq!(first.variable_names(), second.variable_names());
    assert_eq!(first.variable_names(), assembled.variable_names());
    for var in first.variables() {
        let other = second.require(&var.name)?;
        assert_eq!(var.data.kind(), other.data.kind(), "{} changed kind", var.name);
        assert_eq!(var.dims, other.dims);
    }
    assert_eq!(second.require("qcfilter")?.as_text()?, [""]);
    assert!(matches!(first.require("obs_flag")?.data, VarData::Float(_)));
    assert_eq!(first.require("obs_flag")?.to_f64()?, vec![1.0]);
    Ok(())
}

#[test]
fn test_empty_day_selects_nothing() -> Result<()> {
    let assembled = two_day_assembly()?;
    let later = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
    assert!(select_day(&assembled, later)?.is_empty());
    Ok(())
}

#[test]
fn test_daily_encoding() -> Result<()> {
    let assembled = two_day_assembly()?;
    let mut day = select_day(&assembled, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())?;
    apply_daily_encoding(&mut day);

    let width = |name: &str| day.variable(name).and_then(|v| v.encoding.char_width);
    assert_eq!(width("obspack_id"), Some(200));
    assert_eq!(width("platform"), Some(50));
    assert_eq!(width("qcflag"), Some(10));
    assert_eq!(width("qcfilter"), None);

    let fill = |name: &str| day.variable(name).and_then(|v| v.encoding.fill_value);
    assert_eq!(fill("time_components"), Some(-9.0));
    assert_eq!(fill("value"), Some(FLOAT_FILL));
    assert_eq!(fill("altitude"), Some(FLOAT_FILL));
    assert_eq!(fill(STRATEGY_VAR), Some(-9.0));
    Ok(())
}
