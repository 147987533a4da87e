use chrono::Duration;
use chrono::TimeZone;
use chrono::Utc;

use super::field::format_interval;
use super::field::format_timepoint;
use super::field::parse_clock_interval;
use super::field::parse_interval;
use super::field::parse_timepoint;
use super::Field;
use super::FieldStatus;
use super::FieldValue;
use super::LocalizationStep;
use super::ReadoutType;

fn sample_timepoint() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 3, 22, 17, 30, 15).unwrap()
}

#[test]
fn numeric_keeps_declared_decimals() {
    let v = FieldValue::Numeric {
        value: 12.5,
        nr_decimals: 2,
        unit: "C".to_string(),
    };
    assert_eq!(v.to_wire_string(), "12.50");

    let v = FieldValue::Numeric {
        value: 12.0,
        nr_decimals: 0,
        unit: "C".to_string(),
    };
    assert_eq!(v.to_wire_string(), "12");
}

#[test]
fn wire_strings_per_subtype() {
    assert_eq!(FieldValue::Integer(-42).to_wire_string(), "-42");
    assert_eq!(FieldValue::Boolean(true).to_wire_string(), "true");
    assert_eq!(FieldValue::Text("on".into()).to_wire_string(), "on");
    assert_eq!(
        FieldValue::Timestamp(sample_timepoint()).to_wire_string(),
        "2014-03-22T17:30:15Z"
    );
    assert_eq!(
        FieldValue::Interval(Duration::seconds(5415)).to_wire_string(),
        "PT1H30M15S"
    );
    assert_eq!(
        FieldValue::Enumeration {
            value: "High".into(),
            data_type: "AlarmLevel".into(),
        }
        .to_wire_string(),
        "High"
    );
}

#[test]
fn equality_ignores_localization() {
    let a = Field::new(
        "Node1",
        "Temperature",
        sample_timepoint(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        FieldValue::Numeric {
            value: 12.5,
            nr_decimals: 1,
            unit: "C".to_string(),
        },
    );
    let b = a
        .clone()
        .with_localization(Some("Core".to_string()), vec![LocalizationStep::new(7)]);
    assert_eq!(a, b);
}

#[test]
fn equality_covers_value_and_identity() {
    let a = Field::new(
        "Node1",
        "Temperature",
        sample_timepoint(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        FieldValue::Integer(1),
    );
    let mut b = a.clone();
    assert_eq!(a, b);

    b.set_node_id("Node2");
    assert_ne!(a, b);

    let mut c = a.clone();
    c.set_status(FieldStatus::MANUAL_READOUT);
    assert_ne!(a, c);

    let d = Field::new(
        "Node1",
        "Temperature",
        sample_timepoint(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        FieldValue::Integer(2),
    );
    assert_ne!(a, d);
}

#[test]
fn renaming_clears_string_ids() {
    let mut f = Field::new(
        "Node1",
        "Temperature",
        sample_timepoint(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        FieldValue::Integer(1),
    )
    .with_localization(None, vec![LocalizationStep::new(7)]);
    assert_eq!(f.string_ids().len(), 1);

    f.set_field_name("Temperature, Max");
    assert!(f.string_ids().is_empty());
}

#[test]
fn timepoint_round_trip() {
    let t = sample_timepoint();
    let s = format_timepoint(t);
    assert_eq!(parse_timepoint(&s), Some(t));

    // Offset and date-only forms are accepted on input.
    assert_eq!(
        parse_timepoint("2014-03-22T18:30:15+01:00"),
        Some(sample_timepoint())
    );
    assert_eq!(
        parse_timepoint("2014-03-22"),
        Some(Utc.with_ymd_and_hms(2014, 3, 22, 0, 0, 0).unwrap())
    );
    assert_eq!(parse_timepoint("not a time"), None);
}

#[test]
fn interval_round_trip() {
    for d in [
        Duration::zero(),
        Duration::seconds(15),
        Duration::seconds(5415),
        Duration::seconds(2 * 86_400 + 3 * 3_600),
        Duration::milliseconds(1_500),
        -Duration::seconds(90),
    ] {
        let s = format_interval(d);
        assert_eq!(parse_interval(&s), Some(d), "round trip of {}", s);
    }

    assert_eq!(format_interval(Duration::zero()), "PT0S");
    assert_eq!(parse_interval("P1W"), Some(Duration::days(7)));
    assert_eq!(parse_interval("junk"), None);
}

#[test]
fn clock_intervals() {
    assert_eq!(
        parse_clock_interval("02:03:04"),
        Some(Duration::seconds(2 * 3_600 + 3 * 60 + 4))
    );
    assert_eq!(
        parse_clock_interval("1.02:03:04"),
        Some(Duration::seconds(86_400 + 2 * 3_600 + 3 * 60 + 4))
    );
    assert_eq!(
        parse_clock_interval("00:00:01.500"),
        Some(Duration::milliseconds(1_500))
    );
    assert_eq!(parse_clock_interval("-00:01:00"), Some(-Duration::minutes(1)));
    assert_eq!(parse_clock_interval("oops"), None);
}
