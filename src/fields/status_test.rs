use super::FieldStatus;
use super::ReadoutType;

#[test]
fn bit_values_are_stable() {
    assert_eq!(FieldStatus::MISSING.bits(), 1);
    assert_eq!(FieldStatus::AUTOMATIC_ESTIMATE.bits(), 2);
    assert_eq!(FieldStatus::MANUAL_ESTIMATE.bits(), 4);
    assert_eq!(FieldStatus::MANUAL_READOUT.bits(), 8);
    assert_eq!(FieldStatus::AUTOMATIC_READOUT.bits(), 16);
    assert_eq!(FieldStatus::TIME_OFFSET.bits(), 32);
    assert_eq!(FieldStatus::WARNING.bits(), 64);
    assert_eq!(FieldStatus::ERROR.bits(), 128);
    assert_eq!(FieldStatus::SIGNED.bits(), 256);
    assert_eq!(FieldStatus::INVOICED.bits(), 512);
    assert_eq!(FieldStatus::END_OF_SERIES.bits(), 1024);
    assert_eq!(FieldStatus::POWER_FAILURE.bits(), 2048);
    assert_eq!(FieldStatus::INVOICED_CONFIRMED.bits(), 4096);
}

#[test]
fn comparison_key_masks_out_informational_bits() {
    // Warning, error, time offset and power failure do not affect ordering.
    let a = FieldStatus::AUTOMATIC_READOUT | FieldStatus::WARNING | FieldStatus::POWER_FAILURE;
    let b = FieldStatus::AUTOMATIC_READOUT;
    assert_eq!(a.comparison_key(), b.comparison_key());
    assert!(a.is_less_or_equal(b));
    assert!(a.is_greater_or_equal(b));
}

#[test]
fn estimates_rank_below_readouts() {
    assert!(FieldStatus::AUTOMATIC_ESTIMATE.is_less_than(FieldStatus::MANUAL_ESTIMATE));
    assert!(FieldStatus::MANUAL_ESTIMATE.is_less_than(FieldStatus::MANUAL_READOUT));
    assert!(FieldStatus::MANUAL_READOUT.is_less_than(FieldStatus::AUTOMATIC_READOUT));
}

#[test]
fn end_of_series_outranks_automatic_readout() {
    // The shifted copy of the end-of-series bit places a closed series above
    // any plain readout, signed or invoiced status.
    let eos = FieldStatus::AUTOMATIC_READOUT | FieldStatus::END_OF_SERIES;
    let plain = FieldStatus::AUTOMATIC_READOUT | FieldStatus::SIGNED | FieldStatus::INVOICED;
    assert!(eos.is_greater_than(plain));
    assert!(plain.is_less_than(eos));
}

#[test]
fn ordering_is_a_preorder() {
    let samples = [
        FieldStatus::EMPTY,
        FieldStatus::MISSING,
        FieldStatus::AUTOMATIC_ESTIMATE,
        FieldStatus::AUTOMATIC_READOUT,
        FieldStatus::AUTOMATIC_READOUT | FieldStatus::SIGNED,
        FieldStatus::AUTOMATIC_READOUT | FieldStatus::END_OF_SERIES,
        FieldStatus::INVOICED | FieldStatus::INVOICED_CONFIRMED,
    ];
    for a in samples {
        assert!(a.is_less_or_equal(a));
        assert!(a.is_greater_or_equal(a));
        for b in samples {
            for c in samples {
                if a.is_less_or_equal(b) && b.is_less_or_equal(c) {
                    assert!(a.is_less_or_equal(c));
                }
            }
            // Totality: comparable either way.
            assert!(a.is_less_or_equal(b) || b.is_less_or_equal(a));
        }
    }
}

#[test]
fn readout_type_historical_union() {
    assert!(ReadoutType::HISTORICAL.contains(ReadoutType::HISTORICAL_SECOND));
    assert!(ReadoutType::HISTORICAL.contains(ReadoutType::HISTORICAL_OTHER));
    assert!(!ReadoutType::HISTORICAL.contains(ReadoutType::MOMENTARY));
    assert!(ReadoutType::ALL.contains(ReadoutType::HISTORICAL));
    assert!(ReadoutType::ALL.contains(ReadoutType::MOMENTARY));
}

#[test]
fn flag_composition() {
    let mut t = ReadoutType::MOMENTARY;
    t |= ReadoutType::PEAK;
    assert!(t.contains(ReadoutType::MOMENTARY));
    assert!(t.contains(ReadoutType::PEAK));
    assert!(!t.contains(ReadoutType::STATUS));
    assert_eq!((t & ReadoutType::PEAK).bits(), ReadoutType::PEAK.bits());
}
