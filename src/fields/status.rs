use std::fmt;
use std::ops::BitAnd;
use std::ops::BitOr;
use std::ops::BitOrAssign;

/// Status of a field value: provenance and quality bit flags.
///
/// The flags can be combined. Ordering between statuses is defined through a
/// derived comparison key, see [`FieldStatus::comparison_key`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldStatus(u32);

impl FieldStatus {
    /// No status bits set.
    pub const EMPTY: FieldStatus = FieldStatus(0);

    /// The corresponding value is missing.
    pub const MISSING: FieldStatus = FieldStatus(1);
    /// The value is an automatic estimate.
    pub const AUTOMATIC_ESTIMATE: FieldStatus = FieldStatus(2);
    /// The value is a manual estimate.
    pub const MANUAL_ESTIMATE: FieldStatus = FieldStatus(4);
    /// The value is a manually read value.
    pub const MANUAL_READOUT: FieldStatus = FieldStatus(8);
    /// The value is an automatically read value.
    pub const AUTOMATIC_READOUT: FieldStatus = FieldStatus(16);
    /// Time in meter differs from time on server.
    pub const TIME_OFFSET: FieldStatus = FieldStatus(32);
    /// Value flagged with a warning.
    pub const WARNING: FieldStatus = FieldStatus(64);
    /// Value flagged with an error.
    pub const ERROR: FieldStatus = FieldStatus(128);
    /// Value has been signed and approved.
    pub const SIGNED: FieldStatus = FieldStatus(256);
    /// Value has been invoiced.
    pub const INVOICED: FieldStatus = FieldStatus(512);
    /// Value is the last of a series of values. The next value comprises the
    /// start of a new series.
    pub const END_OF_SERIES: FieldStatus = FieldStatus(1024);
    /// Power failure has occurred in the corresponding period.
    pub const POWER_FAILURE: FieldStatus = FieldStatus(2048);
    /// Value has been invoiced and confirmed by receiver of invoice.
    pub const INVOICED_CONFIRMED: FieldStatus = FieldStatus(4096);

    /// Mask selecting the status bits that take part in status comparison.
    ///
    /// Includes `END_OF_SERIES << 3` so that end-of-series values outrank
    /// plain automatic readouts; the bit layout is load-bearing and must not
    /// be re-derived.
    pub const COMPARISON_MASK: u32 = Self::MISSING.0
        | Self::AUTOMATIC_ESTIMATE.0
        | Self::MANUAL_ESTIMATE.0
        | Self::MANUAL_READOUT.0
        | Self::AUTOMATIC_READOUT.0
        | Self::INVOICED.0
        | Self::INVOICED_CONFIRMED.0
        | Self::END_OF_SERIES.0
        | (Self::END_OF_SERIES.0 << 3)
        | Self::SIGNED.0;

    pub const fn from_bits(bits: u32) -> Self {
        FieldStatus(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: FieldStatus) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Derived key used for all status ordering operations:
    /// `(bits | ((bits & END_OF_SERIES) << 3)) & COMPARISON_MASK`.
    pub const fn comparison_key(self) -> u32 {
        (self.0 | ((self.0 & Self::END_OF_SERIES.0) << 3)) & Self::COMPARISON_MASK
    }

    /// True if `self` sorts strictly below `other` under the comparison key.
    pub const fn is_less_than(self, other: FieldStatus) -> bool {
        self.comparison_key() < other.comparison_key()
    }

    /// True if `self` sorts strictly above `other` under the comparison key.
    pub const fn is_greater_than(self, other: FieldStatus) -> bool {
        self.comparison_key() > other.comparison_key()
    }

    pub const fn is_less_or_equal(self, other: FieldStatus) -> bool {
        self.comparison_key() <= other.comparison_key()
    }

    pub const fn is_greater_or_equal(self, other: FieldStatus) -> bool {
        self.comparison_key() >= other.comparison_key()
    }

    /// Wire attribute names, in export order.
    pub(crate) const ATTRIBUTES: [(FieldStatus, &'static str); 13] = [
        (Self::MISSING, "missing"),
        (Self::AUTOMATIC_ESTIMATE, "automaticEstimate"),
        (Self::MANUAL_ESTIMATE, "manualEstimate"),
        (Self::MANUAL_READOUT, "manualReadout"),
        (Self::AUTOMATIC_READOUT, "automaticReadout"),
        (Self::TIME_OFFSET, "timeOffset"),
        (Self::WARNING, "warning"),
        (Self::ERROR, "error"),
        (Self::SIGNED, "signed"),
        (Self::INVOICED, "invoiced"),
        (Self::END_OF_SERIES, "endOfSeries"),
        (Self::POWER_FAILURE, "powerFailure"),
        (Self::INVOICED_CONFIRMED, "invoiceConfirmed"),
    ];
}

impl BitOr for FieldStatus {
    type Output = FieldStatus;

    fn bitor(self, rhs: FieldStatus) -> FieldStatus {
        FieldStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldStatus {
    fn bitor_assign(&mut self, rhs: FieldStatus) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FieldStatus {
    type Output = FieldStatus;

    fn bitand(self, rhs: FieldStatus) -> FieldStatus {
        FieldStatus(self.0 & rhs.0)
    }
}

impl fmt::Debug for FieldStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut first = true;
        write!(f, "FieldStatus(")?;
        for (flag, name) in Self::ATTRIBUTES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "empty")?;
        }
        write!(f, ")")
    }
}
