use std::fmt;
use std::ops::BitAnd;
use std::ops::BitOr;
use std::ops::BitOrAssign;

/// Category of a readout: what kind of value a field represents, and which
/// kinds of values a request asks for. Flags can be combined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadoutType(u32);

impl ReadoutType {
    pub const EMPTY: ReadoutType = ReadoutType(0);

    /// Momentary values, as of the time of readout.
    pub const MOMENTARY: ReadoutType = ReadoutType(1);
    /// Peak values, such as maximum or minimum readings.
    pub const PEAK: ReadoutType = ReadoutType(2);
    /// Status values describing device state.
    pub const STATUS: ReadoutType = ReadoutType(4);
    /// Values computed from other values.
    pub const COMPUTED: ReadoutType = ReadoutType(8);
    /// Identity values, such as serial numbers.
    pub const IDENTITY: ReadoutType = ReadoutType(16);

    pub const HISTORICAL_SECOND: ReadoutType = ReadoutType(1024);
    pub const HISTORICAL_MINUTE: ReadoutType = ReadoutType(2048);
    pub const HISTORICAL_HOUR: ReadoutType = ReadoutType(4096);
    pub const HISTORICAL_DAY: ReadoutType = ReadoutType(8192);
    pub const HISTORICAL_WEEK: ReadoutType = ReadoutType(16384);
    pub const HISTORICAL_MONTH: ReadoutType = ReadoutType(32768);
    pub const HISTORICAL_QUARTER: ReadoutType = ReadoutType(65536);
    pub const HISTORICAL_YEAR: ReadoutType = ReadoutType(131072);
    /// Historical values with a period not covered by the base periods.
    pub const HISTORICAL_OTHER: ReadoutType = ReadoutType(262144);

    /// All historical categories.
    pub const HISTORICAL: ReadoutType = ReadoutType(
        Self::HISTORICAL_SECOND.0
            | Self::HISTORICAL_MINUTE.0
            | Self::HISTORICAL_HOUR.0
            | Self::HISTORICAL_DAY.0
            | Self::HISTORICAL_WEEK.0
            | Self::HISTORICAL_MONTH.0
            | Self::HISTORICAL_QUARTER.0
            | Self::HISTORICAL_YEAR.0
            | Self::HISTORICAL_OTHER.0,
    );

    /// All categories. A request that names no category on the wire implies
    /// this.
    pub const ALL: ReadoutType = ReadoutType(u32::MAX);

    pub const fn from_bits(bits: u32) -> Self {
        ReadoutType(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ReadoutType) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Wire attribute names, in export order.
    pub(crate) const ATTRIBUTES: [(ReadoutType, &'static str); 14] = [
        (Self::MOMENTARY, "momentary"),
        (Self::PEAK, "peak"),
        (Self::STATUS, "status"),
        (Self::COMPUTED, "computed"),
        (Self::IDENTITY, "identity"),
        (Self::HISTORICAL_SECOND, "historicalSecond"),
        (Self::HISTORICAL_MINUTE, "historicalMinute"),
        (Self::HISTORICAL_HOUR, "historicalHour"),
        (Self::HISTORICAL_DAY, "historicalDay"),
        (Self::HISTORICAL_WEEK, "historicalWeek"),
        (Self::HISTORICAL_MONTH, "historicalMonth"),
        (Self::HISTORICAL_QUARTER, "historicalQuarter"),
        (Self::HISTORICAL_YEAR, "historicalYear"),
        (Self::HISTORICAL_OTHER, "historicalOther"),
    ];
}

impl BitOr for ReadoutType {
    type Output = ReadoutType;

    fn bitor(self, rhs: ReadoutType) -> ReadoutType {
        ReadoutType(self.0 | rhs.0)
    }
}

impl BitOrAssign for ReadoutType {
    fn bitor_assign(&mut self, rhs: ReadoutType) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ReadoutType {
    type Output = ReadoutType;

    fn bitand(self, rhs: ReadoutType) -> ReadoutType {
        ReadoutType(self.0 & rhs.0)
    }
}

impl fmt::Debug for ReadoutType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.0 == u32::MAX {
            return write!(f, "ReadoutType(all)");
        }
        let mut first = true;
        write!(f, "ReadoutType(")?;
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
