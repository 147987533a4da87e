//! The field model: typed sensor values, their categories, statuses and
//! localization metadata.

mod field;
mod language;
mod readout_type;
mod status;

pub use field::Field;
pub use field::FieldValue;
pub use language::format_string_ids;
pub use language::is_localizable;
pub use language::parse_string_ids;
pub use language::LocalizationStep;
pub use readout_type::ReadoutType;
pub use status::FieldStatus;

pub(crate) use field::format_interval;
pub(crate) use field::format_timepoint;
pub(crate) use field::parse_clock_interval;
pub(crate) use field::parse_interval;
pub(crate) use field::parse_timepoint;

#[cfg(test)]
mod field_test;
#[cfg(test)]
mod status_test;
