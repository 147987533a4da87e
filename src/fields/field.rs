use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use chrono::Utc;

use crate::fields::LocalizationStep;
use crate::FieldStatus;
use crate::ReadoutType;

/// Typed payload of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Floating point value with a fixed number of presented decimals and an
    /// optional unit. The decimal count is significant: `2.50` and `2.5`
    /// carry different precision information.
    Numeric {
        value: f64,
        nr_decimals: u8,
        unit: String,
    },
    Integer(i64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Interval(Duration),
    /// Enumeration value together with the name of its data type.
    Enumeration { value: String, data_type: String },
}

impl FieldValue {
    /// Renders the value the way it appears in a `value` attribute on the
    /// wire. Numeric values keep exactly `nr_decimals` decimals.
    pub fn to_wire_string(&self) -> String {
        match self {
            FieldValue::Numeric {
                value, nr_decimals, ..
            } => format!("{:.*}", *nr_decimals as usize, value),
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Text(v) => v.clone(),
            FieldValue::Boolean(v) => v.to_string(),
            FieldValue::Timestamp(t) => format_timepoint(*t),
            FieldValue::Interval(d) => format_interval(*d),
            FieldValue::Enumeration { value, .. } => value.clone(),
        }
    }
}

/// One sensor data field: a named, timestamped, categorized value read from
/// a node.
#[derive(Debug, Clone)]
pub struct Field {
    node_id: String,
    field_name: String,
    timepoint: DateTime<Utc>,
    readout_type: ReadoutType,
    status: FieldStatus,
    language_module: Option<String>,
    string_ids: Vec<LocalizationStep>,
    value: FieldValue,
}

impl Field {
    pub fn new(
        node_id: impl Into<String>,
        field_name: impl Into<String>,
        timepoint: DateTime<Utc>,
        readout_type: ReadoutType,
        status: FieldStatus,
        value: FieldValue,
    ) -> Self {
        Field {
            node_id: node_id.into(),
            field_name: field_name.into(),
            timepoint,
            readout_type,
            status,
            language_module: None,
            string_ids: Vec::new(),
            value,
        }
    }

    pub fn with_localization(
        mut self,
        language_module: Option<String>,
        string_ids: Vec<LocalizationStep>,
    ) -> Self {
        self.language_module = language_module;
        self.string_ids = string_ids;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn timepoint(&self) -> DateTime<Utc> {
        self.timepoint
    }

    pub fn readout_type(&self) -> ReadoutType {
        self.readout_type
    }

    pub fn status(&self) -> FieldStatus {
        self.status
    }

    pub fn language_module(&self) -> Option<&str> {
        self.language_module.as_deref()
    }

    pub fn string_ids(&self) -> &[LocalizationStep] {
        &self.string_ids
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn set_node_id(
        &mut self,
        node_id: impl Into<String>,
    ) {
        self.node_id = node_id.into();
    }

    /// Renaming a field invalidates its localization chain, so the string
    /// IDs are cleared along with the name.
    pub fn set_field_name(
        &mut self,
        field_name: impl Into<String>,
    ) {
        self.field_name = field_name.into();
        self.string_ids.clear();
    }

    pub fn set_timepoint(
        &mut self,
        timepoint: DateTime<Utc>,
    ) {
        self.timepoint = timepoint;
    }

    pub fn set_status(
        &mut self,
        status: FieldStatus,
    ) {
        self.status = status;
    }

    /// Wire rendering of the value, see [`FieldValue::to_wire_string`].
    pub fn value_string(&self) -> String {
        self.value.to_wire_string()
    }
}

// Localization metadata is presentation only and excluded from equality.
impl PartialEq for Field {
    fn eq(
        &self,
        other: &Field,
    ) -> bool {
        self.timepoint == other.timepoint
            && self.field_name == other.field_name
            && self.readout_type == other.readout_type
            && self.status == other.status
            && self.node_id == other.node_id
            && self.value == other.value
    }
}

/// Renders a timepoint as it appears in `value` and `timestamp` attributes.
pub(crate) fn format_timepoint(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parses a wire timepoint. Accepts an offset suffix, a bare local form
/// (taken as UTC) and a date-only form.
pub(crate) fn parse_timepoint(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&t));
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Renders an interval as an XML schema duration, e.g. `PT1H30M` or
/// `-P2DT3H`.
pub(crate) fn format_interval(d: Duration) -> String {
    let mut out = String::new();
    let mut secs = d.num_seconds();
    let millis = (d.num_milliseconds() - secs * 1000).unsigned_abs();

    if secs < 0 || d.num_milliseconds() < 0 {
        out.push('-');
        secs = -secs;
    }
    out.push('P');

    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || millis > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if millis > 0 {
            out.push_str(&format!("{}.{:03}S", seconds, millis));
        } else if seconds > 0 || (days == 0 && hours == 0 && minutes == 0) {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}

/// Parses an XML schema duration into an interval. Years and months are
/// approximated with the calendar averages used by the wire peers
/// (365 and 30 days).
pub(crate) fn parse_interval(s: &str) -> Option<Duration> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let rest = rest.strip_prefix('P')?;

    let mut millis: i64 = 0;
    let mut in_time = false;
    let mut number = String::new();

    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' | '.' => number.push(c),
            unit => {
                let v: f64 = number.parse().ok()?;
                number.clear();
                let factor = match (unit, in_time) {
                    ('Y', false) => 365.0 * 86_400_000.0,
                    ('M', false) => 30.0 * 86_400_000.0,
                    ('D', false) => 86_400_000.0,
                    ('W', false) => 7.0 * 86_400_000.0,
                    ('H', true) => 3_600_000.0,
                    ('M', true) => 60_000.0,
                    ('S', true) => 1_000.0,
                    _ => return None,
                };
                millis += (v * factor) as i64;
            }
        }
    }
    if !number.is_empty() {
        return None;
    }

    let d = Duration::milliseconds(millis);
    Some(if negative { -d } else { d })
}

/// Parses a clock-style interval, `hh:mm:ss` optionally preceded by a day
/// count (`d.hh:mm:ss`).
pub(crate) fn parse_clock_interval(s: &str) -> Option<Duration> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    // A leading `d.` is a day count; a trailing `.n` is fractional seconds.
    let (days, clock) = match rest.split_once('.') {
        Some((d, c)) if c.contains(':') => (d.parse::<i64>().ok()?, c),
        _ => (0, rest),
    };

    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next().map_or(Ok(0.0), str::parse).ok()?;
    if parts.next().is_some() {
        return None;
    }

    let millis =
        ((days * 86_400 + hours * 3_600 + minutes * 60) * 1_000) as f64 + seconds * 1_000.0;
    let d = Duration::milliseconds(millis as i64);
    Some(if negative { -d } else { d })
}
