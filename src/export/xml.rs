use chrono::DateTime;
use chrono::Utc;

use crate::constants::NS_SENSORDATA;
use crate::export::BufferedExport;
use crate::export::Scope;
use crate::export::SensorDataExport;
use crate::fields::format_string_ids;
use crate::fields::format_timepoint;
use crate::Field;
use crate::FieldValue;

/// Encoder producing the wire payload: a `<fields>` document in the sensor
/// data namespace. The output of one complete `start` .. `end` cycle is a
/// well-formed chunk.
#[derive(Debug, Default)]
pub struct XmlExport {
    buf: String,
    scope: Scope,
}

impl XmlExport {
    pub fn new() -> Self {
        XmlExport::default()
    }

    fn push_attr(
        &mut self,
        name: &str,
        value: &str,
    ) {
        self.buf.push(' ');
        self.buf.push_str(name);
        self.buf.push_str("=\"");
        self.buf.push_str(&escape_xml(value));
        self.buf.push('"');
    }

    fn push_flag_attrs(
        &mut self,
        field: &Field,
    ) {
        self.push_attr("name", field.field_name());

        for (flag, name) in crate::ReadoutType::ATTRIBUTES {
            if field.readout_type().contains(flag) {
                self.push_attr(name, "true");
            }
        }
        for (flag, name) in crate::FieldStatus::ATTRIBUTES {
            if field.status().contains(flag) {
                self.push_attr(name, "true");
            }
        }

        if let Some(string_ids) = format_string_ids(field.string_ids()) {
            if let Some(module) = field.language_module() {
                self.push_attr("module", module);
            }
            self.push_attr("stringIds", &string_ids);
        }
    }
}

impl SensorDataExport for XmlExport {
    fn start(&mut self) {
        self.scope.start_document();
        self.buf.push_str("<fields xmlns=\"");
        self.buf.push_str(NS_SENSORDATA);
        self.buf.push_str("\">");
    }

    fn end(&mut self) {
        self.scope.end_document();
        self.buf.push_str("</fields>");
    }

    fn start_node(
        &mut self,
        node_id: &str,
        cache_type: Option<&str>,
        source_id: Option<&str>,
    ) {
        self.scope.start_node();
        self.buf.push_str("<node");
        self.push_attr("nodeId", node_id);
        if let Some(cache_type) = cache_type.filter(|s| !s.is_empty()) {
            self.push_attr("cacheType", cache_type);
        }
        if let Some(source_id) = source_id.filter(|s| !s.is_empty()) {
            self.push_attr("sourceId", source_id);
        }
        self.buf.push('>');
    }

    fn end_node(&mut self) {
        self.scope.end_node();
        self.buf.push_str("</node>");
    }

    fn start_timestamp(
        &mut self,
        timepoint: DateTime<Utc>,
    ) {
        self.scope.start_timestamp();
        self.buf.push_str("<timestamp");
        self.push_attr("value", &format_timepoint(timepoint));
        self.buf.push('>');
    }

    fn end_timestamp(&mut self) {
        self.scope.end_timestamp();
        self.buf.push_str("</timestamp>");
    }

    fn field(
        &mut self,
        field: &Field,
    ) {
        self.scope.field();

        let element = match field.value() {
            FieldValue::Numeric { .. } => "numeric",
            FieldValue::Integer(_) => "long",
            FieldValue::Text(_) => "string",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "dateTime",
            FieldValue::Interval(_) => "duration",
            FieldValue::Enumeration { .. } => "enum",
        };

        self.buf.push('<');
        self.buf.push_str(element);
        self.push_flag_attrs(field);
        self.push_attr("value", &field.value_string());

        match field.value() {
            FieldValue::Numeric { unit, .. } if !unit.is_empty() => {
                self.push_attr("unit", unit);
            }
            FieldValue::Enumeration { data_type, .. } => {
                self.push_attr("dataType", data_type);
            }
            _ => {}
        }

        self.buf.push_str("/>");
    }
}

impl BufferedExport for XmlExport {
    fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}

/// Escapes text for use in XML attribute values and character data.
pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
