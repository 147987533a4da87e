use chrono::DateTime;
use chrono::Utc;

use crate::export::BufferedExport;
use crate::export::Scope;
use crate::export::SensorDataExport;
use crate::fields::format_string_ids;
use crate::fields::format_timepoint;
use crate::Field;
use crate::FieldValue;

/// RDF encoder producing Turtle triples under the `cl:` prefix. Nodes,
/// timestamps and fields become nested blank nodes.
#[derive(Debug, Default)]
pub struct TurtleExport {
    buf: String,
    scope: Scope,
    first_timestamp: bool,
    first_field: bool,
}

impl TurtleExport {
    pub fn new() -> Self {
        TurtleExport::default()
    }

    fn push_literal(
        &mut self,
        predicate: &str,
        value: &str,
        indent: &str,
    ) {
        self.buf.push_str(indent);
        self.buf.push_str("cl:");
        self.buf.push_str(predicate);
        self.buf.push_str(" \"");
        self.buf.push_str(&escape_turtle(value));
        self.buf.push_str("\" ;\n");
    }

    fn push_boolean(
        &mut self,
        predicate: &str,
        indent: &str,
    ) {
        self.buf.push_str(indent);
        self.buf.push_str("cl:");
        self.buf.push_str(predicate);
        self.buf.push_str(" true ;\n");
    }
}

impl SensorDataExport for TurtleExport {
    fn start(&mut self) {
        self.scope.start_document();
        self.buf
            .push_str("@prefix cl: <urn:xmpp:iot:sensordata#> .\n\n");
    }

    fn end(&mut self) {
        self.scope.end_document();
    }

    fn start_node(
        &mut self,
        node_id: &str,
        cache_type: Option<&str>,
        source_id: Option<&str>,
    ) {
        self.scope.start_node();
        self.buf.push_str("[] cl:nodeId \"");
        self.buf.push_str(&escape_turtle(node_id));
        self.buf.push_str("\" ;\n");
        if let Some(cache_type) = cache_type.filter(|s| !s.is_empty()) {
            self.push_literal("cacheType", cache_type, "   ");
        }
        if let Some(source_id) = source_id.filter(|s| !s.is_empty()) {
            self.push_literal("sourceId", source_id, "   ");
        }
        self.first_timestamp = true;
    }

    fn end_node(&mut self) {
        self.scope.end_node();
        if !self.first_timestamp {
            self.buf.push_str("   ] ;\n");
        }
        // Replace the trailing ` ;` of the last predicate with ` .`.
        if self.buf.ends_with(" ;\n") {
            self.buf.truncate(self.buf.len() - 3);
            self.buf.push_str(" .\n\n");
        }
    }

    fn start_timestamp(
        &mut self,
        timepoint: DateTime<Utc>,
    ) {
        self.scope.start_timestamp();
        if !self.first_timestamp {
            self.buf.push_str("   ] ;\n");
        }
        self.first_timestamp = false;
        self.buf.push_str("   cl:timestamp [\n");
        self.push_literal("value", &format_timepoint(timepoint), "      ");
        self.first_field = true;
    }

    fn end_timestamp(&mut self) {
        self.scope.end_timestamp();
        if !self.first_field {
            self.buf.push_str("      ] ;\n");
        }
    }

    fn field(
        &mut self,
        field: &Field,
    ) {
        self.scope.field();

        if !self.first_field {
            self.buf.push_str("      ] ;\n");
        }
        self.first_field = false;

        self.buf.push_str("      cl:field [\n");
        self.push_literal("name", field.field_name(), "         ");

        for (flag, name) in crate::ReadoutType::ATTRIBUTES {
            if field.readout_type().contains(flag) {
                self.push_boolean(name, "         ");
            }
        }
        for (flag, name) in crate::FieldStatus::ATTRIBUTES {
            if field.status().contains(flag) {
                self.push_boolean(name, "         ");
            }
        }

        if let Some(string_ids) = format_string_ids(field.string_ids()) {
            if let Some(module) = field.language_module() {
                self.push_literal("module", module, "         ");
            }
            self.push_literal("stringIds", &string_ids, "         ");
        }

        let predicate = match field.value() {
            FieldValue::Numeric { .. } => "numeric",
            FieldValue::Integer(_) => "long",
            FieldValue::Text(_) => "string",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "dateTime",
            FieldValue::Interval(_) => "duration",
            FieldValue::Enumeration { .. } => "enum",
        };
        self.push_literal(predicate, &field.value_string(), "         ");

        match field.value() {
            FieldValue::Numeric { unit, .. } if !unit.is_empty() => {
                self.push_literal("unit", unit, "         ");
            }
            FieldValue::Enumeration { data_type, .. } => {
                self.push_literal("dataType", data_type, "         ");
            }
            _ => {}
        }
    }
}

impl BufferedExport for TurtleExport {
    fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}

fn escape_turtle(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
