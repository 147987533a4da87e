use chrono::DateTime;
use chrono::Utc;

use crate::export::BufferedExport;
use crate::export::Scope;
use crate::export::SensorDataExport;
use crate::fields::format_timepoint;
use crate::Field;
use crate::FieldValue;

/// Plain-text encoder: one tab-separated row per field, for terminals and
/// log files.
#[derive(Debug, Default)]
pub struct TextExport {
    buf: String,
    scope: Scope,
    node_id: String,
    timepoint: String,
}

impl TextExport {
    pub fn new() -> Self {
        TextExport::default()
    }
}

impl SensorDataExport for TextExport {
    fn start(&mut self) {
        self.scope.start_document();
    }

    fn end(&mut self) {
        self.scope.end_document();
    }

    fn start_node(
        &mut self,
        node_id: &str,
        _cache_type: Option<&str>,
        _source_id: Option<&str>,
    ) {
        self.scope.start_node();
        self.node_id = node_id.to_string();
    }

    fn end_node(&mut self) {
        self.scope.end_node();
        self.node_id.clear();
    }

    fn start_timestamp(
        &mut self,
        timepoint: DateTime<Utc>,
    ) {
        self.scope.start_timestamp();
        self.timepoint = format_timepoint(timepoint);
    }

    fn end_timestamp(&mut self) {
        self.scope.end_timestamp();
        self.timepoint.clear();
    }

    fn field(
        &mut self,
        field: &Field,
    ) {
        self.scope.field();

        self.buf.push_str(&self.node_id);
        self.buf.push('\t');
        self.buf.push_str(&self.timepoint);
        self.buf.push('\t');
        self.buf.push_str(field.field_name());
        self.buf.push('\t');
        self.buf.push_str(&field.value_string());
        if let FieldValue::Numeric { unit, .. } = field.value() {
            if !unit.is_empty() {
                self.buf.push(' ');
                self.buf.push_str(unit);
            }
        }
        self.buf.push('\n');
    }
}

impl BufferedExport for TextExport {
    fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}
