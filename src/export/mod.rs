//! Sensor data encoders: readout results stream through a
//! [`SensorDataExport`] sink, so the same readout code can produce the wire
//! payload, JSON, plain text or RDF.

mod import;
mod json;
mod partition;
mod text;
mod turtle;
mod xml;

pub use import::parse_fields;
pub use import::FieldsChunk;
pub use json::JsonExport;
pub use partition::PartitionedExport;
pub use text::TextExport;
pub use turtle::TurtleExport;
pub use xml::XmlExport;

pub(crate) use import::attr_bool;
pub(crate) use import::parse_fields_element;
pub(crate) use xml::escape_xml;

use chrono::DateTime;
use chrono::Utc;

use crate::Field;
use crate::FieldStatus;
use crate::FieldValue;
use crate::ReadoutType;

/// Streaming sink for readout results.
///
/// Calls must be well nested: `start`, then per node `start_node` ..
/// `end_node`, then per timepoint `start_timestamp` .. `end_timestamp`,
/// with `field` only inside a timestamp. Encoders panic on misuse; the
/// nesting is a programming contract, not input validation.
pub trait SensorDataExport {
    fn start(&mut self);
    fn end(&mut self);

    fn start_node(
        &mut self,
        node_id: &str,
        cache_type: Option<&str>,
        source_id: Option<&str>,
    );
    fn end_node(&mut self);

    fn start_timestamp(
        &mut self,
        timepoint: DateTime<Utc>,
    );
    fn end_timestamp(&mut self);

    fn field(
        &mut self,
        field: &Field,
    );

    fn export_numeric(
        &mut self,
        name: &str,
        value: f64,
        nr_decimals: u8,
        unit: &str,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Numeric {
                value,
                nr_decimals,
                unit: unit.to_string(),
            },
        ));
    }

    fn export_integer(
        &mut self,
        name: &str,
        value: i64,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Integer(value),
        ));
    }

    fn export_string(
        &mut self,
        name: &str,
        value: &str,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Text(value.to_string()),
        ));
    }

    fn export_boolean(
        &mut self,
        name: &str,
        value: bool,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Boolean(value),
        ));
    }

    fn export_timestamp(
        &mut self,
        name: &str,
        value: DateTime<Utc>,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Timestamp(value),
        ));
    }

    fn export_interval(
        &mut self,
        name: &str,
        value: chrono::Duration,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Interval(value),
        ));
    }

    fn export_enum(
        &mut self,
        name: &str,
        value: &str,
        data_type: &str,
        readout_type: ReadoutType,
        status: FieldStatus,
    ) {
        self.field(&transient_field(
            name,
            readout_type,
            status,
            FieldValue::Enumeration {
                value: value.to_string(),
                data_type: data_type.to_string(),
            },
        ));
    }
}

/// Encoder that accumulates text and can hand it off mid-stream, which is
/// what partitioning needs.
pub trait BufferedExport: SensorDataExport {
    fn buffered_len(&self) -> usize;

    /// Takes the accumulated text, leaving the buffer empty.
    fn take_buffer(&mut self) -> String;
}

fn transient_field(
    name: &str,
    readout_type: ReadoutType,
    status: FieldStatus,
    value: FieldValue,
) -> Field {
    // Node and timepoint are supplied by the surrounding export context.
    Field::new(
        "",
        name,
        DateTime::<Utc>::UNIX_EPOCH,
        readout_type,
        status,
        value,
    )
}

/// Nesting tracker shared by the encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Scope {
    #[default]
    Idle,
    Document,
    Node,
    Timestamp,
}

impl Scope {
    pub(crate) fn start_document(&mut self) {
        assert_eq!(*self, Scope::Idle, "document already started");
        *self = Scope::Document;
    }

    pub(crate) fn end_document(&mut self) {
        assert_eq!(*self, Scope::Document, "unclosed node or timestamp");
        *self = Scope::Idle;
    }

    pub(crate) fn start_node(&mut self) {
        assert_eq!(*self, Scope::Document, "node must open inside a document");
        *self = Scope::Node;
    }

    pub(crate) fn end_node(&mut self) {
        assert_eq!(*self, Scope::Node, "unclosed timestamp");
        *self = Scope::Document;
    }

    pub(crate) fn start_timestamp(&mut self) {
        assert_eq!(*self, Scope::Node, "timestamp must open inside a node");
        *self = Scope::Timestamp;
    }

    pub(crate) fn end_timestamp(&mut self) {
        assert_eq!(*self, Scope::Timestamp, "no open timestamp");
        *self = Scope::Node;
    }

    pub(crate) fn field(&self) {
        assert_eq!(*self, Scope::Timestamp, "field must sit inside a timestamp");
    }
}
