use chrono::DateTime;
use chrono::Utc;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use crate::export::Scope;
use crate::export::SensorDataExport;
use crate::fields::format_string_ids;
use crate::fields::format_timepoint;
use crate::Field;
use crate::FieldValue;

/// Encoder building a JSON value tree mirroring the wire document:
/// nodes contain timestamps, timestamps contain fields.
#[derive(Debug, Default)]
pub struct JsonExport {
    nodes: Vec<Value>,
    node: Option<Map<String, Value>>,
    timestamps: Vec<Value>,
    timestamp: Option<Map<String, Value>>,
    fields: Vec<Value>,
    scope: Scope,
    finished: Option<Value>,
}

impl JsonExport {
    pub fn new() -> Self {
        JsonExport::default()
    }

    /// The finished tree. Empty object until `end` has been called.
    pub fn into_value(self) -> Value {
        self.finished.unwrap_or_else(|| json!({}))
    }
}

impl SensorDataExport for JsonExport {
    fn start(&mut self) {
        self.scope.start_document();
        self.nodes.clear();
        self.finished = None;
    }

    fn end(&mut self) {
        self.scope.end_document();
        self.finished = Some(json!({ "nodes": std::mem::take(&mut self.nodes) }));
    }

    fn start_node(
        &mut self,
        node_id: &str,
        cache_type: Option<&str>,
        source_id: Option<&str>,
    ) {
        self.scope.start_node();
        let mut node = Map::new();
        node.insert("nodeId".to_string(), json!(node_id));
        if let Some(cache_type) = cache_type.filter(|s| !s.is_empty()) {
            node.insert("cacheType".to_string(), json!(cache_type));
        }
        if let Some(source_id) = source_id.filter(|s| !s.is_empty()) {
            node.insert("sourceId".to_string(), json!(source_id));
        }
        self.node = Some(node);
        self.timestamps.clear();
    }

    fn end_node(&mut self) {
        self.scope.end_node();
        let mut node = self.node.take().unwrap_or_default();
        node.insert(
            "timestamps".to_string(),
            Value::Array(std::mem::take(&mut self.timestamps)),
        );
        self.nodes.push(Value::Object(node));
    }

    fn start_timestamp(
        &mut self,
        timepoint: DateTime<Utc>,
    ) {
        self.scope.start_timestamp();
        let mut ts = Map::new();
        ts.insert("timepoint".to_string(), json!(format_timepoint(timepoint)));
        self.timestamp = Some(ts);
        self.fields.clear();
    }

    fn end_timestamp(&mut self) {
        self.scope.end_timestamp();
        let mut ts = self.timestamp.take().unwrap_or_default();
        ts.insert(
            "fields".to_string(),
            Value::Array(std::mem::take(&mut self.fields)),
        );
        self.timestamps.push(Value::Object(ts));
    }

    fn field(
        &mut self,
        field: &Field,
    ) {
        self.scope.field();

        let mut obj = Map::new();
        let field_type = match field.value() {
            FieldValue::Numeric { .. } => "numeric",
            FieldValue::Integer(_) => "long",
            FieldValue::Text(_) => "string",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "dateTime",
            FieldValue::Interval(_) => "duration",
            FieldValue::Enumeration { .. } => "enum",
        };
        obj.insert("fieldType".to_string(), json!(field_type));
        obj.insert("name".to_string(), json!(field.field_name()));

        for (flag, name) in crate::ReadoutType::ATTRIBUTES {
            if field.readout_type().contains(flag) {
                obj.insert(name.to_string(), json!(true));
            }
        }
        for (flag, name) in crate::FieldStatus::ATTRIBUTES {
            if field.status().contains(flag) {
                obj.insert(name.to_string(), json!(true));
            }
        }

        if let Some(string_ids) = format_string_ids(field.string_ids()) {
            if let Some(module) = field.language_module() {
                obj.insert("module".to_string(), json!(module));
            }
            obj.insert("stringIds".to_string(), json!(string_ids));
        }

        match field.value() {
            FieldValue::Numeric {
                value,
                nr_decimals,
                unit,
            } => {
                obj.insert("value".to_string(), json!(value));
                obj.insert("nrDecimals".to_string(), json!(nr_decimals));
                if !unit.is_empty() {
                    obj.insert("unit".to_string(), json!(unit));
                }
            }
            FieldValue::Integer(v) => {
                obj.insert("value".to_string(), json!(v));
            }
            FieldValue::Boolean(v) => {
                obj.insert("value".to_string(), json!(v));
            }
            FieldValue::Enumeration { value, data_type } => {
                obj.insert("value".to_string(), json!(value));
                obj.insert("dataType".to_string(), json!(data_type));
            }
            FieldValue::Text(_) | FieldValue::Timestamp(_) | FieldValue::Interval(_) => {
                obj.insert("value".to_string(), json!(field.value_string()));
            }
        }

        self.fields.push(Value::Object(obj));
    }
}
