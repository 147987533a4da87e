use roxmltree::Document;
use roxmltree::Node;

use crate::errors::ProtocolError;
use crate::errors::Result;
use crate::fields::parse_clock_interval;
use crate::fields::parse_interval;
use crate::fields::parse_string_ids;
use crate::fields::parse_timepoint;
use crate::Field;
use crate::FieldStatus;
use crate::FieldValue;
use crate::ReadoutType;

/// One parsed `<fields>` document: the payload of a readout chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldsChunk {
    pub seqnr: Option<u32>,
    pub done: bool,
    pub fields: Vec<Field>,
}

/// Parses a `<fields>` document, the inverse of the XML encoder. Unknown
/// elements and attributes are ignored; a malformed document is an error,
/// never a panic.
pub fn parse_fields(xml: &str) -> Result<FieldsChunk> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "fields" {
        return Err(ProtocolError::Malformed(format!(
            "expected <fields>, got <{}>",
            root.tag_name().name()
        ))
        .into());
    }
    parse_fields_element(root)
}

pub(crate) fn parse_fields_element(fields: Node) -> Result<FieldsChunk> {
    let mut chunk = FieldsChunk {
        seqnr: fields.attribute("seqnr").and_then(|v| v.parse().ok()),
        done: attr_bool(fields, "done"),
        fields: Vec::new(),
    };

    for node in fields.children().filter(|n| n.has_tag_name("node")) {
        let node_id = node.attribute("nodeId").unwrap_or_default();

        for timestamp in node.children().filter(|n| n.has_tag_name("timestamp")) {
            let timepoint = timestamp
                .attribute("value")
                .and_then(parse_timepoint)
                .ok_or_else(|| {
                    ProtocolError::Malformed("timestamp without a valid value".to_string())
                })?;

            for element in timestamp.children().filter(Node::is_element) {
                let value = match parse_value(element) {
                    Some(value) => value,
                    None => continue,
                };

                let mut readout_type = ReadoutType::EMPTY;
                for (flag, name) in ReadoutType::ATTRIBUTES {
                    if attr_bool(element, name) {
                        readout_type |= flag;
                    }
                }
                let mut status = FieldStatus::EMPTY;
                for (flag, name) in FieldStatus::ATTRIBUTES {
                    if attr_bool(element, name) {
                        status |= flag;
                    }
                }

                let module = element
                    .attribute("module")
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned);
                let string_ids =
                    parse_string_ids(element.attribute("stringIds").unwrap_or_default());

                chunk.fields.push(
                    Field::new(
                        node_id,
                        element.attribute("name").unwrap_or_default(),
                        timepoint,
                        readout_type,
                        status,
                        value,
                    )
                    .with_localization(module, string_ids),
                );
            }
        }
    }

    Ok(chunk)
}

fn parse_value(element: Node) -> Option<FieldValue> {
    let value = element.attribute("value").unwrap_or_default();

    match element.tag_name().name() {
        "numeric" => Some(FieldValue::Numeric {
            value: value.parse().ok()?,
            nr_decimals: decimals_of(value),
            unit: element.attribute("unit").unwrap_or_default().to_string(),
        }),
        "int" | "long" => Some(FieldValue::Integer(value.parse().ok()?)),
        "string" => Some(FieldValue::Text(value.to_string())),
        "boolean" => Some(FieldValue::Boolean(attr_bool(element, "value"))),
        "date" | "dateTime" => Some(FieldValue::Timestamp(parse_timepoint(value)?)),
        "duration" | "timeSpan" => Some(FieldValue::Interval(parse_interval(value)?)),
        "time" => Some(FieldValue::Interval(parse_clock_interval(value)?)),
        "enum" => Some(FieldValue::Enumeration {
            value: value.to_string(),
            data_type: element
                .attribute("dataType")
                .unwrap_or_default()
                .to_string(),
        }),
        _ => None,
    }
}

/// Number of decimals carried by the textual rendering, e.g. `12.50` has 2.
fn decimals_of(value: &str) -> u8 {
    match value.split_once('.') {
        Some((_, frac)) => frac.len().min(u8::MAX as usize) as u8,
        None => 0,
    }
}

pub(crate) fn attr_bool(
    node: Node,
    name: &str,
) -> bool {
    matches!(node.attribute(name), Some("true") | Some("1"))
}
