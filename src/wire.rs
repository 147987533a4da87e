//! Stanza vocabulary: builders and parsers for everything that crosses the
//! peer channel besides the field payloads themselves.

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use roxmltree::Document;

use crate::constants::NS_EVENTS;
use crate::constants::NS_SENSORDATA;
use crate::errors::ProtocolError;
use crate::errors::Result;
use crate::export::attr_bool;
use crate::export::escape_xml;
use crate::export::parse_fields_element;
use crate::export::FieldsChunk;
use crate::fields::format_interval;
use crate::fields::format_timepoint;
use crate::fields::parse_interval;
use crate::fields::parse_timepoint;
use crate::request::push_attr;
use crate::request::push_node_reference;
use crate::request::FieldCondition;
use crate::request::ReadoutRequest;

/// Refusal of an iq request, carried back as an XMPP error stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqReject {
    pub error_type: String,
    pub condition: String,
    pub text: String,
}

impl IqReject {
    pub fn forbidden(text: impl Into<String>) -> Self {
        IqReject {
            error_type: "cancel".to_string(),
            condition: "forbidden".to_string(),
            text: text.into(),
        }
    }

    pub fn bad_request(text: impl Into<String>) -> Self {
        IqReject {
            error_type: "modify".to_string(),
            condition: "bad-request".to_string(),
            text: text.into(),
        }
    }

    /// The `<error>` payload of the error stanza.
    pub fn to_xml(&self) -> String {
        let mut buf = String::new();
        buf.push_str("<error");
        push_attr(&mut buf, "type", &self.error_type);
        buf.push('>');
        buf.push('<');
        buf.push_str(&self.condition);
        buf.push_str(" xmlns=\"urn:ietf:params:xml:ns:xmpp-stanzas\"/>");
        if !self.text.is_empty() {
            buf.push_str("<text xmlns=\"urn:ietf:params:xml:ns:xmpp-stanzas\">");
            buf.push_str(&escape_xml(&self.text));
            buf.push_str("</text>");
        }
        buf.push_str("</error>");
        buf
    }
}

/// One error reported during a readout, as carried by a `failure` push.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadoutError {
    pub timepoint: Option<DateTime<Utc>>,
    pub node_id: String,
    pub cache_type: Option<String>,
    pub source_id: Option<String>,
    pub text: String,
}

/// An iq request addressed to the responder side.
#[derive(Debug, Clone, PartialEq)]
pub enum IqRequest {
    Readout {
        seqnr: u32,
        when: Option<DateTime<Utc>>,
        request: ReadoutRequest,
    },
    Subscribe {
        seqnr: u32,
        request: ReadoutRequest,
        conditions: Vec<FieldCondition>,
        max_age: Option<Duration>,
        min_interval: Option<Duration>,
        max_interval: Option<Duration>,
        immediate: bool,
    },
    Unsubscribe {
        seqnr: u32,
    },
    Cancel {
        seqnr: u32,
    },
}

/// The payload of an iq result, as seen by the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IqAck {
    Accepted { seqnr: u32 },
    Rejected { reason: String },
    Cancelled { seqnr: u32 },
    Empty,
}

/// An asynchronous push from responder to requester.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Started {
        seqnr: u32,
    },
    Fields(FieldsChunk),
    Failure {
        seqnr: u32,
        done: bool,
        errors: Vec<ReadoutError>,
    },
    Done {
        seqnr: u32,
    },
}

// -
// Builders, requester side

pub fn req_stanza(
    seqnr: u32,
    request: &ReadoutRequest,
    when: Option<DateTime<Utc>>,
) -> String {
    let mut buf = String::new();
    buf.push_str("<req xmlns=\"");
    buf.push_str(NS_SENSORDATA);
    buf.push('"');
    push_attr(&mut buf, "seqnr", &seqnr.to_string());
    request.push_attributes(&mut buf);
    if let Some(when) = when {
        push_attr(&mut buf, "when", &format_timepoint(when));
    }
    if !request.push_children_and_close(&mut buf) {
        buf.push_str("</req>");
    }
    buf
}

#[allow(clippy::too_many_arguments)]
pub fn subscribe_stanza(
    seqnr: u32,
    request: &ReadoutRequest,
    conditions: &[FieldCondition],
    max_age: Option<Duration>,
    min_interval: Option<Duration>,
    max_interval: Option<Duration>,
    immediate: bool,
) -> String {
    let mut buf = String::new();
    buf.push_str("<subscribe xmlns=\"");
    buf.push_str(NS_EVENTS);
    buf.push('"');
    push_attr(&mut buf, "seqnr", &seqnr.to_string());
    request.push_attributes(&mut buf);
    if let Some(max_age) = max_age {
        push_attr(&mut buf, "maxAge", &format_interval(max_age));
    }
    if let Some(min_interval) = min_interval {
        push_attr(&mut buf, "minInterval", &format_interval(min_interval));
    }
    if let Some(max_interval) = max_interval {
        push_attr(&mut buf, "maxInterval", &format_interval(max_interval));
    }
    if immediate {
        push_attr(&mut buf, "req", "true");
    }

    // field names filtered without a trigger still go out, as bare fields
    let bare_fields: Vec<&str> = request
        .field_names()
        .map(|names| {
            names
                .iter()
                .map(String::as_str)
                .filter(|name| !conditions.iter().any(|c| c.field_name == *name))
                .collect()
        })
        .unwrap_or_default();

    if conditions.is_empty() && bare_fields.is_empty() && request.nodes().is_none() {
        buf.push_str("/>");
        return buf;
    }
    buf.push('>');

    if let Some(nodes) = request.nodes() {
        for node in nodes {
            push_node_reference(&mut buf, node);
        }
    }
    for name in bare_fields {
        buf.push_str("<field");
        push_attr(&mut buf, "name", name);
        buf.push_str("/>");
    }
    for condition in conditions {
        push_condition(&mut buf, condition);
    }
    buf.push_str("</subscribe>");
    buf
}

pub fn unsubscribe_stanza(seqnr: u32) -> String {
    format!("<unsubscribe xmlns=\"{}\" seqnr=\"{}\"/>", NS_EVENTS, seqnr)
}

pub fn cancel_stanza(seqnr: u32) -> String {
    format!("<cancel xmlns=\"{}\" seqnr=\"{}\"/>", NS_SENSORDATA, seqnr)
}

fn push_condition(
    buf: &mut String,
    condition: &FieldCondition,
) {
    buf.push_str("<field");
    push_attr(buf, "name", &condition.field_name);
    if let Some(v) = condition.current_value {
        push_attr(buf, "currentValue", &format_double(v));
    }
    if let Some(v) = condition.changed_by {
        push_attr(buf, "changedBy", &format_double(v));
    } else {
        if let Some(v) = condition.changed_up {
            push_attr(buf, "changedUp", &format_double(v));
        }
        if let Some(v) = condition.changed_down {
            push_attr(buf, "changedDown", &format_double(v));
        }
    }
    buf.push_str("/>");
}

// -
// Builders, responder side

pub fn accepted_payload(seqnr: u32) -> String {
    format!("<accepted xmlns=\"{}\" seqnr=\"{}\"/>", NS_SENSORDATA, seqnr)
}

pub fn cancelled_payload(seqnr: u32) -> String {
    format!(
        "<cancelled xmlns=\"{}\" seqnr=\"{}\"/>",
        NS_SENSORDATA, seqnr
    )
}

pub fn started_push(seqnr: u32) -> String {
    format!("<started xmlns=\"{}\" seqnr=\"{}\"/>", NS_SENSORDATA, seqnr)
}

pub fn done_push(seqnr: u32) -> String {
    format!("<done xmlns=\"{}\" seqnr=\"{}\"/>", NS_SENSORDATA, seqnr)
}

pub fn failure_push(
    seqnr: u32,
    done: bool,
    errors: &[ReadoutError],
) -> String {
    let mut buf = String::new();
    buf.push_str("<failure xmlns=\"");
    buf.push_str(NS_SENSORDATA);
    buf.push('"');
    push_attr(&mut buf, "seqnr", &seqnr.to_string());
    if done {
        push_attr(&mut buf, "done", "true");
    }
    buf.push('>');
    for error in errors {
        buf.push_str("<error");
        if let Some(timepoint) = error.timepoint {
            push_attr(&mut buf, "timestamp", &format_timepoint(timepoint));
        }
        if !error.node_id.is_empty() {
            push_attr(&mut buf, "nodeId", &error.node_id);
        }
        if let Some(cache_type) = &error.cache_type {
            push_attr(&mut buf, "cacheType", cache_type);
        }
        if let Some(source_id) = &error.source_id {
            push_attr(&mut buf, "sourceId", source_id);
        }
        buf.push('>');
        buf.push_str(&escape_xml(&error.text));
        buf.push_str("</error>");
    }
    buf.push_str("</failure>");
    buf
}

/// Injects `seqnr` (and `done="true"` for the final chunk) into the opening
/// tag of an encoded `<fields>` document.
pub fn annotate_fields(
    xml: &str,
    seqnr: u32,
    done: bool,
) -> String {
    const OPEN: &str = "<fields";
    if !xml.starts_with(OPEN) {
        return xml.to_string();
    }

    let mut out = String::with_capacity(xml.len() + 32);
    out.push_str(OPEN);
    out.push_str(&format!(" seqnr=\"{}\"", seqnr));
    if done {
        out.push_str(" done=\"true\"");
    }
    out.push_str(&xml[OPEN.len()..]);
    out
}

// -
// Parsers

/// Parses an iq request payload on the responder side.
pub fn parse_iq(xml: &str) -> Result<IqRequest> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    let seqnr: u32 = root
        .attribute("seqnr")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    match (root.tag_name().name(), root.tag_name().namespace()) {
        ("req", Some(NS_SENSORDATA)) => Ok(IqRequest::Readout {
            seqnr,
            when: root.attribute("when").and_then(parse_timepoint),
            request: ReadoutRequest::from_stanza(root),
        }),
        ("cancel", Some(NS_SENSORDATA)) => Ok(IqRequest::Cancel { seqnr }),
        ("subscribe", Some(NS_EVENTS)) => {
            let mut conditions = Vec::new();
            for field in root.children().filter(|n| n.has_tag_name("field")) {
                let changed_by = field.attribute("changedBy").and_then(|v| v.parse().ok());
                let changed_up = field.attribute("changedUp").and_then(|v| v.parse().ok());
                let changed_down = field.attribute("changedDown").and_then(|v| v.parse().ok());
                if changed_by.is_none() && changed_up.is_none() && changed_down.is_none() {
                    continue;
                }
                conditions.push(FieldCondition {
                    field_name: field.attribute("name").unwrap_or_default().to_string(),
                    current_value: field.attribute("currentValue").and_then(|v| v.parse().ok()),
                    changed_by,
                    changed_up,
                    changed_down,
                });
            }
            Ok(IqRequest::Subscribe {
                seqnr,
                request: ReadoutRequest::from_stanza(root),
                conditions,
                max_age: root.attribute("maxAge").and_then(parse_interval),
                min_interval: root.attribute("minInterval").and_then(parse_interval),
                max_interval: root.attribute("maxInterval").and_then(parse_interval),
                immediate: attr_bool(root, "req"),
            })
        }
        ("unsubscribe", Some(NS_EVENTS)) => Ok(IqRequest::Unsubscribe { seqnr }),
        (name, _) => Err(ProtocolError::Malformed(format!("unknown iq payload <{}>", name)).into()),
    }
}

/// Parses an iq result payload on the requester side. An empty payload is a
/// bare acknowledgement.
pub fn parse_ack(xml: &str) -> Result<IqAck> {
    if xml.trim().is_empty() {
        return Ok(IqAck::Empty);
    }

    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    let seqnr: u32 = root
        .attribute("seqnr")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    match root.tag_name().name() {
        "accepted" => Ok(IqAck::Accepted { seqnr }),
        "cancelled" => Ok(IqAck::Cancelled { seqnr }),
        "rejected" => {
            let mut reason = String::new();
            for error in root.children().filter(|n| n.has_tag_name("error")) {
                if let Some(text) = error.text() {
                    if !reason.is_empty() {
                        reason.push('\n');
                    }
                    reason.push_str(text);
                }
            }
            if reason.is_empty() {
                reason = "Readout rejected by remote device.".to_string();
            }
            Ok(IqAck::Rejected { reason })
        }
        name => Err(ProtocolError::Malformed(format!("unknown iq result <{}>", name)).into()),
    }
}

/// Parses an asynchronous push on the requester side.
pub fn parse_message(xml: &str) -> Result<PushMessage> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    let seqnr: u32 = root
        .attribute("seqnr")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    match root.tag_name().name() {
        "started" => Ok(PushMessage::Started { seqnr }),
        "done" => Ok(PushMessage::Done { seqnr }),
        "fields" => Ok(PushMessage::Fields(parse_fields_element(root)?)),
        "failure" => {
            let mut errors = Vec::new();
            for error in root.children().filter(|n| n.has_tag_name("error")) {
                errors.push(ReadoutError {
                    timepoint: error.attribute("timestamp").and_then(parse_timepoint),
                    node_id: error.attribute("nodeId").unwrap_or_default().to_string(),
                    cache_type: error
                        .attribute("cacheType")
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned),
                    source_id: error
                        .attribute("sourceId")
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned),
                    text: error.text().unwrap_or_default().trim().to_string(),
                });
            }
            Ok(PushMessage::Failure {
                seqnr,
                done: attr_bool(root, "done"),
                errors,
            })
        }
        name => Err(ProtocolError::Malformed(format!("unknown push <{}>", name)).into()),
    }
}

/// Shortest faithful rendering of a threshold or baseline value.
fn format_double(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod wire_test;
