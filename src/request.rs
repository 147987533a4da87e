//! Readout request filters: what a peer asked to read, and the predicates
//! the readout code uses to decide what to report.

use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use roxmltree::Node;

use crate::export::attr_bool;
use crate::export::escape_xml;
use crate::fields::format_timepoint;
use crate::fields::parse_timepoint;
use crate::ReadoutType;

/// Reference to a node, optionally narrowed by cache type and data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReference {
    pub node_id: String,
    pub cache_type: Option<String>,
    pub source_id: Option<String>,
}

impl NodeReference {
    pub fn new(node_id: impl Into<String>) -> Self {
        NodeReference {
            node_id: node_id.into(),
            cache_type: None,
            source_id: None,
        }
    }
}

/// Trigger specification attached to a field in a subscription request.
///
/// `changed_by` is shorthand for equal up and down thresholds and wins over
/// the directional attributes when both are given.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldCondition {
    pub field_name: String,
    pub current_value: Option<f64>,
    pub changed_by: Option<f64>,
    pub changed_up: Option<f64>,
    pub changed_down: Option<f64>,
}

impl FieldCondition {
    pub fn if_changed_by(
        field_name: impl Into<String>,
        changed_by: f64,
    ) -> Self {
        FieldCondition {
            field_name: field_name.into(),
            changed_by: Some(changed_by),
            ..Default::default()
        }
    }

    pub fn if_changed_up(
        field_name: impl Into<String>,
        changed_up: f64,
    ) -> Self {
        FieldCondition {
            field_name: field_name.into(),
            changed_up: Some(changed_up),
            ..Default::default()
        }
    }

    pub fn if_changed_down(
        field_name: impl Into<String>,
        changed_down: f64,
    ) -> Self {
        FieldCondition {
            field_name: field_name.into(),
            changed_down: Some(changed_down),
            ..Default::default()
        }
    }

    pub fn with_current_value(
        mut self,
        current_value: f64,
    ) -> Self {
        self.current_value = Some(current_value);
        self
    }
}

/// What a peer asked to read: categories, time window, node and field
/// filters, and access tokens. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadoutRequest {
    types: ReadoutType,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    nodes: Option<Vec<NodeReference>>,
    field_names: Option<BTreeSet<String>>,
    service_token: Option<String>,
    device_token: Option<String>,
    user_token: Option<String>,
}

impl ReadoutRequest {
    pub fn new(types: ReadoutType) -> Self {
        ReadoutRequest {
            types,
            ..Default::default()
        }
    }

    pub fn with_window(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_nodes(
        mut self,
        nodes: Vec<NodeReference>,
    ) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn with_fields<I, S>(
        mut self,
        field_names: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_names = Some(field_names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tokens(
        mut self,
        service_token: Option<String>,
        device_token: Option<String>,
        user_token: Option<String>,
    ) -> Self {
        self.service_token = service_token;
        self.device_token = device_token;
        self.user_token = user_token;
        self
    }

    pub fn types(&self) -> ReadoutType {
        self.types
    }

    pub fn nodes(&self) -> Option<&[NodeReference]> {
        self.nodes.as_deref()
    }

    pub fn field_names(&self) -> Option<&BTreeSet<String>> {
        self.field_names.as_ref()
    }

    pub fn service_token(&self) -> Option<&str> {
        self.service_token.as_deref()
    }

    pub fn device_token(&self) -> Option<&str> {
        self.device_token.as_deref()
    }

    pub fn user_token(&self) -> Option<&str> {
        self.user_token.as_deref()
    }

    /// True if the named field should be reported. No field filter means
    /// every field matches.
    pub fn report_field(
        &self,
        field_name: &str,
    ) -> bool {
        match &self.field_names {
            Some(names) => names.contains(field_name),
            None => true,
        }
    }

    /// True if values at the timepoint fall inside the requested window.
    pub fn report_timestamp(
        &self,
        timepoint: DateTime<Utc>,
    ) -> bool {
        if let Some(from) = self.from {
            if timepoint < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if timepoint > to {
                return false;
            }
        }
        true
    }

    /// True if the node should be read. A node filter entry without cache
    /// type or source narrows on node ID alone.
    pub fn report_node(
        &self,
        node_id: &str,
        cache_type: Option<&str>,
        source_id: Option<&str>,
    ) -> bool {
        let nodes = match &self.nodes {
            Some(nodes) => nodes,
            None => return true,
        };

        nodes.iter().any(|n| {
            n.node_id == node_id
                && n.cache_type
                    .as_deref()
                    .map_or(true, |ct| Some(ct) == cache_type)
                && n.source_id
                    .as_deref()
                    .map_or(true, |sid| Some(sid) == source_id)
        })
    }

    /// Reads the filter portion shared by `req` and `subscribe` stanzas:
    /// category attributes, time window, tokens, `node` and `field`
    /// children. No category attribute at all means everything.
    pub(crate) fn from_stanza(element: Node) -> Self {
        let mut types = ReadoutType::EMPTY;
        if attr_bool(element, "all") {
            types = ReadoutType::ALL;
        } else {
            if attr_bool(element, "historical") {
                types |= ReadoutType::HISTORICAL;
            }
            for (flag, name) in ReadoutType::ATTRIBUTES {
                if attr_bool(element, name) {
                    types |= flag;
                }
            }
        }
        if types.is_empty() {
            types = ReadoutType::ALL;
        }

        let mut nodes: Option<Vec<NodeReference>> = None;
        let mut field_names: Option<BTreeSet<String>> = None;

        for child in element.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "node" => {
                    nodes.get_or_insert_with(Vec::new).push(NodeReference {
                        node_id: child.attribute("nodeId").unwrap_or_default().to_string(),
                        cache_type: child
                            .attribute("cacheType")
                            .filter(|s| !s.is_empty())
                            .map(str::to_owned),
                        source_id: child
                            .attribute("sourceId")
                            .filter(|s| !s.is_empty())
                            .map(str::to_owned),
                    });
                }
                "field" => {
                    if let Some(name) = child.attribute("name") {
                        field_names
                            .get_or_insert_with(BTreeSet::new)
                            .insert(name.to_string());
                    }
                }
                _ => {}
            }
        }

        ReadoutRequest {
            types,
            from: element.attribute("from").and_then(parse_timepoint),
            to: element.attribute("to").and_then(parse_timepoint),
            nodes,
            field_names,
            service_token: owned_attr(element, "serviceToken"),
            device_token: owned_attr(element, "deviceToken"),
            user_token: owned_attr(element, "userToken"),
        }
    }

    /// Appends the shared filter attributes (tokens, window, categories) to
    /// an open stanza tag.
    pub(crate) fn push_attributes(
        &self,
        buf: &mut String,
    ) {
        for (name, value) in [
            ("serviceToken", &self.service_token),
            ("deviceToken", &self.device_token),
            ("userToken", &self.user_token),
        ] {
            if let Some(value) = value {
                push_attr(buf, name, value);
            }
        }
        if let Some(from) = self.from {
            push_attr(buf, "from", &format_timepoint(from));
        }
        if let Some(to) = self.to {
            push_attr(buf, "to", &format_timepoint(to));
        }
        push_type_attributes(buf, self.types);
    }

    /// Appends the `node` and `field` filter children. Returns true when
    /// the stanza was self-closed because there were no children; the
    /// caller appends the end tag otherwise.
    pub(crate) fn push_children_and_close(
        &self,
        buf: &mut String,
    ) -> bool {
        let no_children = self.nodes.is_none() && self.field_names.is_none();
        if no_children {
            buf.push_str("/>");
            return true;
        }
        buf.push('>');

        if let Some(nodes) = &self.nodes {
            for node in nodes {
                push_node_reference(buf, node);
            }
        }
        if let Some(names) = &self.field_names {
            for name in names {
                buf.push_str("<field");
                push_attr(buf, "name", name);
                buf.push_str("/>");
            }
        }
        false
    }
}

fn owned_attr(
    element: Node,
    name: &str,
) -> Option<String> {
    element
        .attribute(name)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

pub(crate) fn push_attr(
    buf: &mut String,
    name: &str,
    value: &str,
) {
    buf.push(' ');
    buf.push_str(name);
    buf.push_str("=\"");
    buf.push_str(&escape_xml(value));
    buf.push('"');
}

pub(crate) fn push_node_reference(
    buf: &mut String,
    node: &NodeReference,
) {
    buf.push_str("<node");
    push_attr(buf, "nodeId", &node.node_id);
    if let Some(source_id) = &node.source_id {
        push_attr(buf, "sourceId", source_id);
    }
    if let Some(cache_type) = &node.cache_type {
        push_attr(buf, "cacheType", cache_type);
    }
    buf.push_str("/>");
}

/// Category attributes: `all` collapses the full set, `historical` the
/// historical union, remaining bits go out individually.
pub(crate) fn push_type_attributes(
    buf: &mut String,
    types: ReadoutType,
) {
    if types.bits() & ReadoutType::ALL.bits() == ReadoutType::ALL.bits() {
        push_attr(buf, "all", "true");
        return;
    }

    let mut remaining = types.bits();
    if remaining & ReadoutType::HISTORICAL.bits() == ReadoutType::HISTORICAL.bits() {
        push_attr(buf, "historical", "true");
        remaining &= !ReadoutType::HISTORICAL.bits();
    }
    for (flag, name) in ReadoutType::ATTRIBUTES {
        if remaining & flag.bits() != 0 {
            push_attr(buf, name, "true");
        }
    }
}
