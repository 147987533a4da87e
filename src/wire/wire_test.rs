use chrono::Duration;
use chrono::TimeZone;
use chrono::Utc;

use super::*;
use crate::fields::ReadoutType;
use crate::request::NodeReference;

#[test]
fn req_stanza_round_trips_through_parse_iq() {
    let when = Utc.with_ymd_and_hms(2017, 3, 15, 12, 30, 0).unwrap();
    let request = ReadoutRequest::new(ReadoutType::MOMENTARY)
        .with_nodes(vec![NodeReference::new("Device01")])
        .with_fields(["Temperature"]);

    let xml = req_stanza(3, &request, Some(when));
    let parsed = parse_iq(&xml).unwrap();

    match parsed {
        IqRequest::Readout {
            seqnr,
            when: parsed_when,
            request: parsed_request,
        } => {
            assert_eq!(seqnr, 3);
            assert_eq!(parsed_when, Some(when));
            assert_eq!(parsed_request, request);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn subscribe_stanza_round_trips_with_conditions_and_intervals() {
    let request = ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions = vec![FieldCondition::if_changed_up("Temperature", 0.5)
        .with_current_value(20.0)];

    let xml = subscribe_stanza(
        7,
        &request,
        &conditions,
        Some(Duration::minutes(5)),
        Some(Duration::seconds(10)),
        Some(Duration::hours(1)),
        true,
    );
    assert!(xml.contains(" maxAge=\"PT5M\""));
    assert!(xml.contains(" minInterval=\"PT10S\""));
    assert!(xml.contains(" maxInterval=\"PT1H\""));
    assert!(xml.contains(" req=\"true\""));

    match parse_iq(&xml).unwrap() {
        IqRequest::Subscribe {
            seqnr,
            conditions: parsed,
            max_age,
            min_interval,
            max_interval,
            immediate,
            ..
        } => {
            assert_eq!(seqnr, 7);
            assert_eq!(parsed, conditions);
            assert_eq!(max_age, Some(Duration::minutes(5)));
            assert_eq!(min_interval, Some(Duration::seconds(10)));
            assert_eq!(max_interval, Some(Duration::hours(1)));
            assert!(immediate);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn subscribe_stanza_carries_fields_without_conditions() {
    let request = ReadoutRequest::new(ReadoutType::MOMENTARY).with_fields(["Light", "Temperature"]);
    let conditions = vec![FieldCondition::if_changed_up("Temperature", 0.5)];

    let xml = subscribe_stanza(4, &request, &conditions, None, None, None, false);
    // the filtered-but-triggerless field goes out as a bare field element
    assert!(xml.contains(r#"<field name="Light"/>"#));

    match parse_iq(&xml).unwrap() {
        IqRequest::Subscribe {
            request: parsed, ..
        } => {
            let names = parsed.field_names().unwrap();
            assert!(names.contains("Light"));
            assert!(names.contains("Temperature"));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn condition_changed_by_suppresses_directional_attributes() {
    let condition = FieldCondition {
        field_name: "Energy".to_string(),
        current_value: None,
        changed_by: Some(1.0),
        changed_up: Some(2.0),
        changed_down: Some(3.0),
    };

    let xml = subscribe_stanza(1, &ReadoutRequest::default(), &[condition], None, None, None, false);

    assert!(xml.contains(" changedBy=\"1.0\""));
    assert!(!xml.contains("changedUp"));
    assert!(!xml.contains("changedDown"));
}

#[test]
fn subscribe_parse_skips_fields_without_trigger() {
    let xml = r#"<subscribe xmlns="urn:xmpp:iot:events" seqnr="2" momentary="true">
                   <field name="Temperature" changedUp="0.5"/>
                   <field name="Light"/>
                 </subscribe>"#;

    match parse_iq(xml).unwrap() {
        IqRequest::Subscribe { conditions, .. } => {
            assert_eq!(conditions.len(), 1);
            assert_eq!(conditions[0].field_name, "Temperature");
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn unsubscribe_and_cancel_round_trip() {
    assert_eq!(
        parse_iq(&unsubscribe_stanza(9)).unwrap(),
        IqRequest::Unsubscribe { seqnr: 9 }
    );
    assert_eq!(
        parse_iq(&cancel_stanza(4)).unwrap(),
        IqRequest::Cancel { seqnr: 4 }
    );
}

#[test]
fn parse_iq_rejects_unknown_payload() {
    assert!(parse_iq(r#"<bogus xmlns="urn:xmpp:iot:sensordata"/>"#).is_err());
}

#[test]
fn parse_iq_rejects_wrong_namespace() {
    assert!(parse_iq(r#"<req xmlns="urn:example:other" seqnr="1"/>"#).is_err());
}

#[test]
fn ack_payloads_round_trip() {
    assert_eq!(
        parse_ack(&accepted_payload(5)).unwrap(),
        IqAck::Accepted { seqnr: 5 }
    );
    assert_eq!(
        parse_ack(&cancelled_payload(5)).unwrap(),
        IqAck::Cancelled { seqnr: 5 }
    );
    assert_eq!(parse_ack("").unwrap(), IqAck::Empty);
    assert_eq!(parse_ack("   ").unwrap(), IqAck::Empty);
}

#[test]
fn rejected_ack_collects_error_text() {
    let xml = r#"<rejected xmlns="urn:xmpp:iot:sensordata" seqnr="1">
                   <error>Access denied.</error>
                 </rejected>"#;

    assert_eq!(
        parse_ack(xml).unwrap(),
        IqAck::Rejected {
            reason: "Access denied.".to_string()
        }
    );
}

#[test]
fn rejected_ack_without_text_gets_default_reason() {
    let xml = r#"<rejected xmlns="urn:xmpp:iot:sensordata" seqnr="1"/>"#;

    assert_eq!(
        parse_ack(xml).unwrap(),
        IqAck::Rejected {
            reason: "Readout rejected by remote device.".to_string()
        }
    );
}

#[test]
fn started_and_done_pushes_round_trip() {
    assert_eq!(
        parse_message(&started_push(8)).unwrap(),
        PushMessage::Started { seqnr: 8 }
    );
    assert_eq!(
        parse_message(&done_push(8)).unwrap(),
        PushMessage::Done { seqnr: 8 }
    );
}

#[test]
fn failure_push_round_trips_with_error_details() {
    let timepoint = Utc.with_ymd_and_hms(2017, 3, 15, 12, 0, 0).unwrap();
    let errors = vec![ReadoutError {
        timepoint: Some(timepoint),
        node_id: "Device01".to_string(),
        cache_type: Some("History".to_string()),
        source_id: None,
        text: "Sensor <offline>".to_string(),
    }];

    let xml = failure_push(6, true, &errors);
    assert!(xml.contains(" done=\"true\""));
    assert!(xml.contains("Sensor &lt;offline&gt;"));

    match parse_message(&xml).unwrap() {
        PushMessage::Failure {
            seqnr,
            done,
            errors: parsed,
        } => {
            assert_eq!(seqnr, 6);
            assert!(done);
            assert_eq!(parsed, errors);
        }
        other => panic!("unexpected push: {:?}", other),
    }
}

#[test]
fn annotate_fields_splices_into_the_opening_tag() {
    let xml = r#"<fields xmlns="urn:xmpp:iot:sensordata"><node nodeId="Device01"/></fields>"#;

    let annotated = annotate_fields(xml, 12, true);

    assert!(annotated.starts_with(r#"<fields seqnr="12" done="true" xmlns="#));

    match parse_message(&annotated).unwrap() {
        PushMessage::Fields(chunk) => {
            assert_eq!(chunk.seqnr, Some(12));
            assert!(chunk.done);
        }
        other => panic!("unexpected push: {:?}", other),
    }
}

#[test]
fn annotate_fields_without_done_leaves_flag_unset() {
    let xml = r#"<fields xmlns="urn:xmpp:iot:sensordata"/>"#;

    match parse_message(&annotate_fields(xml, 3, false)).unwrap() {
        PushMessage::Fields(chunk) => {
            assert_eq!(chunk.seqnr, Some(3));
            assert!(!chunk.done);
        }
        other => panic!("unexpected push: {:?}", other),
    }
}

#[test]
fn iq_reject_renders_condition_and_text() {
    let reject = IqReject::forbidden("Access denied");

    let xml = reject.to_xml();

    assert!(xml.starts_with(r#"<error type="cancel">"#));
    assert!(xml.contains(r#"<forbidden xmlns="urn:ietf:params:xml:ns:xmpp-stanzas"/>"#));
    assert!(xml.contains(">Access denied</text>"));
}
