use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use chrono::Utc;
use tokio::sync::mpsc;

use super::*;
use crate::config::ServerConfig;
use crate::export::SensorDataExport;
use crate::transport::Authorization;
use crate::transport::ContactState;
use crate::transport::MockContactDirectory;
use crate::transport::MockPeerChannel;
use crate::transport::MockProvisioning;
use crate::transport::MockReadoutSource;
use crate::transport::PeerAddress;
use crate::wire::parse_message;
use crate::wire::req_stanza;
use crate::wire::subscribe_stanza;
use crate::wire::unsubscribe_stanza;
use crate::wire::PushMessage;
use crate::FieldStatus;
use crate::ReadoutType;

type TestServer = ReadoutServer<MockPeerChannel, MockProvisioning, MockContactDirectory>;

fn capture_channel() -> (MockPeerChannel, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut channel = MockPeerChannel::new();
    channel.expect_send_message().returning(move |_, payload| {
        let _ = tx.send(payload);
        Ok(())
    });
    (channel, rx)
}

fn grant_all() -> MockProvisioning {
    let mut provisioning = MockProvisioning::new();
    provisioning
        .expect_can_read()
        .returning(|request, _| Authorization::Granted(request.clone()));
    provisioning
}

fn present_contacts() -> MockContactDirectory {
    let mut contacts = MockContactDirectory::new();
    contacts.expect_contact_state().returning(|_| ContactState {
        mutual: true,
        online: true,
    });
    contacts
}

fn thermometer() -> MockReadoutSource {
    let mut source = MockReadoutSource::new();
    source.expect_read().returning(|_, sink| {
        sink.start_node("Device01", None, None);
        sink.start_timestamp(Utc.with_ymd_and_hms(2017, 3, 15, 12, 0, 0).unwrap());
        sink.export_numeric(
            "Temperature",
            20.7,
            1,
            "C",
            ReadoutType::MOMENTARY,
            FieldStatus::AUTOMATIC_READOUT,
        );
        sink.end_timestamp();
        sink.end_node();
        Ok(())
    });
    source
}

fn server_with(
    channel: MockPeerChannel,
    provisioning: MockProvisioning,
    contacts: MockContactDirectory,
    source: MockReadoutSource,
) -> TestServer {
    ReadoutServer::new(
        Arc::new(channel),
        Arc::new(provisioning),
        Arc::new(contacts),
        Arc::new(source),
        ServerConfig::default(),
    )
}

fn peer() -> PeerAddress {
    PeerAddress::from("client@example.org/app")
}

async fn next_push(rx: &mut mpsc::UnboundedReceiver<String>) -> PushMessage {
    let payload = rx.recv().await.expect("push expected");
    parse_message(&payload).unwrap()
}

#[tokio::test]
async fn readout_streams_started_then_fields_with_done() {
    let (channel, mut rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let ack = server
        .handle_iq(&peer(), &req_stanza(1, &request, None))
        .await
        .unwrap();
    assert!(ack.contains("<accepted"));
    assert!(ack.contains("seqnr=\"1\""));

    assert_eq!(next_push(&mut rx).await, PushMessage::Started { seqnr: 1 });
    match next_push(&mut rx).await {
        PushMessage::Fields(chunk) => {
            assert_eq!(chunk.seqnr, Some(1));
            assert!(chunk.done);
            assert_eq!(chunk.fields.len(), 1);
            assert_eq!(chunk.fields[0].field_name(), "Temperature");
            assert_eq!(chunk.fields[0].node_id(), "Device01");
        }
        other => panic!("unexpected push: {:?}", other),
    }
}

#[tokio::test]
async fn empty_readout_ends_with_a_done_push() {
    let (channel, mut rx) = capture_channel();
    let mut source = MockReadoutSource::new();
    source.expect_read().returning(|_, _| Ok(()));
    let server = server_with(channel, grant_all(), present_contacts(), source);

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    server
        .handle_iq(&peer(), &req_stanza(2, &request, None))
        .await
        .unwrap();

    assert_eq!(next_push(&mut rx).await, PushMessage::Started { seqnr: 2 });
    assert_eq!(next_push(&mut rx).await, PushMessage::Done { seqnr: 2 });
}

#[tokio::test]
async fn failing_source_reports_a_terminal_failure() {
    let (channel, mut rx) = capture_channel();
    let mut source = MockReadoutSource::new();
    source
        .expect_read()
        .returning(|_, _| Err(crate::Error::Source("sensor unreachable".to_string())));
    let server = server_with(channel, grant_all(), present_contacts(), source);

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    server
        .handle_iq(&peer(), &req_stanza(3, &request, None))
        .await
        .unwrap();

    assert_eq!(next_push(&mut rx).await, PushMessage::Started { seqnr: 3 });
    match next_push(&mut rx).await {
        PushMessage::Failure {
            seqnr,
            done,
            errors,
        } => {
            assert_eq!(seqnr, 3);
            assert!(done);
            assert_eq!(errors.len(), 1);
            assert!(errors[0].text.contains("sensor unreachable"));
        }
        other => panic!("unexpected push: {:?}", other),
    }
}

#[tokio::test]
async fn denied_readout_is_rejected() {
    let (channel, mut rx) = capture_channel();
    let mut provisioning = MockProvisioning::new();
    provisioning
        .expect_can_read()
        .returning(|_, _| Authorization::Denied("not yours".to_string()));
    let server = server_with(channel, provisioning, present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let reject = server
        .handle_iq(&peer(), &req_stanza(4, &request, None))
        .await
        .unwrap_err();

    assert_eq!(reject.condition, "forbidden");
    assert_eq!(reject.text, "not yours");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn malformed_payload_is_rejected_as_bad_request() {
    let (channel, _rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let reject = server.handle_iq(&peer(), "<nonsense/>").await.unwrap_err();

    assert_eq!(reject.condition, "bad-request");
}

#[tokio::test(start_paused = true)]
async fn future_when_defers_the_readout() {
    let (channel, mut rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let when = Utc::now() + chrono::Duration::seconds(30);
    server
        .handle_iq(&peer(), &req_stanza(5, &request, Some(when)))
        .await
        .unwrap();

    // nothing goes out before the scheduled moment
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rx.try_recv().is_err());

    assert_eq!(next_push(&mut rx).await, PushMessage::Started { seqnr: 5 });
}

#[tokio::test(start_paused = true)]
async fn cancel_withdraws_a_scheduled_readout() {
    let (channel, mut rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let when = Utc::now() + chrono::Duration::seconds(30);
    server
        .handle_iq(&peer(), &req_stanza(6, &request, Some(when)))
        .await
        .unwrap();

    let ack = server
        .handle_iq(&peer(), "<cancel xmlns=\"urn:xmpp:iot:sensordata\" seqnr=\"6\"/>")
        .await
        .unwrap();
    assert!(ack.contains("<cancelled"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn subscription_with_bad_intervals_is_rejected() {
    let (channel, _rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let stanza = subscribe_stanza(
        7,
        &request,
        &[],
        None,
        Some(chrono::Duration::seconds(60)),
        Some(chrono::Duration::seconds(10)),
        false,
    );

    let reject = server.handle_iq(&peer(), &stanza).await.unwrap_err();
    assert_eq!(reject.condition, "bad-request");
}

#[tokio::test]
async fn triggered_subscription_pushes_one_event_per_batch() {
    let (channel, mut rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions =
        vec![crate::request::FieldCondition::if_changed_up("Temperature", 0.5).with_current_value(20.0)];
    let stanza = subscribe_stanza(8, &request, &conditions, None, None, None, false);
    server.handle_iq(&peer(), &stanza).await.unwrap();
    assert_eq!(server.subscription_count(), 1);

    // below threshold: no event
    let calm = crate::Field::new(
        "Device01",
        "Temperature",
        Utc::now(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        crate::FieldValue::Numeric {
            value: 20.3,
            nr_decimals: 1,
            unit: "C".to_string(),
        },
    );
    server.values_updated(&[calm]).await;
    assert!(rx.try_recv().is_err());

    // crossing the threshold fires a readout push
    let hot = crate::Field::new(
        "Device01",
        "Temperature",
        Utc::now(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        crate::FieldValue::Numeric {
            value: 21.2,
            nr_decimals: 1,
            unit: "C".to_string(),
        },
    );
    server.values_updated(&[hot]).await;

    assert_eq!(next_push(&mut rx).await, PushMessage::Started { seqnr: 8 });
    match next_push(&mut rx).await {
        PushMessage::Fields(chunk) => assert_eq!(chunk.seqnr, Some(8)),
        other => panic!("unexpected push: {:?}", other),
    }
}

#[tokio::test]
async fn stale_baseline_fires_at_subscribe_time() {
    let (channel, mut rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    // the device already reported 21.2 before anyone subscribed
    let hot = crate::Field::new(
        "Device01",
        "Temperature",
        Utc::now(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        crate::FieldValue::Numeric {
            value: 21.2,
            nr_decimals: 1,
            unit: "C".to_string(),
        },
    );
    server.values_updated(&[hot]).await;

    // a baseline of 20.0 is already a threshold behind the known value
    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions =
        vec![crate::request::FieldCondition::if_changed_up("Temperature", 0.5).with_current_value(20.0)];
    server
        .handle_iq(&peer(), &subscribe_stanza(13, &request, &conditions, None, None, None, false))
        .await
        .unwrap();

    assert_eq!(next_push(&mut rx).await, PushMessage::Started { seqnr: 13 });
    match next_push(&mut rx).await {
        PushMessage::Fields(chunk) => assert_eq!(chunk.seqnr, Some(13)),
        other => panic!("unexpected push: {:?}", other),
    }
}

#[tokio::test]
async fn offline_subscriber_gets_no_event() {
    let (channel, mut rx) = capture_channel();
    let mut contacts = MockContactDirectory::new();
    contacts.expect_contact_state().returning(|_| ContactState {
        mutual: true,
        online: false,
    });
    let server = server_with(channel, grant_all(), contacts, thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions =
        vec![crate::request::FieldCondition::if_changed_up("Temperature", 0.5).with_current_value(20.0)];
    server
        .handle_iq(&peer(), &subscribe_stanza(9, &request, &conditions, None, None, None, false))
        .await
        .unwrap();

    let hot = crate::Field::new(
        "Device01",
        "Temperature",
        Utc::now(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        crate::FieldValue::Numeric {
            value: 25.0,
            nr_decimals: 1,
            unit: "C".to_string(),
        },
    );
    server.values_updated(&[hot]).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(server.subscription_count(), 1);
}

#[tokio::test]
async fn non_mutual_subscriber_is_dropped() {
    let (channel, _rx) = capture_channel();
    let mut contacts = MockContactDirectory::new();
    contacts.expect_contact_state().returning(|_| ContactState {
        mutual: false,
        online: true,
    });
    let server = server_with(channel, grant_all(), contacts, thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions = vec![crate::request::FieldCondition::if_changed_by("Temperature", 1.0)];
    server
        .handle_iq(&peer(), &subscribe_stanza(10, &request, &conditions, None, None, None, false))
        .await
        .unwrap();
    assert_eq!(server.subscription_count(), 1);

    let update = crate::Field::new(
        "Device01",
        "Temperature",
        Utc::now(),
        ReadoutType::MOMENTARY,
        FieldStatus::AUTOMATIC_READOUT,
        crate::FieldValue::Numeric {
            value: 25.0,
            nr_decimals: 1,
            unit: "C".to_string(),
        },
    );
    server.values_updated(&[update]).await;

    assert_eq!(server.subscription_count(), 0);
}

#[tokio::test]
async fn unsubscribe_removes_the_matching_subscription() {
    let (channel, _rx) = capture_channel();
    let server = server_with(channel, grant_all(), present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions = vec![crate::request::FieldCondition::if_changed_by("Temperature", 1.0)];
    server
        .handle_iq(&peer(), &subscribe_stanza(11, &request, &conditions, None, None, None, false))
        .await
        .unwrap();

    // wrong seqnr is still acknowledged but leaves the subscription alone
    let ack = server
        .handle_iq(&peer(), &unsubscribe_stanza(99))
        .await
        .unwrap();
    assert!(ack.is_empty());
    assert_eq!(server.subscription_count(), 1);

    let ack = server
        .handle_iq(&peer(), &unsubscribe_stanza(11))
        .await
        .unwrap();
    assert!(ack.is_empty());
    assert_eq!(server.subscription_count(), 0);
}

#[tokio::test]
async fn clearing_the_authorization_cache_reauthorizes_subscriptions() {
    let (channel, _rx) = capture_channel();
    let mut provisioning = MockProvisioning::new();
    // grant at subscribe time, deny on re-check
    provisioning
        .expect_can_read()
        .times(1)
        .returning(|request, _| Authorization::Granted(request.clone()));
    provisioning
        .expect_can_read()
        .returning(|_, _| Authorization::Denied("revoked".to_string()));
    let server = server_with(channel, provisioning, present_contacts(), thermometer());

    let request = crate::request::ReadoutRequest::new(ReadoutType::MOMENTARY);
    let conditions = vec![crate::request::FieldCondition::if_changed_by("Temperature", 1.0)];
    server
        .handle_iq(&peer(), &subscribe_stanza(12, &request, &conditions, None, None, None, false))
        .await
        .unwrap();
    assert_eq!(server.subscription_count(), 1);

    server.clear_authorization_cache().await;

    assert_eq!(server.subscription_count(), 0);
}
