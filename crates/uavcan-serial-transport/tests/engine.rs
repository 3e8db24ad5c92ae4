//! Engine-level integration tests driven over an in-memory loopback pair.

use std::time::{Duration, Instant};

use uavcan_serial_proto::{
    DataSpecifier, Frame, NodeId, ParserEvent, Priority, Role, ServiceId, StreamParser, SubjectId,
};
use uavcan_serial_transport::{CloseReason, EngineConfig, Endpoint, LoopbackEndpoint, TransportEngine, TransportError, MIN_MTU};

fn config(local_node_id: Option<NodeId>, service_duplication: u8) -> EngineConfig {
    EngineConfig::new(local_node_id, MIN_MTU, service_duplication, None).unwrap()
}

#[test]
fn construction_rejects_an_endpoint_that_is_not_already_open() {
    let (mut endpoint, _peer) = LoopbackEndpoint::pair("a", "b");
    endpoint.close().unwrap();

    let result = TransportEngine::new(Box::new(endpoint), config(None, 1));
    assert!(matches!(result, Err(TransportError::MediaConfig(_))));
}

#[tokio::test]
async fn message_round_trips_and_updates_statistics_on_both_ends() {
    let (endpoint_a, endpoint_b) = LoopbackEndpoint::pair("a", "b");
    let node_a = NodeId::new(1).unwrap();
    let node_b = NodeId::new(2).unwrap();

    let engine_a = TransportEngine::new(Box::new(endpoint_a), config(Some(node_a), 1)).unwrap();
    let engine_b = TransportEngine::new(Box::new(endpoint_b), config(Some(node_b), 1)).unwrap();

    let subject = DataSpecifier::Message(SubjectId::new(7).unwrap());
    let input = engine_b.get_input_session(subject, None).await.unwrap();
    let output = engine_a.get_output_session(subject, None).await.unwrap();

    let frame = Frame::new(
        Priority::Nominal,
        Some(node_a),
        None,
        subject,
        0xDEAD_BEEF,
        1,
        0,
        true,
        b"hello",
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(1);
    let sent_at = output.send_transfer(&[frame], deadline).await.unwrap();
    assert!(sent_at.is_some());

    let received = tokio::time::timeout(Duration::from_secs(1), input.recv())
        .await
        .expect("frame should arrive before the test timeout")
        .expect("session should still be open");
    assert_eq!(received.payload.as_ref(), b"hello");
    assert_eq!(received.source_node_id, Some(node_a));
    assert_eq!(received.destination_node_id, None);

    let stats_a = engine_a.sample_statistics();
    assert_eq!(stats_a.out_frames, 1);
    assert_eq!(stats_a.out_transfers, 1);
    assert_eq!(stats_a.out_incomplete, 0);
    assert!(stats_a.out_bytes > 0);

    let stats_b = engine_b.sample_statistics();
    assert_eq!(stats_b.in_frames, 1);
    assert!(stats_b.in_bytes > 0);

    engine_a.close().await;
    engine_b.close().await;
}

#[tokio::test]
async fn wildcard_and_exact_subscriptions_both_receive_a_matching_frame() {
    let (endpoint_a, endpoint_b) = LoopbackEndpoint::pair("a", "b");
    let node_a = NodeId::new(3).unwrap();
    let node_b = NodeId::new(4).unwrap();

    let engine_a = TransportEngine::new(Box::new(endpoint_a), config(Some(node_a), 1)).unwrap();
    let engine_b = TransportEngine::new(Box::new(endpoint_b), config(Some(node_b), 1)).unwrap();

    let subject = DataSpecifier::Message(SubjectId::new(9).unwrap());
    let exact = engine_b.get_input_session(subject, Some(node_a)).await.unwrap();
    let wildcard = engine_b.get_input_session(subject, None).await.unwrap();
    let output = engine_a.get_output_session(subject, None).await.unwrap();

    let frame =
        Frame::new(Priority::Nominal, Some(node_a), None, subject, 1, 1, 0, true, b"x").unwrap();
    let deadline = Instant::now() + Duration::from_secs(1);
    output.send_transfer(&[frame], deadline).await.unwrap();

    let from_exact = tokio::time::timeout(Duration::from_secs(1), exact.recv()).await.unwrap();
    let from_wildcard = tokio::time::timeout(Duration::from_secs(1), wildcard.recv()).await.unwrap();
    assert!(from_exact.is_some());
    assert!(from_wildcard.is_some());

    engine_a.close().await;
    engine_b.close().await;
}

#[tokio::test]
async fn frame_addressed_to_a_foreign_node_is_not_delivered() {
    let (endpoint_a, endpoint_b) = LoopbackEndpoint::pair("a", "b");
    let node_a = NodeId::new(5).unwrap();
    let node_b = NodeId::new(6).unwrap();
    let node_other = NodeId::new(7).unwrap();

    let engine_a = TransportEngine::new(Box::new(endpoint_a), config(Some(node_a), 1)).unwrap();
    let engine_b = TransportEngine::new(Box::new(endpoint_b), config(Some(node_b), 1)).unwrap();

    let subject = DataSpecifier::Message(SubjectId::new(11).unwrap());
    let input = engine_b.get_input_session(subject, None).await.unwrap();
    let output = engine_a.get_output_session(subject, None).await.unwrap();

    let frame = Frame::new(
        Priority::Nominal,
        Some(node_a),
        Some(node_other),
        subject,
        1,
        1,
        0,
        true,
        b"x",
    )
    .unwrap();
    let deadline = Instant::now() + Duration::from_secs(1);
    output.send_transfer(&[frame], deadline).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(300), input.recv()).await;
    assert!(outcome.is_err(), "a frame addressed elsewhere must never be delivered");

    engine_a.close().await;
    engine_b.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_unblocks_pending_recv() {
    let (endpoint, _peer) = LoopbackEndpoint::pair("a", "b");
    let engine = TransportEngine::new(Box::new(endpoint), config(None, 1)).unwrap();

    let subject = DataSpecifier::Message(SubjectId::new(1).unwrap());
    let input = engine.get_input_session(subject, None).await.unwrap();

    engine.close().await;
    engine.close().await;

    assert_eq!(engine.close_reason(), Some(CloseReason::Explicit));
    assert!(input.recv().await.is_none());

    let result = engine.get_input_session(subject, None).await;
    assert!(matches!(result, Err(TransportError::ResourceClosed)));
}

#[tokio::test]
async fn service_output_session_retransmits_the_configured_number_of_times() {
    let (endpoint_a, mut endpoint_b) = LoopbackEndpoint::pair("a", "b");
    let node_a = NodeId::new(8).unwrap();

    let engine_a = TransportEngine::new(Box::new(endpoint_a), config(Some(node_a), 3)).unwrap();

    let service = DataSpecifier::Service { service: ServiceId::new(5).unwrap(), role: Role::Request };
    let output = engine_a.get_output_session(service, None).await.unwrap();
    assert_eq!(output.duplication(), 3);

    let frame =
        Frame::new(Priority::Nominal, Some(node_a), None, service, 1, 1, 0, true, b"x").unwrap();
    let deadline = Instant::now() + Duration::from_secs(1);
    let sent_at = output.send_transfer(&[frame], deadline).await.unwrap();
    assert!(sent_at.is_some());

    let mut parser = StreamParser::new(4096);
    let mut frame_count = 0usize;
    loop {
        let chunk = endpoint_b.read(4096, Duration::from_millis(200)).unwrap();
        if chunk.is_empty() {
            break;
        }
        parser.feed(&chunk, Instant::now(), |event, _| {
            if matches!(event, ParserEvent::Frame(_)) {
                frame_count += 1;
            }
        });
    }
    assert_eq!(frame_count, 3);

    let stats = engine_a.sample_statistics();
    assert_eq!(stats.out_transfers, 3);
    assert_eq!(stats.out_frames, 3);

    engine_a.close().await;
}

#[tokio::test]
async fn out_of_band_bytes_are_counted_and_never_delivered_as_a_frame() {
    let (endpoint_a, mut endpoint_b) = LoopbackEndpoint::pair("a", "b");
    let engine_a = TransportEngine::new(Box::new(endpoint_a), config(None, 1)).unwrap();

    let subject = DataSpecifier::Message(SubjectId::new(2).unwrap());
    let input = engine_a.get_input_session(subject, None).await.unwrap();

    // Garbage terminated by a delimiter so the parser's OOB span actually
    // flushes (an un-terminated span sits in the scratch buffer forever,
    // per the resynchronisation design).
    endpoint_b.write(&[0xAA, 0xBB, 0xCC, 0x9E], Duration::from_millis(100)).unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(300), input.recv()).await;
    assert!(outcome.is_err(), "bare garbage must never decode into a frame");

    let stats = engine_a.sample_statistics();
    assert!(stats.in_out_of_band_bytes >= 3);
    assert_eq!(stats.in_frames, 0);

    engine_a.close().await;
}
