//! Tests for the inbound aggregator state machines

use bytes::Bytes;
use h2_bridge::{
    AggregateEvent, AggregateMessage, AggregationState, BridgeConfig, Cancellation, HeaderError,
    InboundAggregator, StartLine, StreamError,
};

use super::{example_request_block, h, messages, response_block};

fn responder() -> InboundAggregator {
    InboundAggregator::new(&BridgeConfig::responder())
}

fn initiator() -> InboundAggregator {
    InboundAggregator::new(&BridgeConfig::initiator())
}

fn example_message(method: &str, body: &'static [u8]) -> AggregateMessage {
    AggregateMessage {
        start_line: StartLine::Request {
            method: method.into(),
            path: "/example".into(),
            authority: Some("www.example.org:5555".into()),
            scheme: Some("http".into()),
        },
        headers: vec![
            h("Host", "www.example.org:5555"),
            h("foo", "goo"),
            h("foo", "goo2"),
            h("foo2", "goo2"),
        ],
        body: Bytes::from_static(body),
        trailers: vec![],
    }
}

#[test]
fn test_headers_only_request() {
    let mut agg = responder();
    agg.on_headers(5, example_request_block("GET"), true, false).unwrap();

    assert_eq!(
        agg.drain_events(),
        vec![AggregateEvent::Message {
            stream_id: 5,
            message: example_message("GET", b""),
        }]
    );
    assert_eq!(agg.live_streams(), 0);
}

#[test]
fn test_request_with_body() {
    let mut agg = responder();
    agg.on_headers(3, example_request_block("POST"), false, false).unwrap();
    assert!(agg.poll_event().is_none());

    agg.on_data(3, b"foooooogoooo", true).unwrap();
    assert_eq!(
        agg.drain_events(),
        vec![AggregateEvent::Message {
            stream_id: 3,
            message: example_message("POST", b"foooooogoooo"),
        }]
    );
}

#[test]
fn test_body_chunks_concatenate_in_order() {
    let mut agg = responder();
    agg.on_headers(7, example_request_block("PUT"), false, false).unwrap();
    agg.on_data(7, b"foo", false).unwrap();
    agg.on_data(7, b"", false).unwrap();
    assert_eq!(agg.state(7), Some(AggregationState::BodyReceived));
    agg.on_data(7, b"ooo", false).unwrap();
    agg.on_data(7, b"goooo", false).unwrap();
    assert!(agg.poll_event().is_none());
    agg.on_data(7, b"", true).unwrap();

    let got = messages(&agg.drain_events());
    assert_eq!(got.len(), 1);
    assert_eq!(&got[0].1.body[..], b"foooooogoooo");
}

#[test]
fn test_trailers_complete_the_message() {
    let mut agg = responder();
    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    agg.on_data(1, b"payload", false).unwrap();
    agg.on_trailers(1, vec![h("grpc-status", "0"), h("x-checksum", "abc")], true)
        .unwrap();

    let got = messages(&agg.drain_events());
    assert_eq!(got.len(), 1);
    let (stream_id, message) = &got[0];
    assert_eq!(*stream_id, 1);
    assert_eq!(&message.body[..], b"payload");
    assert_eq!(
        message.trailers,
        vec![h("grpc-status", "0"), h("x-checksum", "abc")]
    );
}

#[test]
fn test_trailers_right_after_headers() {
    let mut agg = initiator();
    agg.on_headers(1, response_block("200"), false, false).unwrap();
    agg.on_trailers(1, vec![h("grpc-status", "0")], true).unwrap();

    let got = messages(&agg.drain_events());
    assert_eq!(got[0].1.status(), Some(200));
    assert!(got[0].1.body.is_empty());
    assert_eq!(got[0].1.trailers, vec![h("grpc-status", "0")]);
}

#[test]
fn test_trailers_must_end_the_stream() {
    let mut agg = responder();
    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    let err = agg.on_trailers(1, vec![h("x", "y")], false).unwrap_err();
    assert!(matches!(err, StreamError::StreamSequence { stream_id: 1, .. }));

    assert_eq!(
        agg.drain_events(),
        vec![AggregateEvent::Cancelled {
            stream_id: 1,
            reason: Cancellation::Failed(err),
        }]
    );
    assert_eq!(agg.state(1), None);
}

#[test]
fn test_pseudo_header_in_trailers() {
    let mut agg = responder();
    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    let err = agg.on_trailers(1, vec![h(":status", "200")], true).unwrap_err();
    assert_eq!(
        err,
        StreamError::Header {
            stream_id: 1,
            source: HeaderError::UnexpectedPseudoHeader(":status".into()),
        }
    );
    assert!(matches!(
        agg.poll_event(),
        Some(AggregateEvent::Cancelled { stream_id: 1, .. })
    ));
}

#[test]
fn test_data_before_headers() {
    let mut agg = responder();
    let err = agg.on_data(9, b"early", false).unwrap_err();
    assert!(matches!(err, StreamError::StreamSequence { stream_id: 9, .. }));
    // Nothing was live, so nothing to cancel.
    assert!(agg.poll_event().is_none());

    let err = agg.on_trailers(9, vec![h("x", "y")], true).unwrap_err();
    assert!(matches!(err, StreamError::StreamSequence { stream_id: 9, .. }));
    assert!(agg.poll_event().is_none());
}

#[test]
fn test_missing_method_cancels_stream() {
    let mut agg = responder();
    let mut block = example_request_block("GET");
    block.pseudo.retain(|f| f.name != ":method");

    let err = agg.on_headers(3, block, false, false).unwrap_err();
    assert_eq!(err.to_string(), "stream 3: missing mandatory pseudo-header :method");
    assert_eq!(
        agg.drain_events(),
        vec![AggregateEvent::Cancelled {
            stream_id: 3,
            reason: Cancellation::Failed(err),
        }]
    );

    // Later frames for the failed stream are sequence errors with no second cancel.
    assert!(agg.on_data(3, b"late", true).is_err());
    assert!(agg.poll_event().is_none());
}

#[test]
fn test_reset_in_each_live_state() {
    let mut agg = responder();

    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    agg.on_headers(3, example_request_block("POST"), false, false).unwrap();
    agg.on_data(3, b"some", false).unwrap();

    agg.on_reset(1, 0x8);
    agg.on_reset(3, 0x2);

    assert_eq!(
        agg.drain_events(),
        vec![
            AggregateEvent::Cancelled {
                stream_id: 1,
                reason: Cancellation::Reset { error_code: 0x8 },
            },
            AggregateEvent::Cancelled {
                stream_id: 3,
                reason: Cancellation::Reset { error_code: 0x2 },
            },
        ]
    );
    assert_eq!(agg.live_streams(), 0);
}

#[test]
fn test_reset_of_unknown_or_finished_stream_is_noop() {
    let mut agg = responder();
    agg.on_reset(11, 0x8);
    assert!(agg.poll_event().is_none());

    agg.on_headers(13, example_request_block("GET"), true, false).unwrap();
    agg.on_reset(13, 0x8);
    let events = agg.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], AggregateEvent::Message { stream_id: 13, .. }));
}

#[test]
fn test_body_limit_is_inclusive() {
    let config = BridgeConfig::responder().with_max_aggregate_body_size(8);
    let mut agg = InboundAggregator::new(&config);

    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    agg.on_data(1, b"1234", false).unwrap();
    agg.on_data(1, b"5678", true).unwrap();
    assert_eq!(messages(&agg.drain_events())[0].1.body.len(), 8);

    agg.on_headers(3, example_request_block("POST"), false, false).unwrap();
    agg.on_data(3, b"1234", false).unwrap();
    let err = agg.on_data(3, b"56789", false).unwrap_err();
    assert_eq!(err, StreamError::MessageTooLarge { stream_id: 3, limit: 8 });
    assert_eq!(err.error_code(), 0x8);
    assert_eq!(
        agg.drain_events(),
        vec![AggregateEvent::Cancelled {
            stream_id: 3,
            reason: Cancellation::Failed(err),
        }]
    );
}

#[test]
fn test_informational_then_final_response() {
    let mut agg = initiator();

    let mut interim = response_block("103");
    interim.regular.push(h("Link", "</style.css>; rel=preload"));
    agg.on_headers(1, interim, false, true).unwrap();
    assert_eq!(agg.state(1), Some(AggregationState::AwaitingHeaders));

    agg.on_headers(1, response_block("100"), false, true).unwrap();
    agg.on_headers(1, response_block("200"), false, false).unwrap();
    agg.on_data(1, b"done", true).unwrap();

    let got = messages(&agg.drain_events());
    assert_eq!(got.len(), 3);
    assert!(got[0].1.is_informational());
    assert_eq!(got[0].1.status(), Some(103));
    assert_eq!(got[0].1.header("link"), Some("</style.css>; rel=preload"));
    assert!(got[0].1.body.is_empty());
    assert_eq!(got[1].1.start_line, StartLine::Informational { status: 100 });
    assert_eq!(got[2].1.start_line, StartLine::Response { status: 200 });
    assert_eq!(&got[2].1.body[..], b"done");
}

#[test]
fn test_informational_errors() {
    let mut agg = initiator();
    let err = agg.on_headers(1, response_block("100"), true, true).unwrap_err();
    assert!(matches!(err, StreamError::StreamSequence { stream_id: 1, .. }));
    assert!(matches!(
        agg.poll_event(),
        Some(AggregateEvent::Cancelled { stream_id: 1, .. })
    ));

    agg.on_headers(3, response_block("200"), false, false).unwrap();
    let err = agg.on_headers(3, response_block("100"), false, true).unwrap_err();
    assert!(matches!(err, StreamError::StreamSequence { stream_id: 3, .. }));
    assert!(matches!(
        agg.poll_event(),
        Some(AggregateEvent::Cancelled { stream_id: 3, .. })
    ));
}

#[test]
fn test_responder_ignores_informational_flag() {
    let mut agg = responder();
    agg.on_headers(1, example_request_block("GET"), true, true).unwrap();
    let got = messages(&agg.drain_events());
    assert_eq!(got[0].1.method(), Some("GET"));
}

#[test]
fn test_interleaved_streams_are_isolated() {
    let mut agg = responder();
    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    agg.on_headers(3, example_request_block("PUT"), false, false).unwrap();
    agg.on_data(1, b"one-", false).unwrap();
    agg.on_data(3, b"three-", false).unwrap();

    let mut bad = example_request_block("GET");
    bad.pseudo.retain(|f| f.name != ":path");
    assert!(agg.on_headers(5, bad, true, false).is_err());

    agg.on_data(3, b"done", true).unwrap();
    agg.on_data(1, b"done", true).unwrap();

    let events = agg.drain_events();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], AggregateEvent::Cancelled { stream_id: 5, .. }));

    let got = messages(&events);
    assert_eq!(got[0].0, 3);
    assert_eq!(got[0].1.method(), Some("PUT"));
    assert_eq!(&got[0].1.body[..], b"three-done");
    assert_eq!(got[1].0, 1);
    assert_eq!(got[1].1.method(), Some("POST"));
    assert_eq!(&got[1].1.body[..], b"one-done");
}

#[test]
fn test_duplicate_headers_on_live_stream() {
    let mut agg = responder();
    agg.on_headers(1, example_request_block("POST"), false, false).unwrap();
    agg.on_data(1, b"x", false).unwrap();

    // A repeated leading block on a stream past its headers.
    let err = agg.on_headers(1, example_request_block("POST"), false, false).unwrap_err();
    assert_eq!(err, StreamError::DuplicateStream { stream_id: 1 });
    assert!(matches!(
        agg.poll_event(),
        Some(AggregateEvent::Cancelled { stream_id: 1, .. })
    ));
}

#[test]
fn test_closed_stream_id_not_reused() {
    let mut agg = responder();
    agg.on_headers(5, example_request_block("GET"), true, false).unwrap();
    agg.drain_events();

    let err = agg.on_headers(5, example_request_block("GET"), true, false).unwrap_err();
    assert_eq!(err, StreamError::DuplicateStream { stream_id: 5 });
    let err = agg.on_headers(3, example_request_block("GET"), true, false).unwrap_err();
    assert_eq!(err, StreamError::DuplicateStream { stream_id: 3 });
    assert!(agg.poll_event().is_none());

    agg.on_headers(7, example_request_block("GET"), true, false).unwrap();
    assert_eq!(messages(&agg.drain_events())[0].0, 7);
}

#[test]
fn test_initiator_accepts_responses_out_of_order() {
    let mut agg = initiator();
    agg.on_headers(5, response_block("200"), true, false).unwrap();
    agg.on_headers(1, response_block("404"), true, false).unwrap();
    let got = messages(&agg.drain_events());
    assert_eq!(got[0].0, 5);
    assert_eq!(got[1].0, 1);
    assert_eq!(got[1].1.status(), Some(404));
}

#[test]
fn test_initiator_rejects_finished_stream_id() {
    let mut agg = initiator();
    agg.on_headers(1, response_block("200"), true, false).unwrap();
    agg.on_headers(3, response_block("200"), false, false).unwrap();
    agg.on_reset(3, 0x8);
    agg.drain_events();

    let err = agg.on_headers(1, response_block("500"), true, false).unwrap_err();
    assert_eq!(err, StreamError::DuplicateStream { stream_id: 1 });
    let err = agg.on_headers(3, response_block("200"), true, false).unwrap_err();
    assert_eq!(err, StreamError::DuplicateStream { stream_id: 3 });
    let err = agg.on_headers(1, response_block("100"), false, true).unwrap_err();
    assert_eq!(err, StreamError::DuplicateStream { stream_id: 1 });

    // No second message and nothing live to cancel.
    assert!(agg.poll_event().is_none());
}

#[test]
fn test_shutdown_cancels_live_streams_in_order() {
    let mut agg = responder();
    agg.on_headers(9, example_request_block("POST"), false, false).unwrap();
    agg.on_headers(11, example_request_block("GET"), true, false).unwrap();
    agg.on_headers(13, example_request_block("POST"), false, false).unwrap();
    agg.on_data(13, b"half", false).unwrap();
    agg.drain_events();

    agg.shutdown();
    assert_eq!(
        agg.drain_events(),
        vec![
            AggregateEvent::Cancelled {
                stream_id: 9,
                reason: Cancellation::ConnectionClosed,
            },
            AggregateEvent::Cancelled {
                stream_id: 13,
                reason: Cancellation::ConnectionClosed,
            },
        ]
    );
    assert_eq!(agg.live_streams(), 0);
}
