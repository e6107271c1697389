use fc_local_framing::{
    decode_streams, output_channel, CollectingSink, EnvelopeBuilder, FramingDecoder,
};
use fc_local_models::{ErrorType, ExecutionInfo, LocalError};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// 1x1 transparent PNG.
const PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

fn info() -> ExecutionInfo {
    ExecutionInfo {
        request_id: Some("4b6b1f5c-1d2e".into()),
        billed_time_ms: Some(100),
        memory_limit_mb: Some(128),
        memory_usage_mb: Some(17),
    }
}

fn decode(stdout: &[u8], stderr: &[u8], chunk: usize) -> (fc_local_framing::FramedOutput, Vec<String>) {
    let sink = Arc::new(Mutex::new(CollectingSink::default()));
    let mut decoder = FramingDecoder::new(Box::new(sink.clone()));
    for piece in stdout.chunks(chunk.max(1)) {
        decoder.feed_stdout(piece);
    }
    if !stderr.is_empty() {
        decoder.feed_stderr(stderr);
    }
    let out = decoder.finish();
    let lines = sink.lock().unwrap().lines.clone();
    (out, lines)
}

#[test]
fn binary_body_survives_round_trip() {
    let headers = vec![("content-type".to_string(), "image/png".to_string())];
    let envelope = EnvelopeBuilder::new()
        .log("FunctionCompute python3 runtime inited.")
        .response(200, "OK", &headers, PNG)
        .execution_info(&info())
        .log("after")
        .build();

    for chunk in [1, 7, 64, envelope.len()] {
        let (out, logs) = decode(&envelope, b"", chunk);
        assert_eq!(logs, vec!["FunctionCompute python3 runtime inited.", "after"]);
        let result = out.into_result().unwrap();
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.headers, headers);
        assert_eq!(&result.body[..], PNG);
        assert_eq!(result.request_id.as_deref(), Some("4b6b1f5c-1d2e"));
        assert_eq!(result.billed_time_ms, Some(100));
        assert_eq!(result.memory_usage_mb, Some(17));
        assert_eq!(result.error_type, ErrorType::None);
    }
}

#[test]
fn embedded_line_breaks_survive_round_trip() {
    let body = b"first\nsecond\r\nthird\r\n\r\nlast\n";
    let headers = vec![
        ("x-fc-http-params".to_string(), "eyJzdGF0dXMiOjIwMH0=".to_string()),
        ("set-cookie".to_string(), "a=1".to_string()),
        ("set-cookie".to_string(), "b=2".to_string()),
    ];
    let envelope = EnvelopeBuilder::new()
        .response(201, "Created", &headers, body)
        .execution_info(&info())
        .build();

    let (out, _) = decode(&envelope, b"", 5);
    let result = out.into_result().unwrap();
    assert_eq!(result.status_code, Some(201));
    assert_eq!(result.status_message.as_deref(), Some("Created"));
    assert_eq!(result.headers, headers);
    assert_eq!(&result.body[..], body);
}

#[test]
fn empty_body_with_error_output_is_unhandled() {
    let envelope = EnvelopeBuilder::new()
        .response(200, "OK", &[], b"")
        .execution_info(&info())
        .build();

    let (out, _) = decode(&envelope, b"Traceback (most recent call last):\n", 32);
    let result = out.into_result().unwrap();
    assert_eq!(result.error_type, ErrorType::UnhandledInvocationError);
    assert_eq!(result.status_code, Some(200));
    assert!(result.body.is_empty());
    let body: serde_json::Value = serde_json::from_slice(&result.error_body()).unwrap();
    assert_eq!(
        body["errorMessage"],
        "Process exited unexpectedly before completing request (duration: 100ms, maxMemoryUsage: 17MB)"
    );
}

#[test]
fn body_with_error_output_is_handled() {
    let envelope = EnvelopeBuilder::new()
        .response(200, "OK", &[], br#"{"errorMessage":"bad input"}"#)
        .execution_info(&info())
        .build();

    let (out, _) = decode(&envelope, b"bad input\n", 32);
    let result = out.into_result().unwrap();
    assert_eq!(result.error_type, ErrorType::HandledInvocationError);
    assert_eq!(&result.body[..], br#"{"errorMessage":"bad input"}"#);
}

#[test]
fn execution_info_without_response_is_an_application_error() {
    let envelope = EnvelopeBuilder::new().execution_info(&info()).build();
    let (out, _) = decode(&envelope, b"", 16);
    let result = out.into_result().unwrap();
    assert_eq!(result.status_code, None);
    assert_eq!(result.error_type, ErrorType::UnhandledInvocationError);
}

#[test]
fn neither_region_is_a_process_crash() {
    let (out, logs) = decode(b"Killed\n", b"", 3);
    assert_eq!(logs, vec!["Killed"]);
    assert!(matches!(out.into_result(), Err(LocalError::ProcessCrash { .. })));
}

#[tokio::test]
async fn stream_readers_feed_one_decoder() {
    let envelope = EnvelopeBuilder::new()
        .log("starting")
        .response(200, "OK", &[], b"pong")
        .execution_info(&info())
        .build();
    let (writers, streams) = output_channel(4);

    let producer = tokio::spawn(async move {
        for chunk in envelope.chunks(10) {
            writers.stdout.send(bytes::Bytes::copy_from_slice(chunk)).await.unwrap();
        }
        writers.stderr.send(bytes::Bytes::from_static(b"warn\n")).await.unwrap();
    });

    let sink = Arc::new(Mutex::new(CollectingSink::default()));
    let decoder = FramingDecoder::new(Box::new(sink.clone()));
    let out = decode_streams(streams, decoder, CancellationToken::new()).await;
    producer.await.unwrap();

    assert_eq!(sink.lock().unwrap().errors, b"warn\n");
    let result = out.into_result().unwrap();
    assert_eq!(&result.body[..], b"pong");
    assert_eq!(result.error_type, ErrorType::HandledInvocationError);
}

#[tokio::test]
async fn cancellation_stops_readers() {
    let (writers, streams) = output_channel(4);
    let cancel = CancellationToken::new();
    let decoder = FramingDecoder::new(Box::new(CollectingSink::default()));

    let task = tokio::spawn(decode_streams(streams, decoder, cancel.clone()));
    writers.stdout.send(bytes::Bytes::from_static(b"partial")).await.unwrap();
    cancel.cancel();

    let out = tokio::time::timeout(std::time::Duration::from_secs(1), task)
        .await
        .expect("decoder did not stop after cancel")
        .unwrap();
    assert!(out.response.is_none());
    drop(writers);
}
