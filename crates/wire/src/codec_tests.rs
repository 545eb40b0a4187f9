// SPDX-License-Identifier: MIT

use super::*;
use crate::frame::{Frame, FrameResultStatus};
use templar_core::DelegationId;

#[test]
fn encode_returns_json_without_length_prefix() {
    let frame = Frame::HeartbeatPing { timestamp_ms: 7 };
    let encoded = encode(&frame).expect("encode failed");
    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(json_str.starts_with('{'), "should be JSON object: {json_str}");
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";
    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.expect("write failed");
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.expect("read failed");
    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_big_endian_length_prefix() {
    let data = b"test data";
    let mut buffer = Vec::new();
    write_message(&mut buffer, data).await.expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn read_message_rejects_oversize_frame() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, &vec![0u8; 100]).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor, 10).await.unwrap_err();
    assert!(matches!(err, ProtocolError::FrameTooLarge { size: 100, limit: 10 }));
}

#[tokio::test]
async fn frame_roundtrips_through_the_wire() {
    let frame = Frame::DelegationResult {
        delegation_id: DelegationId::new("d1"),
        status: FrameResultStatus::Completed,
        result: Some(serde_json::json!({"answer": 42})),
    };
    let payload = encode(&frame).expect("encode");

    let mut buffer = Vec::new();
    write_message(&mut buffer, &payload).await.expect("write");

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.expect("read");
    let decoded: Frame = decode(&read_back).expect("decode");
    assert_eq!(decoded, frame);
}
