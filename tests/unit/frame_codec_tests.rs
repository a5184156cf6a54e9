//! Unit tests for the blank-line frame codec.
//!
//! Covers:
//! - both delimiters, earliest one first
//! - split invariance across arbitrary read boundaries, including inside a
//!   delimiter and inside a multi-byte character
//! - keep-alive frames, end-of-stream remainder, and the frame size limit

use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use kbase_chat::stream::codec::{Frame, FrameCodec, FrameDecoder};
use kbase_chat::stream::event::{interpret_frame, StreamEvent};
use kbase_chat::AppError;

const STREAM: &str = concat!(
    "data: {\"event\":\"meta\",\"data\":{\"conversationId\":7,\"assistantMessageId\":42}}\n\n",
    "data: {\"event\":\"chunk\",\"data\":{\"delta\":\"Grüße \"}}\r\n\r\n",
    ": keep-alive\n\n",
    "data: {\"event\":\"chunk\",\"data\":{\"delta\":\"aus 東京\"}}\n\n",
    "data: {\"event\":\"done\",\"data\":{\"content\":\"Grüße aus 東京\"}}\n\n",
);

fn decode_in_slices(bytes: &[u8], boundaries: &[usize]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut start = 0;
    for &end in boundaries {
        frames.extend(decoder.push(&bytes[start..end]).expect("push succeeds"));
        start = end;
    }
    frames.extend(decoder.push(&bytes[start..]).expect("push succeeds"));
    frames.extend(decoder.finish().expect("finish succeeds"));
    frames
}

fn events(frames: &[Frame]) -> Vec<StreamEvent> {
    frames
        .iter()
        .filter_map(|frame| interpret_frame(frame).expect("frame interprets"))
        .collect()
}

// ── Delimiters ──────────────────────────────────────────────────────────────

/// A single `\n\n`-terminated frame decodes to its data line.
#[test]
fn lf_delimited_frame_decodes() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("data: hello\n\nrest");

    let frame = codec
        .decode(&mut buf)
        .expect("decode succeeds")
        .expect("frame is complete");

    assert_eq!(frame.data, vec!["hello".to_owned()]);
    assert_eq!(&buf[..], b"rest", "delimiter must be consumed");
}

/// `\r\n\r\n` frames decode with carriage returns stripped from lines.
#[test]
fn crlf_delimited_frame_decodes() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("event: chunk\r\ndata: hi\r\n\r\n");

    let frame = codec
        .decode(&mut buf)
        .expect("decode succeeds")
        .expect("frame is complete");

    assert_eq!(frame.event.as_deref(), Some("chunk"));
    assert_eq!(frame.data, vec!["hi".to_owned()]);
    assert!(buf.is_empty());
}

/// Without a delimiter nothing is emitted until end of stream.
#[test]
fn incomplete_frame_waits_for_delimiter() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.push(b"data: partial").expect("push succeeds");
    assert!(frames.is_empty());
    assert_eq!(decoder.pending_bytes(), "data: partial".len());

    let flushed = decoder.finish().expect("finish succeeds");
    assert_eq!(flushed.len(), 1, "remainder is emitted at end of stream");
    assert_eq!(flushed[0].data, vec!["partial".to_owned()]);
}

/// Multiple `data:` lines in one frame are joined with newlines.
#[test]
fn multi_line_data_is_joined() {
    let frame = Frame::parse("data: line one\ndata: line two");
    assert_eq!(frame.payload().as_deref(), Some("line one\nline two"));
}

// ── Split invariance ────────────────────────────────────────────────────────

/// Every single split point yields the same frames as one block.
#[test]
fn every_split_point_yields_identical_frames() {
    let bytes = STREAM.as_bytes();
    let whole = decode_in_slices(bytes, &[]);
    assert_eq!(whole.len(), 5);

    for split in 1..bytes.len() {
        let split_frames = decode_in_slices(bytes, &[split]);
        assert_eq!(split_frames, whole, "split at byte {split} changed the frames");
    }
}

/// Byte-at-a-time delivery yields the same decoded events.
#[test]
fn byte_at_a_time_yields_identical_events() {
    let bytes = STREAM.as_bytes();
    let boundaries: Vec<usize> = (1..bytes.len()).collect();

    let expected = events(&decode_in_slices(bytes, &[]));
    let actual = events(&decode_in_slices(bytes, &boundaries));

    assert_eq!(actual, expected);
    assert_eq!(
        actual.last(),
        Some(&StreamEvent::Done(kbase_chat::stream::event::DonePayload {
            content: Some("Grüße aus 東京".to_owned()),
            ..Default::default()
        }))
    );
}

/// Splitting inside a multi-byte character keeps the text intact.
#[test]
fn split_inside_multibyte_character_keeps_text() {
    let bytes = STREAM.as_bytes();
    let inside = STREAM.find('東').expect("marker present") + 1;

    let frames = decode_in_slices(bytes, &[inside]);
    let texts: Vec<String> = events(&frames)
        .into_iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk { delta } => Some(delta),
            _ => None,
        })
        .collect();

    assert_eq!(texts, vec!["Grüße ".to_owned(), "aus 東京".to_owned()]);
}

/// Splitting between the two halves of a CRLF delimiter still yields one frame.
#[test]
fn split_inside_crlf_delimiter_yields_one_frame() {
    let raw = b"data: a\r\n\r\ndata: b\n\n";
    for split in 8..12 {
        let frames = decode_in_slices(raw, &[split]);
        let data: Vec<Vec<String>> = frames.into_iter().map(|f| f.data).collect();
        assert_eq!(
            data,
            vec![vec!["a".to_owned()], vec!["b".to_owned()]],
            "split at {split}"
        );
    }
}

// ── Keep-alive, EOF and limits ──────────────────────────────────────────────

/// Comment-only and blank-data frames carry no payload.
#[test]
fn keep_alive_frames_have_no_payload() {
    let frames = decode_in_slices(b": ping\n\ndata:\n\n", &[]);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|frame| frame.payload().is_none()));
}

/// An unterminated frame past the size limit is a fatal transport error.
#[test]
fn oversized_frame_is_rejected() {
    let mut codec = FrameCodec::with_max_frame_bytes(16);
    let mut buf = BytesMut::from("data: this frame never ends");

    let err = codec.decode(&mut buf).expect_err("frame exceeds limit");
    assert!(matches!(err, AppError::Transport(ref msg) if msg.contains("frame too long")));
}

/// A multi-MiB frame fed in small slices decodes in linear time.
#[test]
fn large_frame_in_small_slices_decodes_promptly() {
    let delta = "x".repeat(3 * 1_048_576);
    let stream = format!("data: {{\"event\":\"chunk\",\"data\":{{\"delta\":\"{delta}\"}}}}\r\n\r\n");

    let started = Instant::now();
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for slice in stream.as_bytes().chunks(256) {
        frames.extend(decoder.push(slice).expect("push succeeds"));
    }
    let elapsed = started.elapsed();

    assert_eq!(decoder.pending_bytes(), 0);
    assert_eq!(frames.len(), 1);
    assert_eq!(events(&frames), vec![StreamEvent::Chunk { delta }]);
    assert!(
        elapsed < Duration::from_secs(10),
        "decoding took {elapsed:?}"
    );
}

/// Invalid UTF-8 is decoded lossily rather than dropping the frame.
#[test]
fn invalid_utf8_is_decoded_lossily() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder
        .push(b"data: caf\xff\n\n")
        .expect("push succeeds");

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, vec!["caf\u{fffd}".to_owned()]);
}
