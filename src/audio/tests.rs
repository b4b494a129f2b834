use bytes::Bytes;

use crate::audio::{AudioBuffer, SILENCE_BYTE};
use crate::protocol::frame::PAYLOAD_SIZE;

fn frame_of(buffer: &mut AudioBuffer) -> Option<[u8; PAYLOAD_SIZE]> {
    let mut dst = [0u8; PAYLOAD_SIZE];
    buffer.fill_frame(&mut dst).then_some(dst)
}

#[test]
fn test_fill_whole_frames() {
    let mut buffer = AudioBuffer::new(Bytes::from(vec![0x11; PAYLOAD_SIZE * 2]));

    assert_eq!(buffer.total_frames(), 2);
    assert_eq!(frame_of(&mut buffer).unwrap(), [0x11; PAYLOAD_SIZE]);
    assert_eq!(buffer.position_frames(), 1);
    assert!(buffer.has_remaining());
    assert_eq!(frame_of(&mut buffer).unwrap(), [0x11; PAYLOAD_SIZE]);
    assert!(!buffer.has_remaining());
    assert!(frame_of(&mut buffer).is_none());
}

#[test]
fn test_partial_tail_frame_padded_with_silence() {
    let mut buffer = AudioBuffer::new(Bytes::from(vec![0x22; PAYLOAD_SIZE + 40]));

    assert_eq!(buffer.total_frames(), 2);
    let _ = frame_of(&mut buffer).unwrap();
    let tail = frame_of(&mut buffer).unwrap();
    assert!(tail[..40].iter().all(|&b| b == 0x22));
    assert!(tail[40..].iter().all(|&b| b == SILENCE_BYTE));
    assert!(!buffer.has_remaining());
}

#[test]
fn test_tones_play_before_body() {
    let tones = Bytes::from(vec![0xAA; PAYLOAD_SIZE]);
    let body = Bytes::from(vec![0xBB; PAYLOAD_SIZE]);
    let mut buffer = AudioBuffer::with_tones(tones, body);

    assert!(buffer.plays_tones());
    assert!(buffer.in_tones());
    assert_eq!(frame_of(&mut buffer).unwrap(), [0xAA; PAYLOAD_SIZE]);
    assert!(!buffer.in_tones());
    assert_eq!(frame_of(&mut buffer).unwrap(), [0xBB; PAYLOAD_SIZE]);
}

#[test]
fn test_replay_skips_tones() {
    let tones = Bytes::from(vec![0xAA; PAYLOAD_SIZE]);
    let body = Bytes::from(vec![0xBB; PAYLOAD_SIZE]);
    let mut buffer = AudioBuffer::with_tones(tones, body);
    buffer.set_play_tones(false);

    assert!(!buffer.plays_tones());
    assert_eq!(buffer.total_frames(), 1);
    assert_eq!(frame_of(&mut buffer).unwrap(), [0xBB; PAYLOAD_SIZE]);
    assert!(!buffer.has_remaining());
}

#[test]
fn test_truncation_cuts_at_frame_boundary() {
    let mut buffer = AudioBuffer::new(Bytes::from(vec![0x33; PAYLOAD_SIZE * 4]));
    buffer.truncate_frames(2);

    assert!(buffer.is_truncated());
    assert_eq!(buffer.total_frames(), 2);
    let _ = frame_of(&mut buffer).unwrap();
    let _ = frame_of(&mut buffer).unwrap();
    assert!(!buffer.has_remaining());
}

#[test]
fn test_truncation_longer_than_audio_is_not_truncation() {
    let mut buffer = AudioBuffer::new(Bytes::from(vec![0x33; PAYLOAD_SIZE]));
    buffer.truncate_frames(5);
    assert!(!buffer.is_truncated());
    assert_eq!(buffer.total_frames(), 1);
}

#[test]
fn test_rewind_and_seek() {
    let mut buffer = AudioBuffer::new(Bytes::from(vec![0x44; PAYLOAD_SIZE * 3]));

    let _ = frame_of(&mut buffer).unwrap();
    let _ = frame_of(&mut buffer).unwrap();
    assert_eq!(buffer.position_frames(), 2);

    buffer.rewind();
    assert_eq!(buffer.position_frames(), 0);
    assert!(buffer.has_remaining());

    buffer.seek_frames(2);
    assert_eq!(buffer.position_frames(), 2);
    buffer.seek_frames(99);
    assert!(!buffer.has_remaining());
}

#[test]
fn test_empty_body() {
    let mut buffer = AudioBuffer::new(Bytes::new());
    assert!(buffer.is_empty());
    assert!(frame_of(&mut buffer).is_none());
}

#[tokio::test]
async fn test_load_audio_errors() {
    let missing = crate::audio::load_audio(std::path::Path::new("/nonexistent/audio.ulaw")).await;
    assert!(matches!(missing, Err(crate::audio::AudioError::Retrieve { .. })));

    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty.ulaw");
    std::fs::write(&empty, b"").unwrap();
    let loaded = crate::audio::load_audio(&empty).await;
    assert!(matches!(loaded, Err(crate::audio::AudioError::Empty { .. })));

    let good = dir.path().join("good.ulaw");
    std::fs::write(&good, vec![0x55; 320]).unwrap();
    let loaded = crate::audio::load_audio(&good).await.unwrap();
    assert_eq!(loaded.len(), 320);
}
