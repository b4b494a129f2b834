use std::path::Path;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;

use crate::audio::{AudioBuffer, SILENCE_BYTE};
use crate::events::{EventBus, SessionEvent};
use crate::ipc::messages::{Notification, PlaybackStatus};
use crate::playlist::{
    InterruptLock, MessageDescriptor, Playlist, PlaylistError, PlaylistScheduler, PlaylistUpdate,
    initial_scan,
};
use crate::protocol::frame::PAYLOAD_SIZE;

use super::cursor::PlaybackCursor;

fn descriptor(id: u64, audio: &Path) -> MessageDescriptor {
    MessageDescriptor {
        broadcast_id: id,
        name: format!("message {id}"),
        message_type: "TEST".to_string(),
        interrupt: false,
        confirm: false,
        same_tone: false,
        alert_tone: false,
        period_seconds: None,
        transmitter_groups: vec!["GROUP1".to_string()],
        audio: audio.to_path_buf(),
        tones: None,
        expire: None,
    }
}

fn playlist(name: &str, messages: Vec<MessageDescriptor>) -> Playlist {
    Playlist {
        name: name.to_string(),
        transmitter_group: "GROUP1".to_string(),
        priority: 0,
        messages,
    }
}

fn write_audio(dir: &Path, name: &str, frames: usize, fill: u8) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![fill; frames * PAYLOAD_SIZE]).unwrap();
    path
}

struct Fixture {
    scheduler: PlaylistScheduler,
    updates_tx: mpsc::UnboundedSender<PlaylistUpdate>,
    events: tokio::sync::broadcast::Receiver<SessionEvent>,
}

fn fixture() -> Fixture {
    let bus = EventBus::new();
    let events = bus.subscribe();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let scheduler = PlaylistScheduler::new(
        "GROUP1".to_string(),
        updates_rx,
        bus,
        InterruptLock::new(),
    );
    Fixture {
        scheduler,
        updates_tx,
        events,
    }
}

fn drain_notifications(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Notify(notification) = event {
            out.push(notification);
        }
    }
    out
}

#[test]
fn test_descriptor_parses_with_defaults() {
    let json = r#"{
        "broadcast_id": 17,
        "name": "Hourly Weather",
        "message_type": "WXR",
        "audio": "/data/audio/17.ulaw"
    }"#;
    let desc: MessageDescriptor = serde_json::from_str(json).unwrap();

    assert_eq!(desc.broadcast_id, 17);
    assert!(!desc.interrupt);
    assert!(!desc.confirm);
    assert!(desc.period_seconds.is_none());
    assert!(desc.transmitter_groups.is_empty());
    assert!(desc.tones.is_none());
    assert!(desc.expire.is_none());
    assert!(desc.scheduled_for("ANY_GROUP"));
}

#[test]
fn test_descriptor_scheduling_and_expiry() {
    let now = Utc::now();
    let mut desc = descriptor(1, Path::new("/tmp/a.ulaw"));
    assert!(desc.scheduled_for("GROUP1"));
    assert!(!desc.scheduled_for("GROUP2"));

    assert!(!desc.is_expired(now));
    desc.expire = Some(now - ChronoDuration::seconds(1));
    assert!(desc.is_expired(now));
}

#[tokio::test]
async fn test_scheduler_round_robin() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_audio(dir.path(), "a.ulaw", 2, 0x01);
    let b = write_audio(dir.path(), "b.ulaw", 2, 0x02);

    let mut f = fixture();
    f.scheduler.load_playlists(vec![playlist(
        "p1",
        vec![descriptor(1, &a), descriptor(2, &b)],
    )]);

    let now = Utc::now();
    let first = f.scheduler.next(now).await.unwrap();
    assert_eq!(first.descriptor.as_ref().unwrap().broadcast_id, 1);
    let second = f.scheduler.next(now).await.unwrap();
    assert_eq!(second.descriptor.as_ref().unwrap().broadcast_id, 2);
    let third = f.scheduler.next(now).await.unwrap();
    assert_eq!(third.descriptor.as_ref().unwrap().broadcast_id, 1);
}

#[tokio::test]
async fn test_scheduler_interrupt_takes_priority() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_audio(dir.path(), "a.ulaw", 2, 0x01);
    let b = write_audio(dir.path(), "b.ulaw", 2, 0x02);

    let mut f = fixture();
    f.scheduler
        .load_playlists(vec![playlist("p1", vec![descriptor(1, &a)])]);

    let mut interrupt = descriptor(9, &b);
    interrupt.interrupt = true;
    f.updates_tx
        .send(PlaylistUpdate::Loaded(playlist("p2", vec![interrupt])))
        .unwrap();

    assert!(f.scheduler.has_interrupt());
    let now = Utc::now();
    let first = f.scheduler.next(now).await.unwrap();
    assert_eq!(first.descriptor.as_ref().unwrap().broadcast_id, 9);
    assert!(first.cursor.interrupt());

    // The interrupt plays once, then rotation resumes.
    assert!(!f.scheduler.has_interrupt());
    let second = f.scheduler.next(now).await.unwrap();
    assert_eq!(second.descriptor.as_ref().unwrap().broadcast_id, 1);
}

#[tokio::test]
async fn test_scheduler_interrupt_delayed_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_audio(dir.path(), "a.ulaw", 2, 0x01);
    let b = write_audio(dir.path(), "b.ulaw", 2, 0x02);

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let lock = InterruptLock::new();
    let mut scheduler =
        PlaylistScheduler::new("GROUP1".to_string(), updates_rx, bus, lock.clone());
    scheduler.load_playlists(vec![playlist("p1", vec![descriptor(1, &a)])]);

    lock.engage();
    let mut interrupt = descriptor(9, &b);
    interrupt.interrupt = true;
    updates_tx
        .send(PlaylistUpdate::Loaded(playlist("p2", vec![interrupt])))
        .unwrap();

    assert!(!scheduler.has_interrupt());
    let picked = scheduler.next(Utc::now()).await.unwrap();
    assert_eq!(picked.descriptor.as_ref().unwrap().broadcast_id, 1);

    let delayed = drain_notifications(&mut events)
        .into_iter()
        .any(|n| matches!(n, Notification::DelayedBroadcast { broadcast_id: 9, .. }));
    assert!(delayed, "expected a delayed-broadcast notification");

    lock.release();
    assert!(scheduler.has_interrupt());
}

#[tokio::test]
async fn test_scheduler_periodic_message_waits_for_period() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_audio(dir.path(), "a.ulaw", 1, 0x01);

    let mut f = fixture();
    let mut periodic = descriptor(1, &a);
    periodic.period_seconds = Some(600);
    f.scheduler.load_playlists(vec![playlist("p1", vec![periodic])]);

    let now = Utc::now();
    let first = f.scheduler.next(now).await.unwrap();
    assert!(!first.is_filler());

    // Not due yet: filler, not the message, and not exhaustion.
    let second = f.scheduler.next(now + ChronoDuration::seconds(30)).await.unwrap();
    assert!(second.is_filler());

    // Due again after the period.
    let third = f
        .scheduler
        .next(now + ChronoDuration::seconds(601))
        .await
        .unwrap();
    assert!(!third.is_filler());
    assert_eq!(third.descriptor.as_ref().unwrap().broadcast_id, 1);
}

#[tokio::test]
async fn test_scheduler_skips_other_groups_without_dead_air() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_audio(dir.path(), "a.ulaw", 1, 0x01);

    let mut f = fixture();
    let mut other_group = descriptor(1, &a);
    other_group.transmitter_groups = vec!["GROUP2".to_string()];
    f.scheduler
        .load_playlists(vec![playlist("p1", vec![other_group])]);

    let playback = f.scheduler.next(Utc::now()).await.unwrap();
    assert!(playback.is_filler());

    // Filler really is silence.
    let mut cursor = playback.cursor;
    let mut payload = [0u8; PAYLOAD_SIZE];
    let (filled, status) = cursor.fill_frame(&mut payload);
    assert!(filled);
    assert!(status.is_none());
    assert_eq!(payload, [SILENCE_BYTE; PAYLOAD_SIZE]);
}

#[tokio::test]
async fn test_scheduler_exhaustion_notifies_once() {
    let mut f = fixture();

    assert!(f.scheduler.next(Utc::now()).await.is_none());
    assert!(f.scheduler.next(Utc::now()).await.is_none());

    let notifications = drain_notifications(&mut f.events);
    let count = notifications
        .iter()
        .filter(|n| matches!(n, Notification::NoPlayableMessage { .. }))
        .count();
    assert_eq!(count, 1, "exhaustion must be notified exactly once");
}

#[tokio::test]
async fn test_scheduler_expired_message_reports_not_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_audio(dir.path(), "a.ulaw", 1, 0x01);

    let mut f = fixture();
    let mut expiring = descriptor(1, &a);
    expiring.expire = Some(Utc::now() - ChronoDuration::seconds(5));
    f.scheduler.load_playlists(vec![playlist("p1", vec![expiring])]);

    assert!(f.scheduler.next(Utc::now()).await.is_none());
    let reported = drain_notifications(&mut f.events)
        .into_iter()
        .any(|n| matches!(n, Notification::NotBroadcast { broadcast_id: 1, .. }));
    assert!(reported, "expected a not-broadcast notification");
}

#[tokio::test]
async fn test_scheduler_audio_failure_drops_message() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_audio(dir.path(), "good.ulaw", 1, 0x01);

    let mut f = fixture();
    f.scheduler.load_playlists(vec![playlist(
        "p1",
        vec![
            descriptor(1, Path::new("/nonexistent/audio.ulaw")),
            descriptor(2, &good),
        ],
    )]);

    // The broken message is skipped and reported; the good one plays.
    let playback = f.scheduler.next(Utc::now()).await.unwrap();
    assert_eq!(playback.descriptor.as_ref().unwrap().broadcast_id, 2);

    let failed = drain_notifications(&mut f.events)
        .into_iter()
        .any(|n| matches!(n, Notification::InitFailed { broadcast_id: 1, .. }));
    assert!(failed, "expected an init-failed notification");
}

#[tokio::test]
async fn test_scheduler_truncates_against_expiry_and_reports_status() {
    let dir = tempfile::tempdir().unwrap();
    let tones = write_audio(dir.path(), "tones.ulaw", 100, 0xAA);
    let body = write_audio(dir.path(), "body.ulaw", 100, 0xBB);

    let mut f = fixture();
    let now = Utc::now();
    let mut desc = descriptor(5, &body);
    desc.tones = Some(tones);
    desc.same_tone = true;
    // Window fits only 50 of the 200 frames, cutting inside the tones.
    desc.expire = Some(now + ChronoDuration::seconds(1));
    f.scheduler.load_playlists(vec![playlist("p1", vec![desc])]);

    let playback = f.scheduler.next(now).await.unwrap();
    assert!(playback.cursor.truncation_notice());

    let mut cursor = playback.cursor;
    let mut payload = [0u8; PAYLOAD_SIZE];
    let (_, status) = cursor.fill_frame(&mut payload);
    let status = status.expect("first frame must carry the status delta");
    assert_eq!(status.broadcast_id, 5);
    assert_eq!(status.play_count, 1);
    assert!(status.played_same_tone);
    assert!(!status.played_alert_tone);

    // Only the first fill reports.
    let (_, second_status) = cursor.fill_frame(&mut payload);
    assert!(second_status.is_none());
}

#[test]
fn test_cursor_restart_does_not_rereport() {
    let audio = AudioBuffer::new(bytes::Bytes::from(vec![0x0F; PAYLOAD_SIZE * 2]));
    let status = PlaybackStatus {
        transmitter_group: "GROUP1".to_string(),
        broadcast_id: 1,
        transmit_time: Utc::now(),
        play_count: 1,
        played_same_tone: false,
        played_alert_tone: false,
    };
    let mut cursor = PlaybackCursor::new(audio, status, false, false);

    let mut payload = [0u8; PAYLOAD_SIZE];
    assert!(cursor.fill_frame(&mut payload).1.is_some());

    cursor.restart();
    assert_eq!(cursor.position_frames(), 0);
    let (filled, status) = cursor.fill_frame(&mut payload);
    assert!(filled);
    assert!(status.is_none(), "restart must not re-report the status");
}

#[tokio::test]
async fn test_initial_scan_is_strict() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("good.json"),
        serde_json::to_vec(&playlist("p1", vec![])).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("ignored.txt"), b"not a playlist").unwrap();

    let playlists = initial_scan(dir.path()).await.unwrap();
    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].name, "p1");

    std::fs::write(dir.path().join("bad.json"), b"{ not json").unwrap();
    assert!(matches!(
        initial_scan(dir.path()).await,
        Err(PlaylistError::Descriptor { .. })
    ));
}
