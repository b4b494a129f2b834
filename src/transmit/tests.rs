use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::events::{EventBus, ShutdownLevel};
use crate::playlist::{InterruptLock, MessageDescriptor, Playlist, PlaylistScheduler};
use crate::protocol::frame::{AudioFrame, PAYLOAD_SIZE, SEQUENCE_STEP};
use crate::sync::{ResumeDirective, SyncHandle, SyncState};
use crate::transmit::broadcast_loop::{self, BroadcastOutcome, BroadcastProgress};
use crate::transmit::playlist_loop::PlaylistLoop;
use crate::transmit::{LoopOwner, TransmitHandoff, TransmitLink};
use crate::types::{AmplitudeTargets, RuntimeConfig, SharedConfig, TransmitterSet};

fn shared_config(channels: Vec<u8>) -> SharedConfig {
    SharedConfig::new(RuntimeConfig {
        transmitters: TransmitterSet::new(channels).unwrap(),
        amplitudes: AmplitudeTargets {
            voice: 5000,
            same: 6000,
            alert: 7000,
        },
        time_zone: "UTC".to_string(),
    })
}

fn frame_with_seq(sequence: u16) -> AudioFrame {
    AudioFrame {
        sequence,
        timestamp: u32::from(sequence) * 160,
        ssrc: 42,
        addressing: 1,
        previous_payload: [0; PAYLOAD_SIZE],
        current_payload: [sequence as u8; PAYLOAD_SIZE],
    }
}

async fn recv_frame(socket: &UdpSocket, timeout: Duration) -> Option<AudioFrame> {
    let mut buf = [0u8; 512];
    match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Ok(len)) => Some(AudioFrame::decode(&buf[..len]).unwrap()),
        _ => None,
    }
}

#[tokio::test]
async fn test_handoff_exchange_preserves_frames() {
    let handoff = Arc::new(TransmitHandoff::new(LoopOwner::Playlist));
    assert_eq!(handoff.owner(), LoopOwner::Playlist);
    assert!(!handoff.yield_requested(LoopOwner::Playlist));

    // The "playlist loop": lends the token when asked, expects the
    // broadcast side's final frame back.
    let lender = {
        let handoff = Arc::clone(&handoff);
        tokio::spawn(async move {
            while !handoff.yield_requested(LoopOwner::Playlist) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            handoff
                .lend(LoopOwner::Playlist, Some(frame_with_seq(10)))
                .await
        })
    };

    let seed = handoff.acquire(LoopOwner::Broadcast).await;
    assert_eq!(seed.unwrap().sequence, 10);
    assert_eq!(handoff.owner(), LoopOwner::Broadcast);

    handoff.release(LoopOwner::Broadcast, Some(frame_with_seq(25)));
    let resumed = lender.await.unwrap();
    assert_eq!(resumed.unwrap().sequence, 25);
    assert_eq!(handoff.owner(), LoopOwner::Playlist);
}

#[tokio::test]
async fn test_handoff_acquire_when_already_owner() {
    let handoff = TransmitHandoff::new(LoopOwner::Broadcast);
    // A maintenance session starts as the owner; acquire must not block.
    let seed = handoff.acquire(LoopOwner::Broadcast).await;
    assert!(seed.is_none());
    assert_eq!(handoff.owner(), LoopOwner::Broadcast);
}

#[tokio::test]
async fn test_handoff_keeps_lender_frame_when_taker_sent_nothing() {
    let handoff = Arc::new(TransmitHandoff::new(LoopOwner::Playlist));
    let lender = {
        let handoff = Arc::clone(&handoff);
        tokio::spawn(async move {
            while !handoff.yield_requested(LoopOwner::Playlist) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            handoff
                .lend(LoopOwner::Playlist, Some(frame_with_seq(7)))
                .await
        })
    };

    let _ = handoff.acquire(LoopOwner::Broadcast).await;
    handoff.release(LoopOwner::Broadcast, None);

    // The broadcast never sent, so the playlist side resumes from its own
    // last frame.
    let resumed = lender.await.unwrap();
    assert_eq!(resumed.unwrap().sequence, 7);
}

#[tokio::test]
async fn test_link_replicates_and_numbers_monotonically() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest: SocketAddr = receiver.local_addr().unwrap();

    let shared = shared_config(vec![1, 3]);
    let mut link = TransmitLink::new(dest, shared).await.unwrap();

    for i in 0..3u8 {
        link.transmit(&[i; PAYLOAD_SIZE]).await.unwrap();
    }

    let mut frames = Vec::new();
    for _ in 0..6 {
        frames.push(
            recv_frame(&receiver, Duration::from_secs(1))
                .await
                .expect("expected a replicated frame"),
        );
    }

    // One datagram per transmitter, identical within a tick.
    for pair in frames.chunks(2) {
        assert_eq!(pair[0], pair[1]);
        assert_eq!(pair[0].addressing, 0b0101);
    }
    // Strictly increasing numbering across ticks.
    for window in frames.chunks(2).collect::<Vec<_>>().windows(2) {
        assert_eq!(
            window[1][0].sequence,
            window[0][0].sequence.wrapping_add(SEQUENCE_STEP)
        );
        assert_eq!(
            window[1][0].timestamp,
            window[0][0].timestamp.wrapping_add(160)
        );
    }
}

#[tokio::test]
async fn test_link_seed_continues_numbering() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest: SocketAddr = receiver.local_addr().unwrap();

    let mut link = TransmitLink::new(dest, shared_config(vec![1])).await.unwrap();
    link.seed(Some(frame_with_seq(100)));
    link.transmit(&[9; PAYLOAD_SIZE]).await.unwrap();

    let frame = recv_frame(&receiver, Duration::from_secs(1)).await.unwrap();
    assert_eq!(frame.sequence, 101);
    assert_eq!(frame.previous_payload, [100u8; PAYLOAD_SIZE]);
}

#[tokio::test]
async fn test_broadcast_loop_drains_queue_and_finishes() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest: SocketAddr = receiver.local_addr().unwrap();
    let link = TransmitLink::new(dest, shared_config(vec![1])).await.unwrap();

    let (status_tx, _interval_tx, sync) = SyncHandle::channel();
    status_tx.send_modify(|s| {
        s.state = SyncState::Synced;
        s.ever_synced = true;
    });

    let progress = Arc::new(BroadcastProgress::new());
    let (tx, rx) = mpsc::channel(8);
    for i in 0..4u8 {
        progress.frame_queued();
        tx.send([i; PAYLOAD_SIZE]).await.unwrap();
    }
    drop(tx);

    let (_halt_tx, halt_rx) = watch::channel(false);
    let (link, outcome) = broadcast_loop::run(link, sync, rx, Arc::clone(&progress), halt_rx).await;

    assert_eq!(outcome, BroadcastOutcome::Finished);
    assert_eq!(progress.consumed(), 4);
    assert_eq!(progress.remaining(), 0);
    assert_eq!(link.last_frame().unwrap().sequence, 3);

    for i in 0..4u8 {
        let frame = recv_frame(&receiver, Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame.current_payload, [i; PAYLOAD_SIZE]);
        assert_eq!(frame.sequence, u16::from(i));
    }
}

#[tokio::test]
async fn test_broadcast_loop_halt_stops_early() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest: SocketAddr = receiver.local_addr().unwrap();
    let link = TransmitLink::new(dest, shared_config(vec![1])).await.unwrap();

    let (status_tx, _interval_tx, sync) = SyncHandle::channel();
    status_tx.send_modify(|s| {
        s.state = SyncState::Synced;
        s.ever_synced = true;
    });

    let progress = Arc::new(BroadcastProgress::new());
    let (tx, rx) = mpsc::channel(600);
    for _ in 0..500 {
        progress.frame_queued();
        tx.send([1u8; PAYLOAD_SIZE]).await.unwrap();
    }

    let (halt_tx, halt_rx) = watch::channel(false);
    let run = tokio::spawn(broadcast_loop::run(
        link,
        sync,
        rx,
        Arc::clone(&progress),
        halt_rx,
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    halt_tx.send(true).unwrap();
    let (_link, outcome) = run.await.unwrap();

    assert_eq!(outcome, BroadcastOutcome::Halted);
    assert!(progress.remaining() > 0);
    drop(tx);
}

fn test_playlist(dir: &std::path::Path, frames: usize, fill: u8, interrupt: bool) -> Playlist {
    let audio_path = dir.join(format!("msg-{fill}.ulaw"));
    std::fs::write(&audio_path, vec![fill; frames * PAYLOAD_SIZE]).unwrap();
    Playlist {
        name: format!("playlist-{fill}"),
        transmitter_group: "GROUP1".to_string(),
        priority: 0,
        messages: vec![MessageDescriptor {
            broadcast_id: u64::from(fill),
            name: format!("message {fill}"),
            message_type: "TEST".to_string(),
            interrupt,
            confirm: false,
            same_tone: false,
            alert_tone: false,
            period_seconds: None,
            transmitter_groups: vec!["GROUP1".to_string()],
            audio: audio_path,
            tones: None,
            expire: None,
        }],
    }
}

struct LoopFixture {
    receiver: UdpSocket,
    updates_tx: mpsc::UnboundedSender<crate::playlist::PlaylistUpdate>,
    status_tx: watch::Sender<crate::sync::SyncStatus>,
    shutdown_tx: watch::Sender<ShutdownLevel>,
    task: tokio::task::JoinHandle<()>,
}

async fn start_playlist_loop(playlists: Vec<Playlist>) -> LoopFixture {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest = receiver.local_addr().unwrap();

    let bus = EventBus::new();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let mut scheduler = PlaylistScheduler::new(
        "GROUP1".to_string(),
        updates_rx,
        bus.clone(),
        InterruptLock::new(),
    );
    scheduler.load_playlists(playlists);

    let (status_tx, _interval_tx, sync) = SyncHandle::channel();
    status_tx.send_modify(|s| {
        s.state = SyncState::Synced;
        s.ever_synced = true;
    });

    let link = TransmitLink::new(dest, shared_config(vec![1])).await.unwrap();
    let handoff = Arc::new(TransmitHandoff::new(LoopOwner::Playlist));
    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownLevel::Running);

    let looper = PlaylistLoop::new(link, scheduler, handoff, sync, bus, "GROUP1".to_string());
    let task = tokio::spawn(looper.run(shutdown_rx));

    LoopFixture {
        receiver,
        updates_tx,
        status_tx,
        shutdown_tx,
        task,
    }
}

/// No frames while unsynced; numbering continues where it stopped when
/// sync returns within the restart threshold.
#[tokio::test]
async fn test_playlist_loop_stalls_unsynced_and_resumes_contiguously() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = start_playlist_loop(vec![test_playlist(dir.path(), 200, 0x10, false)]).await;

    let first = recv_frame(&fixture.receiver, Duration::from_secs(1))
        .await
        .expect("playback should start");
    assert_eq!(first.current_payload, [0x10; PAYLOAD_SIZE]);

    // Drop sync and drain anything already in flight.
    fixture.status_tx.send_modify(|s| s.state = SyncState::Unsynced);
    let mut last_seq = first.sequence;
    while let Some(frame) = recv_frame(&fixture.receiver, Duration::from_millis(100)).await {
        last_seq = frame.sequence;
    }

    // Stalled: nothing for several pacing intervals.
    assert!(
        recv_frame(&fixture.receiver, Duration::from_millis(200))
            .await
            .is_none(),
        "frames were sent while unsynced"
    );

    // Short desync: resume in place with contiguous numbering.
    fixture.status_tx.send_modify(|s| {
        s.state = SyncState::Synced;
        s.directive = ResumeDirective::Continue;
    });
    let resumed = recv_frame(&fixture.receiver, Duration::from_secs(1))
        .await
        .expect("playback should resume after sync returns");
    assert_eq!(resumed.sequence, last_seq.wrapping_add(SEQUENCE_STEP));

    fixture.shutdown_tx.send(ShutdownLevel::Immediate).unwrap();
    fixture.task.await.unwrap();
}

/// An interrupt-flagged message takes over at the next frame boundary,
/// with numbering intact.
#[tokio::test]
async fn test_interrupt_preempts_at_frame_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = start_playlist_loop(vec![test_playlist(dir.path(), 500, 0x10, false)]).await;

    let first = recv_frame(&fixture.receiver, Duration::from_secs(1))
        .await
        .expect("playback should start");
    assert_eq!(first.current_payload, [0x10; PAYLOAD_SIZE]);

    fixture
        .updates_tx
        .send(crate::playlist::PlaylistUpdate::Loaded(test_playlist(
            dir.path(),
            5,
            0x77,
            true,
        )))
        .unwrap();

    // Every frame is either all-normal or all-interrupt (no mid-frame
    // switch), numbering never skips, and the interrupt shows up quickly.
    let mut last_seq = first.sequence;
    let mut saw_interrupt = false;
    for _ in 0..60 {
        let Some(frame) = recv_frame(&fixture.receiver, Duration::from_millis(500)).await else {
            break;
        };
        assert_eq!(frame.sequence, last_seq.wrapping_add(SEQUENCE_STEP));
        last_seq = frame.sequence;
        let byte = frame.current_payload[0];
        assert!(
            frame.current_payload.iter().all(|&b| b == byte),
            "mid-frame content switch"
        );
        if byte == 0x77 {
            saw_interrupt = true;
            break;
        }
    }
    assert!(saw_interrupt, "interrupt message never took over");

    fixture.shutdown_tx.send(ShutdownLevel::Immediate).unwrap();
    fixture.task.await.unwrap();
}
