//! Frame-by-frame message selection

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;

use crate::audio::{AudioBuffer, SILENCE_BYTE, load_audio};
use crate::events::EventBus;
use crate::ipc::messages::{Notification, PlaybackStatus};
use crate::protocol::frame::PAYLOAD_SIZE;

use super::cursor::{MessagePlayback, PlaybackCursor};
use super::directory::PlaylistUpdate;
use super::message::{MessageDescriptor, Playlist};

/// Filler audio length when nothing is playable but messages remain
const FILLER_FRAMES: usize = 50;

/// Shared flag that delays interrupt pre-emption while a live broadcast
/// owns the transmitter
#[derive(Debug, Clone, Default)]
pub struct InterruptLock(Arc<AtomicBool>);

impl InterruptLock {
    /// Create an unlocked instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether interrupts are currently delayed
    #[must_use]
    pub fn engaged(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Delay interrupts
    pub fn engage(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Allow interrupts again
    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
struct Entry {
    desc: MessageDescriptor,
    playlist: String,
    priority: u8,
    play_count: u32,
    last_played: Option<DateTime<Utc>>,
    interrupt_pending: bool,
}

impl Entry {
    fn periodic_due(&self, now: DateTime<Utc>) -> bool {
        match self.desc.period_seconds {
            None => true,
            Some(period) => match self.last_played {
                None => true,
                Some(last) => {
                    #[allow(clippy::cast_possible_wrap)]
                    let period = ChronoDuration::seconds(period as i64);
                    now - last >= period
                }
            },
        }
    }
}

/// Decides which message's audio feeds the transmit loop next.
///
/// Owned by the playlist transmit loop's task; playlist changes arrive
/// through an update channel drained at frame boundaries.
pub struct PlaylistScheduler {
    group: String,
    entries: Vec<Entry>,
    next_index: usize,
    updates: mpsc::UnboundedReceiver<PlaylistUpdate>,
    bus: EventBus,
    interrupt_lock: InterruptLock,
    exhausted_notified: bool,
    filler_audio: Bytes,
}

impl PlaylistScheduler {
    /// Create a scheduler for the given transmitter group
    #[must_use]
    pub fn new(
        group: String,
        updates: mpsc::UnboundedReceiver<PlaylistUpdate>,
        bus: EventBus,
        interrupt_lock: InterruptLock,
    ) -> Self {
        Self {
            group,
            entries: Vec::new(),
            next_index: 0,
            updates,
            bus,
            interrupt_lock,
            exhausted_notified: false,
            filler_audio: Bytes::from(vec![SILENCE_BYTE; FILLER_FRAMES * PAYLOAD_SIZE]),
        }
    }

    /// Seed playlists loaded before the session started
    pub fn load_playlists(&mut self, playlists: Vec<Playlist>) {
        for playlist in playlists {
            self.merge_playlist(playlist);
        }
    }

    /// Whether an interrupt is waiting and allowed to pre-empt. The
    /// transmit loop checks this at every frame boundary.
    #[must_use]
    pub fn has_interrupt(&mut self) -> bool {
        self.drain_updates();
        !self.interrupt_lock.engaged() && self.entries.iter().any(|e| e.interrupt_pending)
    }

    fn drain_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            match update {
                PlaylistUpdate::Loaded(playlist) => self.merge_playlist(playlist),
            }
        }
    }

    fn merge_playlist(&mut self, playlist: Playlist) {
        if playlist.transmitter_group != self.group {
            tracing::debug!(
                playlist = %playlist.name,
                group = %playlist.transmitter_group,
                "ignoring playlist for another group"
            );
            return;
        }
        tracing::info!(
            playlist = %playlist.name,
            messages = playlist.messages.len(),
            "merging playlist"
        );

        // Carry play state across a replacement of the same playlist.
        let old: Vec<Entry> = std::mem::take(&mut self.entries);
        let (replaced, mut kept): (Vec<Entry>, Vec<Entry>) =
            old.into_iter().partition(|e| e.playlist == playlist.name);

        for desc in playlist.messages {
            let prior = replaced.iter().find(|e| e.desc.broadcast_id == desc.broadcast_id);
            let interrupt_pending = desc.interrupt
                && prior.is_none_or(|p| p.interrupt_pending || p.play_count == 0);
            if interrupt_pending && self.interrupt_lock.engaged() {
                self.bus.notify(Notification::DelayedBroadcast {
                    transmitter_group: self.group.clone(),
                    broadcast_id: desc.broadcast_id,
                    name: desc.name.clone(),
                });
            }
            kept.push(Entry {
                playlist: playlist.name.clone(),
                priority: playlist.priority,
                play_count: prior.map_or(0, |p| p.play_count),
                last_played: prior.and_then(|p| p.last_played),
                interrupt_pending,
                desc,
            });
        }

        kept.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.entries = kept;
        self.next_index = 0;
        self.exhausted_notified = false;
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let group = self.group.clone();
        let bus = self.bus.clone();
        self.entries.retain(|entry| {
            if !entry.desc.is_expired(now) {
                return true;
            }
            if entry.play_count == 0 {
                bus.notify(Notification::NotBroadcast {
                    transmitter_group: group.clone(),
                    broadcast_id: entry.desc.broadcast_id,
                    expired: entry.desc.expire.unwrap_or(now),
                });
            }
            tracing::info!(
                broadcast_id = entry.desc.broadcast_id,
                name = %entry.desc.name,
                "dropping expired message"
            );
            false
        });
        if self.next_index >= self.entries.len() {
            self.next_index = 0;
        }
    }

    /// Pick the next message and prepare its audio.
    ///
    /// Always returns a playback while playable messages remain, falling
    /// back to silence filler when everything is skipped; returns `None`
    /// only when the playlist is exhausted, emitting the no-playable
    /// notification once per exhaustion episode.
    pub async fn next(&mut self, now: DateTime<Utc>) -> Option<MessagePlayback> {
        self.drain_updates();
        self.purge_expired(now);

        loop {
            let Some(index) = self.pick_index(now) else {
                break;
            };
            match self.start_entry(index, now).await {
                Ok(playback) => {
                    self.exhausted_notified = false;
                    return Some(playback);
                }
                Err(()) => {
                    // start_entry already reported and removed the entry.
                    continue;
                }
            }
        }

        if self.entries.is_empty() {
            if !self.exhausted_notified {
                tracing::warn!("no valid playlists or messages to play");
                self.bus.notify(Notification::NoPlayableMessage {
                    transmitter_group: self.group.clone(),
                });
                self.exhausted_notified = true;
            }
            return None;
        }

        // Messages remain but none are playable right now; fill the air.
        let audio = AudioBuffer::new(self.filler_audio.clone());
        Some(MessagePlayback::filler(PlaybackCursor::filler(audio)))
    }

    fn pick_index(&mut self, now: DateTime<Utc>) -> Option<usize> {
        if !self.interrupt_lock.engaged() {
            if let Some(index) = self.entries.iter().position(|e| e.interrupt_pending) {
                return Some(index);
            }
        }

        let len = self.entries.len();
        for offset in 0..len {
            let index = (self.next_index + offset) % len;
            let entry = &self.entries[index];
            if entry.desc.interrupt && !entry.interrupt_pending {
                // Interrupts play once, not in rotation.
                continue;
            }
            if !entry.desc.scheduled_for(&self.group) {
                continue;
            }
            if !entry.periodic_due(now) {
                continue;
            }
            self.next_index = (index + 1) % len;
            return Some(index);
        }
        None
    }

    /// Load audio and build the playback for `index`. On failure the entry
    /// is reported and removed.
    async fn start_entry(&mut self, index: usize, now: DateTime<Utc>) -> Result<MessagePlayback, ()> {
        let desc = self.entries[index].desc.clone();
        let play_count = self.entries[index].play_count;

        let audio = match self.prepare_audio(&desc, play_count, now).await {
            Ok(audio) => audio,
            Err(e) => {
                self.entries.remove(index);
                if self.next_index > index {
                    self.next_index -= 1;
                }
                tracing::error!(
                    broadcast_id = desc.broadcast_id,
                    name = %desc.name,
                    error = %e,
                    "failed to retrieve audio, dropping message"
                );
                self.bus.notify(Notification::InitFailed {
                    transmitter_group: self.group.clone(),
                    broadcast_id: desc.broadcast_id,
                    name: desc.name,
                    interrupt: desc.interrupt,
                });
                return Err(());
            }
        };

        let entry = &mut self.entries[index];
        entry.interrupt_pending = false;
        entry.play_count += 1;
        entry.last_played = Some(now);

        let played_tones = audio.plays_tones();
        let status = PlaybackStatus {
            transmitter_group: self.group.clone(),
            broadcast_id: desc.broadcast_id,
            transmit_time: now,
            play_count: entry.play_count,
            played_same_tone: played_tones && desc.same_tone,
            played_alert_tone: played_tones && desc.alert_tone,
        };
        let cursor = PlaybackCursor::new(audio, status, desc.interrupt, desc.confirm);
        Ok(MessagePlayback::message(cursor, desc))
    }

    async fn prepare_audio(
        &self,
        desc: &MessageDescriptor,
        play_count: u32,
        now: DateTime<Utc>,
    ) -> Result<AudioBuffer, crate::audio::AudioError> {
        let body = load_audio(&desc.audio).await?;
        let mut audio = match &desc.tones {
            Some(tones_path) => {
                let tones = load_audio(tones_path).await?;
                let mut audio = AudioBuffer::with_tones(tones, body);
                // Tones alert listeners once; replays skip them.
                audio.set_play_tones(play_count == 0);
                audio
            }
            None => AudioBuffer::new(body),
        };

        if let Some(expire) = desc.expire {
            let window_ms = (expire - now).num_milliseconds();
            if window_ms > 0 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let frames_allowed = (window_ms as u64 / 20) as usize;
                if frames_allowed < audio.total_frames() {
                    audio.truncate_frames(frames_allowed);
                }
            }
        }
        Ok(audio)
    }
}
