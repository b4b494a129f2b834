//! Comms manager client

use std::net::Ipv4Addr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::broadcast::LiveBroadcastControl;
use crate::events::{EventBus, SessionEvent, ShutdownLevel};
use crate::playlist::ScanControl;
use crate::types::{SessionConfig, SharedConfig};

use super::codec::IpcCodec;
use super::messages::{IpcMessage, LiveBroadcastState, Notification, PlaybackStatus, Registration};
use super::IpcError;

/// Reconnection is retried at this fixed interval, indefinitely
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

type IpcStream = Framed<TcpStream, IpcCodec>;

/// Live-broadcast commands the client cannot execute itself; the session
/// owns the transmit machinery
#[derive(Debug)]
pub enum LiveCommand {
    /// Begin a live broadcast takeover
    Start {
        /// Live broadcast identifier
        broadcast_id: String,
        /// Pre-built tone audio to queue before the stream
        tones: Vec<u8>,
    },
}

/// Everything the client needs to act on manager commands
#[derive(Debug, Clone)]
pub struct CommsHandles {
    /// Runtime-mutable configuration
    pub shared: SharedConfig,
    /// Session event bus
    pub bus: EventBus,
    /// Live broadcast registry
    pub live: LiveBroadcastControl,
    /// Playlist scanner control
    pub scan: ScanControl,
}

/// Cached last-known playback state for snapshot replies
#[derive(Debug, Default)]
struct SnapshotCache {
    playlist: Option<PlaybackStatus>,
    live_broadcast: Option<String>,
}

/// The supervisory-channel client task
pub struct CommsClient {
    manager_port: u16,
    group: String,
    playlist_directory: String,
    data_port: u16,
    dac_hostname: String,
    handles: CommsHandles,
    live_cmds: mpsc::UnboundedSender<LiveCommand>,
    /// Last DAC connection status, replayed after registration
    cached_status: Option<bool>,
    cache: SnapshotCache,
}

impl CommsClient {
    /// Build the client for a session
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        handles: CommsHandles,
        live_cmds: mpsc::UnboundedSender<LiveCommand>,
    ) -> Self {
        Self {
            manager_port: config.manager_port,
            group: config.transmitter_group.clone(),
            playlist_directory: config.playlist_directory.display().to_string(),
            data_port: config.data_port,
            dac_hostname: config.dac_hostname.clone(),
            handles,
            live_cmds,
            cached_status: None,
            cache: SnapshotCache::default(),
        }
    }

    /// Run the connect/serve/reconnect loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<ShutdownLevel>) {
        let mut events = self.handles.bus.subscribe();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<IpcMessage>();

        while *shutdown.borrow() == ShutdownLevel::Running {
            match self.connect().await {
                Ok(mut stream) => {
                    tracing::info!(port = self.manager_port, "connected to comms manager");
                    let served = self
                        .serve(&mut stream, &mut events, &out_tx, &mut out_rx, &mut shutdown)
                        .await;
                    if let Err(e) = served {
                        tracing::error!(error = %e, "comms manager connection failed");
                    }
                    // Announce our departure; best effort.
                    let _ = stream.send(IpcMessage::Shutdown { now: false }).await;
                    self.on_disconnect();
                }
                Err(e) => {
                    tracing::error!(error = %e, "unable to connect to comms manager");
                    self.on_disconnect();
                }
            }

            if *shutdown.borrow() != ShutdownLevel::Running {
                break;
            }
            self.wait_retry(&mut events, &mut shutdown).await;
        }

        tracing::info!("comms manager client stopped");
    }

    async fn connect(&self) -> Result<IpcStream, IpcError> {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, self.manager_port)).await?;
        // With the manager down and its port in the ephemeral range, the OS
        // can complete a TCP simultaneous open against ourselves. That
        // holds the port and keeps the manager from ever starting, so bail
        // out immediately.
        if stream.local_addr()?.port() == self.manager_port {
            return Err(IpcError::SelfConnection {
                port: self.manager_port,
            });
        }
        stream.set_nodelay(true)?;
        Ok(Framed::new(stream, IpcCodec::new()))
    }

    async fn serve(
        &mut self,
        stream: &mut IpcStream,
        events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
        out_tx: &mpsc::UnboundedSender<IpcMessage>,
        out_rx: &mut mpsc::UnboundedReceiver<IpcMessage>,
        shutdown: &mut watch::Receiver<ShutdownLevel>,
    ) -> Result<(), IpcError> {
        let snapshot = self.handles.shared.snapshot().await;
        stream
            .send(IpcMessage::Register(Registration {
                playlist_directory: self.playlist_directory.clone(),
                data_port: self.data_port,
                dac_hostname: self.dac_hostname.clone(),
                transmitter_group: self.group.clone(),
                transmitters: snapshot.transmitters,
                amplitudes: snapshot.amplitudes,
            }))
            .await?;
        if self.cached_status == Some(true) {
            stream
                .send(IpcMessage::Status {
                    connected_to_dac: true,
                })
                .await?;
        }

        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(message)) => self.handle_inbound(message, out_tx).await,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
                event = events.recv() => {
                    if let Ok(event) = event {
                        self.handle_event(event, Some(out_tx));
                    }
                },
                outgoing = out_rx.recv() => {
                    if let Some(message) = outgoing {
                        stream.send(message).await?;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() != ShutdownLevel::Running {
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn handle_inbound(&mut self, message: IpcMessage, out_tx: &mpsc::UnboundedSender<IpcMessage>) {
        match message {
            IpcMessage::Shutdown { now } => {
                tracing::info!(now, "shutdown requested by comms manager");
                self.handles
                    .bus
                    .emit(SessionEvent::ShutdownRequested { now });
            }
            IpcMessage::ScanPlaylists { scan } => {
                tracing::info!(scan, "playlist scanning toggled by comms manager");
                self.handles.scan.set_enabled(scan);
            }
            IpcMessage::ChangeTransmitters { transmitters } => {
                tracing::info!(?transmitters, "transmitter set changed by comms manager");
                self.handles.shared.set_transmitters(transmitters).await;
            }
            IpcMessage::ChangeAmplitude { amplitudes } => {
                tracing::info!(?amplitudes, "amplitude targets changed by comms manager");
                self.handles.shared.set_amplitudes(amplitudes).await;
            }
            IpcMessage::ChangeTimeZone { time_zone } => {
                tracing::info!(%time_zone, "time zone changed by comms manager");
                self.handles.shared.set_time_zone(time_zone).await;
            }
            IpcMessage::SendPlaylistRequest { transmitter_group } => {
                let response = IpcMessage::SendPlaylistResponse {
                    transmitter_group,
                    playlist: self
                        .cache
                        .playlist
                        .clone()
                        .map(|current| super::messages::PlaylistSnapshot {
                            current: Some(current),
                            queued: Vec::new(),
                        }),
                    live_broadcast: self.cache.live_broadcast.clone(),
                };
                let _ = out_tx.send(response);
            }
            IpcMessage::LiveBroadcastStart {
                broadcast_id,
                tones,
            } => {
                let _ = self.live_cmds.send(LiveCommand::Start {
                    broadcast_id,
                    tones,
                });
            }
            IpcMessage::LiveBroadcastAudio {
                broadcast_id,
                audio,
            } => {
                self.handles.live.push_audio(&broadcast_id, &audio);
            }
            IpcMessage::LiveBroadcastStop { broadcast_id } => {
                self.handles.live.finish(&broadcast_id);
            }
            other => {
                tracing::error!(message = ?other, "unrecognized message from comms manager");
            }
        }
    }

    /// Track session events in the snapshot cache and, when connected,
    /// queue the outward message.
    fn handle_event(&mut self, event: SessionEvent, out_tx: Option<&mpsc::UnboundedSender<IpcMessage>>) {
        let outgoing = match event {
            SessionEvent::LostSync => {
                self.cached_status = Some(false);
                Some(IpcMessage::Status {
                    connected_to_dac: false,
                })
            }
            SessionEvent::RegainedSync { .. } => {
                self.cached_status = Some(true);
                Some(IpcMessage::Status {
                    connected_to_dac: true,
                })
            }
            SessionEvent::Notify(notification) => {
                self.update_cache(&notification);
                Some(IpcMessage::Notify(notification))
            }
            SessionEvent::ShutdownRequested { .. } => None,
        };

        if let Some(message) = outgoing {
            match out_tx {
                Some(out_tx) => {
                    let _ = out_tx.send(message);
                }
                None => {
                    tracing::warn!(?message, "comms manager unreachable, dropping message");
                }
            }
        }
    }

    fn update_cache(&mut self, notification: &Notification) {
        match notification {
            Notification::PlaybackStatus(status) => {
                self.cache.playlist = Some(status.clone());
            }
            Notification::NoPlayableMessage { .. } => {
                self.cache.playlist = None;
                self.cache.live_broadcast = None;
            }
            Notification::LiveBroadcastSwitch {
                broadcast_id,
                state,
                ..
            } => {
                self.cache.live_broadcast = match state {
                    LiveBroadcastState::Started => Some(broadcast_id.clone()),
                    LiveBroadcastState::Finished => None,
                };
            }
            _ => {}
        }
    }

    /// Losing the supervisory link is the only safe way a live broadcast
    /// can be terminated from outside, so treat the loss as an implicit
    /// halt. Normal playlist playback is unaffected.
    fn on_disconnect(&mut self) {
        if let Some(broadcast_id) = self.handles.live.halt_active() {
            tracing::warn!(%broadcast_id, "comms manager link lost, forcibly halting live broadcast");
        }
        // The session has to feed itself while the manager is away.
        self.handles.scan.kick();
    }

    /// Sleep the retry interval, keeping the event cache warm meanwhile
    async fn wait_retry(
        &mut self,
        events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
        shutdown: &mut watch::Receiver<ShutdownLevel>,
    ) {
        let retry = tokio::time::sleep(RETRY_INTERVAL);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                () = &mut retry => return,
                event = events.recv() => {
                    if let Ok(event) = event {
                        self.handle_event(event, None);
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() != ShutdownLevel::Running {
                        return;
                    }
                },
            }
        }
    }
}
