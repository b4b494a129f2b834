//! Playlist-directory scanning

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};

use crate::events::ShutdownLevel;

use super::PlaylistError;
use super::message::Playlist;

/// How often the scanner sweeps the directory while scanning is enabled
const SCAN_PERIOD: Duration = Duration::from_secs(30);

/// Updates flowing from the scanner to the scheduler
#[derive(Debug, Clone)]
pub enum PlaylistUpdate {
    /// A playlist descriptor was loaded or reloaded
    Loaded(Playlist),
}

/// Control surface the supervisory channel uses to steer the scanner
#[derive(Debug, Clone)]
pub struct ScanControl {
    enable: watch::Sender<bool>,
    kick: mpsc::UnboundedSender<()>,
}

impl ScanControl {
    /// Enable or disable periodic scanning
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.enable.send(enabled);
    }

    /// Request an immediate sweep regardless of the enable flag. Used when
    /// the comms manager is unreachable and the session must fend for
    /// itself.
    pub fn kick(&self) {
        let _ = self.kick.send(());
    }
}

/// Watches the playlist directory and feeds the scheduler
pub struct PlaylistScanner {
    dir: PathBuf,
    updates: mpsc::UnboundedSender<PlaylistUpdate>,
    enable: watch::Receiver<bool>,
    kick: mpsc::UnboundedReceiver<()>,
    seen: HashMap<PathBuf, SystemTime>,
}

impl PlaylistScanner {
    /// Create a scanner and its control surface. Scanning starts enabled;
    /// the comms manager normally disables it once it takes over playlist
    /// delivery.
    #[must_use]
    pub fn new(
        dir: PathBuf,
        updates: mpsc::UnboundedSender<PlaylistUpdate>,
    ) -> (Self, ScanControl) {
        let (enable_tx, enable_rx) = watch::channel(true);
        let (kick_tx, kick_rx) = mpsc::unbounded_channel();
        (
            Self {
                dir,
                updates,
                enable: enable_rx,
                kick: kick_rx,
                seen: HashMap::new(),
            },
            ScanControl {
                enable: enable_tx,
                kick: kick_tx,
            },
        )
    }

    /// Run until shutdown, sweeping periodically while enabled and on
    /// every kick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<ShutdownLevel>) {
        let mut ticker = tokio::time::interval(SCAN_PERIOD);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() != ShutdownLevel::Running {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *self.enable.borrow() {
                        self.scan_once().await;
                    }
                }
                kicked = self.kick.recv() => {
                    if kicked.is_none() {
                        break;
                    }
                    self.scan_once().await;
                }
            }
        }
        tracing::debug!("playlist scanner stopped");
    }

    /// Sweep the directory once. Malformed descriptors found while running
    /// are logged and skipped, never fatal.
    async fn scan_once(&mut self) {
        let files = match list_descriptors(&self.dir).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "playlist directory scan failed");
                return;
            }
        };

        for (path, modified) in files {
            if self.seen.get(&path) == Some(&modified) {
                continue;
            }
            match load_descriptor(&path).await {
                Ok(playlist) => {
                    self.seen.insert(path, modified);
                    if self.updates.send(PlaylistUpdate::Loaded(playlist)).is_err() {
                        return; // scheduler is gone
                    }
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "skipping bad playlist descriptor");
                    self.seen.insert(path, modified);
                }
            }
        }
    }
}

async fn list_descriptors(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>, PlaylistError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| PlaylistError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut files = Vec::new();
    loop {
        let entry = entries
            .next_entry()
            .await
            .map_err(|source| PlaylistError::Scan {
                path: dir.to_path_buf(),
                source,
            })?;
        let Some(entry) = entry else { break };
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified));
    }
    files.sort();
    Ok(files)
}

async fn load_descriptor(path: &Path) -> Result<Playlist, PlaylistError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| PlaylistError::Scan {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&data).map_err(|source| PlaylistError::Descriptor {
        path: path.to_path_buf(),
        source,
    })
}

/// Load every descriptor in the directory, strictly.
///
/// Used at session start, where a malformed descriptor is fatal.
///
/// # Errors
///
/// Returns the first `PlaylistError` encountered.
pub async fn initial_scan(dir: &Path) -> Result<Vec<Playlist>, PlaylistError> {
    let mut playlists = Vec::new();
    for (path, _) in list_descriptors(dir).await? {
        playlists.push(load_descriptor(&path).await?);
    }
    Ok(playlists)
}
