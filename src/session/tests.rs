use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::error::DacTransmitError;
use crate::session::{DacSession, MaintenanceSession};
use crate::types::{AmplitudeTargets, SessionConfig, SessionMode, TransmitterSet};

fn config(dir: PathBuf, mode: SessionMode) -> SessionConfig {
    SessionConfig {
        dac_hostname: "dac1".to_string(),
        dac_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        data_port: 20_000,
        control_port: 20_001,
        manager_port: 58_000,
        transmitter_group: "GROUP1".to_string(),
        playlist_directory: dir,
        mode,
        transmitters: TransmitterSet::new(vec![1]).unwrap(),
        amplitudes: AmplitudeTargets {
            voice: 5000,
            same: 6000,
            alert: 7000,
        },
        time_zone: "UTC".to_string(),
        maintenance_audio: None,
    }
}

#[test]
fn test_session_rejects_missing_playlist_directory() {
    let bad = config(PathBuf::from("/nonexistent/playlists"), SessionMode::Normal);
    let err = DacSession::new(bad).unwrap_err();
    assert!(matches!(err, DacTransmitError::Config(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_maintenance_session_requires_audio() {
    let dir = tempfile::tempdir().unwrap();
    let missing = config(dir.path().to_path_buf(), SessionMode::Maintenance);
    let err = MaintenanceSession::new(missing).unwrap_err();
    assert!(matches!(err, DacTransmitError::Config(_)));
}

#[test]
fn test_maintenance_session_accepts_real_audio() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("tone.ulaw");
    std::fs::write(&audio, vec![0x40; 1600]).unwrap();

    let mut cfg = config(dir.path().to_path_buf(), SessionMode::Maintenance);
    cfg.maintenance_audio = Some(audio);
    assert!(MaintenanceSession::new(cfg).is_ok());
}

#[tokio::test]
async fn test_shutdown_handle_escalates_but_never_downgrades() {
    use crate::events::ShutdownLevel;

    let dir = tempfile::tempdir().unwrap();
    let session = DacSession::new(config(dir.path().to_path_buf(), SessionMode::Normal)).unwrap();
    let handle = session.handle();
    let watch = session.shutdown_rx.clone();

    assert_eq!(*watch.borrow(), ShutdownLevel::Running);

    handle.shutdown(false);
    assert_eq!(*watch.borrow(), ShutdownLevel::Graceful);

    handle.shutdown(true);
    assert_eq!(*watch.borrow(), ShutdownLevel::Immediate);

    // A later graceful request must not undo an immediate one.
    handle.shutdown(false);
    assert_eq!(*watch.borrow(), ShutdownLevel::Immediate);
}
