//! DAC transmit daemon

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use dactransmit::{
    AmplitudeTargets, DacSession, MaintenanceSession, SessionConfig, SessionMode, TransmitterSet,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DAC hostname or address
    #[arg(short = 'd', long)]
    dac: String,

    /// UDP port for audio frames
    #[arg(short = 'p', long)]
    data_port: u16,

    /// UDP port for the DAC control channel (defaults to data port + 1)
    #[arg(long)]
    control_port: Option<u16>,

    /// Loopback TCP port of the comms manager
    #[arg(short = 'm', long)]
    manager_port: u16,

    /// Destination transmitter channels (1-4)
    #[arg(short = 't', long, value_delimiter = ',', required = true)]
    transmitters: Vec<u8>,

    /// Transmitter group this session broadcasts for
    #[arg(short = 'g', long)]
    group: String,

    /// Directory scanned for playlist descriptors
    #[arg(short = 'i', long)]
    input_directory: PathBuf,

    /// Voice audio amplitude target
    #[arg(long, default_value_t = 5000)]
    voice_amplitude: u16,

    /// SAME tone amplitude target
    #[arg(long, default_value_t = 5000)]
    same_amplitude: u16,

    /// Alert tone amplitude target
    #[arg(long, default_value_t = 5000)]
    alert_amplitude: u16,

    /// IANA time-zone identifier for scheduling
    #[arg(long, default_value = "UTC")]
    time_zone: String,

    /// Run a one-shot maintenance broadcast of this audio file
    #[arg(long)]
    maintenance_audio: Option<PathBuf>,
}

impl Args {
    async fn into_config(self) -> anyhow::Result<SessionConfig> {
        let dac_address: IpAddr = match self.dac.parse() {
            Ok(addr) => addr,
            Err(_) => {
                let addrs = tokio::net::lookup_host((self.dac.as_str(), self.data_port)).await?;
                addrs
                    .map(|a| a.ip())
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("could not resolve DAC host {}", self.dac))?
            }
        };

        let mode = if self.maintenance_audio.is_some() {
            SessionMode::Maintenance
        } else {
            SessionMode::Normal
        };

        Ok(SessionConfig {
            dac_hostname: self.dac,
            dac_address,
            data_port: self.data_port,
            control_port: self.control_port.unwrap_or(self.data_port + 1),
            manager_port: self.manager_port,
            transmitter_group: self.group,
            playlist_directory: self.input_directory,
            mode,
            transmitters: TransmitterSet::new(self.transmitters)?,
            amplitudes: AmplitudeTargets {
                voice: self.voice_amplitude,
                same: self.same_amplitude,
                alert: self.alert_amplitude,
            },
            time_zone: self.time_zone,
            maintenance_audio: self.maintenance_audio,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match args.into_config().await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid session configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(version = dactransmit::VERSION, "dactransmit starting");

    let result = match config.mode {
        SessionMode::Maintenance => match MaintenanceSession::new(config) {
            Ok(session) => session.run().await.map(|completed| {
                if !completed {
                    error!("maintenance broadcast was reaped or failed");
                }
            }),
            Err(e) => Err(e),
        },
        SessionMode::Normal => match DacSession::new(config) {
            Ok(session) => {
                let handle = session.handle();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("interrupt received, shutting down");
                        handle.shutdown(true);
                    }
                });
                session.run().await
            }
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "session failed");
            ExitCode::FAILURE
        }
    }
}
