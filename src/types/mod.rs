//! Core types

pub mod config;


pub use config::{
    AmplitudeTargets, ConfigError, RuntimeConfig, SessionConfig, SessionMode, SharedConfig,
    TransmitterSet,
};
