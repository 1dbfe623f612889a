//! Configuration and tooling around `cuewire-osc`
//!
//! Loads `cuewire.toml`, installs logging and provides the pieces the
//! `osc_monitor` and `osc_send` binaries share.

pub mod logging;
pub mod net;
pub mod settings;

pub use settings::{
    AnnounceSettings, MappingSettings, ReceiveSettings, SendSettings, Settings, SettingsError,
    SETTINGS_FILENAME,
};
