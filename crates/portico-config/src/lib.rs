//! Portico configuration: the TOML settings file and the data directory.

pub mod dirs;
pub mod settings;

pub use settings::{
    CertSettings, DnsSettings, PlatformSettings, ProxySettings, Settings, SettingsError,
    StoreSettings,
};
