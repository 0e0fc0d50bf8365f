//! Layered file+env configuration loader, built on the `config` crate's
//! builder pattern: a TOML file merged with `VEN__`-prefixed environment
//! overrides. The VEN's parameter count - identity, two independent
//! transports, TLS paths, control tuning - warrants a structured file
//! over one environment variable per field.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use oadr_model::{OadrProfile, VenIdentity};

use crate::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct VenConfig {
    pub ven: VenSection,
    pub store: StoreSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub control: ControlSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenSection {
    pub ven_id: String,
    pub party_id: Option<String>,
    pub group_id: Option<String>,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub accepted_vtn_ids: Vec<String>,
    #[serde(default)]
    pub accepted_market_contexts: Vec<String>,
    #[serde(default = "default_profile")]
    pub profile: String,
}

fn default_profile() -> String {
    "2.0a".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TransportSection {
    #[serde(default)]
    pub http: HttpTransportSection,
    #[serde(default)]
    pub xmpp: XmppTransportSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HttpTransportSection {
    #[serde(default)]
    pub enabled: bool,
    pub vtn_base_uri: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub ca_bundle_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct XmppTransportSection {
    #[serde(default)]
    pub enabled: bool,
    pub jid: Option<String>,
    pub password: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlSection {
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
}

fn default_loop_interval_secs() -> u64 {
    30
}

impl Default for ControlSection {
    fn default() -> Self {
        Self { loop_interval_secs: default_loop_interval_secs() }
    }
}

impl VenConfig {
    /// Reads `ven.toml` (or `path`, if given), layered with `VEN_*`
    /// prefixed environment overrides (`VEN__VEN__VEN_ID`, double
    /// underscore separated, the `config` crate's convention for nested
    /// keys).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file_path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("ven.toml"));

        let built = config::Config::builder()
            .add_source(config::File::from(file_path).required(false))
            .add_source(config::Environment::with_prefix("VEN").separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }

    pub fn to_identity(&self) -> Result<VenIdentity, ConfigError> {
        let profile = match self.ven.profile.as_str() {
            "2.0a" => OadrProfile::TwoZeroA,
            "2.0b" => OadrProfile::TwoZeroB,
            other => return Err(ConfigError::InvalidProfile(other.to_owned())),
        };

        Ok(VenIdentity {
            ven_id: self.ven.ven_id.clone(),
            party_id: self.ven.party_id.clone(),
            group_id: self.ven.group_id.clone(),
            resource_id: self.ven.resource_id.clone(),
            accepted_vtn_ids: self.ven.accepted_vtn_ids.clone(),
            accepted_market_contexts: self.ven.accepted_market_contexts.clone(),
            profile,
        })
    }
}
