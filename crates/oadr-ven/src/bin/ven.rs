//! The VEN process entrypoint: loads configuration, wires the store,
//! handler, controller and whichever transports are enabled, then runs
//! until `Ctrl-C`, shutting every task down within a bounded timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oadr_control::{EventController, LoggingSignalSink};
use oadr_handler::EventHandler;
use oadr_model::OadrProfile;
use oadr_store::SqliteEventStore;
use oadr_transport::{HttpPollTransport, HttpPollTransportConfig, XmppPushTransport};
use oadr_ven::VenConfig;

fn xml_profile(profile: OadrProfile) -> oadr_xml::Profile {
    match profile {
        OadrProfile::TwoZeroA => oadr_xml::Profile::TwoZeroA,
        OadrProfile::TwoZeroB => oadr_xml::Profile::TwoZeroB,
    }
}

/// A Virtual End Node: polls or is pushed `distributeEvent` payloads
/// from a VTN, tracks accepted events, and derives a live signal level.
#[derive(Parser)]
#[command(name = "ven", version, about)]
struct Args {
    /// Path to the TOML configuration file (defaults to `ven.toml` in
    /// the working directory; overridable per-field via `VEN__...` env vars).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = VenConfig::load(args.config.as_deref())?;
    let identity = Arc::new(config.to_identity()?);

    tracing::info!(ven_id = %identity.ven_id, profile = ?identity.profile, "starting ven");

    let store = Arc::new(SqliteEventStore::connect(&config.store.path).await?);
    let handler = Arc::new(EventHandler::new(identity.clone(), store.clone()));

    let loop_interval = Duration::from_secs(config.control.loop_interval_secs);
    let controller = EventController::new(identity.clone(), store.clone(), Arc::new(LoggingSignalSink), loop_interval);
    let control_handle = controller.clone().spawn();

    let mut http_transport = None;
    let mut http_handle = None;
    if config.transport.http.enabled {
        let http_section = &config.transport.http;
        let vtn_base_uri = http_section
            .vtn_base_uri
            .clone()
            .ok_or("transport.http.enabled is true but vtn_base_uri is not set")?;

        let tls = match (&http_section.client_cert_path, &http_section.client_key_path, &http_section.ca_bundle_path) {
            (Some(cert), Some(key), Some(ca)) => Some(oadr_transport::load_tls_config(cert, key, ca)?),
            _ => None,
        };

        let http_config = HttpPollTransportConfig {
            vtn_base_uri,
            poll_interval: http_section
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(oadr_transport::DEFAULT_POLL_INTERVAL),
            request_timeout: http_section
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(oadr_transport::DEFAULT_REQUEST_TIMEOUT),
            tls,
        };

        let transport = Arc::new(HttpPollTransport::new(http_config, xml_profile(identity.profile), handler.clone(), controller.clone())?);
        http_handle = Some(transport.clone().spawn());
        http_transport = Some(transport);
    }

    let mut xmpp_stop = None;
    let mut xmpp_handle = None;
    if config.transport.xmpp.enabled {
        let xmpp_section = &config.transport.xmpp;
        let jid = xmpp_section.jid.clone().ok_or("transport.xmpp.enabled is true but jid is not set")?;
        let password = xmpp_section.password.clone().ok_or("transport.xmpp.enabled is true but password is not set")?;

        let transport = XmppPushTransport::new(&jid, &password, xml_profile(identity.profile), handler.clone(), controller.clone());
        xmpp_stop = Some(transport.stop_handle());
        xmpp_handle = Some(transport.spawn());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    controller.stop();
    if let Some(transport) = &http_transport {
        transport.stop();
    }
    if let Some(stop) = &xmpp_stop {
        stop.stop();
    }

    const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, control_handle).await;
    if let Some(handle) = http_handle {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
    }
    if let Some(handle) = xmpp_handle {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
    }

    tracing::info!("ven stopped");
    Ok(())
}
