//! HTTP poll transport: the client-initiated side of event delivery.
//! Builds a `requestEvent`, POSTs it to the VTN, parses the reply as a
//! `distributeEvent`, hands it to the handler, and posts back any reply
//! the handler produces.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Certificate, Identity};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use url::Url;

use oadr_control::EventController;
use oadr_handler::EventHandler;
use oadr_store::EventStore;
use oadr_xml::{OadrDocument, Profile};

use crate::TransportError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const OADR2_URI_PATH: &str = "OpenADR2/Simple/EiEvent";
const CONTENT_TYPE: &str = "application/xml";

/// Optional mutual-TLS material, loaded from PEM files.
pub struct TlsConfig {
    pub client_cert_pem: Vec<u8>,
    pub client_key_pem: Vec<u8>,
    pub ca_bundle_pem: Vec<u8>,
}

pub struct HttpPollTransportConfig {
    pub vtn_base_uri: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub tls: Option<TlsConfig>,
}

impl Default for HttpPollTransportConfig {
    fn default() -> Self {
        Self {
            vtn_base_uri: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            tls: None,
        }
    }
}

/// Ensures exactly one trailing slash before the fixed `EiEvent` suffix.
fn event_uri(base: &str) -> Result<Url, TransportError> {
    let normalized = if base.ends_with('/') { base.to_owned() } else { format!("{base}/") };
    Ok(Url::parse(&normalized)?.join(OADR2_URI_PATH)?)
}

pub struct HttpPollTransport<S: EventStore + 'static> {
    client: reqwest::Client,
    event_uri: Url,
    profile: Profile,
    handler: Arc<EventHandler<S>>,
    controller: Arc<EventController<S>>,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
}

impl<S: EventStore + 'static> HttpPollTransport<S> {
    pub fn new(
        config: HttpPollTransportConfig,
        profile: Profile,
        handler: Arc<EventHandler<S>>,
        controller: Arc<EventController<S>>,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(tls) = config.tls {
            let identity = Identity::from_pkcs8_pem(&tls.client_cert_pem, &tls.client_key_pem)
                .map_err(TransportError::Network)?;
            let ca = Certificate::from_pem(&tls.ca_bundle_pem).map_err(TransportError::Network)?;
            builder = builder.identity(identity).add_root_certificate(ca).use_rustls_tls();
        }
        let client = builder.build().map_err(TransportError::Network)?;

        Ok(Self {
            client,
            event_uri: event_uri(&config.vtn_base_uri)?,
            profile,
            handler,
            controller,
            poll_interval: config.poll_interval,
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cooperative shutdown mirroring `oadr_control::EventController::stop`:
    /// set the flag, wake any interruptible sleep, let the caller join the
    /// returned handle with a bounded timeout.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while !self.stopping.load(Ordering::SeqCst) {
                if let Err(err) = self.poll_once().await {
                    tracing::warn!(error = %err, "poll iteration failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = self.shutdown.notified() => {}
                }
            }
            tracing::info!("http poll loop exiting");
        })
    }

    /// Build a `requestEvent`, POST it, parse the reply as a
    /// `distributeEvent`, hand it to the handler, and post back any
    /// reply the handler produces.
    async fn poll_once(&self) -> Result<(), TransportError> {
        let request = self.handler.build_request_payload()?;
        tracing::debug!(uri = %self.event_uri, "polling vtn for events");

        let response = self
            .client
            .post(self.event_uri.clone())
            .header("Content-Type", CONTENT_TYPE)
            .body(request.into_raw())
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "vtn returned a non-success status");
            return Ok(());
        }

        let body = response.bytes().await?.to_vec();
        let doc = OadrDocument::parse(body, self.profile)?;

        let reply = self.handler.handle_payload(&doc).await?;
        self.controller.signal_updated();

        if let Some(reply) = reply {
            self.client
                .post(self.event_uri.clone())
                .header("Content-Type", CONTENT_TYPE)
                .body(reply.into_raw())
                .send()
                .await?;
        }

        Ok(())
    }
}

/// Loads PEM-encoded TLS material from disk for `TlsConfig`.
pub fn load_tls_config(
    client_cert_path: &Path,
    client_key_path: &Path,
    ca_bundle_path: &Path,
) -> std::io::Result<TlsConfig> {
    Ok(TlsConfig {
        client_cert_pem: std::fs::read(client_cert_path)?,
        client_key_pem: std::fs::read(client_key_path)?,
        ca_bundle_pem: std::fs::read(ca_bundle_path)?,
    })
}
