//! XMPP push transport: the server-initiated side of event delivery.
//! Listens for `<iq type='set'>` stanzas carrying an `oadrDistributeEvent`
//! root, hands the payload to the handler, and replies with a
//! `set`-type `iq` addressed back to the sender. Built on `tokio-xmpp`,
//! the maintained async/tokio-native XMPP client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use minidom::Element;
use tokio::task::JoinHandle;
use tokio_xmpp::{AsyncClient as XmppClient, Event as XmppEvent};

use oadr_control::EventController;
use oadr_handler::EventHandler;
use oadr_store::EventStore;
use oadr_xml::{OadrDocument, Profile};

use crate::TransportError;

const DISTRIBUTE_EVENT_ROOT: &str = "oadrDistributeEvent";

/// A cloneable handle to stop a spawned [`XmppPushTransport`] loop once
/// `spawn` has moved the transport itself into its task.
#[derive(Clone)]
pub struct XmppStopHandle(Arc<AtomicBool>);

impl XmppStopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct XmppPushTransport<S: EventStore + 'static> {
    client: XmppClient,
    profile: Profile,
    handler: Arc<EventHandler<S>>,
    controller: Arc<EventController<S>>,
    stopping: Arc<AtomicBool>,
}

impl<S: EventStore + 'static> XmppPushTransport<S> {
    pub fn new(
        jid: &str,
        password: &str,
        profile: Profile,
        handler: Arc<EventHandler<S>>,
        controller: Arc<EventController<S>>,
    ) -> Self {
        Self {
            client: XmppClient::new(jid, password),
            profile,
            handler,
            controller,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// A cloneable shutdown switch, for callers that need to stop the
    /// loop after `spawn` has consumed `self`.
    pub fn stop_handle(&self) -> XmppStopHandle {
        XmppStopHandle(self.stopping.clone())
    }

    /// Drives the client's event stream. Only `set`-type `iq` stanzas
    /// whose payload root is `oadrDistributeEvent` are dispatched to the
    /// handler; everything else is ignored.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = self.client.next().await {
                if self.stopping.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = self.handle_event(event).await {
                    tracing::warn!(error = %err, "error handling xmpp event");
                }
            }
            tracing::info!("xmpp push loop exiting");
        })
    }

    async fn handle_event(&mut self, event: XmppEvent) -> Result<(), TransportError> {
        let Some((from, stanza)) = incoming_distribute_event(event) else {
            return Ok(());
        };

        let mut raw = Vec::new();
        stanza.write_to(&mut raw).map_err(|e| TransportError::Xmpp(e.to_string()))?;
        let doc = OadrDocument::parse(raw, self.profile)?;

        let reply = self.handler.handle_payload(&doc).await?;
        self.controller.signal_updated();

        if let Some(reply) = reply {
            let reply_elem = Element::from_reader(reply.into_raw().as_slice())
                .map_err(|e| TransportError::Xmpp(e.to_string()))?;
            let iq = Element::builder("iq", "jabber:client")
                .attr("type", "set")
                .attr("to", from.as_str())
                .append(reply_elem)
                .build();
            self.client.send_stanza(iq).await.map_err(|e| TransportError::Xmpp(e.to_string()))?;
        }

        Ok(())
    }
}

/// Unwraps an `Event::Stanza` iq of type `set` whose single child is the
/// `oadrDistributeEvent` root, returning the originating bare JID and the
/// event payload element. Anything else (presence, non-matching iq,
/// connection lifecycle events) yields `None` and is silently ignored.
fn incoming_distribute_event(event: XmppEvent) -> Option<(String, Element)> {
    let XmppEvent::Stanza(stanza) = event else {
        return None;
    };
    if stanza.name() != "iq" || stanza.attr("type") != Some("set") {
        return None;
    }
    let from = stanza.attr("from")?.to_owned();
    let payload = stanza.children().find(|c| c.name() == DISTRIBUTE_EVENT_ROOT)?.clone();
    Some((from, payload))
}
