//! The Event Handler: the payload state machine translating a received
//! `distributeEvent` document into store mutations and, where owed, a
//! `createdEvent` reply. The three decision points (whether a reply is
//! owed, what opt status it carries, whether the store should mutate)
//! are split into named helpers instead of re-derived inline three
//! times over.

mod decide;
mod descriptor;
mod error;
mod reply;

pub use error::HandlerError;
pub use reply::ReplyLine;

use std::sync::Arc;

use oadr_model::{EventKey, OadrProfile, VenIdentity};
use oadr_store::EventStore;
use oadr_xml::{OadrDocument, Profile};

pub struct EventHandler<S: EventStore> {
    identity: Arc<VenIdentity>,
    store: Arc<S>,
}

impl<S: EventStore> EventHandler<S> {
    pub fn new(identity: Arc<VenIdentity>, store: Arc<S>) -> Self {
        Self { identity, store }
    }

    fn profile(&self) -> Profile {
        match self.identity.profile {
            OadrProfile::TwoZeroA => Profile::TwoZeroA,
            OadrProfile::TwoZeroB => Profile::TwoZeroB,
        }
    }

    pub fn build_request_payload(&self) -> Result<OadrDocument, HandlerError> {
        reply::build_request_payload(self.profile(), &self.identity.ven_id)
    }

    pub fn build_error_response(&self, request_id: Option<&str>, code: &str) -> Result<OadrDocument, HandlerError> {
        reply::build_error_response(self.profile(), &self.identity.ven_id, request_id, code)
    }

    /// Validates the VTN, then for each carried event decides whether a
    /// reply line is owed, what opt status it carries, and whether the
    /// store should move forward to the new copy; finally sweeps any
    /// previously-active event absent from this envelope as implicitly
    /// cancelled.
    #[tracing::instrument(skip_all)]
    pub async fn handle_payload(&self, doc: &OadrDocument) -> Result<Option<OadrDocument>, HandlerError> {
        let request_id = doc.find_text(&[("pyld", "requestID")]);
        let vtn_id = doc.find_text(&[("ei", "vtnID")]).ok_or(HandlerError::MissingField("ei:vtnID"))?;

        if !self.identity.accepts_vtn(&vtn_id) {
            tracing::warn!(vtn_id = %vtn_id, "rejecting distributeEvent from an unaccepted VTN");
            return Ok(Some(self.build_error_response(request_id.as_deref(), "400")?));
        }

        let mut reply_lines = Vec::new();
        let mut seen_event_ids = Vec::new();

        for oadr_event in doc.find_all(&[("oadr", "oadrEvent")]) {
            let response_required = oadr_event.find_text(&[("oadr", "oadrResponseRequired")]);
            let Some(ei_event) = oadr_event.find_all(&[("ei", "eiEvent")]).into_iter().next() else {
                continue;
            };

            let descriptor = descriptor::extract(&ei_event)?;

            if descriptor.is_cancelled() {
                tracing::debug!(event_id = %descriptor.event_id, "event status indicates cancellation");
                continue;
            }
            seen_event_ids.push(descriptor.event_id.clone());

            let key = EventKey::new(vtn_id.clone(), descriptor.event_id.clone());
            let prior = self.store.get(&key).await?;
            let prior_mod = prior.as_ref().map(|p| p.modification_number);

            if decide::decide_reply(prior_mod, descriptor.modification_number, response_required.as_deref()) {
                let (opt, status) = decide::decide_opt_status(&self.identity, &descriptor, prior_mod);
                reply_lines.push(ReplyLine {
                    event_id: descriptor.event_id.clone(),
                    modification_number: descriptor.modification_number,
                    request_id: request_id.clone(),
                    opt,
                    status,
                });
            }

            if decide::decide_mutation(prior_mod, descriptor.modification_number) {
                let raw_xml = match (descriptor.start_before, descriptor.start_after) {
                    (None, None) => ei_event.into_document()?.into_raw(),
                    _ => {
                        let new_start = oadr_schedule::random_offset(
                            descriptor.active_period_start,
                            descriptor.start_before,
                            descriptor.start_after,
                        );
                        let doc = ei_event.into_document()?;
                        doc.replace_text(
                            &[
                                ("ei", "eiActivePeriod"),
                                ("xcal", "properties"),
                                ("xcal", "dtstart"),
                                ("xcal", "date-time"),
                            ],
                            &oadr_schedule::dttm_to_str(&new_start, false),
                        )?
                    }
                };
                self.store.upsert(&key, descriptor.modification_number, &raw_xml).await?;
            }
        }

        let active = self.store.get_active_events().await?;
        let cancelled: Vec<EventKey> = active
            .into_iter()
            .map(|e| e.key)
            .filter(|k| k.vtn_id == vtn_id && !seen_event_ids.contains(&k.event_id))
            .collect();
        if !cancelled.is_empty() {
            self.store.remove(&cancelled).await?;
        }

        if reply_lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reply::build_created_payload(self.profile(), &self.identity.ven_id, &reply_lines)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oadr_store::SqliteEventStore;

    fn identity(vtn_ids: Vec<&str>) -> VenIdentity {
        VenIdentity {
            ven_id: "ven_py".to_owned(),
            party_id: None,
            group_id: None,
            resource_id: None,
            accepted_vtn_ids: vtn_ids.into_iter().map(String::from).collect(),
            accepted_market_contexts: vec![],
            profile: OadrProfile::TwoZeroA,
        }
    }

    fn distribute_event(vtn_id: &str, event_id: &str, mod_num: i64) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<oadr:oadrDistributeEvent xmlns:oadr="http://openadr.org/oadr-2.0a/2012/07"
    xmlns:pyld="http://docs.oasis-open.org/ns/energyinterop/201110/payloads"
    xmlns:ei="http://docs.oasis-open.org/ns/energyinterop/201110"
    xmlns:emix="http://docs.oasis-open.org/ns/emix/2011/06"
    xmlns:xcal="urn:ietf:params:xml:ns:icalendar-2.0"
    xmlns:strm="urn:ietf:params:xml:ns:icalendar-2.0:stream">
  <pyld:requestID>req-1</pyld:requestID>
  <ei:vtnID>{vtn_id}</ei:vtnID>
  <oadr:oadrEvent>
    <oadr:oadrResponseRequired>always</oadr:oadrResponseRequired>
    <ei:eiEvent>
      <ei:eventDescriptor>
        <ei:eventID>{event_id}</ei:eventID>
        <ei:modificationNumber>{mod_num}</ei:modificationNumber>
      </ei:eventDescriptor>
      <ei:eiActivePeriod>
        <xcal:properties>
          <xcal:dtstart><xcal:date-time>2013-05-12T08:30:50Z</xcal:date-time></xcal:dtstart>
        </xcal:properties>
      </ei:eiActivePeriod>
      <ei:eiEventSignals>
        <ei:eiEventSignal>
          <ei:signalName>simple</ei:signalName>
          <ei:signalType>level</ei:signalType>
          <strm:intervals>
            <ei:interval>
              <xcal:duration><xcal:duration>PT5M</xcal:duration></xcal:duration>
              <ei:signalPayload><ei:payloadFloat><ei:value>1.0</ei:value></ei:payloadFloat></ei:signalPayload>
            </ei:interval>
          </strm:intervals>
        </ei:eiEventSignal>
      </ei:eiEventSignals>
    </ei:eiEvent>
  </oadr:oadrEvent>
</oadr:oadrDistributeEvent>"#
        )
        .into_bytes()
    }

    fn cancelled_distribute_event(vtn_id: &str, event_id: &str, mod_num: i64) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<oadr:oadrDistributeEvent xmlns:oadr="http://openadr.org/oadr-2.0a/2012/07"
    xmlns:pyld="http://docs.oasis-open.org/ns/energyinterop/201110/payloads"
    xmlns:ei="http://docs.oasis-open.org/ns/energyinterop/201110"
    xmlns:emix="http://docs.oasis-open.org/ns/emix/2011/06"
    xmlns:xcal="urn:ietf:params:xml:ns:icalendar-2.0"
    xmlns:strm="urn:ietf:params:xml:ns:icalendar-2.0:stream">
  <pyld:requestID>req-1</pyld:requestID>
  <ei:vtnID>{vtn_id}</ei:vtnID>
  <oadr:oadrEvent>
    <oadr:oadrResponseRequired>always</oadr:oadrResponseRequired>
    <ei:eiEvent>
      <ei:eventDescriptor>
        <ei:eventID>{event_id}</ei:eventID>
        <ei:modificationNumber>{mod_num}</ei:modificationNumber>
        <ei:eventStatus>cancelled</ei:eventStatus>
      </ei:eventDescriptor>
      <ei:eiActivePeriod>
        <xcal:properties>
          <xcal:dtstart><xcal:date-time>2013-05-12T08:30:50Z</xcal:date-time></xcal:dtstart>
        </xcal:properties>
      </ei:eiActivePeriod>
      <ei:eiEventSignals>
        <ei:eiEventSignal>
          <ei:signalName>simple</ei:signalName>
          <ei:signalType>level</ei:signalType>
          <strm:intervals>
            <ei:interval>
              <xcal:duration><xcal:duration>PT5M</xcal:duration></xcal:duration>
              <ei:signalPayload><ei:payloadFloat><ei:value>1.0</ei:value></ei:payloadFloat></ei:signalPayload>
            </ei:interval>
          </strm:intervals>
        </ei:eiEventSignal>
      </ei:eiEventSignals>
    </ei:eiEvent>
  </oadr:oadrEvent>
</oadr:oadrDistributeEvent>"#
        )
        .into_bytes()
    }

    async fn handler() -> (EventHandler<SqliteEventStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::connect(&dir.path().join("ven.db")).await.unwrap();
        (EventHandler::new(Arc::new(identity(vec!["vtn_1", "vtn_2"])), Arc::new(store)), dir)
    }

    #[tokio::test]
    async fn first_acceptance_stores_and_replies_optin() {
        let (handler, _dir) = handler().await;
        let doc = OadrDocument::parse(distribute_event("vtn_1", "e_1", 0), Profile::TwoZeroA).unwrap();

        let reply = handler.handle_payload(&doc).await.unwrap().expect("reply owed");
        assert_eq!(reply.find_text(&[("pyld", "eiCreatedEvent"), ("ei", "venID")]).as_deref(), Some("ven_py"));
        let responses = reply.find_all(&[("pyld", "eiCreatedEvent"), ("ei", "eventResponses"), ("ei", "eventResponse")]);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].find_text(&[("ei", "optType")]).as_deref(), Some("optIn"));

        let stored = handler.store.get(&EventKey::new("vtn_1", "e_1")).await.unwrap().unwrap();
        assert_eq!(stored.modification_number, 0);
    }

    #[tokio::test]
    async fn stale_modification_leaves_store_untouched() {
        let (handler, _dir) = handler().await;
        let first = OadrDocument::parse(distribute_event("vtn_1", "e_1", 5), Profile::TwoZeroA).unwrap();
        handler.handle_payload(&first).await.unwrap();

        let stale = OadrDocument::parse(distribute_event("vtn_1", "e_1", 3), Profile::TwoZeroA).unwrap();
        let reply = handler.handle_payload(&stale).await.unwrap().expect("reply owed");
        let responses = reply.find_all(&[("pyld", "eiCreatedEvent"), ("ei", "eventResponses"), ("ei", "eventResponse")]);
        assert_eq!(responses[0].find_text(&[("ei", "optType")]).as_deref(), Some("optOut"));
        assert_eq!(responses[0].find_text(&[("ei", "responseCode")]).as_deref(), Some("403"));

        let stored = handler.store.get(&EventKey::new("vtn_1", "e_1")).await.unwrap().unwrap();
        assert_eq!(stored.modification_number, 5);
    }

    #[tokio::test]
    async fn implicit_cancel_removes_events_absent_from_a_later_envelope() {
        let (handler, _dir) = handler().await;
        let first = OadrDocument::parse(distribute_event("vtn_1", "e_1", 0), Profile::TwoZeroA).unwrap();
        handler.handle_payload(&first).await.unwrap();

        let second = OadrDocument::parse(distribute_event("vtn_1", "e_2", 0), Profile::TwoZeroA).unwrap();
        handler.handle_payload(&second).await.unwrap();

        assert!(handler.store.get(&EventKey::new("vtn_1", "e_1")).await.unwrap().is_none());
        assert!(handler.store.get(&EventKey::new("vtn_1", "e_2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancelled_status_removes_a_previously_accepted_event() {
        let (handler, _dir) = handler().await;
        let first = OadrDocument::parse(distribute_event("vtn_1", "e_1", 0), Profile::TwoZeroA).unwrap();
        handler.handle_payload(&first).await.unwrap();
        assert!(handler.store.get(&EventKey::new("vtn_1", "e_1")).await.unwrap().is_some());

        let cancel = OadrDocument::parse(cancelled_distribute_event("vtn_1", "e_1", 1), Profile::TwoZeroA).unwrap();
        handler.handle_payload(&cancel).await.unwrap();

        assert!(handler.store.get(&EventKey::new("vtn_1", "e_1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unaccepted_vtn_is_rejected_with_a_400() {
        let (handler, _dir) = handler().await;
        let doc = OadrDocument::parse(distribute_event("vtn_unknown", "e_1", 0), Profile::TwoZeroA).unwrap();
        let reply = handler.handle_payload(&doc).await.unwrap().expect("error response");
        assert_eq!(
            reply.find_text(&[("pyld", "eiCreatedEvent"), ("ei", "eiResponse"), ("ei", "responseCode")]).as_deref(),
            Some("400")
        );
    }
}
