#![cfg(feature = "test-util")]

use std::sync::Arc;
use std::time::Duration;

use oadr_control::EventController;
use oadr_model::{EventKey, OadrProfile, VenIdentity};
use oadr_store::{EventStore, SqliteEventStore};
use oadr_ven::RegisterSink;

fn identity() -> Arc<VenIdentity> {
    Arc::new(VenIdentity {
        ven_id: "ven_py".to_owned(),
        party_id: None,
        group_id: None,
        resource_id: None,
        accepted_vtn_ids: vec![],
        accepted_market_contexts: vec![],
        profile: OadrProfile::TwoZeroA,
    })
}

const ACTIVE_EVENT: &str = r#"<?xml version="1.0"?>
<ei:eiEvent xmlns:ei="http://docs.oasis-open.org/ns/energyinterop/201110"
    xmlns:xcal="urn:ietf:params:xml:ns:icalendar-2.0"
    xmlns:strm="urn:ietf:params:xml:ns:icalendar-2.0:stream">
  <ei:eventDescriptor>
    <ei:eventID>e_1</ei:eventID>
    <ei:modificationNumber>0</ei:modificationNumber>
  </ei:eventDescriptor>
  <ei:eiActivePeriod>
    <xcal:properties>
      <xcal:dtstart><xcal:date-time>2000-01-01T00:00:00Z</xcal:date-time></xcal:dtstart>
    </xcal:properties>
  </ei:eiActivePeriod>
  <ei:eiEventSignals>
    <ei:eiEventSignal>
      <ei:signalName>simple</ei:signalName>
      <ei:signalType>level</ei:signalType>
      <strm:intervals>
        <ei:interval>
          <xcal:duration><xcal:duration>PT1H</xcal:duration></xcal:duration>
          <ei:signalPayload><ei:payloadFloat><ei:value>3.5</ei:value></ei:payloadFloat></ei:signalPayload>
        </ei:interval>
      </strm:intervals>
    </ei:eiEventSignal>
  </ei:eiEventSignals>
</ei:eiEvent>"#;

#[tokio::test]
async fn an_active_event_drives_the_register_to_its_signal_level() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteEventStore::connect(&dir.path().join("ven.db")).await.unwrap());
    store.upsert(&EventKey::new("vtn_1", "e_1"), 0, ACTIVE_EVENT.as_bytes()).await.unwrap();

    let sink = Arc::new(RegisterSink::new());
    let controller = EventController::new(identity(), store, sink.clone(), Duration::from_secs(30));
    let handle = controller.clone().spawn();

    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.stop();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

    assert_eq!(sink.values.get("signal_level").map(|v| *v), Some(3.5));
}
