use chrono::{DateTime, Utc};
use oadr_schedule::CalendarDuration;

/// Durable and in-memory primary key. Keying by the pair rather than
/// `event_id` alone avoids collisions between two VTNs that happen to
/// hand out the same event id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub vtn_id: String,
    pub event_id: String,
}

impl EventKey {
    pub fn new(vtn_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            vtn_id: vtn_id.into(),
            event_id: event_id.into(),
        }
    }
}

/// A row of the durable event table: the raw payload is the source of
/// truth, `modification_number` is hoisted out for fast monotonicity
/// checks without re-parsing XML on every write.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub key: EventKey,
    pub modification_number: i64,
    pub raw_xml: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Level,
    Price,
    Delta,
    Setpoint,
}

impl SignalType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "level" => Some(Self::Level),
            "price" => Some(Self::Price),
            "delta" => Some(Self::Delta),
            "setpoint" => Some(Self::Setpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalInterval {
    pub duration: CalendarDuration,
    pub uid: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub signal_type: SignalType,
    pub intervals: Vec<SignalInterval>,
}

#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub party_ids: Vec<String>,
    pub group_ids: Vec<String>,
    pub resource_ids: Vec<String>,
    pub ven_ids: Vec<String>,
}

impl Targets {
    /// Targeting is "specified" the moment any one of the four lists is
    /// non-empty; an event with all four empty is broadcast.
    pub fn is_specified(&self) -> bool {
        !self.party_ids.is_empty()
            || !self.group_ids.is_empty()
            || !self.resource_ids.is_empty()
            || !self.ven_ids.is_empty()
    }

    /// A single match among the four id-lists is enough to accept.
    pub fn matches(
        &self,
        party_id: Option<&str>,
        group_id: Option<&str>,
        resource_id: Option<&str>,
        ven_id: &str,
    ) -> bool {
        if !self.is_specified() {
            return true;
        }
        let in_list = |id: Option<&str>, list: &[String]| {
            id.is_some_and(|id| !id.is_empty() && list.iter().any(|x| x == id))
        };
        in_list(party_id, &self.party_ids)
            || in_list(group_id, &self.group_ids)
            || in_list(resource_id, &self.resource_ids)
            || in_list(Some(ven_id), &self.ven_ids)
    }
}

/// What the handler/controller extract from an `eiEvent` element. Not
/// persisted on its own — re-derived from `StoredEvent::raw_xml` whenever
/// needed, so the raw document stays the single source of truth.
#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub event_id: String,
    pub modification_number: i64,
    pub status: String,
    pub market_context: Option<String>,
    pub active_period_start: DateTime<Utc>,
    pub start_before: Option<CalendarDuration>,
    pub start_after: Option<CalendarDuration>,
    pub targets: Targets,
    pub signals: Vec<Signal>,
}

impl EventDescriptor {
    /// The first recognized `simple` signal - only signals named `simple`
    /// with a valid type are recognized. Any `Signal` reaching this list
    /// already carries a valid `SignalType` -
    /// the XML layer drops unrecognized `signalType` values at parse
    /// time, so only the name needs checking here.
    pub fn simple_signal(&self) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == "simple")
    }

    /// Whether `eiEvent/eventDescriptor/eventStatus` marks this event as
    /// cancelled by the VTN - one of the three ways an event stops being
    /// active, alongside expiry and implicit cancellation (absence from
    /// a later envelope).
    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case("cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_event_matches_everyone() {
        let targets = Targets::default();
        assert!(targets.matches(None, None, None, "any-ven"));
    }

    #[test]
    fn targeted_event_requires_a_match() {
        let targets = Targets {
            ven_ids: vec!["ven_py".to_owned()],
            ..Default::default()
        };
        assert!(!targets.matches(Some("Party_123"), Some("Group_123"), Some("Resource_123"), "ven_other"));
        assert!(targets.matches(Some("Party_123"), Some("Group_123"), Some("Resource_123"), "ven_py"));
    }

    #[test]
    fn single_list_match_is_sufficient() {
        let targets = Targets {
            party_ids: vec!["Party_123".to_owned()],
            group_ids: vec!["Group_999".to_owned()],
            ..Default::default()
        };
        assert!(targets.matches(Some("Party_123"), Some("Group_123"), None, "ven_x"));
    }
}
