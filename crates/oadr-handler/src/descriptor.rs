use oadr_model::{EventDescriptor, Signal, SignalInterval, SignalType, Targets};
use oadr_schedule::{parse_duration, str_to_datetime};
use oadr_xml::{PathStep, Span};

use crate::HandlerError;

/// Pulls an `EventDescriptor` out of the `ei:eiEvent` span nested inside
/// one `oadr:oadrEvent`, walking each field by its qualified path in turn.
pub fn extract(evt: &Span) -> Result<EventDescriptor, HandlerError> {
    let event_id = evt
        .find_text(&[("ei", "eventDescriptor"), ("ei", "eventID")])
        .ok_or(HandlerError::MissingField("ei:eventID"))?;

    let modification_number = evt
        .find_text(&[("ei", "eventDescriptor"), ("ei", "modificationNumber")])
        .and_then(|s| s.parse().ok())
        .ok_or(HandlerError::MissingField("ei:modificationNumber"))?;

    let status = evt
        .find_text(&[("ei", "eventDescriptor"), ("ei", "eventStatus")])
        .unwrap_or_default();

    let market_context = evt.find_text(&[
        ("ei", "eventDescriptor"),
        ("ei", "eiMarketContext"),
        ("emix", "marketContext"),
    ]);

    let start_str = evt
        .find_text(&[
            ("ei", "eiActivePeriod"),
            ("xcal", "properties"),
            ("xcal", "dtstart"),
            ("xcal", "date-time"),
        ])
        .ok_or(HandlerError::MissingField("xcal:dtstart"))?;
    let active_period_start = str_to_datetime(&start_str)?;

    let start_before = find_tolerance(evt, "startbefore")?;
    let start_after = find_tolerance(evt, "startafter")?;

    let targets = Targets {
        party_ids: text_list(evt, [("ei", "eiTarget"), ("ei", "partyID")]),
        group_ids: text_list(evt, [("ei", "eiTarget"), ("ei", "groupID")]),
        resource_ids: text_list(evt, [("ei", "eiTarget"), ("ei", "resourceID")]),
        ven_ids: text_list(evt, [("ei", "eiTarget"), ("ei", "venID")]),
    };

    Ok(EventDescriptor {
        event_id,
        modification_number,
        status,
        market_context,
        active_period_start,
        start_before,
        start_after,
        targets,
        signals: extract_signals(evt),
    })
}

fn text_list(evt: &Span, path: [PathStep; 2]) -> Vec<String> {
    evt.find_all(&path).iter().filter_map(|s| s.text().map(String::from)).collect()
}

fn find_tolerance(evt: &Span, field: &str) -> Result<Option<oadr_schedule::CalendarDuration>, HandlerError> {
    let path = [
        ("ei", "eiActivePeriod"),
        ("xcal", "properties"),
        ("xcal", "tolerance"),
        ("xcal", "tolerate"),
        ("xcal", field),
    ];
    match evt.find_text(&path) {
        Some(s) if !s.is_empty() => Ok(Some(parse_duration(&s)?)),
        _ => Ok(None),
    }
}

/// Iterates every `eiEventSignal`, overwriting a running match each time
/// one is found, so the *last* signal named `simple` with a recognized
/// type wins, not the first.
fn extract_signals(evt: &Span) -> Vec<Signal> {
    let mut selected: Option<Span> = None;
    for signal in evt.find_all(&[("ei", "eiEventSignals"), ("ei", "eiEventSignal")]) {
        let name = signal.find_text(&[("ei", "signalName")]);
        let recognized = signal
            .find_text(&[("ei", "signalType")])
            .and_then(|t| SignalType::parse(&t))
            .is_some();
        if name.as_deref() == Some("simple") && recognized {
            selected = Some(signal);
        }
    }

    let Some(signal) = selected else {
        return Vec::new();
    };
    let signal_type = signal
        .find_text(&[("ei", "signalType")])
        .and_then(|t| SignalType::parse(&t))
        .unwrap_or(SignalType::Level);

    let intervals = signal
        .find_all(&[("strm", "intervals"), ("ei", "interval")])
        .into_iter()
        .map(|interval| SignalInterval {
            duration: interval
                .find_text(&[("xcal", "duration"), ("xcal", "duration")])
                .and_then(|s| parse_duration(&s).ok())
                .unwrap_or_default(),
            uid: interval.find_text(&[("xcal", "uid"), ("xcal", "text")]),
            value: interval.find_descendant_text(("ei", "value")),
        })
        .collect();

    vec![Signal {
        name: "simple".to_owned(),
        signal_type,
        intervals,
    }]
}
