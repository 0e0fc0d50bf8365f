use oadr_model::{EventDescriptor, Signal, SignalInterval, SignalType, Targets};
use oadr_schedule::{parse_duration, str_to_datetime};
use oadr_xml::{OadrDocument, PathStep, Span};

use crate::ControlError;

/// Pulls an `EventDescriptor` back out of a stored event's raw `eiEvent`
/// document - the same field walk `oadr_handler::descriptor::extract`
/// performs on the `eiEvent` span still embedded in an envelope, but the
/// controller only ever sees the already-unwrapped, persisted copy.
pub fn extract(doc: &OadrDocument) -> Result<EventDescriptor, ControlError> {
    let event_id = doc
        .find_text(&[("ei", "eventDescriptor"), ("ei", "eventID")])
        .ok_or(ControlError::MissingField("ei:eventID"))?;

    let modification_number = doc
        .find_text(&[("ei", "eventDescriptor"), ("ei", "modificationNumber")])
        .and_then(|s| s.parse().ok())
        .ok_or(ControlError::MissingField("ei:modificationNumber"))?;

    let status = doc
        .find_text(&[("ei", "eventDescriptor"), ("ei", "eventStatus")])
        .unwrap_or_default();

    let market_context = doc.find_text(&[
        ("ei", "eventDescriptor"),
        ("ei", "eiMarketContext"),
        ("emix", "marketContext"),
    ]);

    let start_str = doc
        .find_text(&[
            ("ei", "eiActivePeriod"),
            ("xcal", "properties"),
            ("xcal", "dtstart"),
            ("xcal", "date-time"),
        ])
        .ok_or(ControlError::MissingField("xcal:dtstart"))?;
    let active_period_start = str_to_datetime(&start_str)?;

    let start_before = find_tolerance(doc, "startbefore")?;
    let start_after = find_tolerance(doc, "startafter")?;

    let targets = Targets {
        party_ids: text_list(doc, [("ei", "eiTarget"), ("ei", "partyID")]),
        group_ids: text_list(doc, [("ei", "eiTarget"), ("ei", "groupID")]),
        resource_ids: text_list(doc, [("ei", "eiTarget"), ("ei", "resourceID")]),
        ven_ids: text_list(doc, [("ei", "eiTarget"), ("ei", "venID")]),
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
        signals: extract_signals(doc),
    })
}

fn text_list(doc: &OadrDocument, path: [PathStep; 2]) -> Vec<String> {
    doc.find_all(&path).iter().filter_map(|s| s.text().map(String::from)).collect()
}

fn find_tolerance(doc: &OadrDocument, field: &str) -> Result<Option<oadr_schedule::CalendarDuration>, ControlError> {
    let path = [
        ("ei", "eiActivePeriod"),
        ("xcal", "properties"),
        ("xcal", "tolerance"),
        ("xcal", "tolerate"),
        ("xcal", field),
    ];
    match doc.find_text(&path) {
        Some(s) if !s.is_empty() => Ok(Some(parse_duration(&s)?)),
        _ => Ok(None),
    }
}

/// Same "last matching `simple` signal wins" quirk as the handler's
/// extractor - see `oadr_handler::descriptor::extract_signals`.
fn extract_signals(doc: &OadrDocument) -> Vec<Signal> {
    let mut selected: Option<Span> = None;
    for signal in doc.find_all(&[("ei", "eiEventSignals"), ("ei", "eiEventSignal")]) {
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
