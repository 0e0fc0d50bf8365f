use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use oadr_xml::{OadrDocument, Profile};

use crate::decide::Opt;
use crate::HandlerError;

/// One line of a `createdEvent`'s `eventResponses` list.
pub struct ReplyLine {
    pub event_id: String,
    pub modification_number: i64,
    pub request_id: Option<String>,
    pub opt: Opt,
    pub status: &'static str,
}

fn open_root(writer: &mut Writer<Vec<u8>>, profile: Profile, local: &str) -> Result<(), quick_xml::Error> {
    let qname = format!("oadr:{local}");
    let mut start = BytesStart::new(qname.as_str());
    for (prefix, uri) in profile.namespaces().entries() {
        start.push_attribute((format!("xmlns:{prefix}").as_str(), *uri));
    }
    writer.write_event(Event::Start(start))
}

fn close_root(writer: &mut Writer<Vec<u8>>, local: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::End(BytesEnd::new(format!("oadr:{local}"))))
}

fn open(writer: &mut Writer<Vec<u8>>, qname: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(qname)))
}

fn close(writer: &mut Writer<Vec<u8>>, qname: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::End(BytesEnd::new(qname)))
}

fn text_elem(writer: &mut Writer<Vec<u8>>, qname: &str, text: &str) -> Result<(), quick_xml::Error> {
    open(writer, qname)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    close(writer, qname)
}

fn empty_elem(writer: &mut Writer<Vec<u8>>, qname: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Empty(BytesStart::new(qname)))
}

fn eiresponse(writer: &mut Writer<Vec<u8>>, code: &str, request_id: Option<&str>) -> Result<(), quick_xml::Error> {
    open(writer, "ei:eiResponse")?;
    text_elem(writer, "ei:responseCode", code)?;
    match request_id {
        Some(id) => text_elem(writer, "pyld:requestID", id)?,
        None => empty_elem(writer, "pyld:requestID")?,
    }
    close(writer, "ei:eiResponse")
}

/// `oadrRequestEvent`, used by the HTTP poll transport to pull events
/// from a VTN. Carries a fresh request id per call.
pub fn build_request_payload(profile: Profile, ven_id: &str) -> Result<OadrDocument, HandlerError> {
    let mut writer = Writer::new(Vec::new());
    open_root(&mut writer, profile, "oadrRequestEvent")?;
    open(&mut writer, "pyld:eiRequestEvent")?;
    text_elem(&mut writer, "pyld:requestID", &uuid::Uuid::new_v4().to_string())?;
    text_elem(&mut writer, "ei:venID", ven_id)?;
    text_elem(&mut writer, "pyld:replyLimit", "99")?;
    close(&mut writer, "pyld:eiRequestEvent")?;
    close_root(&mut writer, "oadrRequestEvent")?;
    Ok(OadrDocument::parse(writer.into_inner(), profile)?)
}

/// A `createdEvent` carrying a single top-level `eiResponse` and no
/// per-event lines - used when the whole envelope is rejected outright
/// (unknown VTN, malformed payload).
pub fn build_error_response(profile: Profile, ven_id: &str, request_id: Option<&str>, code: &str) -> Result<OadrDocument, HandlerError> {
    let mut writer = Writer::new(Vec::new());
    open_root(&mut writer, profile, "oadrCreatedEvent")?;
    open(&mut writer, "pyld:eiCreatedEvent")?;
    eiresponse(&mut writer, code, request_id)?;
    text_elem(&mut writer, "ei:venID", ven_id)?;
    close(&mut writer, "pyld:eiCreatedEvent")?;
    close_root(&mut writer, "oadrCreatedEvent")?;
    Ok(OadrDocument::parse(writer.into_inner(), profile)?)
}

/// A `createdEvent` enumerating one `eventResponse` per reply line owed,
/// in encounter order, alongside a top-level `200` `eiResponse`.
pub fn build_created_payload(profile: Profile, ven_id: &str, lines: &[ReplyLine]) -> Result<OadrDocument, HandlerError> {
    let mut writer = Writer::new(Vec::new());
    open_root(&mut writer, profile, "oadrCreatedEvent")?;
    open(&mut writer, "pyld:eiCreatedEvent")?;
    eiresponse(&mut writer, "200", None)?;

    open(&mut writer, "ei:eventResponses")?;
    for line in lines {
        open(&mut writer, "ei:eventResponse")?;
        text_elem(&mut writer, "ei:responseCode", line.status)?;
        match &line.request_id {
            Some(id) => text_elem(&mut writer, "pyld:requestID", id)?,
            None => empty_elem(&mut writer, "pyld:requestID")?,
        }
        open(&mut writer, "ei:qualifiedEventID")?;
        text_elem(&mut writer, "ei:eventID", &line.event_id)?;
        text_elem(&mut writer, "ei:modificationNumber", &line.modification_number.to_string())?;
        close(&mut writer, "ei:qualifiedEventID")?;
        text_elem(&mut writer, "ei:optType", line.opt.as_str())?;
        close(&mut writer, "ei:eventResponse")?;
    }
    close(&mut writer, "ei:eventResponses")?;

    text_elem(&mut writer, "ei:venID", ven_id)?;
    close(&mut writer, "pyld:eiCreatedEvent")?;
    close_root(&mut writer, "oadrCreatedEvent")?;
    Ok(OadrDocument::parse(writer.into_inner(), profile)?)
}
