use std::sync::Arc;

use quick_xml::events::{BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;

use crate::namespace::NamespaceMap;
use crate::{Profile, XmlError};

/// One step of a query path: an `(namespace_prefix, local_name)` pair,
/// resolved against a `NamespaceMap` at match time. Analogous to one
/// `'ei:eventID'` segment of an lxml `findtext`/`iterfind` path string.
pub type PathStep<'a> = (&'a str, &'a str);

#[derive(Debug, Clone)]
struct ElemNode {
    ns_uri: Option<Vec<u8>>,
    local: String,
    text: Option<String>,
    children: Vec<ElemNode>,
    /// Byte offsets of this element's own span (opening tag through
    /// closing tag, or the whole self-closing tag) inside the raw
    /// document it was parsed from. Lets `Span::into_document` slice the
    /// original bytes instead of re-serializing from this stripped tree,
    /// so attributes, comments, CDATA and processing instructions nested
    /// inside survive untouched.
    start: usize,
    end: usize,
}

impl ElemNode {
    fn matches(&self, ns: &NamespaceMap, step: PathStep) -> bool {
        let (ns_key, local) = step;
        if self.local != local {
            return false;
        }
        match (&self.ns_uri, ns.get(ns_key)) {
            (Some(uri), Some(expected)) => uri.as_slice() == expected.as_bytes(),
            _ => false,
        }
    }
}

fn resolved_ns_uri(resolved: &ResolveResult) -> Option<Vec<u8>> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(uri.to_vec()),
        _ => None,
    }
}

/// Whether a resolved element name matches one `(prefix, local)` path step.
fn step_matches(resolved: &ResolveResult, local: &[u8], ns: &NamespaceMap, step: PathStep) -> bool {
    if local != step.1.as_bytes() {
        return false;
    }
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => ns.get(step.0).is_some_and(|expected| expected.as_bytes() == *uri),
        _ => false,
    }
}

fn attach(stack: &mut Vec<ElemNode>, root: &mut Option<ElemNode>, node: ElemNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else {
        *root = Some(node);
    }
}

/// Parses `raw` into a queryable tree, recording each element's byte span
/// as it goes (`reader.buffer_position()` before/after each event) so a
/// later `into_document` can slice the exact original bytes rather than
/// rebuild them from the (attribute-stripped) tree.
fn parse_tree(raw: &[u8]) -> Result<ElemNode, XmlError> {
    let mut reader = NsReader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<ElemNode> = Vec::new();
    let mut root: Option<ElemNode> = None;

    loop {
        let start_pos = reader.buffer_position() as usize;
        let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
        let end_pos = reader.buffer_position() as usize;

        match event {
            Event::Start(ref e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(ElemNode {
                    ns_uri: resolved_ns_uri(&resolved),
                    local,
                    text: None,
                    children: Vec::new(),
                    start: start_pos,
                    end: start_pos,
                });
            }
            Event::Empty(ref e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let node = ElemNode {
                    ns_uri: resolved_ns_uri(&resolved),
                    local,
                    text: None,
                    children: Vec::new(),
                    start: start_pos,
                    end: end_pos,
                };
                attach(&mut stack, &mut root, node);
            }
            Event::Text(ref e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape()?.into_owned();
                    let text = text.trim();
                    if !text.is_empty() {
                        top.text.get_or_insert_with(String::new).push_str(text);
                    }
                }
            }
            Event::CData(ref e) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    top.text.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(_) => {
                if let Some(mut node) = stack.pop() {
                    node.end = end_pos;
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| XmlError::NotFound {
        path: "<document root>".to_owned(),
    })
}

/// Depth-first search for the first descendant matching `step`, at any
/// depth - the equivalent of lxml's `//` wildcard-ancestor axis used by
/// `ei:signalPayload//ei:value` (a signal payload's value element nests
/// differently depending on its declared type).
fn find_descendant<'a>(node: &'a ElemNode, ns: &NamespaceMap, step: PathStep) -> Option<&'a ElemNode> {
    for child in &node.children {
        if child.matches(ns, step) {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, ns, step) {
            return Some(found);
        }
    }
    None
}

fn find_node<'a>(node: &'a ElemNode, ns: &NamespaceMap, path: &[PathStep]) -> Option<&'a ElemNode> {
    let mut current = node;
    for step in path {
        current = current.children.iter().find(|c| c.matches(ns, *step))?;
    }
    Some(current)
}

fn find_all_nodes<'a>(node: &'a ElemNode, ns: &NamespaceMap, path: &[PathStep]) -> Vec<&'a ElemNode> {
    if path.is_empty() {
        return vec![node];
    }
    let (last, init) = path.split_last().expect("checked non-empty above");
    let mut parents = vec![node];
    for step in init {
        parents = parents
            .into_iter()
            .flat_map(|p| p.children.iter().filter(move |c| c.matches(ns, *step)))
            .collect();
    }
    parents
        .into_iter()
        .flat_map(|p| p.children.iter().filter(move |c| c.matches(ns, *last)))
        .collect()
}

/// Rewrites a standalone subtree's root start tag to additionally declare
/// every prefix in `ns`, leaving every other byte - including the root's
/// own original attributes and everything nested inside it - untouched.
/// Needed because a subtree sliced out of an envelope (e.g. `eiEvent`)
/// relies on namespace declarations that live on an ancestor outside the
/// slice.
fn inject_namespaces(slice: &[u8], ns: &NamespaceMap) -> Result<Vec<u8>, XmlError> {
    let mut reader = quick_xml::Reader::from_reader(slice);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let event = reader.read_event_into(&mut buf)?;
    let consumed = reader.buffer_position() as usize;

    let is_empty = matches!(event, Event::Empty(_));
    let mut start = match event {
        Event::Start(e) | Event::Empty(e) => e.into_owned(),
        _ => {
            return Err(XmlError::NotFound {
                path: "<subtree root>".to_owned(),
            })
        }
    };
    let existing: Vec<Vec<u8>> = start
        .attributes()
        .filter_map(|a| a.ok().map(|a| a.key.as_ref().to_vec()))
        .collect();
    for (prefix, uri) in ns.entries() {
        let key = format!("xmlns:{prefix}");
        if !existing.iter().any(|e| e.as_slice() == key.as_bytes()) {
            start.push_attribute((key.as_str(), *uri));
        }
    }

    let mut out = Vec::new();
    {
        let mut writer = Writer::new(&mut out);
        if is_empty {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
        }
    }
    out.extend_from_slice(&slice[consumed..]);
    Ok(out)
}

/// A sub-element reached via `find_all` — a cloned subtree that can itself
/// be queried, equivalent to re-entering `evt.iterfind(...)` in the
/// original and operating on each matched `etree.Element` in turn.
#[derive(Debug, Clone)]
pub struct Span {
    node: ElemNode,
    ns: &'static NamespaceMap,
    raw: Arc<[u8]>,
}

impl Span {
    pub fn text(&self) -> Option<&str> {
        self.node.text.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.node.local
    }

    pub fn find_text(&self, path: &[PathStep]) -> Option<String> {
        find_node(&self.node, self.ns, path).and_then(|n| n.text.clone())
    }

    pub fn find_all(&self, path: &[PathStep]) -> Vec<Span> {
        find_all_nodes(&self.node, self.ns, path)
            .into_iter()
            .cloned()
            .map(|node| Span { node, ns: self.ns, raw: self.raw.clone() })
            .collect()
    }

    /// Finds the first descendant at any depth matching `step`, not just
    /// an immediate child - see `find_descendant` for why this exists.
    pub fn find_descendant_text(&self, step: PathStep) -> Option<String> {
        find_descendant(&self.node, self.ns, step).and_then(|n| n.text.clone())
    }

    /// Turns this span into a standalone document: the original bytes
    /// between this element's opening and closing tags are sliced out
    /// verbatim (attributes, comments, CDATA, nested markup all
    /// untouched) and the root tag is augmented with the namespace
    /// declarations it relied on from its former ancestors, so the slice
    /// can be parsed again on its own.
    pub fn into_document(self) -> Result<OadrDocument, XmlError> {
        let slice = &self.raw[self.node.start..self.node.end];
        let raw = inject_namespaces(slice, self.ns)?;
        let root = parse_tree(&raw)?;
        Ok(OadrDocument {
            raw: Arc::from(raw),
            ns: self.ns,
            root,
        })
    }
}

/// A namespace-aware OpenADR XML document. Holds the verbatim raw bytes
/// alongside a parsed index used for querying — mutation
/// (`replace_text`) re-walks the raw bytes directly so every byte outside
/// the targeted text node survives unchanged.
#[derive(Debug, Clone)]
pub struct OadrDocument {
    raw: Arc<[u8]>,
    ns: &'static NamespaceMap,
    root: ElemNode,
}

impl OadrDocument {
    pub fn parse(raw: Vec<u8>, profile: Profile) -> Result<Self, XmlError> {
        let root = parse_tree(&raw)?;
        Ok(Self {
            raw: Arc::from(raw),
            ns: profile.namespaces(),
            root,
        })
    }

    pub fn root_local_name(&self) -> &str {
        &self.root.local
    }

    pub fn find_text(&self, path: &[PathStep]) -> Option<String> {
        find_node(&self.root, self.ns, path).and_then(|n| n.text.clone())
    }

    pub fn find_all(&self, path: &[PathStep]) -> Vec<Span> {
        find_all_nodes(&self.root, self.ns, path)
            .into_iter()
            .cloned()
            .map(|node| Span { node, ns: self.ns, raw: self.raw.clone() })
            .collect()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw.to_vec()
    }

    /// Rewrites the text of the element reached by `path`, replaying every
    /// other event in the stream unchanged. Used for the one in-place
    /// mutation the handler performs: pinning a randomized active-period
    /// start into the persisted `eiEvent` on first acceptance.
    pub fn replace_text(&self, path: &[PathStep], new_text: &str) -> Result<Vec<u8>, XmlError> {
        let mut reader = NsReader::from_reader(self.raw.as_ref());
        reader.config_mut().trim_text(false);

        let mut writer = Writer::new(Vec::new());
        let mut buf = Vec::new();
        let mut stack: Vec<bool> = Vec::new();
        let mut progress = 0usize;
        let mut replaced = false;

        loop {
            let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
            let is_eof = matches!(event, Event::Eof);

            match &event {
                Event::Start(e) => {
                    let continues = progress < path.len()
                        && step_matches(&resolved, e.local_name().as_ref(), self.ns, path[progress]);
                    stack.push(continues);
                    if continues {
                        progress += 1;
                    }
                }
                Event::End(_) => {
                    if let Some(continues) = stack.pop() {
                        if continues {
                            progress -= 1;
                        }
                    }
                }
                _ => {}
            }

            if matches!(event, Event::Text(_)) && progress == path.len() && !replaced {
                writer.write_event(Event::Text(BytesText::new(new_text)))?;
                replaced = true;
            } else {
                writer.write_event(event)?;
            }

            if is_eof {
                break;
            }
            buf.clear();
        }

        if !replaced {
            return Err(XmlError::NotFound {
                path: path.iter().map(|(p, l)| format!("{p}:{l}")).collect::<Vec<_>>().join("/"),
            });
        }
        Ok(writer.into_inner())
    }
}
