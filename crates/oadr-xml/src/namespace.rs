use phf::{phf_map, Map};

/// Which profile's namespace bindings a document should be read/written
/// against. Mirrors `oadr_model::OadrProfile` but kept local so `oadr-xml`
/// has no dependency on `oadr-model` (this crate sits below it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    TwoZeroA,
    TwoZeroB,
}

/// Prefix -> namespace URI bindings for one OpenADR profile. A compile-time
/// perfect-hash map - a small fixed lookup table that never grows at
/// runtime.
pub type NamespaceMap = Map<&'static str, &'static str>;

pub static NS_A: NamespaceMap = phf_map! {
    "oadr" => "http://openadr.org/oadr-2.0a/2012/07",
    "pyld" => "http://docs.oasis-open.org/ns/energyinterop/201110/payloads",
    "ei" => "http://docs.oasis-open.org/ns/energyinterop/201110",
    "emix" => "http://docs.oasis-open.org/ns/emix/2011/06",
    "xcal" => "urn:ietf:params:xml:ns:icalendar-2.0",
    "strm" => "urn:ietf:params:xml:ns:icalendar-2.0:stream",
};

pub static NS_B: NamespaceMap = phf_map! {
    "oadr" => "http://openadr.org/oadr-2.0b/2012/07",
    "pyld" => "http://docs.oasis-open.org/ns/energyinterop/201110/payloads",
    "ei" => "http://docs.oasis-open.org/ns/energyinterop/201110",
    "emix" => "http://docs.oasis-open.org/ns/emix/2011/06",
    "xcal" => "urn:ietf:params:xml:ns:icalendar-2.0",
    "strm" => "urn:ietf:params:xml:ns:icalendar-2.0:stream",
    "xmldsig" => "http://www.w3.org/2000/09/xmldsig#",
    "iso42173a" => "urn:un:unece:uncefact:codelist:standard:5:ISO42173A:2010-04-07",
    "siscale" => "http://docs.oasis-open.org/ns/emix/2011/06/siscale",
    "power" => "http://docs.oasis-open.org/ns/emix/2011/06/power",
    "gb" => "http://naesb.org/espi",
    "atom" => "http://www.w3.org/2005/Atom",
    "ccts" => "urn:un:unece:uncefact:documentation:standard:CoreComponentsTechnicalSpecification:2",
    "gml" => "http://www.opengis.net/gml/3.2",
    "gmlsf" => "http://www.opengis.net/gmlsf/2.0",
};

impl Profile {
    pub fn namespaces(self) -> &'static NamespaceMap {
        match self {
            Profile::TwoZeroA => &NS_A,
            Profile::TwoZeroB => &NS_B,
        }
    }

    /// The `oadr` prefix's own URI, used when writing envelope root elements.
    pub fn oadr_uri(self) -> &'static str {
        self.namespaces().get("oadr").copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_b_carries_the_extra_bindings() {
        assert!(NS_A.get("xmldsig").is_none());
        assert_eq!(NS_B.get("xmldsig"), Some(&"http://www.w3.org/2000/09/xmldsig#"));
    }

    #[test]
    fn both_profiles_share_the_ei_binding() {
        assert_eq!(NS_A.get("ei"), NS_B.get("ei"));
    }
}
