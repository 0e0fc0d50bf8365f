/// Which OpenADR namespace profile this VEN speaks. Fixed at
/// construction; selects the namespace map every XML query in
/// `oadr-handler` is parameterized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OadrProfile {
    TwoZeroA,
    TwoZeroB,
}

/// This VEN's process-wide identity, immutable after start.
#[derive(Debug, Clone)]
pub struct VenIdentity {
    pub ven_id: String,
    pub party_id: Option<String>,
    pub group_id: Option<String>,
    pub resource_id: Option<String>,
    /// Empty means unrestricted - any VTN is accepted.
    pub accepted_vtn_ids: Vec<String>,
    /// Empty means unrestricted - any market context is accepted.
    pub accepted_market_contexts: Vec<String>,
    pub profile: OadrProfile,
}

impl VenIdentity {
    pub fn accepts_vtn(&self, vtn_id: &str) -> bool {
        self.accepted_vtn_ids.is_empty() || self.accepted_vtn_ids.iter().any(|v| v == vtn_id)
    }

    pub fn accepts_market_context(&self, market_context: Option<&str>) -> bool {
        if self.accepted_market_contexts.is_empty() {
            return true;
        }
        match market_context {
            Some(mc) => self.accepted_market_contexts.iter().any(|m| m == mc),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn unrestricted_vtn_set_accepts_anything() {
        assert!(identity(vec![]).accepts_vtn("vtn_1"));
    }

    #[test]
    fn restricted_vtn_set_requires_membership() {
        let id = identity(vec!["vtn_1", "vtn_2"]);
        assert!(id.accepts_vtn("vtn_1"));
        assert!(!id.accepts_vtn("vtn_3"));
    }
}
