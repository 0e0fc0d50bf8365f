use oadr_model::{EventDescriptor, VenIdentity};

/// The `optType` half of a reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opt {
    In,
    Out,
}

impl Opt {
    pub fn as_str(self) -> &'static str {
        match self {
            Opt::In => "optIn",
            Opt::Out => "optOut",
        }
    }
}

/// A reply line is owed when there was no prior copy, the new
/// modification number is strictly higher, or the VTN demanded a
/// response regardless.
pub fn decide_reply(prior_mod: Option<i64>, new_mod: i64, response_required: Option<&str>) -> bool {
    prior_mod.is_none() || prior_mod.is_some_and(|prior| new_mod > prior) || response_required == Some("always")
}

/// The first matching check wins, falling through to `(optIn, 200)` when
/// none apply.
pub fn decide_opt_status(identity: &VenIdentity, descriptor: &EventDescriptor, prior_mod: Option<i64>) -> (Opt, &'static str) {
    if prior_mod.is_some_and(|prior| descriptor.modification_number < prior) {
        return (Opt::Out, "403");
    }
    if !descriptor.targets.matches(
        identity.party_id.as_deref(),
        identity.group_id.as_deref(),
        identity.resource_id.as_deref(),
        &identity.ven_id,
    ) {
        return (Opt::Out, "403");
    }
    if descriptor.simple_signal().is_none() {
        return (Opt::Out, "403");
    }
    if !identity.accepts_market_context(descriptor.market_context.as_deref()) {
        return (Opt::Out, "405");
    }
    (Opt::In, "200")
}

/// The store only moves forward on a strictly higher modification
/// number (or no prior copy at all).
pub fn decide_mutation(prior_mod: Option<i64>, new_mod: i64) -> bool {
    prior_mod.is_none() || prior_mod.is_some_and(|prior| new_mod > prior)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oadr_model::{OadrProfile, Targets};

    fn identity() -> VenIdentity {
        VenIdentity {
            ven_id: "ven_py".to_owned(),
            party_id: Some("Party_123".to_owned()),
            group_id: Some("Group_123".to_owned()),
            resource_id: Some("Resource_123".to_owned()),
            accepted_vtn_ids: vec![],
            accepted_market_contexts: vec![],
            profile: OadrProfile::TwoZeroA,
        }
    }

    fn descriptor(targets: Targets) -> EventDescriptor {
        use chrono::{TimeZone, Utc};
        use oadr_model::{Signal, SignalInterval, SignalType};
        EventDescriptor {
            event_id: "e_1".to_owned(),
            modification_number: 0,
            status: String::new(),
            market_context: None,
            active_period_start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            start_before: None,
            start_after: None,
            targets,
            signals: vec![Signal {
                name: "simple".to_owned(),
                signal_type: SignalType::Level,
                intervals: vec![SignalInterval {
                    duration: Default::default(),
                    uid: None,
                    value: Some("1".to_owned()),
                }],
            }],
        }
    }

    #[test]
    fn stale_modification_opts_out_before_anything_else_is_checked() {
        let d = descriptor(Targets::default());
        assert_eq!(decide_opt_status(&identity(), &d, Some(5)), (Opt::Out, "403"));
    }

    #[test]
    fn targeting_mismatch_opts_out() {
        let d = descriptor(Targets {
            ven_ids: vec!["ven_other".to_owned()],
            ..Default::default()
        });
        assert_eq!(decide_opt_status(&identity(), &d, None), (Opt::Out, "403"));
    }

    #[test]
    fn targeting_match_opts_in() {
        let d = descriptor(Targets {
            ven_ids: vec!["ven_py".to_owned()],
            ..Default::default()
        });
        assert_eq!(decide_opt_status(&identity(), &d, None), (Opt::In, "200"));
    }

    #[test]
    fn reply_owed_on_first_sight_only() {
        assert!(decide_reply(None, 0, None));
        assert!(!decide_reply(Some(0), 0, None));
        assert!(decide_reply(Some(0), 0, Some("always")));
        assert!(decide_reply(Some(0), 1, None));
    }

    #[test]
    fn mutation_requires_strictly_higher_modification() {
        assert!(decide_mutation(None, 0));
        assert!(decide_mutation(Some(0), 1));
        assert!(!decide_mutation(Some(1), 1));
        assert!(!decide_mutation(Some(2), 1));
    }
}
