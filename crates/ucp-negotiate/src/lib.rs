//! Capability negotiation: version gate, capability/handler intersection,
//! and orphan pruning (§4.1).
//!
//! All functions here are pure and synchronous; the caller is responsible
//! for fetching the agent's [`AgentProfile`] (typically via
//! `ucp-profile-cache`) before calling [`negotiate`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use ucp_core::{AgentProfile, Capability, CapabilityRegistry, Handler, HandlerRegistry, NegotiatedContext};

/// The agent's declared version is nonempty and strictly newer than the
/// business's own version (§4.1 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionError {
    /// Stable machine code, always `"ucp_version_unsupported"`.
    pub code: &'static str,
    /// The agent's advertised version.
    pub agent_version: String,
    /// The merchant's supported version.
    pub business_version: String,
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: agent version {} is newer than supported version {}",
            self.code, self.agent_version, self.business_version
        )
    }
}

impl std::error::Error for VersionError {}

/// Version gate (§4.1 step 3, property 7, §8): an empty agent version is
/// always accepted; a nonempty agent version strictly greater (by string
/// comparison) than the business version is rejected.
///
/// # Errors
///
/// Returns [`VersionError`] when the agent's version is newer.
pub fn version_gate(business_version: &str, agent_version: &str) -> Result<(), VersionError> {
    if agent_version.is_empty() {
        return Ok(());
    }
    if agent_version > business_version {
        return Err(VersionError {
            code: "ucp_version_unsupported",
            agent_version: agent_version.to_string(),
            business_version: business_version.to_string(),
        });
    }
    Ok(())
}

/// Capability intersection (§4.1 step 4): an empty agent capability map
/// means "whatever you offer" and inherits the business registry whole.
/// Otherwise a business family is kept iff the agent also declares that
/// family; no per-version intersection within a family is performed — the
/// business entries are canonical.
#[must_use]
pub fn intersect_capabilities(
    business: &CapabilityRegistry,
    agent: &CapabilityRegistry,
) -> CapabilityRegistry {
    if agent.is_empty() {
        return business.clone();
    }
    business
        .iter()
        .filter(|(family, _)| agent.contains_key(*family))
        .map(|(family, entries)| (family.clone(), entries.clone()))
        .collect()
}

/// Orphan pruning (§4.1 step 5, property 8, §8): repeatedly delete every
/// kept [`Capability`] entry whose `extends` set is non-empty and shares
/// no key with the families present in the registry at the start of that
/// pass. A family whose entries are all pruned away is removed entirely.
/// Iterates to a fixpoint; a second call on an already-pruned registry is
/// a no-op.
#[must_use]
pub fn prune_orphans(registry: &CapabilityRegistry) -> CapabilityRegistry {
    let mut current = registry.clone();
    loop {
        let keys: HashSet<&str> = current.keys().map(String::as_str).collect();
        let mut changed = false;
        let mut next: CapabilityRegistry = BTreeMap::new();

        for (family, entries) in &current {
            let retained: Vec<Capability> = entries
                .iter()
                .filter(|cap| {
                    if cap.is_extension() {
                        let keep = cap.parents().iter().any(|p| keys.contains(p.as_str()));
                        if !keep {
                            changed = true;
                        }
                        keep
                    } else {
                        true
                    }
                })
                .cloned()
                .collect();

            if retained.is_empty() && !entries.is_empty() {
                changed = true;
            }
            if !retained.is_empty() {
                next.insert(family.clone(), retained);
            }
        }

        current = next;
        if !changed {
            return current;
        }
    }
}

/// Compare two version strings the way §4.1 step 6 requires: if both look
/// like semver (a leading `v` is added if absent) use semver-style
/// ordering; otherwise compare as strings (`YYYY-MM-DD` sorts correctly
/// lexicographically).
#[must_use]
pub fn handler_version_at_least(agent_version: &str, business_version: &str) -> bool {
    match (parse_semver(agent_version), parse_semver(business_version)) {
        (Some(a), Some(b)) => a >= b,
        _ => agent_version >= business_version,
    }
}

fn parse_semver(v: &str) -> Option<(u64, u64, u64)> {
    let v = v.strip_prefix('v').unwrap_or(v);
    let mut parts = v.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Handler intersection (§4.1 step 6): same shape as capability
/// intersection, but within a kept family a business handler survives
/// only if the agent declares a handler with the same `id` whose version
/// is `>=` the business handler's version.
#[must_use]
pub fn intersect_handlers(business: &HandlerRegistry, agent: &HandlerRegistry) -> HandlerRegistry {
    if agent.is_empty() {
        return business.clone();
    }
    let mut result: HandlerRegistry = BTreeMap::new();
    for (family, entries) in business {
        let Some(agent_entries) = agent.get(family) else {
            continue;
        };
        let retained: Vec<Handler> = entries
            .iter()
            .filter(|biz_handler| {
                agent_entries.iter().any(|agent_handler| {
                    agent_handler.id == biz_handler.id
                        && handler_version_at_least(&agent_handler.version, &biz_handler.version)
                })
            })
            .cloned()
            .collect();
        if !retained.is_empty() {
            result.insert(family.clone(), retained);
        }
    }
    result
}

/// Negotiate a [`NegotiatedContext`] from the merchant's own profile and an
/// already-fetched (or already-failed) agent profile fetch outcome.
///
/// `agent_profile` is `None` when the fetch failed with no usable fallback
/// data (§4.1 step 2); in that case the full business profile is inherited
/// and `fetch_error` is recorded, without running the version gate.
///
/// # Errors
///
/// Returns [`VersionError`] if the agent's version is newer than the
/// business's (§4.1 step 3).
pub fn negotiate(
    profile_url: impl Into<String>,
    business: &AgentProfile,
    agent_profile: Option<&AgentProfile>,
    fetch_error: Option<String>,
) -> Result<NegotiatedContext, VersionError> {
    let profile_url = profile_url.into();

    let Some(agent) = agent_profile else {
        return Ok(NegotiatedContext {
            profile_url,
            version: business.version.clone(),
            capabilities: business.capabilities.clone(),
            payment_handlers: business.payment_handlers.clone(),
            fetch_error,
        });
    };

    version_gate(&business.version, &agent.version)?;

    let intersected = intersect_capabilities(&business.capabilities, &agent.capabilities);
    let pruned = prune_orphans(&intersected);
    let handlers = intersect_handlers(&business.payment_handlers, &agent.payment_handlers);

    Ok(NegotiatedContext {
        profile_url,
        version: business.version.clone(),
        capabilities: pruned,
        payment_handlers: handlers,
        fetch_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ucp_core::Extends;

    fn cap(version: &str) -> Capability {
        Capability::new(version)
    }

    fn cap_extending(version: &str, parents: Vec<&str>) -> Capability {
        Capability {
            version: version.into(),
            spec: None,
            schema: None,
            extends: Some(if parents.len() == 1 {
                Extends::Single(parents[0].into())
            } else {
                Extends::Multi(parents.into_iter().map(String::from).collect())
            }),
        }
    }

    #[test]
    fn version_gate_accepts_empty_agent_version() {
        assert!(version_gate("2026-01-11", "").is_ok());
    }

    #[test]
    fn version_gate_accepts_equal_or_older() {
        assert!(version_gate("2026-01-11", "2026-01-11").is_ok());
        assert!(version_gate("2026-01-11", "2020-01-01").is_ok());
    }

    #[test]
    fn version_gate_rejects_newer_agent_version() {
        let err = version_gate("2026-01-11", "2099-01-01").unwrap_err();
        assert_eq!(err.code, "ucp_version_unsupported");
    }

    #[test]
    fn empty_agent_registry_inherits_all() {
        let mut business = CapabilityRegistry::new();
        business.insert("dev.ucp.shopping.checkout".into(), vec![cap("2026-01-11")]);
        let agent = CapabilityRegistry::new();
        let result = intersect_capabilities(&business, &agent);
        assert_eq!(result, business);
    }

    #[test]
    fn nonempty_agent_registry_filters_to_shared_families() {
        let mut business = CapabilityRegistry::new();
        business.insert("dev.ucp.shopping.checkout".into(), vec![cap("2026-01-11")]);
        business.insert("dev.ucp.shopping.discount".into(), vec![cap("2026-01-11")]);
        let mut agent = CapabilityRegistry::new();
        agent.insert("dev.ucp.shopping.checkout".into(), vec![cap("2020-01-01")]);

        let result = intersect_capabilities(&business, &agent);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("dev.ucp.shopping.checkout"));
    }

    #[test]
    fn orphan_pruning_removes_entries_whose_parents_are_absent() {
        let mut registry = CapabilityRegistry::new();
        registry.insert(
            "dev.ucp.shopping.discount.percentage".into(),
            vec![cap_extending("2026-01-11", vec!["dev.ucp.shopping.discount"])],
        );
        // Parent family "dev.ucp.shopping.discount" is absent.
        let pruned = prune_orphans(&registry);
        assert!(pruned.is_empty());
    }

    #[test]
    fn multi_parent_survives_if_any_parent_present() {
        let mut registry = CapabilityRegistry::new();
        registry.insert("dev.ucp.shopping.checkout".into(), vec![cap("2026-01-11")]);
        registry.insert(
            "dev.ucp.shopping.combo".into(),
            vec![cap_extending(
                "2026-01-11",
                vec!["dev.ucp.shopping.checkout", "dev.ucp.shopping.missing"],
            )],
        );
        let pruned = prune_orphans(&registry);
        assert!(pruned.contains_key("dev.ucp.shopping.combo"));
    }

    #[test]
    fn orphan_pruning_cascades_to_fixpoint() {
        let mut registry = CapabilityRegistry::new();
        registry.insert("a".into(), vec![cap_extending("2026-01-11", vec!["b"])]);
        registry.insert("b".into(), vec![cap_extending("2026-01-11", vec!["c"])]);
        // `c` is never defined: b is orphaned in pass 1, which then
        // orphans a in pass 2.
        let once = prune_orphans(&registry);
        let twice = prune_orphans(&once);
        assert_eq!(once, twice);
        assert!(once.is_empty());
    }

    #[test]
    fn handler_version_semver_comparison() {
        assert!(handler_version_at_least("v2.1.0", "v2.0.0"));
        assert!(!handler_version_at_least("v1.0.0", "v2.0.0"));
        assert!(handler_version_at_least("2.1.0", "v2.0.0"));
    }

    #[test]
    fn handler_version_date_string_comparison() {
        assert!(handler_version_at_least("2026-02-01", "2026-01-11"));
        assert!(!handler_version_at_least("2020-01-01", "2026-01-11"));
    }

    #[test]
    fn handler_intersection_filters_on_id_and_version() {
        let mut business = HandlerRegistry::new();
        business.insert(
            "dev.ucp.payments".into(),
            vec![
                Handler { id: "stripe".into(), version: "2026-01-11".into() },
                Handler { id: "paypal".into(), version: "2026-01-11".into() },
            ],
        );
        let mut agent = HandlerRegistry::new();
        agent.insert(
            "dev.ucp.payments".into(),
            vec![Handler { id: "stripe".into(), version: "2026-02-01".into() }],
        );

        let result = intersect_handlers(&business, &agent);
        let stripe_family = &result["dev.ucp.payments"];
        assert_eq!(stripe_family.len(), 1);
        assert_eq!(stripe_family[0].id, "stripe");
    }

    #[test]
    fn negotiate_degraded_mode_inherits_full_business_profile() {
        let mut capabilities = CapabilityRegistry::new();
        capabilities.insert("dev.ucp.shopping.checkout".into(), vec![cap("2026-01-11")]);
        let business = AgentProfile {
            version: "2026-01-11".into(),
            capabilities,
            payment_handlers: HandlerRegistry::new(),
        };
        let ctx = negotiate(
            "https://agent.example/profile",
            &business,
            None,
            Some("connection refused".into()),
        )
        .unwrap();
        assert!(ctx.is_degraded());
        assert_eq!(ctx.capabilities, business.capabilities);
    }

    #[test]
    fn negotiate_rejects_agent_too_new() {
        let business = AgentProfile {
            version: "2026-01-11".into(),
            capabilities: CapabilityRegistry::new(),
            payment_handlers: HandlerRegistry::new(),
        };
        let agent = AgentProfile {
            version: "2099-01-01".into(),
            capabilities: CapabilityRegistry::new(),
            payment_handlers: HandlerRegistry::new(),
        };
        let err = negotiate("https://agent.example/profile", &business, Some(&agent), None)
            .unwrap_err();
        assert_eq!(err.code, "ucp_version_unsupported");
    }

    proptest! {
        #[test]
        fn prop_pruning_twice_is_idempotent(
            has_extends in proptest::collection::vec(any::<bool>(), 1..6)
        ) {
            let mut registry = CapabilityRegistry::new();
            for (i, extends) in has_extends.iter().enumerate() {
                let entry = if *extends {
                    cap_extending("2026-01-11", vec!["nonexistent.family"])
                } else {
                    cap("2026-01-11")
                };
                registry.insert(format!("family.{i}"), vec![entry]);
            }
            let once = prune_orphans(&registry);
            let twice = prune_orphans(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_empty_agent_registry_is_identity(
            n in 0usize..5
        ) {
            let mut business = CapabilityRegistry::new();
            for i in 0..n {
                business.insert(format!("family.{i}"), vec![cap("2026-01-11")]);
            }
            let agent = CapabilityRegistry::new();
            prop_assert_eq!(intersect_capabilities(&business, &agent), business);
        }
    }
}
