use crate::labels::VERSION;
use istio_app_controller_k8s_api::{
    networking::{DestinationRuleSpec, Subset},
    DestinationRule, ObjectMeta,
};

/// The subset for one application version, selecting pods by their
/// `version` label.
pub fn version_subset(version: &str) -> Subset {
    Subset {
        name: version.to_string(),
        labels: Some((VERSION.to_string(), version.to_string()))
            .into_iter()
            .collect(),
        ..Subset::default()
    }
}

/// Appends a subset for `version` unless one with that name already exists.
/// Returns true if the rule changed.
pub fn add_subset(rule: &mut DestinationRule, version: &str) -> bool {
    if rule.spec.subsets.iter().any(|s| s.name == version) {
        return false;
    }
    rule.spec.subsets.push(version_subset(version));
    true
}

/// Removes every subset named `version`. Returns true if the rule changed.
pub fn remove_subset(rule: &mut DestinationRule, version: &str) -> bool {
    let before = rule.spec.subsets.len();
    rule.spec.subsets.retain(|s| s.name != version);
    rule.spec.subsets.len() != before
}

/// A destination rule for `host` with one subset per version, in order.
pub fn new_rule<'v>(
    name: &str,
    namespace: &str,
    host: &str,
    versions: impl IntoIterator<Item = &'v str>,
) -> DestinationRule {
    let mut rule = DestinationRule {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: DestinationRuleSpec {
            host: host.to_string(),
            ..DestinationRuleSpec::default()
        },
    };
    for version in versions {
        add_subset(&mut rule, version);
    }
    rule
}
