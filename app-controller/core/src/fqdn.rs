use serde::Serialize;
use std::fmt;

/// Suffix shared by every in-cluster service name.
pub const CLUSTER_LOCAL_SUFFIX: &str = "svc.cluster.local";

/// The fully-qualified name of an in-cluster host, e.g.
/// `reviews.bookinfo.svc.cluster.local`.
///
/// This is the only identity shared by services, destination rules and
/// virtual services: two resources refer to the same host iff their names
/// resolve to equal `Fqdn`s.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fqdn(String);

/// Resolves `name` relative to `namespace`.
///
/// Names that are already qualified are returned unchanged.
pub fn fqdn(name: &str, namespace: &str) -> String {
    if name.ends_with(CLUSTER_LOCAL_SUFFIX) {
        return name.to_string();
    }
    format!("{}.{}.{}", name, namespace, CLUSTER_LOCAL_SUFFIX)
}

// === impl Fqdn ===

impl Fqdn {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self(fqdn(name, namespace))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Fqdn {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_short_names() {
        assert_eq!(fqdn("reviews", "bookinfo"), "reviews.bookinfo.svc.cluster.local");
    }

    #[test]
    fn idempotent() {
        for (name, ns) in [
            ("reviews", "bookinfo"),
            ("reviews.bookinfo.svc.cluster.local", "bookinfo"),
            ("reviews.other.svc.cluster.local", "bookinfo"),
            ("", "default"),
        ] {
            let once = fqdn(name, ns);
            assert_eq!(fqdn(&once, ns), once, "{}/{}", ns, name);
        }
    }

    #[test]
    fn qualified_names_ignore_namespace() {
        assert_eq!(
            Fqdn::new("reviews.other.svc.cluster.local", "bookinfo"),
            Fqdn::new("reviews", "other"),
        );
        assert_ne!(Fqdn::new("reviews", "bookinfo"), Fqdn::new("reviews", "other"));
    }
}
