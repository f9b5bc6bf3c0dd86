use istio_app_controller_k8s_api::{labels::Map, Selector};

/// Names the application a workload belongs to.
pub const APP: &str = "app";

/// Names the application version a workload runs. Destination rule subsets
/// select pods by this label.
pub const VERSION: &str = "version";

/// Marks resources managed through the console.
pub const MANAGED_BY: &str = "qcloud-app";

/// The identifying labels of one application version's workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadLabels {
    pub app: String,
    pub version: String,
    pub managed_by: String,
}

/// Selects every workload of an application, regardless of version.
pub fn app_selector(app: &str) -> Selector {
    Some((APP, app)).into_iter().collect()
}

/// Labels for an application's `Service`.
pub fn service_labels(app: &str) -> Map {
    [(APP, app), (MANAGED_BY, app)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// === impl WorkloadLabels ===

impl WorkloadLabels {
    pub fn new(app: impl ToString, version: impl ToString) -> Self {
        let app = app.to_string();
        Self {
            managed_by: app.clone(),
            app,
            version: version.to_string(),
        }
    }

    /// Reads the labels from a label map. Returns `None` unless both the app
    /// and version labels are set and non-empty.
    pub fn from_map(labels: &Map) -> Option<Self> {
        let app = labels.get(APP).filter(|v| !v.is_empty())?;
        let version = labels.get(VERSION).filter(|v| !v.is_empty())?;
        Some(Self {
            app: app.clone(),
            version: version.clone(),
            managed_by: labels.get(MANAGED_BY).cloned().unwrap_or_else(|| app.clone()),
        })
    }

    /// The full label set stamped on a workload and its pod template.
    pub fn to_map(&self) -> Map {
        let mut map = Map::new();
        self.stamp(&mut map);
        map
    }

    /// Writes these labels into `labels`, leaving unrelated keys in place.
    pub fn stamp(&self, labels: &mut Map) {
        labels.insert(APP.to_string(), self.app.clone());
        labels.insert(MANAGED_BY.to_string(), self.managed_by.clone());
        labels.insert(VERSION.to_string(), self.version.clone());
    }

    /// The match labels selecting exactly this version's pods.
    pub fn match_labels(&self) -> Map {
        [(APP, &self.app), (VERSION, &self.version)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub fn selector(&self) -> Selector {
        Selector::from_map(self.match_labels())
    }

    /// Returns true if `labels` carries this version's app and version
    /// labels.
    pub fn agrees_with(&self, labels: &Map) -> bool {
        labels.get(APP) == Some(&self.app) && labels.get(VERSION) == Some(&self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn from_map_requires_app_and_version() {
        let labels = btreemap! {
            "app".to_string() => "reviews".to_string(),
            "version".to_string() => "v1".to_string(),
        };
        assert_eq!(
            WorkloadLabels::from_map(&labels),
            Some(WorkloadLabels::new("reviews", "v1"))
        );

        let empty_version = btreemap! {
            "app".to_string() => "reviews".to_string(),
            "version".to_string() => "".to_string(),
        };
        assert_eq!(WorkloadLabels::from_map(&empty_version), None);

        let no_app = btreemap! { "version".to_string() => "v1".to_string() };
        assert_eq!(WorkloadLabels::from_map(&no_app), None);
    }

    #[test]
    fn stamp_overrides_only_workload_keys() {
        let mut labels = btreemap! {
            "app".to_string() => "old".to_string(),
            "tier".to_string() => "backend".to_string(),
        };
        WorkloadLabels::new("reviews", "v2").stamp(&mut labels);
        assert_eq!(
            labels,
            btreemap! {
                "app".to_string() => "reviews".to_string(),
                "qcloud-app".to_string() => "reviews".to_string(),
                "tier".to_string() => "backend".to_string(),
                "version".to_string() => "v2".to_string(),
            }
        );
    }

    #[test]
    fn match_labels_exclude_managed_by() {
        let labels = WorkloadLabels::new("reviews", "v2");
        assert_eq!(labels.selector().to_string(), "app=reviews,version=v2");
        assert!(labels.agrees_with(&labels.to_map()));
        assert!(!WorkloadLabels::new("reviews", "v1").agrees_with(&labels.to_map()));
    }
}
