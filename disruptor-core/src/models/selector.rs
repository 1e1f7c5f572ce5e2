//! Declarative pod selectors

use std::collections::BTreeMap;
use std::fmt;

use crate::Error;

/// A declarative selector that resolves to a concrete set of pods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSelector {
    /// The namespace to search; defaults to `default` when unset
    pub namespace: Option<String>,
    /// Labels a pod must have (a superset match)
    pub include: BTreeMap<String, String>,
    /// Labels a pod must not share any key/value with
    pub exclude: BTreeMap<String, String>,
}

impl PodSelector {
    /// Build a new selector
    ///
    /// # Arguments
    ///
    /// * `namespace` - The namespace to scope this selector to
    /// * `include` - Labels a matching pod must carry
    /// * `exclude` - Labels a matching pod must not share
    pub fn new(
        namespace: Option<String>,
        include: BTreeMap<String, String>,
        exclude: BTreeMap<String, String>,
    ) -> Self {
        PodSelector {
            namespace,
            include,
            exclude,
        }
    }

    /// Get the namespace this selector targets, defaulting to `default`
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }

    /// Check that this selector carries at least a namespace or a label map
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.is_none() && self.include.is_empty() && self.exclude.is_empty() {
            return Err(Error::SelectorInvalid(
                "a selector must set a namespace or at least one label map".to_owned(),
            ));
        }
        Ok(())
    }

    /// Check whether a pod's labels satisfy this selector
    ///
    /// # Arguments
    ///
    /// * `labels` - The labels on the candidate pod
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let included = self
            .include
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value));
        let excluded = self
            .exclude
            .iter()
            .any(|(key, value)| labels.get(key) == Some(value));
        included && !excluded
    }
}

impl fmt::Display for PodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.include.is_empty() && self.exclude.is_empty() {
            write!(f, "all pods in ns \"{}\"", self.namespace())
        } else {
            write!(
                f,
                "pods {}in ns \"{}\"",
                render_label_groups(&self.include, &self.exclude),
                self.namespace()
            )
        }
    }
}

/// Render the `including(...)`/`excluding(...)` groups with trailing separators trimmed
fn render_label_groups(
    include: &BTreeMap<String, String>,
    exclude: &BTreeMap<String, String>,
) -> String {
    let mut parts = Vec::new();
    if !include.is_empty() {
        let pairs = include
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("including({pairs})"));
    }
    if !exclude.is_empty() {
        let pairs = exclude
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("excluding({pairs})"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{} ", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_all_pods_when_unconstrained() {
        let selector = PodSelector::new(Some("payments".to_owned()), BTreeMap::new(), BTreeMap::new());
        assert_eq!(selector.to_string(), "all pods in ns \"payments\"");
    }

    #[test]
    fn displays_include_and_exclude_without_trailing_separators() {
        let mut include = BTreeMap::new();
        include.insert("app".to_owned(), "cart".to_owned());
        let mut exclude = BTreeMap::new();
        exclude.insert("canary".to_owned(), "true".to_owned());
        let selector = PodSelector::new(Some("default".to_owned()), include, exclude);
        assert_eq!(
            selector.to_string(),
            "pods including(app=cart), excluding(canary=true) in ns \"default\""
        );
    }

    #[test]
    fn matches_superset_include_and_rejects_shared_exclude() {
        let mut include = BTreeMap::new();
        include.insert("app".to_owned(), "cart".to_owned());
        let mut exclude = BTreeMap::new();
        exclude.insert("canary".to_owned(), "true".to_owned());
        let selector = PodSelector::new(None, include, exclude);

        let mut labels = BTreeMap::new();
        labels.insert("app".to_owned(), "cart".to_owned());
        labels.insert("version".to_owned(), "v2".to_owned());
        assert!(selector.matches(&labels));

        labels.insert("canary".to_owned(), "true".to_owned());
        assert!(!selector.matches(&labels));
    }

    #[test]
    fn validate_rejects_fully_empty_selector() {
        let selector = PodSelector::default();
        assert!(selector.validate().is_err());
    }
}
