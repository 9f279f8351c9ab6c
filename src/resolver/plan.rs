use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::Dist;

/// A package placed at the top level of the install tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPackage {
    pub version: String,
    pub url: String,
    pub shasum: String,
}

impl PlannedPackage {
    pub fn new(version: impl Into<String>, dist: &Dist) -> Self {
        Self {
            version: version.into(),
            url: dist.tarball.clone(),
            shasum: dist.shasum.clone(),
        }
    }
}

/// A package that has to be installed below its top-level counterpart.
///
/// `parent` is a `/`-separated path of package names to nest under. It is
/// None when the conflicting edge came straight from the root manifest and
/// there is no package to nest under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsatisfied {
    pub name: String,
    pub parent: Option<String>,
    pub version: String,
    pub url: String,
}

impl Unsatisfied {
    /// Package names along `parent`, outermost first. A scoped name
    /// (`@scope/pkg`) stays one segment.
    pub fn parent_segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = Vec::new();
        let mut parts = self
            .parent
            .as_deref()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty());

        while let Some(part) = parts.next() {
            if part.starts_with('@')
                && let Some(rest) = parts.next()
            {
                segments.push(format!("{}/{}", part, rest));
            } else {
                segments.push(part.to_string());
            }
        }
        segments
    }
}

/// Outcome of a resolution: what goes where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPlan {
    pub top_level: BTreeMap<String, PlannedPackage>,
    pub unsatisfied: Vec<Unsatisfied>,
}

impl InstallPlan {
    pub fn package_count(&self) -> usize {
        self.top_level.len() + self.unsatisfied.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(parent: Option<&str>) -> Unsatisfied {
        Unsatisfied {
            name: "shared".into(),
            parent: parent.map(String::from),
            version: "2.0.0".into(),
            url: "http://r/shared-2.0.0.tgz".into(),
        }
    }

    #[test]
    fn test_parent_segments() {
        assert_eq!(record(Some("right")).parent_segments(), vec!["right"]);
        assert_eq!(
            record(Some("outer/inner")).parent_segments(),
            vec!["outer", "inner"]
        );
        assert_eq!(
            record(Some("@scope/outer/inner")).parent_segments(),
            vec!["@scope/outer", "inner"]
        );
        assert!(record(None).parent_segments().is_empty());
    }

    #[test]
    fn test_package_count() {
        let mut plan = InstallPlan::default();
        plan.top_level.insert(
            "shared".into(),
            PlannedPackage {
                version: "1.0.0".into(),
                url: "http://r/shared-1.0.0.tgz".into(),
                shasum: String::new(),
            },
        );
        plan.unsatisfied.push(record(Some("right")));
        assert_eq!(plan.package_count(), 2);
    }
}
