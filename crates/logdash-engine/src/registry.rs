//! Known projects and their partition days.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::RwLock;

type ProjectMap = BTreeMap<String, BTreeSet<NaiveDate>>;

/// Listing of projects that have at least one discovered log file.
///
/// Rebuilt wholesale by the poller after each pass; readers get the map as
/// it stood after the last completed pass.
#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: RwLock<Arc<ProjectMap>>,
}

impl ProjectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the listing.
    pub fn refresh(&self, projects: ProjectMap) {
        *self.projects.write() = Arc::new(projects);
    }

    /// Project names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.current().keys().cloned().collect()
    }

    /// Returns true if the project is known.
    #[must_use]
    pub fn contains(&self, project: &str) -> bool {
        self.current().contains_key(project)
    }

    /// Partition days of a project, oldest first.
    #[must_use]
    pub fn days(&self, project: &str) -> Option<Vec<NaiveDate>> {
        self.current()
            .get(project)
            .map(|days| days.iter().copied().collect())
    }

    /// Number of known projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// Returns true if no project is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    fn current(&self) -> Arc<ProjectMap> {
        Arc::clone(&self.projects.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("valid date")
    }

    #[test]
    fn empty_registry() {
        let registry = ProjectRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
        assert!(!registry.contains("alpha"));
        assert_eq!(registry.days("alpha"), None);
    }

    #[test]
    fn refresh_replaces_listing() {
        let registry = ProjectRegistry::new();
        let mut projects = ProjectMap::new();
        projects.insert("zeta".to_string(), BTreeSet::from([day(2)]));
        projects.insert("alpha".to_string(), BTreeSet::from([day(3), day(1)]));
        registry.refresh(projects);

        assert_eq!(registry.list(), vec!["alpha", "zeta"]);
        assert_eq!(registry.days("alpha"), Some(vec![day(1), day(3)]));
        assert_eq!(registry.len(), 2);

        registry.refresh(ProjectMap::new());
        assert!(!registry.contains("alpha"));
    }
}
