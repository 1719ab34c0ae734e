//! Work discovery: from a trusted source to an ordered queue.
//!
//! Discovery is a strict pipeline. The source must be registered and trusted
//! before the index is refreshed, and the index must be fresh before listing,
//! so a failure at any step aborts the run before anything is installed. The
//! listing is sanitized and deduplicated; an empty result is an error, not an
//! empty run.

use crate::error::{DiscoveryError, Result};
use crate::queue::{self, WorkQueue};
use crate::source::{Category, PackageSource};
use log::info;
use std::path::Path;

/// Build the work queue from the live package source.
pub fn discover(source: &mut dyn PackageSource, category: Option<Category>) -> Result<WorkQueue> {
    source.ensure_trusted()?;
    source.refresh_index()?;

    let listing = source.list_items(category)?;
    let identifiers = queue::parse_identifier_list(&listing);
    if identifiers.is_empty() {
        return Err(DiscoveryError::EmptySet {
            scope: scope_label(category),
        }
        .into());
    }

    info!(
        "Discovered {} installable items for {}",
        identifiers.len(),
        scope_label(category)
    );
    Ok(WorkQueue::from_identifiers(identifiers))
}

/// Rebuild the queue from a previous run's saved unfinished list.
pub fn load_saved(path: &Path) -> Result<WorkQueue> {
    if !path.exists() {
        return Err(DiscoveryError::ResumeUnavailable {
            path: path.to_path_buf(),
        }
        .into());
    }

    let text = std::fs::read_to_string(path)?;
    let identifiers = queue::parse_identifier_list(&text);
    if identifiers.is_empty() {
        return Err(DiscoveryError::EmptySet {
            scope: format!("saved queue {}", path.display()),
        }
        .into());
    }

    info!(
        "Resuming {} unfinished items from {}",
        identifiers.len(),
        path.display()
    );
    Ok(WorkQueue::from_identifiers(identifiers))
}

fn scope_label(category: Option<Category>) -> String {
    match category {
        Some(cat) => format!("category {}", cat),
        None => "full catalog".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArsenalError;
    use crate::source::InstallOutcome;

    /// Scripted source that records the order of calls made against it.
    struct FakeSource {
        listing: std::result::Result<String, String>,
        refresh_fails: bool,
        trust_fails: bool,
        calls: Vec<&'static str>,
    }

    impl FakeSource {
        fn with_listing(listing: &str) -> Self {
            FakeSource {
                listing: Ok(listing.to_string()),
                refresh_fails: false,
                trust_fails: false,
                calls: Vec::new(),
            }
        }
    }

    impl PackageSource for FakeSource {
        fn ensure_trusted(&mut self) -> Result<()> {
            self.calls.push("trust");
            if self.trust_fails {
                return Err(DiscoveryError::SourceRegistration("no keyring".into()).into());
            }
            Ok(())
        }

        fn refresh_index(&mut self) -> Result<()> {
            self.calls.push("refresh");
            if self.refresh_fails {
                return Err(DiscoveryError::IndexRefresh("mirror down".into()).into());
            }
            Ok(())
        }

        fn list_items(&mut self, _category: Option<Category>) -> Result<String> {
            self.calls.push("list");
            self.listing
                .clone()
                .map_err(|e| DiscoveryError::IndexRefresh(e).into())
        }

        fn install(&mut self, _item: &str) -> Result<InstallOutcome> {
            self.calls.push("install");
            Ok(InstallOutcome::ok())
        }

        fn upgrade_system(&mut self) -> Result<()> {
            self.calls.push("upgrade");
            Ok(())
        }
    }

    #[test]
    fn test_discover_runs_steps_in_order() {
        let mut source = FakeSource::with_listing("nmap\nsqlmap\n");
        let queue = discover(&mut source, None).unwrap();
        assert_eq!(source.calls, vec!["trust", "refresh", "list"]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_trust_failure_short_circuits() {
        let mut source = FakeSource::with_listing("nmap\n");
        source.trust_fails = true;
        assert!(discover(&mut source, None).is_err());
        assert_eq!(source.calls, vec!["trust"]);
    }

    #[test]
    fn test_refresh_failure_short_circuits() {
        let mut source = FakeSource::with_listing("nmap\n");
        source.refresh_fails = true;
        assert!(discover(&mut source, None).is_err());
        assert_eq!(source.calls, vec!["trust", "refresh"]);
    }

    #[test]
    fn test_empty_listing_is_an_error() {
        let mut source = FakeSource::with_listing("\n# nothing\n");
        match discover(&mut source, Some(Category::Forensics)) {
            Err(ArsenalError::Discovery(DiscoveryError::EmptySet { scope })) => {
                assert_eq!(scope, "category forensics");
            }
            other => panic!("expected EmptySet, got {:?}", other.map(|q| q.len())),
        }
    }

    #[test]
    fn test_discover_deduplicates_listing() {
        let mut source = FakeSource::with_listing("nmap\nnmap\nhydra\n");
        let queue = discover(&mut source, None).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_load_saved_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        match load_saved(&path) {
            Err(ArsenalError::Discovery(DiscoveryError::ResumeUnavailable { path: p })) => {
                assert_eq!(p, path);
            }
            other => panic!("expected ResumeUnavailable, got {:?}", other.map(|q| q.len())),
        }
    }

    #[test]
    fn test_load_saved_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "hydra\nnmap\n").unwrap();

        let queue = load_saved(&path).unwrap();
        let names: Vec<&str> = queue.items().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["hydra", "nmap"]);
    }

    #[test]
    fn test_load_saved_empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(load_saved(&path).is_err());
    }
}
