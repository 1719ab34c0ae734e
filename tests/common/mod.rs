//! Shared test doubles for the integration suites.

use arsenalup::error::Result;
use arsenalup::signals::CancelToken;
use arsenalup::source::{Category, InstallOutcome, PackageSource};
use std::collections::HashMap;

/// Package source with pre-scripted install outcomes, recording every call
/// made against it. Unscripted installs succeed; scripted outcomes are
/// consumed in order, then the item succeeds.
pub struct ScriptedSource {
    listing: String,
    outcomes: HashMap<String, Vec<InstallOutcome>>,
    /// Every trait method invocation, in order.
    pub calls: Vec<&'static str>,
    pub install_calls: Vec<String>,
    trip_on: Option<(String, CancelToken)>,
    trip_on_upgrade: Option<CancelToken>,
}

impl ScriptedSource {
    pub fn with_listing(listing: &str) -> Self {
        ScriptedSource {
            listing: listing.to_string(),
            outcomes: HashMap::new(),
            calls: Vec::new(),
            install_calls: Vec::new(),
            trip_on: None,
            trip_on_upgrade: None,
        }
    }

    /// Queue outcomes for one item, consumed one per attempt.
    pub fn script(mut self, name: &str, outcomes: Vec<InstallOutcome>) -> Self {
        self.outcomes.insert(name.to_string(), outcomes);
        self
    }

    /// Trip the given token when the named item is installed, simulating a
    /// signal arriving while that install is in flight.
    pub fn trip_when_installing(mut self, name: &str, token: &CancelToken) -> Self {
        self.trip_on = Some((name.to_string(), token.clone()));
        self
    }

    /// Trip the given token during the system upgrade, simulating a signal
    /// arriving while the upgrade is in flight.
    pub fn trip_during_upgrade(mut self, token: &CancelToken) -> Self {
        self.trip_on_upgrade = Some(token.clone());
        self
    }
}

impl PackageSource for ScriptedSource {
    fn ensure_trusted(&mut self) -> Result<()> {
        self.calls.push("trust");
        Ok(())
    }

    fn refresh_index(&mut self) -> Result<()> {
        self.calls.push("refresh");
        Ok(())
    }

    fn list_items(&mut self, _category: Option<Category>) -> Result<String> {
        self.calls.push("list");
        Ok(self.listing.clone())
    }

    fn install(&mut self, item: &str) -> Result<InstallOutcome> {
        self.calls.push("install");
        self.install_calls.push(item.to_string());
        if let Some((name, token)) = &self.trip_on {
            if name == item {
                token.trip();
            }
        }
        let outcome = self
            .outcomes
            .get_mut(item)
            .and_then(|queued| {
                if queued.is_empty() {
                    None
                } else {
                    Some(queued.remove(0))
                }
            })
            .unwrap_or_else(InstallOutcome::ok);
        Ok(outcome)
    }

    fn upgrade_system(&mut self) -> Result<()> {
        self.calls.push("upgrade");
        if let Some(token) = &self.trip_on_upgrade {
            token.trip();
        }
        Ok(())
    }
}
