//! The shared-library negotiation table.
//!
//! Every loaded bundle registers the library copies it ships, then resolves
//! the copies it needs. Singleton libraries keep the first registered copy
//! (the host registers before any remote loads, so the host copy wins);
//! non-singleton libraries keep the last registered copy.

use std::collections::BTreeMap;

use crate::version::{Version, VersionReq};

// --- ScopeEntry ---

/// One negotiated library slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub version: Version,
    pub singleton: bool,
    /// Name of the bundle that contributed the winning copy.
    pub provider: String,
}

// --- Warnings and errors ---

/// Non-fatal negotiation findings, accumulated for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeWarning {
    /// A singleton library was offered again with a different version; the
    /// established copy stays.
    SingletonVersionMismatch {
        library: String,
        kept: Version,
        kept_provider: String,
        offered: Version,
        offered_by: String,
    },
    /// A consumer's requirement does not match the established singleton
    /// copy; the consumer gets the established copy anyway.
    SingletonRequirementMismatch {
        library: String,
        established: Version,
        requirement: VersionReq,
        consumer: String,
    },
}

impl std::fmt::Display for ScopeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeWarning::SingletonVersionMismatch {
                library,
                kept,
                kept_provider,
                offered,
                offered_by,
            } => write!(
                f,
                "singleton '{library}' pinned at {kept} by {kept_provider}; \
                 offer {offered} from {offered_by} ignored"
            ),
            ScopeWarning::SingletonRequirementMismatch {
                library,
                established,
                requirement,
                consumer,
            } => write!(
                f,
                "'{consumer}' requires '{library}' {requirement} but the \
                 singleton copy is {established}; using it anyway"
            ),
        }
    }
}

/// Fatal negotiation failures; they reject the remote's resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The required library is not in the scope at all.
    Missing { library: String, consumer: String },
    /// The requirement cannot be met by the winning non-singleton copy.
    Incompatible {
        library: String,
        available: Version,
        requirement: VersionReq,
        consumer: String,
    },
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::Missing { library, consumer } => {
                write!(f, "'{consumer}' requires '{library}' but nothing provides it")
            }
            ScopeError::Incompatible {
                library,
                available,
                requirement,
                consumer,
            } => write!(
                f,
                "'{consumer}' requires '{library}' {requirement} but only \
                 {available} is available"
            ),
        }
    }
}

/// Outcome of one [`SharedScope::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    KeptExisting,
    Replaced,
}

// --- SharedScope ---

/// Per-host table of shared-library versions all loaded bundles negotiate
/// against.
#[derive(Default)]
pub struct SharedScope {
    entries: BTreeMap<String, ScopeEntry>,
    warnings: Vec<ScopeWarning>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a library copy. A slot becomes singleton as soon as any
    /// participant declares it so.
    pub fn register(
        &mut self,
        library: &str,
        version: Version,
        singleton: bool,
        provider: &str,
    ) -> RegisterOutcome {
        let Some(existing) = self.entries.get_mut(library) else {
            self.entries.insert(
                library.to_owned(),
                ScopeEntry {
                    version,
                    singleton,
                    provider: provider.to_owned(),
                },
            );
            return RegisterOutcome::Inserted;
        };

        if existing.singleton || singleton {
            existing.singleton = true;
            if existing.version != version {
                let warning = ScopeWarning::SingletonVersionMismatch {
                    library: library.to_owned(),
                    kept: existing.version,
                    kept_provider: existing.provider.clone(),
                    offered: version,
                    offered_by: provider.to_owned(),
                };
                #[cfg(feature = "debug-loader")]
                eprintln!("[SCOPE] {warning}");
                self.warnings.push(warning);
            }
            RegisterOutcome::KeptExisting
        } else {
            #[cfg(feature = "debug-loader")]
            eprintln!(
                "[SCOPE] '{library}' replaced {} ({}) with {version} ({provider})",
                existing.version, existing.provider
            );
            *existing = ScopeEntry {
                version,
                singleton,
                provider: provider.to_owned(),
            };
            RegisterOutcome::Replaced
        }
    }

    /// Resolve a consumer's requirement against the winning copies.
    ///
    /// Singleton slots always resolve to the established copy; a mismatched
    /// requirement only produces a warning. Non-singleton slots fail on
    /// mismatch.
    pub fn resolve(
        &mut self,
        library: &str,
        requirement: &VersionReq,
        consumer: &str,
    ) -> Result<ScopeEntry, ScopeError> {
        let Some(entry) = self.entries.get(library) else {
            return Err(ScopeError::Missing {
                library: library.to_owned(),
                consumer: consumer.to_owned(),
            });
        };
        if requirement.matches(&entry.version) {
            return Ok(entry.clone());
        }
        if entry.singleton {
            let warning = ScopeWarning::SingletonRequirementMismatch {
                library: library.to_owned(),
                established: entry.version,
                requirement: *requirement,
                consumer: consumer.to_owned(),
            };
            #[cfg(feature = "debug-loader")]
            eprintln!("[SCOPE] {warning}");
            let entry = entry.clone();
            self.warnings.push(warning);
            Ok(entry)
        } else {
            Err(ScopeError::Incompatible {
                library: library.to_owned(),
                available: entry.version,
                requirement: *requirement,
                consumer: consumer.to_owned(),
            })
        }
    }

    pub fn entry(&self, library: &str) -> Option<&ScopeEntry> {
        self.entries.get(library)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn warnings(&self) -> &[ScopeWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn singleton_keeps_first_registration() {
        let mut scope = SharedScope::new();
        assert_eq!(
            scope.register("react", v("18.2.0"), true, "host"),
            RegisterOutcome::Inserted
        );
        assert_eq!(
            scope.register("react", v("17.0.2"), true, "checkout"),
            RegisterOutcome::KeptExisting
        );

        let entry = scope.entry("react").unwrap();
        assert_eq!(entry.version, v("18.2.0"));
        assert_eq!(entry.provider, "host");
        assert_eq!(scope.warnings().len(), 1);
        assert!(matches!(
            &scope.warnings()[0],
            ScopeWarning::SingletonVersionMismatch { library, .. } if library == "react"
        ));
    }

    #[test]
    fn singleton_same_version_offer_is_quiet() {
        let mut scope = SharedScope::new();
        scope.register("react", v("18.2.0"), true, "host");
        scope.register("react", v("18.2.0"), true, "checkout");
        assert!(scope.warnings().is_empty());
    }

    #[test]
    fn non_singleton_last_loaded_wins() {
        let mut scope = SharedScope::new();
        scope.register("lodash", v("4.17.20"), false, "host");
        assert_eq!(
            scope.register("lodash", v("4.17.21"), false, "checkout"),
            RegisterOutcome::Replaced
        );

        let entry = scope.entry("lodash").unwrap();
        assert_eq!(entry.version, v("4.17.21"));
        assert_eq!(entry.provider, "checkout");
        assert!(scope.warnings().is_empty());
    }

    #[test]
    fn any_singleton_declaration_pins_the_slot() {
        let mut scope = SharedScope::new();
        scope.register("react", v("18.2.0"), false, "host");
        scope.register("react", v("17.0.2"), true, "checkout");

        let entry = scope.entry("react").unwrap();
        assert!(entry.singleton);
        assert_eq!(entry.version, v("18.2.0"));

        // A later offer can no longer replace it.
        scope.register("react", v("19.0.0"), false, "banner");
        assert_eq!(scope.entry("react").unwrap().version, v("18.2.0"));
    }

    #[test]
    fn resolve_satisfied_requirement() {
        let mut scope = SharedScope::new();
        scope.register("react", v("18.2.0"), true, "host");
        let entry = scope
            .resolve("react", &VersionReq::parse("^18.0").unwrap(), "checkout")
            .unwrap();
        assert_eq!(entry.version, v("18.2.0"));
        assert!(scope.warnings().is_empty());
    }

    #[test]
    fn resolve_missing_library_fails() {
        let mut scope = SharedScope::new();
        let error = scope
            .resolve("moment", &VersionReq::Any, "checkout")
            .unwrap_err();
        assert!(matches!(error, ScopeError::Missing { library, .. } if library == "moment"));
    }

    #[test]
    fn singleton_requirement_mismatch_warns_and_resolves() {
        let mut scope = SharedScope::new();
        scope.register("react", v("18.2.0"), true, "host");

        let entry = scope
            .resolve("react", &VersionReq::parse("^17.0.2").unwrap(), "legacy-tile")
            .unwrap();
        assert_eq!(entry.version, v("18.2.0"));
        assert_eq!(scope.warnings().len(), 1);
        assert!(matches!(
            &scope.warnings()[0],
            ScopeWarning::SingletonRequirementMismatch { consumer, .. } if consumer == "legacy-tile"
        ));
    }

    #[test]
    fn non_singleton_requirement_mismatch_fails() {
        let mut scope = SharedScope::new();
        scope.register("lodash", v("4.17.21"), false, "host");

        let error = scope
            .resolve("lodash", &VersionReq::parse("^3.10").unwrap(), "checkout")
            .unwrap_err();
        assert!(matches!(
            error,
            ScopeError::Incompatible { available, .. } if available == v("4.17.21")
        ));
    }
}
