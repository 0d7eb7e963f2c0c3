//! Recursive Include Walker
//!
//! Starting at a repository document, follows `includes` depth-first and
//! flattens the tree into a list of entries. Includes form a tree by
//! convention; the depth cap stops accidental cycles.

use serde_json::Value;
use tracing::{debug, info};

use crate::error::ChannelError;
use crate::loader::{Document, Loader, Location};
use crate::version::{SchemaSupport, SchemaVersion, VersionPolicy};

/// How a repository document was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryRole {
    /// Part of the canonical channel rather than an external repository
    pub main: bool,
    /// Reached through another document's `includes`
    pub included: bool,
    /// Number of include hops from the repository root
    pub depth: usize,
}

/// One result of a walk
#[derive(Debug)]
pub enum WalkEntry {
    Document { document: Document, role: RepositoryRole },
    /// Legacy or unrecognized schema version; not validated, includes not
    /// followed
    Skipped { location: Location, schema_version: String },
    /// Structural failure for this location
    Failed { location: Location, error: ChannelError },
}

impl WalkEntry {
    pub fn location(&self) -> &Location {
        match self {
            WalkEntry::Document { document, .. } => &document.location,
            WalkEntry::Skipped { location, .. } | WalkEntry::Failed { location, .. } => location,
        }
    }
}

/// Depth-first walker over repository includes
pub struct IncludeWalker<'a> {
    loader: &'a Loader,
    policy: &'a VersionPolicy,
    max_depth: usize,
}

impl<'a> IncludeWalker<'a> {
    pub fn new(loader: &'a Loader, policy: &'a VersionPolicy, max_depth: usize) -> Self {
        Self {
            loader,
            policy,
            max_depth,
        }
    }

    /// Walk a repository root and everything it includes
    pub fn walk(&self, root: Location, main: bool) -> Vec<WalkEntry> {
        let mut entries = Vec::new();
        let role = RepositoryRole {
            main,
            included: false,
            depth: 0,
        };
        self.visit(root, role, &mut entries);
        info!(documents = entries.len(), "walk finished");
        entries
    }

    fn visit(&self, location: Location, role: RepositoryRole, entries: &mut Vec<WalkEntry>) {
        if role.depth > self.max_depth {
            entries.push(WalkEntry::Failed {
                error: ChannelError::DepthExceeded {
                    location: location.to_string(),
                    limit: self.max_depth,
                },
                location,
            });
            return;
        }

        let document = match self.loader.load(&location) {
            Ok(doc) => doc,
            Err(error) => {
                entries.push(WalkEntry::Failed { location, error });
                return;
            }
        };

        match self.policy.classify(document.schema_version()) {
            SchemaSupport::Legacy(SchemaVersion { raw, .. }) => {
                debug!(location = %location, version = %raw, "skipping legacy schema");
                entries.push(WalkEntry::Skipped {
                    location,
                    schema_version: raw,
                });
            }
            SchemaSupport::Unknown(raw) if document.schema_version().is_some_and(Value::is_string) => {
                debug!(location = %location, version = %raw, "skipping unrecognized schema");
                entries.push(WalkEntry::Skipped {
                    location,
                    schema_version: raw,
                });
            }
            SchemaSupport::Supported => {
                let includes = include_references(&document.value);
                entries.push(WalkEntry::Document { document, role });
                for reference in includes {
                    let child_role = RepositoryRole {
                        main: role.main,
                        included: true,
                        depth: role.depth + 1,
                    };
                    match location.join(&reference) {
                        Ok(child) => self.visit(child, child_role, entries),
                        Err(error) => entries.push(WalkEntry::Failed {
                            location: location.clone(),
                            error,
                        }),
                    }
                }
            }
            // missing or non-string version: validators report it
            SchemaSupport::Unknown(_) | SchemaSupport::Missing => {
                entries.push(WalkEntry::Document { document, role });
            }
        }
    }
}

/// String entries of a document's `includes` array. Non-string entries are
/// left for the repository key checks to report.
pub fn include_references(value: &Value) -> Vec<String> {
    value
        .get("includes")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
