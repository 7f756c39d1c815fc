//! Commands for state mutations.
//!
//! Commands are returned by IPC handlers to request changes that the main
//! daemon loop performs against the graph mirror.

use crate::error::{Error, Result};
use crate::ledger::LinkPair;

/// A command representing a state mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-read the graph from PipeWire
    Refresh,
    /// Link every selected source node to every selected target node
    CreateLinks { sources: Vec<u32>, targets: Vec<u32> },
    /// Link a single output port to a single input port
    LinkPorts { output_port: u32, input_port: u32 },
    /// Remove session-created links
    RemoveLinks { pairs: Vec<LinkPair> },
    /// Remove any link PipeWire reports, by link ID
    UnlinkById { id: u32 },
    /// Remove every link created during this session
    RemoveAllLinks,
    /// Request shutdown
    Shutdown,
}

impl Command {
    /// Build a `CreateLinks` command, rejecting empty selections.
    ///
    /// # Errors
    /// Returns [`Error::NoSources`] or [`Error::NoTargets`].
    pub fn create_links(sources: Vec<u32>, targets: Vec<u32>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::NoSources);
        }
        if targets.is_empty() {
            return Err(Error::NoTargets);
        }
        Ok(Self::CreateLinks { sources, targets })
    }

    /// Build a `RemoveLinks` command, rejecting an empty selection.
    ///
    /// # Errors
    /// Returns [`Error::NoLinksSelected`].
    pub fn remove_links(pairs: Vec<LinkPair>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::NoLinksSelected);
        }
        Ok(Self::RemoveLinks { pairs })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_create_links_requires_sources() {
        assert_matches!(Command::create_links(vec![], vec![50]), Err(Error::NoSources));
    }

    #[test]
    fn test_create_links_requires_targets() {
        assert_matches!(Command::create_links(vec![40], vec![]), Err(Error::NoTargets));
    }

    #[test]
    fn test_create_links_checks_sources_first() {
        let err = Command::create_links(vec![], vec![]).unwrap_err();
        assert_eq!(err.to_string(), "Please select at least one source application");
    }

    #[test]
    fn test_remove_links_requires_selection() {
        assert_matches!(Command::remove_links(vec![]), Err(Error::NoLinksSelected));
        assert_matches!(
            Command::remove_links(vec![LinkPair::nodes(1, 2)]),
            Ok(Command::RemoveLinks { pairs }) if pairs.len() == 1
        );
    }
}
