use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attr::Token;
use crate::error::UploadError;
use crate::policy::{LoadReport, RuleId};
use crate::tree::DecisionTree;

/// Longest resource path accepted in an upload.
pub const MAX_PATH_LEN: usize = 4096;

/// Which policy representation the engine runs. Picked once at
/// configuration time; it decides how the resource upload is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyModel {
    /// Resources carry sets of rule ids resolved against the flat
    /// policy table.
    FlatRules,
    /// Resources carry their own decision trees.
    DecisionTrees,
}

/// The policy record bound to one resource.
#[derive(Debug)]
pub enum ResourcePolicy<T> {
    /// Ids of the rules covering the resource, in upload order.
    Rules(Vec<RuleId>),
    Tree(DecisionTree<T>),
}

/// Resource path to policy-record mapping, rebuilt wholesale from each
/// upload. Flat lines carry `path:id1,id2,...`; tree lines carry
/// `path:node_count|root|node|...`. Hash collisions between paths are
/// resolved by exact path equality, never by hash alone.
#[derive(Debug, Default)]
pub struct ResourceIndex<T> {
    entries: HashMap<String, ResourcePolicy<T>>,
}

impl<T: Token> ResourceIndex<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Parse a full resource upload under the given model. A line
    /// shorter than two bytes ends the scan; the last line wins when a
    /// path repeats.
    pub fn parse(text: &str, model: PolicyModel) -> Result<(Self, LoadReport), UploadError> {
        let mut entries = HashMap::new();
        let mut report = LoadReport::default();
        for line in text.split('\n') {
            if line.len() < 2 {
                break;
            }
            let (path, section) = line
                .split_once(':')
                .ok_or_else(|| UploadError::malformed(format!("resource line '{line}' has no ':'")))?;
            if path.len() > MAX_PATH_LEN {
                return Err(UploadError::PathTooLong { max: MAX_PATH_LEN });
            }
            let policy = match model {
                PolicyModel::FlatRules => ResourcePolicy::Rules(Self::parse_rule_ids(section)?),
                PolicyModel::DecisionTrees => {
                    ResourcePolicy::Tree(DecisionTree::parse(section, &mut report)?)
                }
            };
            entries.insert(path.to_string(), policy);
        }
        report.entries = entries.len();
        debug!(resources = entries.len(), "resource index parsed");
        Ok((Self { entries }, report))
    }

    fn parse_rule_ids(section: &str) -> Result<Vec<RuleId>, UploadError> {
        section
            .split(',')
            .map(|id| {
                id.parse::<RuleId>()
                    .map_err(|_| UploadError::malformed(format!("invalid rule id '{id}'")))
            })
            .collect()
    }

    /// Policy record for a path. Absence is not an error: a resource
    /// with no record has no covering policy and every controlled
    /// request against it is denied.
    pub fn get(&self, path: &str) -> Option<&ResourcePolicy<T>> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{PolicyModel, ResourceIndex, ResourcePolicy, MAX_PATH_LEN};
    use crate::error::UploadError;

    #[test]
    fn parse_flat_rule_sets() {
        let (index, report) = ResourceIndex::<String>::parse(
            "/home/secured/doc:0,2\n/home/secured/log:1\n",
            PolicyModel::FlatRules,
        )
        .unwrap();
        assert_eq!(report.entries, 2);
        match index.get("/home/secured/doc").unwrap() {
            ResourcePolicy::Rules(ids) => assert_eq!(ids, &[0, 2]),
            other => panic!("expected rule ids, got {other:?}"),
        }
        assert!(index.get("/home/secured/other").is_none());
    }

    #[test]
    fn parse_trees() {
        let (index, _) = ResourceIndex::<String>::parse(
            "/home/secured/doc:2|0 - - dept|1 0 eng READ\n",
            PolicyModel::DecisionTrees,
        )
        .unwrap();
        assert!(matches!(
            index.get("/home/secured/doc").unwrap(),
            ResourcePolicy::Tree(_)
        ));
    }

    #[test]
    fn model_governs_parsing() {
        // a tree line under the flat model is not valid rule ids
        assert!(ResourceIndex::<String>::parse(
            "/home/secured/doc:2|0 - - dept|1 0 eng READ\n",
            PolicyModel::FlatRules,
        )
        .is_err());
    }

    #[test]
    fn overlong_path_rejects() {
        let line = format!("{}:0\n", "p".repeat(MAX_PATH_LEN + 1));
        let err = ResourceIndex::<String>::parse(&line, PolicyModel::FlatRules).unwrap_err();
        assert!(matches!(err, UploadError::PathTooLong { .. }));
    }

    #[test]
    fn last_line_wins_on_duplicate_path() {
        let (index, report) = ResourceIndex::<String>::parse(
            "/home/secured/doc:0\n/home/secured/doc:1\n",
            PolicyModel::FlatRules,
        )
        .unwrap();
        assert_eq!(report.entries, 1);
        match index.get("/home/secured/doc").unwrap() {
            ResourcePolicy::Rules(ids) => assert_eq!(ids, &[1]),
            other => panic!("expected rule ids, got {other:?}"),
        }
    }
}
