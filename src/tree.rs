use core::str::FromStr;
use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::attr::{AttributeList, Token};
use crate::error::UploadError;
use crate::operation::{Decision, Operation};
use crate::policy::LoadReport;

/// A node of a resource's decision tree: either an internal node that
/// branches on the value of one attribute, or a leaf carrying the
/// operation the matched path grants.
#[derive(Debug)]
enum Node<T> {
    Internal {
        attr: T,
        branches: HashMap<T, Node<T>>,
    },
    Leaf(Operation),
}

/// A per-resource decision tree.
///
/// The upload encodes a tree as `node_count|root|node|node|...` where
/// every node record is `nid pid value last`: `nid` the node's id,
/// `pid` the parent id, `value` the branch value leading from the
/// parent to this node, and `last` either an attribute name (internal
/// node) or an operation word (leaf). The root record uses `-`
/// placeholders for `pid` and `value`.
///
/// Node ids only exist while the line is parsed: records are collected
/// into a temporary id-indexed arena, children are wired to their
/// parents as owned branches, and the arena is discarded once the root
/// is assembled.
#[derive(Debug)]
pub struct DecisionTree<T> {
    root: Node<T>,
}

enum Payload<T> {
    Attr(T),
    Op(Operation),
}

struct NodeRec<T> {
    parent: Option<(u32, T)>,
    payload: Payload<T>,
}

impl<T: Token> DecisionTree<T> {
    /// Parse the section of a resource line after the path. Repeated
    /// node ids keep the last record and are added to `report`.
    pub(crate) fn parse(section: &str, report: &mut LoadReport) -> Result<Self, UploadError> {
        let mut records = section.split('|');
        let count_str = records
            .next()
            .ok_or_else(|| UploadError::malformed("tree without node count"))?;
        let count: u32 = count_str
            .trim()
            .parse()
            .map_err(|_| UploadError::malformed(format!("invalid node count '{count_str}'")))?;
        if count == 0 {
            return Err(UploadError::malformed("tree with zero nodes"));
        }

        let mut slots: Vec<Option<NodeRec<T>>> = (0..count).map(|_| None).collect();
        let mut root_nid = None;
        for record in records {
            let (nid, rec) = Self::parse_record(record, count, root_nid.is_none())?;
            if root_nid.is_none() {
                root_nid = Some(nid);
            }
            let slot = &mut slots[nid as usize];
            if slot.is_some() {
                warn!(id = nid, "duplicate node id, keeping the last occurrence");
                report.duplicates.push(nid);
            }
            *slot = Some(rec);
        }
        let root_nid = root_nid.ok_or_else(|| UploadError::malformed("tree without a root node"))?;

        // child links per parent, in record order
        let mut children: HashMap<u32, Vec<(T, u32)>> = HashMap::new();
        for (nid, slot) in slots.iter().enumerate() {
            if let Some(NodeRec {
                parent: Some((pid, value)),
                ..
            }) = slot
            {
                children
                    .entry(*pid)
                    .or_default()
                    .push((value.clone(), nid as u32));
            }
        }

        let mut seen = HashSet::new();
        let root = Self::assemble(root_nid, &slots, &children, &mut seen)?;
        Ok(Self { root })
    }

    fn parse_record(
        record: &str,
        count: u32,
        is_root: bool,
    ) -> Result<(u32, NodeRec<T>), UploadError> {
        let mut fields = record.split_whitespace();
        let (Some(nid), Some(pid), Some(value), Some(last), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(UploadError::malformed(format!(
                "node record '{record}' must have four fields"
            )));
        };
        let nid: u32 = nid
            .parse()
            .map_err(|_| UploadError::malformed(format!("invalid node id '{nid}'")))?;
        if nid >= count {
            return Err(UploadError::NodeIdOutOfRange { id: nid, count });
        }
        let parent = if is_root {
            // pid and value are placeholders on the root record
            None
        } else {
            let pid: u32 = pid
                .parse()
                .map_err(|_| UploadError::malformed(format!("invalid parent id '{pid}'")))?;
            if pid >= count {
                return Err(UploadError::NodeIdOutOfRange { id: pid, count });
            }
            Some((pid, T::parse(value)?))
        };
        // a leaf carries an operation word where internal nodes carry
        // an attribute name
        let payload = match Operation::from_str(last) {
            Ok(op) => Payload::Op(op),
            Err(_) => Payload::Attr(T::parse(last)?),
        };
        Ok((nid, NodeRec { parent, payload }))
    }

    fn assemble(
        nid: u32,
        slots: &[Option<NodeRec<T>>],
        children: &HashMap<u32, Vec<(T, u32)>>,
        seen: &mut HashSet<u32>,
    ) -> Result<Node<T>, UploadError> {
        if !seen.insert(nid) {
            return Err(UploadError::malformed(format!(
                "node {nid} is its own ancestor"
            )));
        }
        let rec = slots[nid as usize]
            .as_ref()
            .ok_or_else(|| UploadError::malformed(format!("node {nid} referenced but not defined")))?;
        match &rec.payload {
            Payload::Op(op) => Ok(Node::Leaf(*op)),
            Payload::Attr(attr) => {
                let mut branches = HashMap::new();
                if let Some(kids) = children.get(&nid) {
                    for (value, child) in kids {
                        branches.insert(value.clone(), Self::assemble(*child, slots, children, seen)?);
                    }
                }
                Ok(Node::Internal {
                    attr: attr.clone(),
                    branches,
                })
            }
        }
    }

    /// Walk the single deterministic path the request selects.
    ///
    /// At an internal node the branch is picked by the value the
    /// principal holds for the node's attribute; the environment is
    /// consulted only when the principal holds no matching value, so
    /// the principal's value decides whenever both sides hold one for
    /// the same name. A node with no matching branch denies
    /// immediately; there is no backtracking.
    pub fn evaluate(
        &self,
        principal: &AttributeList<T>,
        env: &AttributeList<T>,
        requested: Operation,
    ) -> Decision {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(granted) => return granted.grants(requested).into(),
                Node::Internal { attr, branches } => {
                    let next = principal
                        .values_of(attr)
                        .find_map(|v| branches.get(v))
                        .or_else(|| env.values_of(attr).find_map(|v| branches.get(v)));
                    match next {
                        Some(child) => node = child,
                        None => return Decision::Deny,
                    }
                }
            }
        }
    }
}
