//! Commitment tree
//!
//! A [`Timestamp`] node holds a message, the attestations made directly on
//! that message, and one child per distinct [`Op`]. The child's message is
//! always `op.call(parent.msg)`.
//!
//! Node encoding (markers: `0xff` fork, `0x00` attestation):
//! attestations in set order, then ops in insertion order; every edge except
//! the last is prefixed with `0xff`.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::attestation::Attestation;
use crate::codec::{DeserializationContext, SerializationContext};
use crate::error::{EncodingError, TimestampError};
use crate::op::{Op, MAX_MSG_LENGTH, MAX_RESULT_LENGTH};

pub(crate) const ATTESTATION_MARKER: u8 = 0x00;
pub(crate) const FORK_MARKER: u8 = 0xff;

/// Maximum nesting accepted while decoding
pub const RECURSION_LIMIT: usize = 256;

/// A pending attestation found in a tree, addressed by its op path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommitment {
    /// Ops leading from the root to the attested node
    pub path: Vec<Op>,
    /// Message of the attested node
    pub commitment: Vec<u8>,
    /// Calendar that issued the attestation
    pub calendar_url: String,
}

/// A node in the commitment tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    msg: Vec<u8>,
    attestations: BTreeSet<Attestation>,
    ops: IndexMap<Op, Timestamp>,
}

impl Timestamp {
    #[must_use]
    pub fn new(msg: impl Into<Vec<u8>>) -> Self {
        Self {
            msg: msg.into(),
            attestations: BTreeSet::new(),
            ops: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn msg(&self) -> &[u8] {
        &self.msg
    }

    /// Outgoing op edges in insertion order
    #[must_use]
    pub fn ops(&self) -> &IndexMap<Op, Timestamp> {
        &self.ops
    }

    #[must_use]
    pub fn child_for(&self, op: &Op) -> Option<&Timestamp> {
        self.ops.get(op)
    }

    pub fn child_for_mut(&mut self, op: &Op) -> Option<&mut Timestamp> {
        self.ops.get_mut(op)
    }

    /// Get the child for `op`, creating it if absent
    pub fn add_op(&mut self, op: Op) -> &mut Timestamp {
        let msg = &self.msg;
        self.ops
            .entry(op)
            .or_insert_with_key(|op| Timestamp::new(op.call(msg)))
    }

    #[must_use]
    pub fn attestations_here(&self) -> &BTreeSet<Attestation> {
        &self.attestations
    }

    /// Returns false if the attestation was already present
    pub fn add_attestation(&mut self, attestation: Attestation) -> bool {
        self.attestations.insert(attestation)
    }

    /// Walk a path of ops from this node
    pub fn node_mut(&mut self, path: &[Op]) -> Option<&mut Timestamp> {
        let mut node = self;
        for op in path {
            node = node.ops.get_mut(op)?;
        }
        Some(node)
    }

    /// Every reachable node carrying at least one attestation, pre-order
    #[must_use]
    pub fn directly_verified(&self) -> Vec<&Timestamp> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if !node.attestations.is_empty() {
                out.push(node);
            }
        });
        out
    }

    /// Every attestation paired with the message it attests, pre-order
    ///
    /// A node's own attestations come first (set order), then its children
    /// in insertion order.
    #[must_use]
    pub fn all_attestations(&self) -> Vec<(Vec<u8>, Attestation)> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            for attestation in &node.attestations {
                out.push((node.msg.clone(), attestation.clone()));
            }
        });
        out
    }

    /// Tree-wide set of attestations
    #[must_use]
    pub fn attestation_set(&self) -> HashSet<Attestation> {
        let mut out = HashSet::new();
        self.walk(&mut |node| out.extend(node.attestations.iter().cloned()));
        out
    }

    /// Pending attestations with the path needed to reach them again mutably
    #[must_use]
    pub fn pending_commitments(&self) -> Vec<PendingCommitment> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.collect_pending(&mut path, &mut out);
        out
    }

    fn collect_pending(&self, path: &mut Vec<Op>, out: &mut Vec<PendingCommitment>) {
        for attestation in &self.attestations {
            if let Attestation::Pending { uri } = attestation {
                out.push(PendingCommitment {
                    path: path.clone(),
                    commitment: self.msg.clone(),
                    calendar_url: uri.clone(),
                });
            }
        }

        for (op, child) in &self.ops {
            if op.is_opaque() {
                continue;
            }
            path.push(op.clone());
            child.collect_pending(path, out);
            path.pop();
        }
    }

    /// True once a Bitcoin attestation is reachable
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let mut complete = false;
        self.walk(&mut |node| {
            complete |= node
                .attestations
                .iter()
                .any(|a| a.bitcoin_height().is_some());
        });
        complete
    }

    /// Pre-order visit, skipping subtrees behind opaque ops
    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Timestamp)) {
        visit(self);
        for (op, child) in &self.ops {
            if !op.is_opaque() {
                child.walk(visit);
            }
        }
    }

    /// Merge another tree for the same message into this one
    ///
    /// # Errors
    ///
    /// Returns `TimestampError::IncompatibleMerge` if the messages differ
    pub fn merge(&mut self, other: &Timestamp) -> Result<(), TimestampError> {
        if self.msg != other.msg {
            return Err(TimestampError::IncompatibleMerge {
                expected: hex::encode(&self.msg),
                actual: hex::encode(&other.msg),
            });
        }
        self.merge_same_msg(other);
        Ok(())
    }

    // Equal ops on equal messages yield equal child messages, so recursion
    // never needs to re-check.
    fn merge_same_msg(&mut self, other: &Timestamp) {
        self.attestations.extend(other.attestations.iter().cloned());
        for (op, child) in &other.ops {
            match self.ops.get_mut(op) {
                Some(existing) => existing.merge_same_msg(child),
                None => {
                    self.ops.insert(op.clone(), child.clone());
                }
            }
        }
    }

    /// Human-readable rendering of the tree
    #[must_use]
    pub fn str_tree(&self, indent: usize) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, indent);
        out
    }

    fn write_tree(&self, out: &mut String, indent: usize) {
        let pad = " ".repeat(indent);

        for attestation in &self.attestations {
            let _ = writeln!(out, "{pad}verify {attestation}");
        }

        if self.ops.len() > 1 {
            for (op, child) in &self.ops {
                let _ = writeln!(out, "{pad} -> {op}");
                child.write_tree(out, indent + 4);
            }
        } else if let Some((op, child)) = self.ops.first() {
            let _ = writeln!(out, "{pad}{op}");
            child.write_tree(out, indent);
        }
    }

    /// Encode this node and everything below it
    ///
    /// Trees the decoder would refuse are refused here too.
    ///
    /// # Errors
    ///
    /// `EncodingError::EmptyTimestamp` if any node has no edges, message
    /// length or nesting beyond the decode limits, or an op or attestation
    /// that fails validation
    pub fn serialize(&self, ctx: &mut SerializationContext) -> Result<(), EncodingError> {
        self.serialize_at_depth(ctx, 0)
    }

    fn serialize_at_depth(
        &self,
        ctx: &mut SerializationContext,
        depth: usize,
    ) -> Result<(), EncodingError> {
        if depth > RECURSION_LIMIT {
            return Err(EncodingError::RecursionLimit(RECURSION_LIMIT));
        }

        let mut remaining = self.attestations.len() + self.ops.len();
        if remaining == 0 {
            return Err(EncodingError::EmptyTimestamp);
        }

        for attestation in &self.attestations {
            remaining -= 1;
            if remaining > 0 {
                ctx.write_byte(FORK_MARKER);
            }
            ctx.write_byte(ATTESTATION_MARKER);
            attestation.serialize(ctx)?;
        }

        for (op, child) in &self.ops {
            if self.msg.len() > MAX_MSG_LENGTH {
                return Err(EncodingError::MsgTooLong {
                    len: self.msg.len(),
                    max: MAX_MSG_LENGTH,
                });
            }
            if child.msg.len() > MAX_RESULT_LENGTH {
                return Err(EncodingError::ResultTooLong {
                    len: child.msg.len(),
                    max: MAX_RESULT_LENGTH,
                });
            }

            remaining -= 1;
            if remaining > 0 {
                ctx.write_byte(FORK_MARKER);
            }
            op.serialize(ctx)?;
            child.serialize_at_depth(ctx, depth + 1)?;
        }

        Ok(())
    }

    /// Decode a node whose message is already known
    ///
    /// # Errors
    ///
    /// Any malformed or truncated input, or nesting deeper than
    /// [`RECURSION_LIMIT`]
    pub fn deserialize(
        ctx: &mut DeserializationContext<'_>,
        msg: Vec<u8>,
    ) -> Result<Self, EncodingError> {
        Self::deserialize_at_depth(ctx, msg, 0)
    }

    fn deserialize_at_depth(
        ctx: &mut DeserializationContext<'_>,
        msg: Vec<u8>,
        depth: usize,
    ) -> Result<Self, EncodingError> {
        if depth > RECURSION_LIMIT {
            return Err(EncodingError::RecursionLimit(RECURSION_LIMIT));
        }

        let mut node = Timestamp::new(msg);

        let mut tag = ctx.read_byte()?;
        while tag == FORK_MARKER {
            let edge_tag = ctx.read_byte()?;
            node.read_edge(ctx, edge_tag, depth)?;
            tag = ctx.read_byte()?;
        }
        node.read_edge(ctx, tag, depth)?;

        Ok(node)
    }

    fn read_edge(
        &mut self,
        ctx: &mut DeserializationContext<'_>,
        tag: u8,
        depth: usize,
    ) -> Result<(), EncodingError> {
        if tag == ATTESTATION_MARKER {
            let attestation = Attestation::deserialize(ctx)?;
            self.attestations.insert(attestation);
            return Ok(());
        }

        let op = Op::deserialize_from_tag(ctx, tag)?;
        let child_msg = op.call_checked(&self.msg)?;
        let child = Self::deserialize_at_depth(ctx, child_msg, depth + 1)?;

        match self.ops.get_mut(&op) {
            Some(existing) => existing.merge_same_msg(&child),
            None => {
                self.ops.insert(op, child);
            }
        }
        Ok(())
    }

    /// Decode a calendar response: a bare node rooted at `msg`
    ///
    /// # Errors
    ///
    /// As [`Timestamp::deserialize`], plus trailing bytes after the node
    pub fn from_calendar_response(msg: &[u8], bytes: &[u8]) -> Result<Self, EncodingError> {
        let mut ctx = DeserializationContext::new(bytes);
        let timestamp = Self::deserialize(&mut ctx, msg.to_vec())?;
        ctx.assert_eof()?;
        Ok(timestamp)
    }

    /// Encode as a bare node
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::EmptyTimestamp` if any node has no edges
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let mut ctx = SerializationContext::new();
        self.serialize(&mut ctx)?;
        Ok(ctx.into_bytes())
    }
}
