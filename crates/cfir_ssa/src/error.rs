use crate::ir::{ty::Ty, BlockId, InstId, NodeId};

/// Errors returned by graph mutators.
///
/// Every mutator checks its preconditions before touching the graph, so an
/// `Err` always leaves the graph as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no block `{0}`")]
    NoSuchBlock(BlockId),
    #[error("no instruction `{0}`")]
    NoSuchNode(InstId),
    #[error("index {index} is out of range for block `{block}` with {len} statement(s)")]
    IndexOutOfRange {
        block: BlockId,
        index: usize,
        len: usize,
    },
    #[error("block `{0}` already ends in a jump")]
    DuplicateJump(BlockId),
    #[error("block `{0}` has no jump")]
    NoJump(BlockId),
    #[error("`{node}` has type {found}, expected {expected}")]
    TypeMismatch {
        node: NodeId,
        expected: Ty,
        found: Ty,
    },
    #[error("`{block}` is not an incoming block of `{phi}`")]
    NoSuchPredecessor { phi: InstId, block: BlockId },
    #[error("no phi class covers both {0} and {1}")]
    NoCommonPhiType(Ty, Ty),
    #[error("cannot merge `{block}` with `{succ}`: {reason}")]
    IllegalMerge {
        block: BlockId,
        succ: BlockId,
        reason: &'static str,
    },
    #[error("block `{0}` already exists")]
    DuplicateBlock(BlockId),
    #[error("instruction `{0}` already exists")]
    DuplicateNode(InstId),
    #[error("cannot remove the entry block `{0}`")]
    RemoveEntry(BlockId),
    #[error("phi `{phi}` in `{block}` has no input but is still used")]
    PhiWithoutInput { phi: InstId, block: BlockId },
    #[error("`{0}` is not a phi")]
    NotAPhi(InstId),
    #[error("`{0}` is not a statement")]
    NotAStmt(InstId),
    #[error("cannot inline a graph whose block `{0}` returns non-locally")]
    NonLocalReturn(BlockId),
    #[error("inlined graph reads {expected} argument(s), {found} given")]
    InlineArity { expected: usize, found: usize },
    #[error("`{old}` is already staged to become `{staged}`, not `{new}`")]
    SubstConflict {
        old: NodeId,
        staged: NodeId,
        new: NodeId,
    },
    #[error("`{id}` has {expected} output(s), the new payload has {found}")]
    ArityChanged {
        id: InstId,
        expected: usize,
        found: usize,
    },
    #[error("`{id}` takes {expected} argument(s), {found} given")]
    ArgCount {
        id: InstId,
        expected: usize,
        found: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
