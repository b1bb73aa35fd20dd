use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument};

use crate::{
    cfg::NodeKind,
    ir::{inst::Payload, ty::Ty, BlockId, InstId, NodeId},
    Block, Cfg,
};

// ---------------------------------------------------------------------------
// Violation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingEntry(BlockId),
    MissingJump(BlockId),
    /// An instruction listed by a block is not in the node table, or the
    /// table says it lives elsewhere.
    MissingNode { block: BlockId, inst: InstId },
    DanglingTarget { block: BlockId, target: BlockId },
    DanglingPredecessor { block: BlockId, pred: BlockId },
    /// `from` jumps to `to` but is not one of its predecessors, or the
    /// other way around.
    InconsistentEdge { from: BlockId, to: BlockId },
    ExitMismatch(BlockId),
    PhiInSmallBlock { block: BlockId, phi: InstId },
    PhiMissingInput { phi: InstId, pred: BlockId },
    PhiExtraInput { phi: InstId, incoming: BlockId },
    UnsetPhiInput { phi: InstId, incoming: BlockId },
    DanglingArg { inst: InstId, arg: NodeId },
    ArgType {
        inst: InstId,
        arg: NodeId,
        expected: Ty,
        found: Ty,
    },
    NotDefinedBeforeUse { inst: InstId, arg: NodeId },
    InvalidInstr { inst: InstId, reason: String },
    NotReachable(BlockId),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingEntry(b) => write!(f, "entry block `{b}` does not exist"),
            Violation::MissingJump(b) => write!(f, "block `{b}` has no jump"),
            Violation::MissingNode { block, inst } => {
                write!(f, "block `{block}` lists `{inst}`, which is not recorded there")
            }
            Violation::DanglingTarget { block, target } => {
                write!(f, "block `{block}` jumps to missing block `{target}`")
            }
            Violation::DanglingPredecessor { block, pred } => {
                write!(f, "block `{block}` lists missing predecessor `{pred}`")
            }
            Violation::InconsistentEdge { from, to } => {
                write!(f, "edge `{from}` -> `{to}` is only known to one side")
            }
            Violation::ExitMismatch(b) => write!(f, "exit set is wrong about block `{b}`"),
            Violation::PhiInSmallBlock { block, phi } => {
                write!(f, "phi `{phi}` in block `{block}`, which has fewer than two predecessors")
            }
            Violation::PhiMissingInput { phi, pred } => {
                write!(f, "phi `{phi}` has no input for predecessor `{pred}`")
            }
            Violation::PhiExtraInput { phi, incoming } => {
                write!(f, "phi `{phi}` has an input for non-predecessor `{incoming}`")
            }
            Violation::UnsetPhiInput { phi, incoming } => {
                write!(f, "phi `{phi}` has an unset input for `{incoming}`")
            }
            Violation::DanglingArg { inst, arg } => {
                write!(f, "`{inst}` uses `{arg}`, which is not in the graph")
            }
            Violation::ArgType {
                inst,
                arg,
                expected,
                found,
            } => write!(f, "`{inst}` expects {expected} but `{arg}` is {found}"),
            Violation::NotDefinedBeforeUse { inst, arg } => {
                write!(f, "`{inst}` uses `{arg}` before it is defined")
            }
            Violation::InvalidInstr { inst, reason } => write!(f, "`{inst}` is invalid: {reason}"),
            Violation::NotReachable(b) => write!(f, "block `{b}` is not reachable from the entry"),
        }
    }
}

// ---------------------------------------------------------------------------
// VerifierResult
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifierResult {
    pub violations: Vec<Violation>,
}

impl VerifierResult {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Every violation found in a graph, with a dump of the graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("graph failed verification with {} violation(s):\n{}\n{dump}", .violations.len(), listing(.violations))]
pub struct VerifyError {
    pub violations: Vec<Violation>,
    pub dump: String,
}

fn listing(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {v}\n"))
        .collect()
}

// ---------------------------------------------------------------------------
// CfgVerifier
// ---------------------------------------------------------------------------

/// Values known to be defined at the current point of the walk.
///
/// Definitions sit on a stack; entries below `floor` belong to blocks that
/// do not reach the current one through a chain of single predecessors and
/// are not visible.
#[derive(Default)]
struct Defined {
    stack: Vec<InstId>,
    index: FxHashMap<InstId, usize>,
    floor: usize,
}

impl Defined {
    fn push(&mut self, id: &InstId) {
        self.index.insert(id.clone(), self.stack.len());
        self.stack.push(id.clone());
    }

    fn contains(&self, id: &InstId) -> bool {
        self.index.get(id).is_some_and(|&i| i >= self.floor)
    }

    fn truncate(&mut self, len: usize) {
        for id in self.stack.drain(len..) {
            self.index.remove(&id);
        }
    }
}

enum Step {
    Enter { block: BlockId, chained: bool },
    Leave { len: usize, floor: usize },
}

pub struct CfgVerifier<'a> {
    cfg: &'a Cfg,
    result: VerifierResult,
    defined: Defined,
    visited: FxHashSet<BlockId>,
}

impl<'a> CfgVerifier<'a> {
    pub fn new(cfg: &'a Cfg) -> Self {
        Self {
            cfg,
            result: VerifierResult::default(),
            defined: Defined::default(),
            visited: FxHashSet::default(),
        }
    }

    pub fn verify(mut self) -> VerifierResult {
        let entry = self.cfg.entry().clone();
        if !self.cfg.has_block(&entry) {
            self.emit(Violation::MissingEntry(entry));
            return self.result;
        }

        let mut steps = vec![Step::Enter {
            block: entry,
            chained: false,
        }];
        while let Some(step) = steps.pop() {
            match step {
                Step::Enter { block, chained } => {
                    if !self.visited.insert(block.clone()) {
                        continue;
                    }
                    let Some(data) = self.cfg.block(&block) else {
                        continue;
                    };
                    steps.push(Step::Leave {
                        len: self.defined.stack.len(),
                        floor: self.defined.floor,
                    });
                    if !chained {
                        self.defined.floor = self.defined.stack.len();
                    }
                    self.check_block(data);

                    let succs = self.cfg.successors(&block);
                    for succ in succs.into_iter().rev() {
                        if self.visited.contains(&succ) {
                            continue;
                        }
                        let chained = self
                            .cfg
                            .block(&succ)
                            .is_some_and(|s| s.num_preds() == 1 && s.has_pred(&block));
                        steps.push(Step::Enter {
                            block: succ,
                            chained,
                        });
                    }
                }
                Step::Leave { len, floor } => {
                    self.defined.truncate(len);
                    self.defined.floor = floor;
                }
            }
        }

        for block in self.cfg.block_ids() {
            if !self.visited.contains(block) {
                self.result
                    .violations
                    .push(Violation::NotReachable(block.clone()));
            }
        }
        self.result
    }

    fn emit(&mut self, violation: Violation) {
        self.result.violations.push(violation);
    }

    fn check_block(&mut self, block: &Block) {
        let id = block.id();
        self.check_edges(block);

        for inst in block.insts() {
            match self.cfg.inst(inst) {
                Some(data) if data.block() == id => {}
                _ => self.emit(Violation::MissingNode {
                    block: id.clone(),
                    inst: inst.clone(),
                }),
            }
        }

        for phi in block.phis() {
            self.check_phi(block, phi);
            self.defined.push(phi);
        }
        for stmt in block.stmts() {
            self.check_inst(stmt);
            self.defined.push(stmt);
        }
        match block.jump() {
            Some(jump) => self.check_inst(jump),
            None => self.emit(Violation::MissingJump(id.clone())),
        }
    }

    fn check_edges(&mut self, block: &Block) {
        let id = block.id();
        let succs = self.cfg.successors(id);
        for target in &succs {
            match self.cfg.block(target) {
                None => self.emit(Violation::DanglingTarget {
                    block: id.clone(),
                    target: target.clone(),
                }),
                Some(t) if !t.has_pred(id) => self.emit(Violation::InconsistentEdge {
                    from: id.clone(),
                    to: target.clone(),
                }),
                Some(_) => {}
            }
        }
        for pred in block.preds() {
            if !self.cfg.has_block(pred) {
                self.emit(Violation::DanglingPredecessor {
                    block: id.clone(),
                    pred: pred.clone(),
                });
            } else if !self.cfg.successors(pred).contains(id) {
                self.emit(Violation::InconsistentEdge {
                    from: pred.clone(),
                    to: id.clone(),
                });
            }
        }
        if self.cfg.is_exit(id) != succs.is_empty() {
            self.emit(Violation::ExitMismatch(id.clone()));
        }
    }

    fn check_phi(&mut self, block: &Block, id: &InstId) {
        let Some(phi) = self.cfg.phi(id) else {
            return;
        };
        if block.num_preds() < 2 {
            self.emit(Violation::PhiInSmallBlock {
                block: block.id().clone(),
                phi: id.clone(),
            });
        }
        for pred in block.preds() {
            if !phi.has_incoming(pred) {
                self.emit(Violation::PhiMissingInput {
                    phi: id.clone(),
                    pred: pred.clone(),
                });
            }
        }
        for (incoming, input) in phi.inputs() {
            if !block.has_pred(incoming) {
                self.emit(Violation::PhiExtraInput {
                    phi: id.clone(),
                    incoming: incoming.clone(),
                });
            }
            match input {
                None => self.emit(Violation::UnsetPhiInput {
                    phi: id.clone(),
                    incoming: incoming.clone(),
                }),
                Some(node) => {
                    self.check_arg(id, node, phi.class());
                }
            }
        }
    }

    fn check_inst(&mut self, id: &InstId) {
        let Some(data) = self.cfg.inst(id) else {
            return;
        };
        let verdict = match data.kind() {
            NodeKind::Stmt(instr) => instr.payload().verify(),
            NodeKind::Jump(instr) => instr.payload().verify(),
            NodeKind::Phi(_) => Ok(()),
        };
        if let Err(reason) = verdict {
            self.emit(Violation::InvalidInstr {
                inst: id.clone(),
                reason,
            });
        }
        for (arg, slot) in data.args().into_iter().zip(data.arg_slots()) {
            if self.check_arg(id, arg, slot) && !self.is_defined(arg) {
                self.emit(Violation::NotDefinedBeforeUse {
                    inst: id.clone(),
                    arg: arg.clone(),
                });
            }
        }
    }

    /// Checks that `arg` exists and fits `slot`. Returns whether it exists.
    fn check_arg(&mut self, inst: &InstId, arg: &NodeId, slot: Ty) -> bool {
        let Some(found) = self.cfg.ty_of(arg) else {
            self.emit(Violation::DanglingArg {
                inst: inst.clone(),
                arg: arg.clone(),
            });
            return false;
        };
        if !found.is_subtype_of(slot) {
            self.emit(Violation::ArgType {
                inst: inst.clone(),
                arg: arg.clone(),
                expected: slot,
                found,
            });
        }
        true
    }

    fn is_defined(&self, arg: &NodeId) -> bool {
        match arg.origin() {
            Some(origin) => self.defined.contains(origin),
            None => true,
        }
    }
}

impl Cfg {
    /// Checks the structural invariants of the graph, reporting every
    /// violation at once.
    #[instrument(level = "debug", skip_all, fields(cfg = %self.id()))]
    pub fn verify(&self) -> Result<(), VerifyError> {
        let result = CfgVerifier::new(self).verify();
        if result.is_ok() {
            return Ok(());
        }
        debug!(violations = result.violations.len(), "verification failed");
        Err(VerifyError {
            violations: result.violations,
            dump: self.to_string(),
        })
    }
}
