//! Splicing a copy of one graph into another.

use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use crate::{
    cfg::NodeData,
    edit::Edit,
    infra::subst::BatchSubst,
    ir::{
        inst::{Jump, Stmt},
        ty::Ty,
        BlockId, InstId, NodeId,
    },
    Cfg, Error, Result,
};

/// Where control and the returned value come out of an inlined graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inlined {
    /// The block holding what followed the inlining point.
    pub continuation: BlockId,
    /// The returned value as seen from the continuation: the remapped
    /// operand of the only `ret`, a phi over several, or `None` if the
    /// guest never returns.
    pub value: Option<NodeId>,
}

impl Cfg {
    /// Inlines a copy of `guest` before statement `index` of `block`.
    ///
    /// `param #i` statements of the guest are replaced by `args[i]`. Every
    /// other guest block and instruction is copied under a fresh identifier,
    /// and `ret`s become jumps to the continuation. Fails without touching
    /// the graph if the guest returns non-locally or reads a parameter that
    /// `args` does not provide.
    #[instrument(level = "debug", skip_all, fields(host = %self.id(), guest = %guest.id()))]
    pub fn inline(
        &mut self,
        block: &BlockId,
        index: usize,
        guest: &Cfg,
        args: &[NodeId],
    ) -> Result<Inlined> {
        check_guest(guest, args)?;
        self.transaction("inline", |cfg| cfg.splice(block, index, guest, args))
    }

    fn splice(
        &mut self,
        block: &BlockId,
        index: usize,
        guest: &Cfg,
        args: &[NodeId],
    ) -> Result<Inlined> {
        let continuation = self.split_new_successor(block, index)?;

        let order = copy_order(guest);
        let mut blocks: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        for old in &order {
            let new = self.add_bb(old.name().clone())?;
            blocks.insert(old.clone(), new);
        }
        let copied: Vec<BlockId> = order.iter().filter_map(|b| blocks.get(b).cloned()).collect();

        // Allocate every identifier up front so the copies cannot collide.
        let olds: Vec<InstId> = guest_insts(guest, &order)
            .filter(|id| param_index(guest, id).is_none())
            .cloned()
            .collect();
        let fresh = self.fresh_inst_ids(olds.iter().map(|id| id.name()));
        let ids: FxHashMap<InstId, InstId> = olds.into_iter().zip(fresh).collect();
        let renamed = |old: &InstId| ids.get(old).cloned().ok_or_else(|| Error::NoSuchNode(old.clone()));

        let mut subst = BatchSubst::new();
        for id in guest_insts(guest, &order) {
            if let Some(param) = param_index(guest, id) {
                subst.stage(id, args[param].clone())?;
            }
        }
        for (old, new) in &ids {
            subst.stage(old, new)?;
            let arity = guest.inst(old).map_or(0, NodeData::arity);
            for i in 1..arity as u32 {
                subst.stage(NodeId::Aux(old.clone(), i), NodeId::Aux(new.clone(), i))?;
            }
        }

        // Jumps first, so that phis find their predecessors.
        let mut returns: Vec<(BlockId, NodeId)> = Vec::new();
        for (old, new) in order.iter().zip(&copied) {
            let (Some(id), Some(instr)) = (
                guest.block(old).and_then(|b| b.jump()),
                guest.jump(old),
            ) else {
                continue;
            };
            let mut jump = instr.payload().clone();
            subst.rewrite(&mut jump);
            let jump = match jump {
                Jump::Return(value) => {
                    returns.push((new.clone(), value));
                    Jump::Goto(continuation.clone())
                }
                mut jump => {
                    for target in jump.targets_mut() {
                        if let Some(copy) = blocks.get(target) {
                            *target = copy.clone();
                        }
                    }
                    jump
                }
            };
            self.apply(Edit::SetJump {
                block: new.clone(),
                jump: Some((renamed(id)?, jump)),
            })?;
        }

        for (old, new) in order.iter().zip(&copied) {
            let Some(b) = guest.block(old) else {
                continue;
            };
            for (at, id) in b.phis().iter().enumerate() {
                let Some(phi) = guest.phi(id) else {
                    continue;
                };
                // Edges from unreachable guest blocks were not copied.
                let inputs = phi
                    .inputs()
                    .filter_map(|(incoming, node)| {
                        let incoming = blocks.get(incoming)?.clone();
                        Some((incoming, node.map(|n| subst.resolve(n))))
                    })
                    .collect();
                self.apply(Edit::InsertPhi {
                    block: new.clone(),
                    index: at,
                    id: renamed(id)?,
                    class: phi.class(),
                    inputs,
                })?;
            }
        }

        for (old, new) in order.iter().zip(&copied) {
            let Some(b) = guest.block(old) else {
                continue;
            };
            let mut stmts = Vec::new();
            for id in b.stmts() {
                let Some(instr) = guest.stmt(id) else {
                    continue;
                };
                if param_index(guest, id).is_some() {
                    continue;
                }
                let mut stmt = instr.payload().clone();
                subst.rewrite(&mut stmt);
                stmts.push((renamed(id)?, stmt));
            }
            if !stmts.is_empty() {
                self.apply(Edit::InsertStmts {
                    block: new.clone(),
                    index: 0,
                    stmts,
                })?;
            }
        }

        if let Some(entry) = blocks.get(guest.entry()) {
            self.replace_jump(block, Jump::Goto(entry.clone()))?;
        }

        self.refresh_blocks(&copied)?;
        let value = match returns.len() {
            0 | 1 => returns.pop().map(|(_, value)| value),
            _ => {
                let mut class: Option<Ty> = None;
                for (_, value) in &returns {
                    let ty = self.ty_or_value(value);
                    class = Some(match class {
                        Some(class) => Ty::common_input_superclass(class, ty)?,
                        None => ty,
                    });
                }
                let class = class.unwrap_or(Ty::Value);
                let phi = self.add_phi_with(&continuation, "ret", class, returns)?;
                Some(NodeId::from(phi))
            }
        };

        debug!(blocks = copied.len(), insts = ids.len(), "inlined");
        Ok(Inlined {
            continuation,
            value,
        })
    }
}

fn check_guest(guest: &Cfg, args: &[NodeId]) -> Result<()> {
    let mut expected = 0;
    for block in guest.blocks() {
        if let Some(Jump::NonLocalReturn { .. }) = guest.jump(block.id()).map(|j| j.payload()) {
            return Err(Error::NonLocalReturn(block.id().clone()));
        }
        for id in block.stmts() {
            if let Some(index) = param_index(guest, id) {
                expected = expected.max(index + 1);
            }
        }
    }
    if expected > args.len() {
        return Err(Error::InlineArity {
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn param_index(guest: &Cfg, id: &InstId) -> Option<usize> {
    match guest.stmt(id)?.payload() {
        Stmt::Param { index, .. } => Some(*index as usize),
        _ => None,
    }
}

/// Reachable guest blocks in reverse post-order, so that definitions are
/// copied before most of their uses. Unreachable blocks are left behind.
fn copy_order(guest: &Cfg) -> Vec<BlockId> {
    guest.dom_tree().rpo().to_vec()
}

fn guest_insts<'a>(guest: &'a Cfg, order: &'a [BlockId]) -> impl Iterator<Item = &'a InstId> {
    order
        .iter()
        .filter_map(|b| guest.block(b))
        .flat_map(|b| b.insts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::inst::{BinaryOp, CmpOp};
    use cfir_names::{LocalId, Name};

    /// `fn(a, b) = a + b`
    fn adder() -> Cfg {
        let mut g = Cfg::with_entry("start");
        let entry = g.entry().clone();
        let a = g.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        let b = g.push_stmt(&entry, Stmt::param(1, Ty::Int)).unwrap();
        let sum = g
            .push_stmt(&entry, Stmt::binary(BinaryOp::Add, a, b))
            .unwrap();
        g.add_jump(&entry, Jump::ret(sum)).unwrap();
        g
    }

    /// `fn(a) = if a < 0 { 0 } else { a }`
    fn clamp() -> Cfg {
        let mut g = Cfg::new();
        let entry = g.entry().clone();
        let neg = g.add_bb("neg").unwrap();
        let pos = g.add_bb("pos").unwrap();
        let a = g.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        let c = g
            .push_stmt(&entry, Stmt::cmp(CmpOp::Lt, a.clone(), NodeId::int(0)))
            .unwrap();
        g.add_jump(&entry, Jump::branch(c, neg.clone(), pos.clone()))
            .unwrap();
        g.add_jump(&neg, Jump::ret(NodeId::int(0))).unwrap();
        g.add_jump(&pos, Jump::ret(a)).unwrap();
        g
    }

    fn host() -> (Cfg, BlockId, InstId, InstId) {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let x = cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        let y = cfg
            .push_stmt(&entry, Stmt::binary(BinaryOp::Mul, x.clone(), NodeId::int(2)))
            .unwrap();
        cfg.add_jump(&entry, Jump::ret(y.clone())).unwrap();
        (cfg, entry, x, y)
    }

    #[test]
    fn test_inline_straight_line() {
        let (mut cfg, entry, x, y) = host();
        let guest = adder();
        let inlined = cfg
            .inline(&entry, 1, &guest, &[x.clone().into(), NodeId::int(1)])
            .unwrap();

        let start = BlockId::from("start");
        assert_eq!(cfg.successors(&entry), vec![start.clone()]);
        assert_eq!(cfg.successors(&start), vec![inlined.continuation.clone()]);
        assert_eq!(cfg.block(&inlined.continuation).unwrap().stmts(), &[y]);

        let value = inlined.value.unwrap();
        let sum = value.origin().unwrap();
        assert_eq!(cfg.locate(sum).unwrap().0, &start);
        assert_eq!(cfg.stmt(sum).unwrap().payload().to_string(), format!("add {x}, 1"));
        assert_eq!(cfg.ty_of(&value), Some(Ty::Int));
        assert!(cfg.verify().is_ok(), "{}", cfg);
    }

    #[test]
    fn test_inline_several_returns_joins_with_a_phi() {
        let (mut cfg, entry, x, _) = host();
        let guest = clamp();
        let inlined = cfg.inline(&entry, 1, &guest, &[x.into()]).unwrap();

        let value = inlined.value.unwrap();
        let phi = cfg.phi(value.origin().unwrap()).unwrap();
        assert_eq!(phi.class(), Ty::Int);
        assert_eq!(phi.len(), 2);
        assert_eq!(cfg.predecessors(&inlined.continuation).len(), 2);
        // The guest entry is renamed since the host already has one.
        let copy = BlockId::new(LocalId::new(Name::new("entry"), 2));
        assert!(cfg.has_block(&copy));
        assert_eq!(cfg.successors(&entry), vec![copy]);
        assert_eq!(cfg.len(), 5);
    }

    #[test]
    fn test_inline_checks_the_guest_first() {
        let (mut cfg, entry, _, _) = host();
        let before = cfg.to_string();
        assert_eq!(
            cfg.inline(&entry, 1, &adder(), &[NodeId::int(1)]),
            Err(Error::InlineArity {
                expected: 2,
                found: 1,
            })
        );

        let mut nlr = Cfg::new();
        let genv = NodeId::global_env();
        let nlr_entry = nlr.entry().clone();
        nlr.add_jump(
            &nlr_entry,
            Jump::NonLocalReturn {
                value: NodeId::nil(),
                env: genv,
            },
        )
        .unwrap();
        assert_eq!(
            cfg.inline(&entry, 1, &nlr, &[]),
            Err(Error::NonLocalReturn(nlr_entry))
        );
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_inline_can_be_undone() {
        let (mut cfg, entry, x, _) = host();
        let before = cfg.to_string();
        let (inlined, log) = cfg.record(|cfg| cfg.inline(&entry, 1, &clamp(), &[x.into()]));
        inlined.unwrap();
        log.undo(&mut cfg).unwrap();
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_inline_ignores_unreachable_returns() {
        let (mut cfg, entry, x, _) = host();
        let mut guest = adder();
        let dead = guest.add_bb("dead").unwrap();
        guest.add_jump(&dead, Jump::ret(NodeId::int(7))).unwrap();

        let inlined = cfg
            .inline(&entry, 1, &guest, &[x.clone().into(), NodeId::int(1)])
            .unwrap();
        let value = inlined.value.unwrap();
        assert!(cfg.stmt(value.origin().unwrap()).is_some());
        assert!(cfg.block(&inlined.continuation).unwrap().phis().is_empty());
        assert_eq!(cfg.predecessors(&inlined.continuation).len(), 1);
        assert!(!cfg.has_block(&BlockId::from("dead")));
        assert!(cfg.verify().is_ok(), "{}", cfg);
    }
}
