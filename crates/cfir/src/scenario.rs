//! Canned graphs for the driver.

use cfir_ssa::{
    ir::{
        builder::Builder,
        inst::{BinaryOp, CmpOp, Jump, Stmt, UnaryOp},
    },
    BlockId, Cfg, Error, Inlined, NodeId, Result, Ty,
};

use crate::cli::Scenario;

pub fn build(scenario: Scenario) -> Result<Cfg> {
    match scenario {
        Scenario::Straight => straight(),
        Scenario::Diamond | Scenario::Inline => diamond(),
        Scenario::Loop => counting_loop(),
    }
}

/// The transformation a scenario runs before cleanup, if any.
pub fn transform(scenario: Scenario, cfg: &mut Cfg) -> Result<Option<Inlined>> {
    match scenario {
        Scenario::Inline => inline_adder(cfg).map(Some),
        _ => Ok(None),
    }
}

/// ```text
/// entry: a = param 0; b = param 1; s = a + b; goto next
/// next:  m = s * 2; goto tail
/// tail:  ret m
/// ```
fn straight() -> Result<Cfg> {
    let mut cfg = Cfg::new();
    let mut b = Builder::new(&mut cfg);
    let next = b.block("next")?;
    let tail = b.block("tail")?;

    let x = b.push_named("a", Stmt::param(0, Ty::Int))?;
    let y = b.push_named("b", Stmt::param(1, Ty::Int))?;
    let s = b.push_named("s", Stmt::binary(BinaryOp::Add, x, y))?;
    b.goto(&next)?;

    b.switch_to(&next);
    let m = b.push_named("m", Stmt::binary(BinaryOp::Mul, s, NodeId::int(2)))?;
    b.goto(&tail)?;

    b.switch_to(&tail);
    b.ret(m)?;
    Ok(cfg)
}

/// ```text
/// entry: x = param 0; c = x < 0; br c, neg, pos
/// neg:   n = -x; goto join
/// pos:   goto join
/// join:  p = phi [neg: n, pos: x]; d = p * 2; ret d
/// ```
fn diamond() -> Result<Cfg> {
    let mut cfg = Cfg::new();
    let mut b = Builder::new(&mut cfg);
    let neg = b.block("neg")?;
    let pos = b.block("pos")?;
    let join = b.block("join")?;

    let x = b.push_named("x", Stmt::param(0, Ty::Int))?;
    let c = b.push_named("c", Stmt::cmp(CmpOp::Lt, x.clone(), NodeId::int(0)))?;
    b.jump(Jump::branch(c, neg.clone(), pos.clone()))?;

    b.switch_to(&neg);
    let n = b.push_named("n", Stmt::unary(UnaryOp::Neg, x.clone()))?;
    b.goto(&join)?;

    b.switch_to(&pos);
    b.goto(&join)?;

    b.switch_to(&join);
    let p = b.phi(Ty::Int, vec![(neg, n), (pos, x)])?;
    let d = b.push_named("d", Stmt::binary(BinaryOp::Mul, p, NodeId::int(2)))?;
    b.ret(d)?;
    Ok(cfg)
}

/// ```text
/// entry: n = param 0; goto head
/// head:  i = phi [entry: n, body: j]; c = i > 0; br c, body, exit
/// body:  j = i - 1; goto head
/// exit:  ret i
/// ```
fn counting_loop() -> Result<Cfg> {
    let mut cfg = Cfg::new();
    let mut b = Builder::new(&mut cfg);
    let entry = b.current().clone();
    let head = b.block("head")?;
    let body = b.block("body")?;
    let exit = b.block("exit")?;

    let n = b.push_named("n", Stmt::param(0, Ty::Int))?;
    b.goto(&head)?;

    b.switch_to(&body);
    b.goto(&head)?;

    b.switch_to(&head);
    let i = b.phi(Ty::Int, vec![(entry, n)])?;
    let c = b.push_named("c", Stmt::cmp(CmpOp::Gt, &i, NodeId::int(0)))?;
    b.jump(Jump::branch(c, body.clone(), exit.clone()))?;

    b.switch_to(&body);
    let j = b.cfg.insert_named_stmt(
        &body,
        0,
        "j",
        Stmt::binary(BinaryOp::Sub, &i, NodeId::int(1)),
    )?;
    b.cfg.set_phi_input(&i, &body, j.into())?;

    b.switch_to(&exit);
    b.ret(&i)?;
    Ok(cfg)
}

/// `fn(a, b) = a + b`
fn adder() -> Result<Cfg> {
    let mut g = Cfg::with_entry("add");
    let mut b = Builder::new(&mut g);
    let x = b.push(Stmt::param(0, Ty::Int))?;
    let y = b.push(Stmt::param(1, Ty::Int))?;
    let sum = b.push(Stmt::binary(BinaryOp::Add, x, y))?;
    b.ret(sum)?;
    Ok(g)
}

/// Inlines `adder(d, 1)` after `d` in the diamond's join block and returns
/// its result instead of `d`.
fn inline_adder(cfg: &mut Cfg) -> Result<Inlined> {
    let join = BlockId::from("join");
    let jump = cfg.jump(&join).ok_or_else(|| Error::NoJump(join.clone()))?;
    let Jump::Return(d) = jump.payload().clone() else {
        return Err(Error::NoJump(join));
    };
    let index = cfg
        .block(&join)
        .map(|b| b.stmts().len())
        .ok_or_else(|| Error::NoSuchBlock(join.clone()))?;

    let inlined = cfg.inline(&join, index, &adder()?, &[d.clone(), NodeId::int(1)])?;
    if let Some(value) = &inlined.value {
        let ret = cfg
            .block(&inlined.continuation)
            .and_then(|b| b.jump())
            .cloned()
            .ok_or_else(|| Error::NoJump(inlined.continuation.clone()))?;
        cfg.replace_in_args(&ret, &d, value.clone())?;
    }
    Ok(inlined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_verifies() {
        for scenario in [
            Scenario::Straight,
            Scenario::Diamond,
            Scenario::Loop,
            Scenario::Inline,
        ] {
            let mut cfg = build(scenario).unwrap();
            cfg.verify().unwrap();
            transform(scenario, &mut cfg).unwrap();
            cfg.verify().unwrap();
            cfg.cleanup().unwrap();
            cfg.verify().unwrap();
        }
    }

    #[test]
    fn test_cleanup_folds_the_straight_line() {
        let mut cfg = build(Scenario::Straight).unwrap();
        let stats = cfg.cleanup().unwrap();
        assert_eq!(stats.merged_blocks, 2);
        assert_eq!(cfg.len(), 1);
    }

    #[test]
    fn test_loop_is_left_alone() {
        let mut cfg = build(Scenario::Loop).unwrap();
        let before = cfg.to_string();
        assert!(cfg.cleanup().unwrap().is_empty());
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_inline_uses_the_returned_value() {
        let mut cfg = build(Scenario::Inline).unwrap();
        let inlined = transform(Scenario::Inline, &mut cfg).unwrap().unwrap();
        let value = inlined.value.unwrap();
        let jump = cfg.jump(&inlined.continuation).unwrap();
        assert_eq!(jump.payload(), &Jump::Return(value));
    }
}
