use cfir_ssa::{
    ir::inst::{BinaryOp, Jump, Stmt},
    Cfg, NodeId, Ty, Violation,
};

fn violations(cfg: &Cfg) -> Vec<Violation> {
    match cfg.verify() {
        Ok(()) => Vec::new(),
        Err(err) => err.violations,
    }
}

#[test]
fn test_removed_definition_leaves_dangling_use() {
    let mut cfg = Cfg::new();
    let entry = cfg.entry().clone();
    let a = cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
    let b = cfg
        .push_stmt(&entry, Stmt::binary(BinaryOp::Add, &a, NodeId::int(1)))
        .unwrap();
    cfg.add_jump(&entry, Jump::ret(&b)).unwrap();
    assert!(cfg.verify().is_ok());

    cfg.remove(&a).unwrap();
    assert_eq!(
        violations(&cfg),
        vec![Violation::DanglingArg {
            inst: b,
            arg: a.into(),
        }]
    );
}

#[test]
fn test_phi_in_a_straight_line_block() {
    let mut cfg = Cfg::new();
    let entry = cfg.entry().clone();
    let next = cfg.add_bb("next").unwrap();
    cfg.add_jump(&entry, Jump::goto(next.clone())).unwrap();
    let phi = cfg
        .add_phi_with(&next, "phi", Ty::Int, vec![(entry.clone(), NodeId::int(1))])
        .unwrap();
    cfg.add_jump(&next, Jump::ret(&phi)).unwrap();

    assert_eq!(
        violations(&cfg),
        vec![Violation::PhiInSmallBlock { block: next, phi }]
    );
}

#[test]
fn test_every_violation_is_reported_at_once() {
    let mut cfg = Cfg::new();
    let entry = cfg.entry().clone();
    let other = cfg.add_bb("other").unwrap();
    let dead = cfg.add_bb("dead").unwrap();
    cfg.add_jump(&entry, Jump::goto(other.clone())).unwrap();
    cfg.push_stmt(&other, Stmt::Nop).unwrap();
    cfg.add_jump(&dead, Jump::ret(NodeId::nil())).unwrap();

    let err = cfg.verify().unwrap_err();
    assert_eq!(
        err.violations,
        vec![Violation::MissingJump(other), Violation::NotReachable(dead)]
    );
    let message = err.to_string();
    assert!(message.starts_with("graph failed verification with 2 violation(s):"));
    assert!(message.ends_with(&cfg.to_string()), "{message}");
}

#[test]
fn test_orphan_without_a_jump_is_only_unreachable() {
    let mut cfg = Cfg::new();
    let entry = cfg.entry().clone();
    cfg.add_jump(&entry, Jump::ret(NodeId::nil())).unwrap();
    let dead = cfg.add_bb("dead").unwrap();
    cfg.push_stmt(&dead, Stmt::Nop).unwrap();

    assert_eq!(violations(&cfg), vec![Violation::NotReachable(dead)]);
}
