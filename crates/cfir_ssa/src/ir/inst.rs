use std::fmt;

use cfir_names::Name;

use crate::{
    effects::{AbstractHeap, Effects},
    ir::{ty::Ty, BlockId, Constant, NodeId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical NOT
    Not,
    /// Arithmetic negation
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Addition
    Add,
    // Subtraction
    Sub,
    // Multiplication
    Mul,
    // Division, traps on zero
    Div,
    // Remainder, traps on zero
    Rem,
    // Logical or bitwise AND
    And,
    // Logical or bitwise OR
    Or,
    // Logical or bitwise XOR
    Xor,
}

impl BinaryOp {
    pub fn can_trap(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }

    fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The opaque part of an instruction, as far as the graph is concerned.
///
/// Arguments are exposed as one flat, positional list. `arg_slots` gives the
/// type each position accepts and must always have the same length as the
/// argument list.
pub trait Payload: Clone + fmt::Display {
    /// Base name for identifiers of instructions carrying this payload.
    fn mnemonic(&self) -> &'static str;

    fn get_args<'a>(&'a self, args: &mut Vec<&'a NodeId>);

    fn get_args_mut<'a>(&'a mut self, args: &mut Vec<&'a mut NodeId>);

    fn arg_slots(&self) -> Vec<Ty>;

    /// Output types, given the current types of the arguments.
    fn output_tys(&self, ty_of: &dyn Fn(&NodeId) -> Ty) -> Vec<Ty>;

    fn effects(&self) -> Effects;

    /// Payload-local sanity checks.
    fn verify(&self) -> Result<(), String> {
        Ok(())
    }

    fn args(&self) -> Vec<&NodeId> {
        let mut args = Vec::new();
        self.get_args(&mut args);
        args
    }

    fn arity(&self, ty_of: &dyn Fn(&NodeId) -> Ty) -> usize {
        self.output_tys(ty_of).len()
    }
}

// ---------------------------------------------------------------------------
// Stmt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    Nop,

    /// The `index`th argument the graph was entered with.
    Param { index: u32, ty: Ty },

    Unary { op: UnaryOp, operand: NodeId },

    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },

    Cmp { op: CmpOp, lhs: NodeId, rhs: NodeId },

    /// Select between two values based on a boolean condition.
    Select {
        cond: NodeId,
        then_val: NodeId,
        else_val: NodeId,
    },

    /// Call a closure. `env` is the environment the callee may reach into.
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
        env: Option<NodeId>,
    },

    /// Create an environment, optionally nested in `parent`.
    MkEnv {
        parent: Option<NodeId>,
        bindings: Vec<(Name, NodeId)>,
    },

    /// Read a variable out of an environment.
    LdVar { env: NodeId, name: Name },

    /// Write a variable into an environment.
    StVar {
        env: NodeId,
        name: Name,
        value: NodeId,
    },

    /// Quotient and remainder; the remainder is the secondary output.
    DivMod { lhs: NodeId, rhs: NodeId },
}

impl Stmt {
    #[inline]
    pub fn param(index: u32, ty: Ty) -> Self {
        Stmt::Param { index, ty }
    }

    #[inline]
    pub fn unary(op: UnaryOp, operand: impl Into<NodeId>) -> Self {
        Stmt::Unary {
            op,
            operand: operand.into(),
        }
    }

    #[inline]
    pub fn binary(op: BinaryOp, lhs: impl Into<NodeId>, rhs: impl Into<NodeId>) -> Self {
        Stmt::Binary {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    #[inline]
    pub fn cmp(op: CmpOp, lhs: impl Into<NodeId>, rhs: impl Into<NodeId>) -> Self {
        Stmt::Cmp {
            op,
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    #[inline]
    pub fn select(
        cond: impl Into<NodeId>,
        then_val: impl Into<NodeId>,
        else_val: impl Into<NodeId>,
    ) -> Self {
        Stmt::Select {
            cond: cond.into(),
            then_val: then_val.into(),
            else_val: else_val.into(),
        }
    }

    #[inline]
    pub fn call(callee: impl Into<NodeId>, args: Vec<NodeId>, env: Option<NodeId>) -> Self {
        Stmt::Call {
            callee: callee.into(),
            args,
            env,
        }
    }

    #[inline]
    pub fn mk_env(parent: Option<NodeId>, bindings: Vec<(Name, NodeId)>) -> Self {
        Stmt::MkEnv { parent, bindings }
    }

    #[inline]
    pub fn ld_var(env: impl Into<NodeId>, name: impl Into<Name>) -> Self {
        Stmt::LdVar {
            env: env.into(),
            name: name.into(),
        }
    }

    #[inline]
    pub fn st_var(env: impl Into<NodeId>, name: impl Into<Name>, value: impl Into<NodeId>) -> Self {
        Stmt::StVar {
            env: env.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    #[inline]
    pub fn div_mod(lhs: impl Into<NodeId>, rhs: impl Into<NodeId>) -> Self {
        Stmt::DivMod {
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    /// The environment argument, for payloads that have one.
    pub fn env(&self) -> Option<&NodeId> {
        match self {
            Stmt::Call { env, .. } => env.as_ref(),
            Stmt::MkEnv { parent, .. } => parent.as_ref(),
            Stmt::LdVar { env, .. } | Stmt::StVar { env, .. } => Some(env),
            _ => None,
        }
    }
}

impl Payload for Stmt {
    fn mnemonic(&self) -> &'static str {
        match self {
            Stmt::Nop => "nop",
            Stmt::Param { .. } => "param",
            Stmt::Unary { op, .. } => match op {
                UnaryOp::Not => "not",
                UnaryOp::Neg => "neg",
            },
            Stmt::Binary { op, .. } => match op {
                BinaryOp::Add => "add",
                BinaryOp::Sub => "sub",
                BinaryOp::Mul => "mul",
                BinaryOp::Div => "div",
                BinaryOp::Rem => "rem",
                BinaryOp::And => "and",
                BinaryOp::Or => "or",
                BinaryOp::Xor => "xor",
            },
            Stmt::Cmp { .. } => "cmp",
            Stmt::Select { .. } => "select",
            Stmt::Call { .. } => "call",
            Stmt::MkEnv { .. } => "env",
            Stmt::LdVar { .. } => "ld",
            Stmt::StVar { .. } => "st",
            Stmt::DivMod { .. } => "divmod",
        }
    }

    fn get_args<'a>(&'a self, args: &mut Vec<&'a NodeId>) {
        match self {
            Stmt::Nop | Stmt::Param { .. } => {}
            Stmt::Unary { operand, .. } => args.push(operand),
            Stmt::Binary { lhs, rhs, .. }
            | Stmt::Cmp { lhs, rhs, .. }
            | Stmt::DivMod { lhs, rhs } => {
                args.push(lhs);
                args.push(rhs);
            }
            Stmt::Select {
                cond,
                then_val,
                else_val,
            } => {
                args.push(cond);
                args.push(then_val);
                args.push(else_val);
            }
            Stmt::Call {
                callee,
                args: call_args,
                env,
            } => {
                args.push(callee);
                args.extend(call_args.iter());
                args.extend(env.iter());
            }
            Stmt::MkEnv { parent, bindings } => {
                args.extend(parent.iter());
                args.extend(bindings.iter().map(|(_, value)| value));
            }
            Stmt::LdVar { env, .. } => args.push(env),
            Stmt::StVar { env, value, .. } => {
                args.push(env);
                args.push(value);
            }
        }
    }

    fn get_args_mut<'a>(&'a mut self, args: &mut Vec<&'a mut NodeId>) {
        match self {
            Stmt::Nop | Stmt::Param { .. } => {}
            Stmt::Unary { operand, .. } => args.push(operand),
            Stmt::Binary { lhs, rhs, .. }
            | Stmt::Cmp { lhs, rhs, .. }
            | Stmt::DivMod { lhs, rhs } => {
                args.push(lhs);
                args.push(rhs);
            }
            Stmt::Select {
                cond,
                then_val,
                else_val,
            } => {
                args.push(cond);
                args.push(then_val);
                args.push(else_val);
            }
            Stmt::Call {
                callee,
                args: call_args,
                env,
            } => {
                args.push(callee);
                args.extend(call_args.iter_mut());
                args.extend(env.iter_mut());
            }
            Stmt::MkEnv { parent, bindings } => {
                args.extend(parent.iter_mut());
                args.extend(bindings.iter_mut().map(|(_, value)| value));
            }
            Stmt::LdVar { env, .. } => args.push(env),
            Stmt::StVar { env, value, .. } => {
                args.push(env);
                args.push(value);
            }
        }
    }

    fn arg_slots(&self) -> Vec<Ty> {
        match self {
            Stmt::Nop | Stmt::Param { .. } => vec![],
            Stmt::Unary { .. } => vec![Ty::Value],
            Stmt::Binary { .. } | Stmt::Cmp { .. } | Stmt::DivMod { .. } => {
                vec![Ty::Value, Ty::Value]
            }
            Stmt::Select { .. } => vec![Ty::Bool, Ty::Value, Ty::Value],
            Stmt::Call { args, env, .. } => {
                let mut slots = vec![Ty::Value; 1 + args.len()];
                if env.is_some() {
                    slots.push(Ty::Env);
                }
                slots
            }
            Stmt::MkEnv { parent, bindings } => {
                let mut slots = Vec::with_capacity(bindings.len() + 1);
                if parent.is_some() {
                    slots.push(Ty::Env);
                }
                slots.extend(bindings.iter().map(|_| Ty::Value));
                slots
            }
            Stmt::LdVar { .. } => vec![Ty::Env],
            Stmt::StVar { .. } => vec![Ty::Env, Ty::Value],
        }
    }

    fn output_tys(&self, ty_of: &dyn Fn(&NodeId) -> Ty) -> Vec<Ty> {
        let both = |lhs: &NodeId, rhs: &NodeId, ty: Ty| ty_of(lhs) == ty && ty_of(rhs) == ty;
        match self {
            Stmt::Nop | Stmt::StVar { .. } => vec![],
            Stmt::Param { ty, .. } => vec![*ty],
            Stmt::Unary { op, operand } => match (op, ty_of(operand)) {
                (UnaryOp::Not, Ty::Bool) => vec![Ty::Bool],
                (UnaryOp::Neg, Ty::Int) => vec![Ty::Int],
                _ => vec![Ty::Value],
            },
            Stmt::Binary { op, lhs, rhs } => {
                if op.is_logical() && both(lhs, rhs, Ty::Bool) {
                    vec![Ty::Bool]
                } else if both(lhs, rhs, Ty::Int) {
                    vec![Ty::Int]
                } else {
                    vec![Ty::Value]
                }
            }
            Stmt::Cmp { .. } => vec![Ty::Bool],
            Stmt::Select {
                then_val, else_val, ..
            } => {
                let ty = ty_of(then_val).join(ty_of(else_val));
                vec![ty.unwrap_or(Ty::Value)]
            }
            Stmt::Call { .. } | Stmt::LdVar { .. } => vec![Ty::Value],
            Stmt::MkEnv { .. } => vec![Ty::Env],
            Stmt::DivMod { lhs, rhs } => match both(lhs, rhs, Ty::Int) {
                true => vec![Ty::Int, Ty::Int],
                false => vec![Ty::Value, Ty::Value],
            },
        }
    }

    fn effects(&self) -> Effects {
        match self {
            Stmt::Nop
            | Stmt::Param { .. }
            | Stmt::Unary { .. }
            | Stmt::Cmp { .. }
            | Stmt::Select { .. } => Effects::new(),
            Stmt::Binary { op, .. } if op.can_trap() => {
                Effects::new().writing(AbstractHeap::CONTROL)
            }
            Stmt::Binary { .. } => Effects::new(),
            Stmt::DivMod { .. } => Effects::new().writing(AbstractHeap::CONTROL),
            Stmt::Call { callee, env, .. } => {
                let builtin = matches!(
                    callee.as_global().map(|g| g.constant()),
                    Some(Constant::Builtin(_))
                );
                match builtin && env.is_none() {
                    // Runtime builtins never see an environment.
                    true => Effects::new()
                        .reading(AbstractHeap::CONTROL)
                        .writing(AbstractHeap::CONTROL)
                        .writing(AbstractHeap::ALLOC),
                    false => Effects::new()
                        .reading(AbstractHeap::WORLD)
                        .writing(AbstractHeap::WORLD),
                }
            }
            Stmt::MkEnv { .. } => Effects::new().writing(AbstractHeap::ALLOC),
            Stmt::LdVar { .. } => Effects::new().reading(AbstractHeap::ENV),
            Stmt::StVar { .. } => Effects::new().writing(AbstractHeap::ENV),
        }
    }

    fn verify(&self) -> Result<(), String> {
        match self {
            Stmt::Param { ty, .. } if !ty.has_phi() => Err(format!("parameter of type {ty}")),
            Stmt::MkEnv { bindings, .. } => {
                for (i, (name, _)) in bindings.iter().enumerate() {
                    if bindings[..i].iter().any(|(other, _)| other == name) {
                        return Err(format!("variable `{name}` bound twice"));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Jump
// ---------------------------------------------------------------------------

/// The instruction that ends a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Jump {
    Goto(BlockId),

    Branch {
        cond: NodeId,
        then_block: BlockId,
        else_block: BlockId,
    },

    Return(NodeId),

    /// Return from an enclosing function, identified by its environment.
    NonLocalReturn { value: NodeId, env: NodeId },

    Unreachable,
}

impl Jump {
    #[inline]
    pub fn goto(target: impl Into<BlockId>) -> Self {
        Jump::Goto(target.into())
    }

    #[inline]
    pub fn branch(
        cond: impl Into<NodeId>,
        then_block: impl Into<BlockId>,
        else_block: impl Into<BlockId>,
    ) -> Self {
        Jump::Branch {
            cond: cond.into(),
            then_block: then_block.into(),
            else_block: else_block.into(),
        }
    }

    #[inline]
    pub fn ret(value: impl Into<NodeId>) -> Self {
        Jump::Return(value.into())
    }

    /// Successor blocks, in order.
    pub fn targets(&self) -> Vec<&BlockId> {
        match self {
            Jump::Goto(target) => vec![target],
            Jump::Branch {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Jump::Return(_) | Jump::NonLocalReturn { .. } | Jump::Unreachable => vec![],
        }
    }

    pub fn targets_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Jump::Goto(target) => vec![target],
            Jump::Branch {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Jump::Return(_) | Jump::NonLocalReturn { .. } | Jump::Unreachable => vec![],
        }
    }

    /// Rewrites every target equal to `from` into `to`.
    pub fn retarget(&mut self, from: &BlockId, to: &BlockId) {
        for target in self.targets_mut() {
            if target == from {
                *target = to.clone();
            }
        }
    }

    #[inline]
    pub fn is_exit(&self) -> bool {
        self.targets().is_empty()
    }
}

impl Payload for Jump {
    fn mnemonic(&self) -> &'static str {
        match self {
            Jump::Goto(_) => "goto",
            Jump::Branch { .. } => "branch",
            Jump::Return(_) => "ret",
            Jump::NonLocalReturn { .. } => "nlret",
            Jump::Unreachable => "unreachable",
        }
    }

    fn get_args<'a>(&'a self, args: &mut Vec<&'a NodeId>) {
        match self {
            Jump::Goto(_) | Jump::Unreachable => {}
            Jump::Branch { cond, .. } => args.push(cond),
            Jump::Return(value) => args.push(value),
            Jump::NonLocalReturn { value, env } => {
                args.push(value);
                args.push(env);
            }
        }
    }

    fn get_args_mut<'a>(&'a mut self, args: &mut Vec<&'a mut NodeId>) {
        match self {
            Jump::Goto(_) | Jump::Unreachable => {}
            Jump::Branch { cond, .. } => args.push(cond),
            Jump::Return(value) => args.push(value),
            Jump::NonLocalReturn { value, env } => {
                args.push(value);
                args.push(env);
            }
        }
    }

    fn arg_slots(&self) -> Vec<Ty> {
        match self {
            Jump::Goto(_) | Jump::Unreachable => vec![],
            Jump::Branch { .. } => vec![Ty::Bool],
            Jump::Return(_) => vec![Ty::Value],
            Jump::NonLocalReturn { .. } => vec![Ty::Value, Ty::Env],
        }
    }

    fn output_tys(&self, _: &dyn Fn(&NodeId) -> Ty) -> Vec<Ty> {
        vec![]
    }

    fn effects(&self) -> Effects {
        match self {
            Jump::NonLocalReturn { .. } => Effects::new()
                .reading(AbstractHeap::ENV)
                .writing(AbstractHeap::CONTROL),
            _ => Effects::new().writing(AbstractHeap::CONTROL),
        }
    }

    fn verify(&self) -> Result<(), String> {
        match self {
            Jump::Branch {
                then_block,
                else_block,
                ..
            } if then_block == else_block => {
                Err(format!("both branch arms go to `{then_block}`"))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "not"),
            UnaryOp::Neg => write!(f, "neg"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "add"),
            BinaryOp::Sub => write!(f, "sub"),
            BinaryOp::Mul => write!(f, "mul"),
            BinaryOp::Div => write!(f, "div"),
            BinaryOp::Rem => write!(f, "rem"),
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Or => write!(f, "or"),
            BinaryOp::Xor => write!(f, "xor"),
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Eq => write!(f, "eq"),
            CmpOp::Ne => write!(f, "ne"),
            CmpOp::Lt => write!(f, "lt"),
            CmpOp::Le => write!(f, "le"),
            CmpOp::Gt => write!(f, "gt"),
            CmpOp::Ge => write!(f, "ge"),
        }
    }
}

pub(crate) struct CommaSep<'a, I: ?Sized>(pub &'a I);

impl<'a, I, T> fmt::Display for CommaSep<'a, I>
where
    I: ?Sized,
    for<'b> &'b I: IntoIterator<Item = &'b T>,
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut it = self.0.into_iter();
        if let Some(first) = it.next() {
            write!(f, "{}", first)?;
            for item in it {
                write!(f, ", {}", item)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Nop => write!(f, "nop"),
            Stmt::Param { index, ty } => write!(f, "param {} #{}", ty, index),
            Stmt::Unary { op, operand } => write!(f, "{} {}", op, operand),
            Stmt::Binary { op, lhs, rhs } => write!(f, "{} {}, {}", op, lhs, rhs),
            Stmt::Cmp { op, lhs, rhs } => write!(f, "cmp {} {}, {}", op, lhs, rhs),
            Stmt::Select {
                cond,
                then_val,
                else_val,
            } => write!(f, "select {}, {}, {}", cond, then_val, else_val),
            Stmt::Call { callee, args, env } => {
                write!(f, "call {}({})", callee, CommaSep(args))?;
                match env {
                    Some(env) => write!(f, " in {}", env),
                    None => Ok(()),
                }
            }
            Stmt::MkEnv { parent, bindings } => {
                write!(f, "env [")?;
                for (i, (name, value)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, value)?;
                }
                write!(f, "]")?;
                match parent {
                    Some(parent) => write!(f, " in {}", parent),
                    None => Ok(()),
                }
            }
            Stmt::LdVar { env, name } => write!(f, "ld {}.{}", env, name),
            Stmt::StVar { env, name, value } => write!(f, "st {}.{}, {}", env, name, value),
            Stmt::DivMod { lhs, rhs } => write!(f, "divmod {}, {}", lhs, rhs),
        }
    }
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Jump::Goto(target) => write!(f, "goto {}", target),
            Jump::Branch {
                cond,
                then_block,
                else_block,
            } => write!(f, "branch {}, {}, {}", cond, then_block, else_block),
            Jump::Return(value) => write!(f, "ret {}", value),
            Jump::NonLocalReturn { value, env } => write!(f, "nlret {} to {}", value, env),
            Jump::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::InstId;

    fn int_of(_: &NodeId) -> Ty {
        Ty::Int
    }

    #[test]
    fn test_args_and_slots_line_up() {
        let stmts = [
            Stmt::binary(BinaryOp::Add, NodeId::int(1), NodeId::int(2)),
            Stmt::select(NodeId::bool(true), NodeId::int(1), NodeId::nil()),
            Stmt::call(
                NodeId::builtin("print"),
                vec![NodeId::int(1), NodeId::int(2)],
                Some(NodeId::global_env()),
            ),
            Stmt::mk_env(
                Some(NodeId::global_env()),
                vec![(Name::new("x"), NodeId::int(1))],
            ),
            Stmt::st_var(NodeId::global_env(), "x", NodeId::int(3)),
            Stmt::param(0, Ty::Int),
        ];
        for stmt in &stmts {
            assert_eq!(stmt.args().len(), stmt.arg_slots().len(), "{stmt}");
        }
    }

    #[test]
    fn test_args_mut_rewrites_in_place() {
        let a = NodeId::from(InstId::from("a"));
        let mut stmt = Stmt::call(NodeId::builtin("f"), vec![a.clone(), a.clone()], None);
        let mut args = Vec::new();
        stmt.get_args_mut(&mut args);
        for arg in args {
            if *arg == a {
                *arg = NodeId::int(0);
            }
        }
        assert_eq!(stmt.to_string(), "call @f(0, 0)");
    }

    #[test]
    fn test_output_tys() {
        let add = Stmt::binary(BinaryOp::Add, NodeId::int(1), NodeId::int(2));
        assert_eq!(add.output_tys(&int_of), vec![Ty::Int]);
        assert_eq!(add.output_tys(&|_| Ty::Value), vec![Ty::Value]);

        let dm = Stmt::div_mod(NodeId::int(7), NodeId::int(2));
        assert_eq!(dm.arity(&int_of), 2);
        assert_eq!(Stmt::st_var(NodeId::global_env(), "x", NodeId::nil()).arity(&int_of), 0);
    }

    #[test]
    fn test_effects() {
        assert!(Stmt::cmp(CmpOp::Lt, NodeId::int(1), NodeId::int(2)).effects().is_pure());
        assert!(!Stmt::binary(BinaryOp::Div, NodeId::int(1), NodeId::int(0))
            .effects()
            .is_pure());

        let unknown = Stmt::call(NodeId::nil(), vec![], None).effects();
        let builtin = Stmt::call(NodeId::builtin("print"), vec![], None).effects();
        let load = Stmt::ld_var(NodeId::global_env(), "x").effects();
        assert!(unknown.interferes_with(&load));
        assert!(!builtin.interferes_with(&load));
    }

    #[test]
    fn test_jump_targets() {
        let mut jump = Jump::branch(NodeId::bool(true), "a", "b");
        assert_eq!(jump.targets(), vec![&BlockId::from("a"), &BlockId::from("b")]);
        jump.retarget(&BlockId::from("a"), &BlockId::from("c"));
        assert_eq!(jump.to_string(), "branch true, c, b");
        assert!(Jump::ret(NodeId::nil()).is_exit());
        assert!(!Jump::goto("x").is_exit());
    }

    #[test]
    fn test_verify() {
        assert!(Jump::branch(NodeId::bool(true), "a", "a").verify().is_err());
        let env = Stmt::mk_env(
            None,
            vec![(Name::new("x"), NodeId::int(1)), (Name::new("x"), NodeId::int(2))],
        );
        assert!(env.verify().is_err());
        assert!(Stmt::Nop.verify().is_ok());
    }
}
