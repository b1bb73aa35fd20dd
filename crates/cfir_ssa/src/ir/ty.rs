use crate::error::{Error, Result};

/// Node types, as seen by the core.
///
/// `Bool`, `Int` and `Closure` are all `Value`s. `Env` stands on its own and
/// `Void` is what instructions without an output produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ty {
    /// No value
    Void,
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Callable value
    Closure,
    /// Any value
    Value,
    /// Lexical environment
    Env,
}

impl Ty {
    /// The immediate supertype, if any.
    pub fn parent(self) -> Option<Ty> {
        match self {
            Ty::Bool | Ty::Int | Ty::Closure => Some(Ty::Value),
            Ty::Void | Ty::Value | Ty::Env => None,
        }
    }

    pub fn is_subtype_of(self, other: Ty) -> bool {
        let mut ty = Some(self);
        while let Some(t) = ty {
            if t == other {
                return true;
            }
            ty = t.parent();
        }
        false
    }

    /// Least common supertype.
    pub fn join(self, other: Ty) -> Option<Ty> {
        let mut ty = Some(self);
        while let Some(t) = ty {
            if other.is_subtype_of(t) {
                return Some(t);
            }
            ty = t.parent();
        }
        None
    }

    /// Returns `true` if phis of this class can exist.
    #[inline]
    pub fn has_phi(self) -> bool {
        self != Ty::Void
    }

    /// The most specific class a phi merging `a` and `b` inputs can have.
    pub fn common_input_superclass(a: Ty, b: Ty) -> Result<Ty> {
        a.join(b)
            .filter(|ty| ty.has_phi())
            .ok_or(Error::NoCommonPhiType(a, b))
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::Closure => write!(f, "closure"),
            Ty::Value => write!(f, "value"),
            Ty::Env => write!(f, "env"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtyping_is_reflexive_and_follows_parents() {
        assert!(Ty::Int.is_subtype_of(Ty::Int));
        assert!(Ty::Int.is_subtype_of(Ty::Value));
        assert!(!Ty::Value.is_subtype_of(Ty::Int));
        assert!(!Ty::Env.is_subtype_of(Ty::Value));
    }

    #[test]
    fn join_widens_to_value() {
        assert_eq!(Ty::Int.join(Ty::Int), Some(Ty::Int));
        assert_eq!(Ty::Int.join(Ty::Bool), Some(Ty::Value));
        assert_eq!(Ty::Value.join(Ty::Closure), Some(Ty::Value));
        assert_eq!(Ty::Int.join(Ty::Env), None);
    }

    #[test]
    fn common_input_superclass_needs_a_phi_class() {
        assert_eq!(Ty::common_input_superclass(Ty::Int, Ty::Bool), Ok(Ty::Value));
        assert_eq!(Ty::common_input_superclass(Ty::Env, Ty::Env), Ok(Ty::Env));
        assert_eq!(
            Ty::common_input_superclass(Ty::Void, Ty::Void),
            Err(Error::NoCommonPhiType(Ty::Void, Ty::Void))
        );
        assert_eq!(
            Ty::common_input_superclass(Ty::Int, Ty::Env),
            Err(Error::NoCommonPhiType(Ty::Int, Ty::Env))
        );
    }
}
