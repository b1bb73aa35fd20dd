//! Helpers that batch many small edits into few large ones.

pub mod inset;
pub mod subst;
