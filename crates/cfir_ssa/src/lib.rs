//! A mutable control-flow graph in SSA form.
//!
//! A [`Cfg`] owns basic blocks, and every block owns its phis, its
//! statements and the jump that ends it. All mutation goes through
//! [`Edit`]s, which are applied atomically, reported to [`Observer`]s and
//! can be inverted, so any sequence of changes can be logged, undone and
//! replayed.
//!
//! ```
//! use cfir_ssa::{ir::inst::{Jump, Stmt, BinaryOp}, Cfg, NodeId};
//!
//! let mut cfg = Cfg::new();
//! let entry = cfg.entry().clone();
//! let sum = cfg.push_stmt(&entry, Stmt::binary(BinaryOp::Add, NodeId::int(1), NodeId::int(2)))?;
//! cfg.add_jump(&entry, Jump::ret(sum))?;
//! cfg.verify()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod block;
pub mod cfg;
pub mod cleanup;
pub mod dom;
pub mod edit;
pub mod effects;
pub mod error;
pub mod infra;
pub mod inline;
pub mod ir;
pub mod observe;
pub mod traverse;
pub mod verify;

pub use cfir_names as names;

pub use block::Block;
pub use cfg::{Cfg, CfgId, NodeRef};
pub use cleanup::{CleanupOptions, CleanupStats};
pub use dom::DomTree;
pub use edit::{BlockImage, Edit};
pub use error::{Error, Result};
pub use infra::subst::{BatchSubst, CascadingUpdate};
pub use inline::Inlined;
pub use ir::{ty::Ty, BlockId, Constant, GlobalId, InstId, NodeId};
pub use observe::{EditLog, Observer, ObserverId};
pub use traverse::{Order, Traversal};
pub use verify::{Violation, VerifyError};

pub(crate) type FxIndexMap<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
pub(crate) type FxIndexSet<K> = indexmap::IndexSet<K, rustc_hash::FxBuildHasher>;
