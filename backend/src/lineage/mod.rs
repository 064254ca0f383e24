//! Sacrament lineage: kinds, rules and the registry that enforces them

mod kind;
mod service;

pub use kind::{LineageRule, SacramentKind};
pub use service::{LineageError, SacramentRegistry};
