//! Analyses and transforms over the IR.

pub mod analysis;
pub mod transforms;

pub use self::{
    analysis::{
        dominance::{DominanceFrontier, DominatorTree},
        simplify::simplify_inst,
    },
    transforms::{cse::cse_pass, mem2reg::mem2reg_pass},
};
