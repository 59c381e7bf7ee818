pub mod cfg;
pub mod dominance;
pub mod simplify;
