pub mod slablist;
pub mod slabref;

pub use self::{
    slablist::{SlabList, SlabListError, SlabListNode, SlabListNodeHead, SlabListNodeRef},
    slabref::SlabRef,
};
