use slab::Slab;

/// A typed handle into a `Slab` arena.
///
/// Handles are plain indices; the handle `usize::MAX` is reserved as the
/// null handle. Dereferencing a freed or null handle is a programming error
/// and panics.
pub trait SlabRef: Copy + Eq + std::fmt::Debug {
    type Item: Sized;

    fn from_handle(handle: usize) -> Self;
    fn get_handle(&self) -> usize;

    fn new_null() -> Self {
        Self::from_handle(usize::MAX)
    }
    fn is_null(&self) -> bool {
        self.get_handle() == usize::MAX
    }
    fn is_nonnull(&self) -> bool {
        !self.is_null()
    }

    fn try_to_data<'a>(&self, slab: &'a Slab<Self::Item>) -> Option<&'a Self::Item> {
        slab.get(self.get_handle())
    }
    fn to_data<'a>(&self, slab: &'a Slab<Self::Item>) -> &'a Self::Item {
        self.try_to_data(slab)
            .expect("dereferenced a freed or null slab handle")
    }
    fn to_data_mut<'a>(&self, slab: &'a mut Slab<Self::Item>) -> &'a mut Self::Item {
        slab.get_mut(self.get_handle())
            .expect("dereferenced a freed or null slab handle")
    }

    fn is_alive(&self, slab: &Slab<Self::Item>) -> bool {
        self.is_nonnull() && slab.contains(self.get_handle())
    }
}

/// Implements `SlabRef` for a `struct Name(usize)` newtype.
#[macro_export]
macro_rules! impl_slabref {
    ($RefName:ident, $ItemName:ty) => {
        impl $crate::base::SlabRef for $RefName {
            type Item = $ItemName;

            fn from_handle(handle: usize) -> Self {
                Self(handle)
            }
            fn get_handle(&self) -> usize {
                self.0
            }
        }
    };
}
