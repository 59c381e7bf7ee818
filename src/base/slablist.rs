use std::cell::Cell;

use slab::Slab;

use super::slabref::SlabRef;

/// Link head of an intrusive doubly-linked list node living in a slab.
///
/// List layout:
///
/// ```text
/// None <- [Head Guide] <-> [Node] <-> ... <-> [Node] <-> [Tail Guide] -> None
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabListNodeHead {
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

impl SlabListNodeHead {
    pub fn new() -> Self {
        Self { prev: None, next: None }
    }
    pub fn with_prev(self, prev: Option<usize>) -> Self {
        Self { prev, next: self.next }
    }
    pub fn with_next(self, next: Option<usize>) -> Self {
        Self { prev: self.prev, next }
    }
}

impl Default for SlabListNodeHead {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum SlabListError {
    InvalidRef,
    NodeIsHeadGuide,
    NodeIsTailGuide,
}

/// An item that can be linked into a `SlabList`. The link head is stored
/// behind a `Cell` so list surgery only needs a shared borrow of the arena.
pub trait SlabListNode {
    /// Constructor: create an empty guide node.
    fn new_guide() -> Self;

    fn load_node_head(&self) -> SlabListNodeHead;
    fn store_node_head(&self, node_head: SlabListNodeHead);

    fn get_next(&self) -> Option<usize> {
        self.load_node_head().next
    }
    fn get_prev(&self) -> Option<usize> {
        self.load_node_head().prev
    }
    fn set_next(&self, next: Option<usize>) {
        self.store_node_head(self.load_node_head().with_next(next));
    }
    fn set_prev(&self, prev: Option<usize>) {
        self.store_node_head(self.load_node_head().with_prev(prev));
    }
}

pub trait SlabListNodeRef: SlabRef<Item: SlabListNode> {
    fn load_node_head(&self, alloc: &Slab<Self::Item>) -> SlabListNodeHead {
        self.to_data(alloc).load_node_head()
    }
    fn store_node_head(&self, alloc: &Slab<Self::Item>, node_head: SlabListNodeHead) {
        self.to_data(alloc).store_node_head(node_head)
    }

    fn get_next_ref(&self, alloc: &Slab<Self::Item>) -> Option<Self> {
        self.load_node_head(alloc).next.map(Self::from_handle)
    }
    fn get_prev_ref(&self, alloc: &Slab<Self::Item>) -> Option<Self> {
        self.load_node_head(alloc).prev.map(Self::from_handle)
    }
}

/// Intrusive doubly-linked list over slab-allocated nodes, with head and
/// tail guide nodes. The size lives in a `Cell` so every list operation only
/// needs `&self` plus a shared borrow of the arena; allocating or freeing
/// nodes is the only thing that needs `&mut Slab`.
#[derive(Debug)]
pub struct SlabList<T: SlabListNodeRef> {
    pub(crate) head: T,
    pub(crate) tail: T,
    size: Cell<usize>,
}

impl<T: SlabListNodeRef> SlabList<T> {
    /// Creates a list by allocating its two guide nodes in `slab`.
    pub fn from_slab(slab: &mut Slab<T::Item>) -> Self {
        let head = slab.insert(T::Item::new_guide());
        let tail = slab.insert(T::Item::new_guide());
        slab[head].set_next(Some(tail));
        slab[tail].set_prev(Some(head));
        Self {
            head: T::from_handle(head),
            tail: T::from_handle(tail),
            size: Cell::new(0),
        }
    }

    /// A list with null guides. Any operation on it panics; used for guide
    /// nodes of outer lists which never carry a body themselves.
    pub fn new_null() -> Self {
        Self { head: T::new_null(), tail: T::new_null(), size: Cell::new(0) }
    }
    pub fn is_valid(&self) -> bool {
        self.head.is_nonnull()
    }

    pub fn len(&self) -> usize {
        self.size.get()
    }
    pub fn is_empty(&self) -> bool {
        self.size.get() == 0
    }

    pub fn head_guide(&self) -> T {
        self.head
    }
    pub fn tail_guide(&self) -> T {
        self.tail
    }

    /// First real node, if any.
    pub fn front(&self, alloc: &Slab<T::Item>) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        self.head.get_next_ref(alloc)
    }
    /// Last real node, if any.
    pub fn back(&self, alloc: &Slab<T::Item>) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        self.tail.get_prev_ref(alloc)
    }

    pub fn is_guide(&self, node: T) -> bool {
        node == self.head || node == self.tail
    }

    /// Next real node after `node`, or `None` when `node` is the last one.
    pub fn next_of(&self, alloc: &Slab<T::Item>, node: T) -> Option<T> {
        let next = node.get_next_ref(alloc)?;
        if next == self.tail { None } else { Some(next) }
    }

    /// Inserts `new_next` right after `node`.
    pub fn node_add_next(
        &self,
        alloc: &Slab<T::Item>,
        node: T,
        new_next: T,
    ) -> Result<(), SlabListError> {
        let node_data = node.try_to_data(alloc).ok_or(SlabListError::InvalidRef)?;
        let new_data = new_next.try_to_data(alloc).ok_or(SlabListError::InvalidRef)?;
        let old_next = node_data.get_next().ok_or(SlabListError::NodeIsTailGuide)?;
        new_data.store_node_head(SlabListNodeHead {
            prev: Some(node.get_handle()),
            next: Some(old_next),
        });
        node_data.set_next(Some(new_next.get_handle()));
        T::from_handle(old_next)
            .to_data(alloc)
            .set_prev(Some(new_next.get_handle()));
        self.size.set(self.size.get() + 1);
        Ok(())
    }

    /// Inserts `new_prev` right before `node`.
    pub fn node_add_prev(
        &self,
        alloc: &Slab<T::Item>,
        node: T,
        new_prev: T,
    ) -> Result<(), SlabListError> {
        let node_data = node.try_to_data(alloc).ok_or(SlabListError::InvalidRef)?;
        let new_data = new_prev.try_to_data(alloc).ok_or(SlabListError::InvalidRef)?;
        let old_prev = node_data.get_prev().ok_or(SlabListError::NodeIsHeadGuide)?;
        new_data.store_node_head(SlabListNodeHead {
            prev: Some(old_prev),
            next: Some(node.get_handle()),
        });
        node_data.set_prev(Some(new_prev.get_handle()));
        T::from_handle(old_prev)
            .to_data(alloc)
            .set_next(Some(new_prev.get_handle()));
        self.size.set(self.size.get() + 1);
        Ok(())
    }

    /// Unlinks `node` from the list. The node itself stays allocated.
    pub fn unplug_node(&self, alloc: &Slab<T::Item>, node: T) -> Result<(), SlabListError> {
        let node_data = node.try_to_data(alloc).ok_or(SlabListError::InvalidRef)?;
        let prev = node_data.get_prev().ok_or(SlabListError::NodeIsHeadGuide)?;
        let next = node_data.get_next().ok_or(SlabListError::NodeIsTailGuide)?;
        T::from_handle(prev).to_data(alloc).set_next(Some(next));
        T::from_handle(next).to_data(alloc).set_prev(Some(prev));
        node_data.store_node_head(SlabListNodeHead::new());
        self.size.set(self.size.get() - 1);
        Ok(())
    }

    pub fn push_back_ref(&self, alloc: &Slab<T::Item>, node: T) -> Result<(), SlabListError> {
        self.node_add_prev(alloc, self.tail, node)
    }
    pub fn push_front_ref(&self, alloc: &Slab<T::Item>, node: T) -> Result<(), SlabListError> {
        self.node_add_next(alloc, self.head, node)
    }
    pub fn push_back_value(&self, alloc: &mut Slab<T::Item>, value: T::Item) -> T {
        let node = T::from_handle(alloc.insert(value));
        self.push_back_ref(alloc, node)
            .expect("push_back_value: guide nodes must be valid");
        node
    }

    pub fn iter<'a>(&'a self, alloc: &'a Slab<T::Item>) -> SlabListIter<'a, T> {
        SlabListIter {
            current: self.head.get_next_ref(alloc).map(|n| n.get_handle()),
            slab: alloc,
        }
    }

    /// Collects the real nodes into a vector. Useful before mutating the
    /// list while walking it.
    pub fn collect_refs(&self, alloc: &Slab<T::Item>) -> Vec<T> {
        self.iter(alloc).collect()
    }
}

pub struct SlabListIter<'a, T: SlabListNodeRef> {
    current: Option<usize>,
    slab: &'a Slab<T::Item>,
}

impl<T: SlabListNodeRef> Iterator for SlabListIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        // the tail guide has no next; it terminates iteration without being yielded
        let next = self.slab[current].get_next()?;
        self.current = Some(next);
        Some(T::from_handle(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_slabref;
    use slab::Slab;

    #[derive(Debug)]
    struct TestNode {
        node_head: Cell<SlabListNodeHead>,
        number: usize,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TestNodeRef(usize);
    impl_slabref!(TestNodeRef, TestNode);
    impl SlabListNodeRef for TestNodeRef {}

    impl SlabListNode for TestNode {
        fn new_guide() -> Self {
            Self { node_head: Cell::new(SlabListNodeHead::new()), number: 0 }
        }
        fn load_node_head(&self) -> SlabListNodeHead {
            self.node_head.get()
        }
        fn store_node_head(&self, node_head: SlabListNodeHead) {
            self.node_head.set(node_head);
        }
    }

    impl TestNode {
        fn new(number: usize) -> Self {
            Self { node_head: Cell::new(SlabListNodeHead::new()), number }
        }
    }

    fn list_from_vec(slab: &mut Slab<TestNode>, items: Vec<usize>) -> SlabList<TestNodeRef> {
        let list = SlabList::from_slab(slab);
        for item in items {
            list.push_back_value(slab, TestNode::new(item));
        }
        list
    }

    #[test]
    fn push_iter_roundtrip() {
        let mut slab = Slab::new();
        let list = list_from_vec(&mut slab, vec![1, 2, 3, 4, 5]);
        assert_eq!(list.len(), 5);
        let collected: Vec<usize> = list.iter(&slab).map(|n| n.to_data(&slab).number).collect();
        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn unplug_keeps_neighbors_linked() {
        let mut slab = Slab::new();
        let list = list_from_vec(&mut slab, vec![1, 2, 3]);
        let middle = list
            .front(&slab)
            .and_then(|n| list.next_of(&slab, n))
            .unwrap();
        assert_eq!(middle.to_data(&slab).number, 2);
        list.unplug_node(&slab, middle).unwrap();
        let collected: Vec<usize> = list.iter(&slab).map(|n| n.to_data(&slab).number).collect();
        assert_eq!(collected, vec![1, 3]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn insert_before_and_after() {
        let mut slab = Slab::new();
        let list = list_from_vec(&mut slab, vec![10, 30]);
        let first = list.front(&slab).unwrap();
        let node = TestNodeRef::from_handle(slab.insert(TestNode::new(20)));
        list.node_add_next(&slab, first, node).unwrap();
        let collected: Vec<usize> = list.iter(&slab).map(|n| n.to_data(&slab).number).collect();
        assert_eq!(collected, vec![10, 20, 30]);
    }
}
