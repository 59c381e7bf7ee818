//! Control-flow graph views of a function.

use std::collections::HashMap;

use crate::ir::{BlockRef, GlobalRef, IRAllocs};

/// Preorder DFS sequence over the blocks reachable from the entry.
///
/// Successor edges are visited in terminator operand order, so the sequence
/// (and everything derived from it) is deterministic for a given input.
pub struct CfgDfsSeq {
    /// Blocks in preorder; index is the DFS number.
    pub nodes: Vec<BlockRef>,
    /// DFS number of each node's DFS-tree parent; `NULL_PARENT` at the root.
    pub parent: Vec<usize>,
    dfn: HashMap<BlockRef, usize>,
}

impl CfgDfsSeq {
    pub const NULL_PARENT: usize = usize::MAX;

    pub fn compute(allocs: &IRAllocs, func: GlobalRef) -> Self {
        let entry = func
            .expect_func(allocs)
            .entry(allocs)
            .expect("cannot build a CFG for a function without blocks");
        let mut seq = Self { nodes: Vec::new(), parent: Vec::new(), dfn: HashMap::new() };
        let mut stack = vec![(entry, Self::NULL_PARENT)];
        while let Some((block, parent)) = stack.pop() {
            if seq.dfn.contains_key(&block) {
                continue;
            }
            let dfn = seq.nodes.len();
            seq.nodes.push(block);
            seq.parent.push(parent);
            seq.dfn.insert(block, dfn);
            let succs = block.successors(allocs);
            for &succ in succs.iter().rev() {
                if !seq.dfn.contains_key(&succ) {
                    stack.push((succ, dfn));
                }
            }
        }
        seq
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn try_block_dfn(&self, block: BlockRef) -> Option<usize> {
        self.dfn.get(&block).copied()
    }
    pub fn block_of(&self, dfn: usize) -> BlockRef {
        self.nodes[dfn]
    }
    pub fn is_reachable(&self, block: BlockRef) -> bool {
        self.dfn.contains_key(&block)
    }

    /// For every node, the DFS numbers of its CFG predecessors. Edges from
    /// unreachable blocks do not appear.
    pub fn preds_by_dfn(&self, allocs: &IRAllocs) -> Vec<Vec<usize>> {
        let mut preds = vec![Vec::new(); self.len()];
        for (dfn, &block) in self.nodes.iter().enumerate() {
            for succ in block.successors(allocs) {
                if let Some(succ_dfn) = self.try_block_dfn(succ) {
                    preds[succ_dfn].push(dfn);
                }
            }
        }
        preds
    }
}

/// Deduplicated predecessor blocks of every reachable block.
pub fn preds_map(allocs: &IRAllocs, func: GlobalRef) -> HashMap<BlockRef, Vec<BlockRef>> {
    let mut preds: HashMap<BlockRef, Vec<BlockRef>> = HashMap::new();
    for block in func.blocks_vec(allocs) {
        preds.entry(block).or_default();
    }
    for block in func.blocks_vec(allocs) {
        for succ in block.successors(allocs) {
            let entry = preds.entry(succ).or_default();
            if !entry.contains(&block) {
                entry.push(block);
            }
        }
    }
    preds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cases::parse_or_panic;

    #[test]
    fn dfs_orders_diamond() {
        let module = parse_or_panic(
            r#"
            define i32 @f(i1 %c) {
            entry:
              br i1 %c, label %then, label %else
            then:
              br label %merge
            else:
              br label %merge
            merge:
              ret i32 0
            }
            "#,
        );
        let func = module.get_global_by_name("f").unwrap();
        let dfs = CfgDfsSeq::compute(&module.allocs, func);
        assert_eq!(dfs.len(), 4);
        assert_eq!(dfs.try_block_dfn(dfs.nodes[0]), Some(0));
        let preds = dfs.preds_by_dfn(&module.allocs);
        assert!(preds[0].is_empty());
        // merge has two predecessors
        let merge_dfn = dfs
            .nodes
            .iter()
            .position(|b| {
                use crate::base::SlabRef;
                b.to_data(&module.allocs.blocks).name.as_str() == "merge"
            })
            .unwrap();
        assert_eq!(preds[merge_dfn].len(), 2);
    }

    #[test]
    fn unreachable_blocks_are_skipped() {
        let module = parse_or_panic(
            r#"
            define void @f() {
            entry:
              ret void
            island:
              ret void
            }
            "#,
        );
        let func = module.get_global_by_name("f").unwrap();
        let dfs = CfgDfsSeq::compute(&module.allocs, func);
        assert_eq!(dfs.len(), 1);
    }
}
