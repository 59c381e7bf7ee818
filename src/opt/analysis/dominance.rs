//! Dominator tree and dominance frontiers.
//!
//! Built with the semi-NCA algorithm over the CFG preorder: semidominators
//! via a path-compressed link-eval forest, then the NCA correction pass.
//! The tree is recomputed fresh per function visit; passes that only
//! delete instructions never invalidate it.

use std::collections::HashMap;

use crate::{
    ir::{BlockRef, GlobalRef, IRAllocs, InstRef, block_insts},
    opt::analysis::cfg::CfgDfsSeq,
};

/// Link-eval forest over DFS numbers for the semidominator computation.
///
/// Nodes are linked under their DFS-tree parent once their semidominator is
/// final; `eval` answers "which node on the path to my forest root has the
/// smallest semidominator so far", compressing the path as it goes. Roots
/// (nodes not yet linked) evaluate to themselves.
struct EvalForest {
    parent: Vec<usize>,
    best: Vec<usize>,
}

impl EvalForest {
    fn new(len: usize) -> Self {
        Self { parent: (0..len).collect(), best: (0..len).collect() }
    }

    fn link(&mut self, node: usize, parent: usize) {
        debug_assert!(parent < node, "DFS parents precede their children in preorder");
        self.parent[node] = parent;
    }

    fn eval(&mut self, node: usize, semidom: &[usize]) -> usize {
        if self.parent[node] != node {
            self.compress(node, semidom);
        }
        self.best[node]
    }

    fn compress(&mut self, node: usize, semidom: &[usize]) {
        let ancestor = self.parent[node];
        if self.parent[ancestor] == ancestor {
            return;
        }
        self.compress(ancestor, semidom);
        if semidom[self.best[ancestor]] < semidom[self.best[node]] {
            self.best[node] = self.best[ancestor];
        }
        self.parent[node] = self.parent[ancestor];
    }
}

pub struct DomTreeNode {
    pub block: BlockRef,
    /// DFS number of the immediate dominator; `NULL_IDOM` at the root.
    pub idom: usize,
    /// Immediately dominated nodes, in DFS-number order.
    pub children: Vec<usize>,
}

pub struct DominatorTree {
    pub dfs: CfgDfsSeq,
    pub nodes: Vec<DomTreeNode>,
    inst_orders: HashMap<InstRef, u32>,
}

pub const NULL_IDOM: usize = usize::MAX;

impl DominatorTree {
    pub fn compute(allocs: &IRAllocs, func: GlobalRef) -> Self {
        let dfs = CfgDfsSeq::compute(allocs, func);
        let n = dfs.len();
        assert!(n > 0, "dominator tree needs at least the entry block");
        let preds_by_dfn = dfs.preds_by_dfn(allocs);

        // semidominators, relaxed in reverse preorder
        let mut semidom: Vec<usize> = (0..n).collect();
        let mut idom: Vec<usize> = vec![NULL_IDOM; n];
        let mut forest = EvalForest::new(n);

        for u in (1..n).rev() {
            let mut candidate = usize::MAX;
            for &v in &preds_by_dfn[u] {
                // a pred numbered before u contributes itself; one numbered
                // after contributes the best semidominator on its path
                let m = if v < u {
                    v
                } else {
                    semidom[forest.eval(v, &semidom)]
                };
                if m < candidate {
                    candidate = m;
                }
            }
            if candidate == usize::MAX {
                candidate = dfs.parent[u];
            }
            semidom[u] = candidate;
            let parent = dfs.parent[u];
            if parent != CfgDfsSeq::NULL_PARENT {
                forest.link(u, parent);
            }
        }

        // NCA correction: walk the DFS-tree parent chain up to the first
        // node whose semidominator is not deeper than ours
        for w in 1..n {
            let w_sdom = semidom[w];
            let mut id = dfs.parent[w];
            while id != 0 && semidom[id] > w_sdom {
                id = idom[id];
            }
            idom[w] = id;
        }
        idom[0] = NULL_IDOM;

        let mut nodes: Vec<DomTreeNode> = (0..n)
            .map(|dfn| DomTreeNode { block: dfs.block_of(dfn), idom: idom[dfn], children: Vec::new() })
            .collect();
        // ascending w keeps every child list in DFS-number order
        for w in 1..n {
            let id = idom[w];
            nodes[id].children.push(w);
        }

        let inst_orders = Self::build_inst_orders(allocs, func);
        Self { dfs, nodes, inst_orders }
    }

    fn build_inst_orders(allocs: &IRAllocs, func: GlobalRef) -> HashMap<InstRef, u32> {
        let mut orders = HashMap::new();
        for block in func.blocks_vec(allocs) {
            for (count, (inst, _)) in block_insts(block, allocs).enumerate() {
                orders.insert(inst, count as u32);
            }
        }
        orders
    }

    pub fn node_of(&self, block: BlockRef) -> Option<usize> {
        self.dfs.try_block_dfn(block)
    }
    pub fn children(&self, dfn: usize) -> &[usize] {
        &self.nodes[dfn].children
    }
    pub fn block_of(&self, dfn: usize) -> BlockRef {
        self.nodes[dfn].block
    }

    /// Whether `a` dominates `b`. Blocks outside the DFS (unreachable) are
    /// dominated by nothing and dominate nothing.
    pub fn block_dominates(&self, a: BlockRef, b: BlockRef) -> bool {
        let Some(a_dfn) = self.dfs.try_block_dfn(a) else { return false };
        let Some(b_dfn) = self.dfs.try_block_dfn(b) else { return false };
        // a preorder dominator always has the smaller DFS number
        let mut current = b_dfn;
        while current != NULL_IDOM && current >= a_dfn {
            if current == a_dfn {
                return true;
            }
            current = self.nodes[current].idom;
        }
        false
    }

    /// Whether the definition `a` dominates the program point of `b`.
    pub fn inst_dominates(&self, allocs: &IRAllocs, a: InstRef, b: InstRef) -> bool {
        if a == b {
            return true;
        }
        let (Some(a_block), Some(b_block)) = (a.get_parent(allocs), b.get_parent(allocs)) else {
            return false;
        };
        if a_block != b_block {
            return self.block_dominates(a_block, b_block);
        }
        match (self.inst_orders.get(&a), self.inst_orders.get(&b)) {
            (Some(&a_order), Some(&b_order)) => a_order < b_order,
            _ => false,
        }
    }
}

/// Dominance frontiers, computed per DFS number with the predecessor-walk
/// algorithm: a join point lands in the frontier of every predecessor-chain
/// node below its immediate dominator.
pub struct DominanceFrontier {
    pub df: Vec<Vec<usize>>,
}

impl DominanceFrontier {
    pub fn compute(dt: &DominatorTree, allocs: &IRAllocs) -> Self {
        let n = dt.dfs.len();
        let preds = dt.dfs.preds_by_dfn(allocs);
        let mut df: Vec<Vec<usize>> = vec![Vec::new(); n];
        for b in 0..n {
            if preds[b].len() < 2 {
                continue;
            }
            for &p in &preds[b] {
                let mut runner = p;
                while runner != dt.nodes[b].idom && runner != NULL_IDOM {
                    if !df[runner].contains(&b) {
                        df[runner].push(b);
                    }
                    runner = dt.nodes[runner].idom;
                }
            }
        }
        Self { df }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::cases::parse_or_panic;

    fn block_by_name(
        module: &crate::ir::Module,
        func: GlobalRef,
        name: &str,
    ) -> BlockRef {
        use crate::base::SlabRef;
        func.blocks_vec(&module.allocs)
            .into_iter()
            .find(|b| b.to_data(&module.allocs.blocks).name.as_str() == name)
            .expect("no such block")
    }

    const DIAMOND: &str = r#"
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
    "#;

    #[test]
    fn diamond_dominance() {
        let module = parse_or_panic(DIAMOND);
        let func = module.get_global_by_name("f").unwrap();
        let dt = DominatorTree::compute(&module.allocs, func);

        let entry = block_by_name(&module, func, "entry");
        let then_bb = block_by_name(&module, func, "then");
        let else_bb = block_by_name(&module, func, "else");
        let merge = block_by_name(&module, func, "merge");

        assert!(dt.block_dominates(entry, merge));
        assert!(dt.block_dominates(entry, then_bb));
        assert!(dt.block_dominates(entry, entry));
        assert!(!dt.block_dominates(then_bb, merge));
        assert!(!dt.block_dominates(else_bb, merge));
        assert!(!dt.block_dominates(merge, entry));

        // entry immediately dominates all three other blocks
        let entry_dfn = dt.node_of(entry).unwrap();
        assert_eq!(dt.children(entry_dfn).len(), 3);
    }

    #[test]
    fn diamond_frontier() {
        let module = parse_or_panic(DIAMOND);
        let func = module.get_global_by_name("f").unwrap();
        let dt = DominatorTree::compute(&module.allocs, func);
        let df = DominanceFrontier::compute(&dt, &module.allocs);

        let then_bb = block_by_name(&module, func, "then");
        let merge = block_by_name(&module, func, "merge");
        let then_dfn = dt.node_of(then_bb).unwrap();
        let merge_dfn = dt.node_of(merge).unwrap();
        assert_eq!(df.df[then_dfn], vec![merge_dfn]);
        let entry_dfn = dt.node_of(block_by_name(&module, func, "entry")).unwrap();
        assert!(df.df[entry_dfn].is_empty());
    }

    #[test]
    fn loop_header_dominates_body() {
        let module = parse_or_panic(
            r#"
            define i32 @loop(i32 %n) {
            entry:
              br label %header
            header:
              %i = phi i32 [ 0, %entry ], [ %next, %body ]
              %c = icmp slt i32 %i, %n
              br i1 %c, label %body, label %exit
            body:
              %next = add i32 %i, 1
              br label %header
            exit:
              ret i32 %i
            }
            "#,
        );
        let func = module.get_global_by_name("loop").unwrap();
        let dt = DominatorTree::compute(&module.allocs, func);
        let header = block_by_name(&module, func, "header");
        let body = block_by_name(&module, func, "body");
        let exit = block_by_name(&module, func, "exit");
        assert!(dt.block_dominates(header, body));
        assert!(dt.block_dominates(header, exit));
        assert!(!dt.block_dominates(body, exit));
        // header's frontier contains header itself (the back edge joins there)
        let df = DominanceFrontier::compute(&dt, &module.allocs);
        let header_dfn = dt.node_of(header).unwrap();
        assert!(df.df[dt.node_of(body).unwrap()].contains(&header_dfn));
    }
}
