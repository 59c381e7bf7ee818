//! Statistics registry.
//!
//! A name-keyed, registration-ordered counter table owned by the driver and
//! threaded through the passes. Counters are registered once and only ever
//! incremented; `write_csv` publishes them as `name,value` lines for the
//! `.stats` side file.

use std::collections::HashMap;
use std::io::{Result as IoResult, Write};

use crate::ir::{InstKind, Module, block_insts};

pub struct Counter {
    pub name: &'static str,
    pub desc: &'static str,
    pub value: u64,
}

#[derive(Default)]
pub struct Statistics {
    counters: Vec<Counter>,
    index: HashMap<&'static str, usize>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a counter. Registering the same name again is a no-op, so
    /// passes can register their counters on every run.
    pub fn register(&mut self, name: &'static str, desc: &'static str) {
        if self.index.contains_key(name) {
            return;
        }
        self.index.insert(name, self.counters.len());
        self.counters.push(Counter { name, desc, value: 0 });
    }

    pub fn bump(&mut self, name: &'static str) {
        self.add(name, 1);
    }
    pub fn add(&mut self, name: &'static str, amount: u64) {
        let &slot = self
            .index
            .get(name)
            .unwrap_or_else(|| panic!("counter `{name}` was never registered"));
        self.counters[slot].value += amount;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.index
            .get(name)
            .map(|&slot| self.counters[slot].value)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Counter> {
        self.counters.iter()
    }

    /// One `name,value` line per registered counter, in registration order.
    pub fn write_csv(&self, out: &mut dyn Write) -> IoResult<()> {
        for counter in &self.counters {
            writeln!(out, "{},{}", counter.name, counter.value)?;
        }
        Ok(())
    }

    /// Human-readable report for `--verbose`.
    pub fn print_report(&self, out: &mut dyn Write) -> IoResult<()> {
        for counter in &self.counters {
            writeln!(out, "{:8} {} - {}", counter.value, counter.name, counter.desc)?;
        }
        Ok(())
    }
}

/// Fills the module summary counters: non-empty functions, instructions,
/// loads and stores.
pub fn summarize_module(module: &Module, stats: &mut Statistics) {
    stats.register("Functions", "number of functions");
    stats.register("Instructions", "number of instructions");
    stats.register("Loads", "number of loads");
    stats.register("Stores", "number of stores");

    let allocs = &module.allocs;
    for &global in module.globals() {
        let Some(func) = global.as_func(allocs) else { continue };
        if func.is_extern() {
            continue;
        }
        stats.bump("Functions");
        for block in global.blocks_vec(allocs) {
            for (_, data) in block_insts(block, allocs) {
                stats.bump("Instructions");
                match data.kind {
                    InstKind::Load { .. } => stats.bump("Loads"),
                    InstKind::Store { .. } => stats.bump("Stores"),
                    _ => {}
                }
            }
        }
    }
}
