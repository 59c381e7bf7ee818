//! Textual IR writer.
//!
//! Emits the canonical text form read back by `ir::reader`. Unnamed values
//! are renumbered deterministically (`%a0..` for arguments, `%t0..` for
//! instruction results); block labels are kept when unique.

use std::collections::HashMap;
use std::io::{Result as IoResult, Write};

use crate::{
    base::SlabRef,
    ir::{
        BlockRef, ConstData, GlobalData, GlobalRef, IRAllocs, InstKind, InstRef, Module, Opcode,
        ValueSSA, block_insts,
    },
};

pub fn write_module(module: &Module, out: &mut dyn Write) -> IoResult<()> {
    ModuleWriter { module, out }.write()
}

pub fn write_module_to_string(module: &Module) -> String {
    let mut buf = Vec::new();
    write_module(module, &mut buf).expect("writing to a Vec cannot fail");
    String::from_utf8(buf).expect("IR text is always valid UTF-8")
}

struct ModuleWriter<'a> {
    module: &'a Module,
    out: &'a mut dyn Write,
}

struct FuncNames {
    insts: HashMap<InstRef, String>,
    blocks: HashMap<BlockRef, String>,
    func: GlobalRef,
}

impl FuncNames {
    fn build(allocs: &IRAllocs, func: GlobalRef) -> Self {
        let mut insts = HashMap::new();
        let mut blocks = HashMap::new();
        let mut used_labels = std::collections::HashSet::new();
        let mut next_value = 0usize;
        for (i, block) in func.blocks_vec(allocs).iter().enumerate() {
            let stored = block.to_data(&allocs.blocks).name.clone();
            let label = if !stored.is_empty() && used_labels.insert(stored.to_string()) {
                stored.to_string()
            } else {
                format!("bb{i}")
            };
            blocks.insert(*block, label);
            for (inst, data) in block_insts(*block, allocs) {
                if data.common.ret_type.makes_instance() {
                    insts.insert(inst, format!("t{next_value}"));
                    next_value += 1;
                }
            }
        }
        Self { insts, blocks, func }
    }

    fn value(&self, allocs: &IRAllocs, value: ValueSSA) -> String {
        match value {
            ValueSSA::None => "<none>".to_string(),
            ValueSSA::ConstData(data) => format_const(data),
            ValueSSA::FuncArg(func, index) => {
                debug_assert_eq!(func, self.func);
                format!("%a{index}")
            }
            ValueSSA::Block(block) => format!("%{}", self.blocks[&block]),
            ValueSSA::Inst(inst) => format!("%{}", self.insts[&inst]),
            ValueSSA::Global(global) => format!("@{}", global.name(allocs)),
        }
    }

    /// `<type> <value>` with the operand's own type.
    fn typed_value(&self, allocs: &IRAllocs, value: ValueSSA) -> String {
        format!("{} {}", value.get_valtype(allocs), self.value(allocs, value))
    }
}

fn format_const(data: ConstData) -> String {
    match data {
        ConstData::Int { bits: 1, value } => {
            if value == 0 { "false".into() } else { "true".into() }
        }
        ConstData::Int { value, .. } => value.to_string(),
        ConstData::Float { bits, .. } => format!("{:?}", f64::from_bits(bits)),
        ConstData::PtrNull => "null".into(),
        ConstData::Undef(_) => "undef".into(),
        ConstData::Zero(_) => "zeroinitializer".into(),
    }
}

impl ModuleWriter<'_> {
    fn write(&mut self) -> IoResult<()> {
        writeln!(self.out, "; module = {}", self.module.name)?;
        for &global in self.module.globals() {
            let allocs = &self.module.allocs;
            match global.to_data(&allocs.globals) {
                GlobalData::Var(var) => {
                    writeln!(self.out, "@{} = global {}", var.name, var.value_ty)?;
                }
                GlobalData::Func(func) if func.is_extern() => {
                    let params: Vec<String> =
                        func.params.iter().map(|ty| ty.to_string()).collect();
                    writeln!(
                        self.out,
                        "declare {} @{}({})",
                        func.ret_type,
                        func.name,
                        params.join(", ")
                    )?;
                }
                GlobalData::Func(_) => self.write_func(global)?,
            }
        }
        Ok(())
    }

    fn write_func(&mut self, global: GlobalRef) -> IoResult<()> {
        let allocs = &self.module.allocs;
        let func = global.expect_func(allocs);
        let names = FuncNames::build(allocs, global);
        let params: Vec<String> = func
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("{ty} %a{i}"))
            .collect();
        writeln!(
            self.out,
            "define {} @{}({}) {{",
            func.ret_type,
            func.name,
            params.join(", ")
        )?;
        for block in global.blocks_vec(allocs) {
            writeln!(self.out, "{}:", names.blocks[&block])?;
            for (inst, _) in block_insts(block, allocs) {
                writeln!(self.out, "  {}", self.format_inst(&names, inst))?;
            }
        }
        writeln!(self.out, "}}")
    }

    fn format_inst(&self, names: &FuncNames, inst: InstRef) -> String {
        let allocs = &self.module.allocs;
        let data = inst.to_data(&allocs.insts);
        let opcode = data.common.opcode;
        let ty = data.common.ret_type;
        let val = |v: ValueSSA| names.value(allocs, v);
        let tval = |v: ValueSSA| names.typed_value(allocs, v);
        let ops = inst.operand_values(allocs);
        let result = |body: String| -> String {
            match names.insts.get(&inst) {
                Some(name) => format!("%{name} = {body}"),
                None => body,
            }
        };

        let text = match data.kind {
            InstKind::Guide => unreachable!("guide nodes are never printed"),
            InstKind::Binary if opcode == Opcode::Fneg => {
                result(format!("fneg {} {}", ty, val(ops[0])))
            }
            InstKind::Binary => {
                result(format!("{} {} {}, {}", opcode, ty, val(ops[0]), val(ops[1])))
            }
            InstKind::Cmp(cond) => result(format!(
                "{} {} {}, {}",
                opcode,
                cond,
                tval(ops[0]),
                val(ops[1])
            )),
            InstKind::Cast => result(format!("{} {} to {}", opcode, tval(ops[0]), ty)),
            InstKind::Phi => {
                let incomings: Vec<String> = ops
                    .chunks(2)
                    .map(|pair| format!("[ {}, {} ]", val(pair[0]), val(pair[1])))
                    .collect();
                result(format!("phi {} {}", ty, incomings.join(", ")))
            }
            InstKind::Select => result(format!(
                "select {}, {}, {}",
                tval(ops[0]),
                tval(ops[1]),
                tval(ops[2])
            )),
            InstKind::Gep { elem_ty } => {
                let mut parts = vec![format!("getelementptr {}, {}", elem_ty, tval(ops[0]))];
                for &index in &ops[1..] {
                    parts.push(tval(index));
                }
                result(parts.join(", "))
            }
            InstKind::Load { volatile, align } => {
                let vol = if volatile { "volatile " } else { "" };
                let align_suffix = if align > 0 { format!(", align {align}") } else { String::new() };
                result(format!("load {vol}{}, {}{}", ty, tval(ops[0]), align_suffix))
            }
            InstKind::Store { volatile, align } => {
                let vol = if volatile { "volatile " } else { "" };
                let align_suffix = if align > 0 { format!(", align {align}") } else { String::new() };
                format!("store {vol}{}, {}{}", tval(ops[0]), tval(ops[1]), align_suffix)
            }
            InstKind::Alloca { alloc_ty, align } => {
                let align_suffix = if align > 0 { format!(", align {align}") } else { String::new() };
                result(format!("alloca {alloc_ty}{align_suffix}"))
            }
            InstKind::Call => {
                let args: Vec<String> = ops[1..].iter().map(|&a| tval(a)).collect();
                result(format!("call {} {}({})", ty, val(ops[0]), args.join(", ")))
            }
            InstKind::VaArg => result(format!("va_arg {}, {}", tval(ops[0]), ty)),
            InstKind::Ret => match ops.first() {
                Some(&value) => format!("ret {}", tval(value)),
                None => "ret void".to_string(),
            },
            InstKind::Jump => format!("br label {}", val(ops[0])),
            InstKind::Br => format!(
                "br {}, label {}, label {}",
                tval(ops[0]),
                val(ops[1]),
                val(ops[2])
            ),
            InstKind::Switch => {
                let cases: Vec<String> = ops[2..]
                    .chunks(2)
                    .map(|pair| format!("{}, label {}", tval(pair[0]), val(pair[1])))
                    .collect();
                format!(
                    "switch {}, label {} [ {} ]",
                    tval(ops[0]),
                    val(ops[1]),
                    cases.join(", ")
                )
            }
            InstKind::Unreachable => "unreachable".to_string(),
        };
        text
    }
}
