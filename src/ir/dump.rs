//! Human-readable IR printer.
//!
//! The format is stable enough to snapshot: top-level items start at column
//! 0, instructions are indented by two spaces, values print as `@name` when
//! named (functions, globals, named blocks) and `%N` otherwise, with
//! numeric ids reset at each function definition. Constants embed inline as
//! `constant <type> <literal>`.

use std::io::{self, Write};

use hashbrown::HashMap;
use itertools::Itertools;

use crate::common::types::Type;

use super::module::Module;
use super::value::{AccessKind, InstKind, Value, ValueKind};

/// Allocates `%N` ids and remembers `@name`s while one module is printed.
#[derive(Default)]
pub struct IdManager {
    ids: HashMap<Value, usize>,
    names: HashMap<Value, String>,
    next: usize,
}

impl IdManager {
    pub fn log_name(&mut self, v: Value, name: &str) {
        self.names.entry(v).or_insert_with(|| name.to_string());
    }

    pub fn name(&self, v: Value) -> Option<&str> {
        self.names.get(&v).map(String::as_str)
    }

    pub fn id(&mut self, v: Value) -> usize {
        if let Some(&id) = self.ids.get(&v) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(v, id);
        id
    }

    /// Numeric ids restart per function definition; names persist.
    pub fn reset_ids(&mut self) {
        self.ids.clear();
        self.next = 0;
    }
}

struct Dumper<'a, W: Write> {
    m: &'a Module,
    w: &'a mut W,
    idm: IdManager,
    in_expr: u32,
}

impl<'a, W: Write> Dumper<'a, W> {
    fn print_id(&mut self, v: Value) -> io::Result<()> {
        if let Some(name) = self.idm.name(v).map(str::to_string) {
            write!(self.w, "@{}", name)
        } else {
            let id = self.idm.id(v);
            write!(self.w, "%{}", id)
        }
    }

    fn print_type(&mut self, ty: Option<&Type>) -> io::Result<()> {
        match ty {
            Some(ty) => write!(self.w, "{}", ty.type_id()),
            None => write!(self.w, "void"),
        }
    }

    /// Print indent, id, and `=` for a value-producing instruction.
    /// Returns true when already inside an expression (caller stops).
    fn print_prefix(&mut self, v: Value) -> io::Result<bool> {
        if self.in_expr > 0 {
            self.print_id(v)?;
            return Ok(true);
        }
        write!(self.w, "  ")?;
        self.print_id(v)?;
        write!(self.w, " = ")?;
        Ok(false)
    }

    fn inline(&mut self, v: Value) -> io::Result<()> {
        self.in_expr += 1;
        let result = self.dump_value(v);
        self.in_expr -= 1;
        result
    }

    fn with_type(&mut self, v: Value) -> io::Result<()> {
        self.print_type(self.m.graph.ty(v))?;
        write!(self.w, " ")?;
        self.inline(v)
    }

    fn inline_list(&mut self, values: &[Value]) -> io::Result<()> {
        for (i, &v) in values.iter().enumerate() {
            if i > 0 {
                write!(self.w, ", ")?;
            }
            self.inline(v)?;
        }
        Ok(())
    }

    fn dump_value(&mut self, v: Value) -> io::Result<()> {
        match &self.m.graph.value(v).kind {
            ValueKind::Inst(kind) => self.dump_inst(v, *kind),
            ValueKind::Block(_) => self.dump_block(v),
            ValueKind::Function(_) => self.dump_function(v),
            ValueKind::GlobalVar(_) => self.dump_global(v),
            ValueKind::ConstInt(value) => {
                let value = *value;
                write!(self.w, "constant ")?;
                self.print_type(self.m.graph.ty(v))?;
                let unsigned = self
                    .m
                    .graph
                    .ty(v)
                    .is_some_and(|t| t.is_unsigned() || t.is_pointer());
                if unsigned {
                    write!(self.w, " {}", value)
                } else {
                    write!(self.w, " {}", value as i32)
                }
            }
            ValueKind::ConstStr(bytes) => {
                let escaped: String = bytes.iter().map(|&b| escape_char(b)).collect();
                write!(self.w, "constant ")?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " \"{}\"", escaped)
            }
            ValueKind::ConstStruct | ValueKind::ConstArray => {
                write!(self.w, "constant ")?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " {{")?;
                self.inline_list(&self.m.graph.operands(v))?;
                write!(self.w, "}}")
            }
            ValueKind::ConstZero => {
                write!(self.w, "constant ")?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " zero")
            }
            ValueKind::ArgRef(index) => write!(self.w, "arg {}", index),
            ValueKind::Undef => write!(self.w, "undef"),
        }
    }

    fn dump_inst(&mut self, v: Value, kind: InstKind) -> io::Result<()> {
        let ops = self.m.graph.operands(v);
        match kind {
            InstKind::Load => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "load ")?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, ", ")?;
                self.with_type(ops[0])?;
                writeln!(self.w)
            }
            InstKind::Store => {
                write!(self.w, "  store ")?;
                self.with_type(ops[0])?;
                write!(self.w, ", ")?;
                self.with_type(ops[1])?;
                writeln!(self.w)
            }
            InstKind::Alloca => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "alloca ")?;
                self.print_type(self.m.graph.ty(v))?;
                writeln!(self.w)
            }
            InstKind::Access(acc) => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                match acc {
                    AccessKind::Pointer => write!(self.w, "access ptr ")?,
                    AccessKind::Element => write!(self.w, "access elem ")?,
                }
                self.with_type(ops[0])?;
                write!(self.w, ", ")?;
                self.inline(ops[1])?;
                writeln!(self.w)
            }
            InstKind::Binary(op) => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "{} ", op)?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " ")?;
                self.inline(ops[0])?;
                write!(self.w, ", ")?;
                self.inline(ops[1])?;
                writeln!(self.w)
            }
            InstKind::Unary(op) => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "{} ", op)?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " ")?;
                self.inline(ops[0])?;
                writeln!(self.w)
            }
            InstKind::Cast => {
                let is_const = self.m.graph.is_const(v);
                if !is_const && self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "cast ")?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " ")?;
                self.inline(ops[0])?;
                if !is_const {
                    writeln!(self.w)?;
                }
                Ok(())
            }
            InstKind::Call => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "call ")?;
                self.with_type(ops[0])?;
                for &arg in &ops[1..] {
                    write!(self.w, ", ")?;
                    self.inline(arg)?;
                }
                writeln!(self.w)
            }
            InstKind::Branch => {
                write!(self.w, "  br ")?;
                self.inline_list(&ops)?;
                writeln!(self.w)
            }
            InstKind::Jump => {
                write!(self.w, "  jump ")?;
                self.inline(ops[0])?;
                writeln!(self.w)
            }
            InstKind::Return => {
                write!(self.w, "  ret ")?;
                if ops.is_empty() {
                    write!(self.w, "void")?;
                } else {
                    self.with_type(ops[0])?;
                }
                writeln!(self.w)
            }
            InstKind::Phi => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "phi ")?;
                self.print_type(self.m.graph.ty(v))?;
                write!(self.w, " ")?;
                self.inline_list(&ops)?;
                writeln!(self.w)
            }
            InstKind::PhiOperand => {
                write!(self.w, "[")?;
                self.inline(ops[0])?;
                write!(self.w, ", ")?;
                self.inline(ops[1])?;
                write!(self.w, "]")
            }
            InstKind::Select => {
                if self.print_prefix(v)? {
                    return Ok(());
                }
                write!(self.w, "select ")?;
                self.with_type(ops[0])?;
                write!(self.w, ", ")?;
                self.with_type(ops[1])?;
                write!(self.w, ", ")?;
                self.with_type(ops[2])?;
                writeln!(self.w)
            }
        }
    }

    fn dump_block(&mut self, v: Value) -> io::Result<()> {
        if let Some(name) = &self.m.graph.block_data(v).name {
            let name = name.clone();
            self.idm.log_name(v, &name);
        }
        self.print_id(v)?;
        if self.in_expr > 0 {
            return Ok(());
        }
        write!(self.w, ":")?;
        let preds = self.m.graph.operands(v);
        if !preds.is_empty() {
            write!(self.w, " ; preds: ")?;
            self.inline_list(&preds)?;
        }
        writeln!(self.w)?;
        for inst in self.m.graph.block_data(v).insts.clone() {
            self.dump_value(inst)?;
        }
        Ok(())
    }

    fn dump_function(&mut self, v: Value) -> io::Result<()> {
        let (name, link) = {
            let data = self.m.graph.func_data(v);
            (data.name.clone(), data.link)
        };
        self.idm.log_name(v, &name);
        if self.in_expr > 0 {
            return self.print_id(v);
        }
        let blocks = self.m.graph.operands(v);
        write!(self.w, "{} ", if blocks.is_empty() { "declare" } else { "define" })?;
        write!(self.w, "{} ", link)?;
        self.print_type(self.m.graph.ty(v))?;
        write!(self.w, " ")?;
        self.print_id(v)?;
        if !blocks.is_empty() {
            self.idm.reset_ids();
            // Allocate block ids up front so forward branches print in
            // block order.
            for &b in &blocks {
                match self.m.graph.block_data(b).name.clone() {
                    Some(name) => self.idm.log_name(b, &name),
                    None => {
                        self.idm.id(b);
                    }
                }
            }
            writeln!(self.w, " {{")?;
            for &b in &blocks {
                self.dump_block(b)?;
            }
            write!(self.w, "}}")?;
        }
        writeln!(self.w)
    }

    fn dump_global(&mut self, v: Value) -> io::Result<()> {
        let (name, link, is_var) = {
            let data = self.m.graph.global_data(v);
            (data.name.clone(), data.link, data.is_var)
        };
        self.idm.log_name(v, &name);
        self.print_id(v)?;
        if self.in_expr > 0 {
            return Ok(());
        }
        write!(self.w, " = {} global {} ", link, if is_var { "var" } else { "const" })?;
        self.print_type(self.m.graph.ty(v))?;
        let ops = self.m.graph.operands(v);
        if let Some(&init) = ops.first() {
            write!(self.w, ", ")?;
            self.inline(init)?;
        }
        writeln!(self.w)
    }
}

fn escape_char(b: u8) -> String {
    match b {
        b'\x07' => "\\a".into(),
        b'\x08' => "\\b".into(),
        b'\x0c' => "\\f".into(),
        b'\n' => "\\n".into(),
        b'\r' => "\\r".into(),
        b'\t' => "\\t".into(),
        b'\x0b' => "\\v".into(),
        b'\\' => "\\\\".into(),
        b'"' => "\\\"".into(),
        0 => "\\0".into(),
        b if b.is_ascii_graphic() || b == b' ' => (b as char).to_string(),
        b => format!("\\x{:02x}", b),
    }
}

impl Module {
    /// Print the whole module. Seals the global constructor first, so
    /// repeated dumps are byte-identical.
    pub fn dump<W: Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.seal_global_ctor();
        let items = self.vars().iter().chain(self.funcs()).copied().collect_vec();
        let mut dumper = Dumper { m: self, w, idm: IdManager::default(), in_expr: 0 };
        for item in items {
            dumper.dump_value(item)?;
            writeln!(dumper.w)?;
        }
        Ok(())
    }

    /// Convenience wrapper used by tests.
    pub fn dump_to_string(&mut self) -> String {
        let mut buf = Vec::new();
        self.dump(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("dump produced invalid UTF-8")
    }
}
