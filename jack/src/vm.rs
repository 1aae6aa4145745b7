//! Stack machine instructions and the writer that emits them.
use std::fmt::{self, Display, Formatter};

use crate::symbols::VarKind;

pub const ALLOC_FUNC: &str = "Memory.alloc";
pub const MULTIPLY_FUNC: &str = "Math.multiply";
pub const DIVIDE_FUNC: &str = "Math.divide";
pub const STRING_NEW_FUNC: &str = "String.new";
pub const STRING_APPEND_FUNC: &str = "String.appendChar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Local,
    Argument,
    This,
    That,
    Constant,
    Static,
    Temp,
    Pointer,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Local => "local",
            Segment::Argument => "argument",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Constant => "constant",
            Segment::Static => "static",
            Segment::Temp => "temp",
            Segment::Pointer => "pointer",
        }
    }
}

impl From<VarKind> for Segment {
    fn from(kind: VarKind) -> Self {
        match kind {
            VarKind::Static => Segment::Static,
            VarKind::Field => Segment::This,
            VarKind::Arg => Segment::Argument,
            VarKind::Local => Segment::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Push(Segment, u32),
    Pop(Segment, u32),
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
    Label(String),
    Goto(String),
    IfGoto(String),
    Call(String, u32),
    Function(String, u32),
    Return,
}

impl Instruction {
    /// Net change of the stack depth when the instruction runs. `return`
    /// is reported from the callee's side: it consumes the return value.
    pub fn stack_effect(&self) -> i64 {
        match self {
            Instruction::Push(_, _) => 1,
            Instruction::Pop(_, _) => -1,
            Instruction::Add
            | Instruction::Sub
            | Instruction::Eq
            | Instruction::Gt
            | Instruction::Lt
            | Instruction::And
            | Instruction::Or => -1,
            Instruction::Neg | Instruction::Not => 0,
            Instruction::Label(_) | Instruction::Goto(_) | Instruction::Function(_, _) => 0,
            Instruction::IfGoto(_) => -1,
            Instruction::Call(_, n) => 1 - i64::from(*n),
            Instruction::Return => -1,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(seg, i) => write!(f, "push {} {}", seg.as_str(), i),
            Instruction::Pop(seg, i) => write!(f, "pop {} {}", seg.as_str(), i),
            Instruction::Add => f.write_str("add"),
            Instruction::Sub => f.write_str("sub"),
            Instruction::Neg => f.write_str("neg"),
            Instruction::Eq => f.write_str("eq"),
            Instruction::Gt => f.write_str("gt"),
            Instruction::Lt => f.write_str("lt"),
            Instruction::And => f.write_str("and"),
            Instruction::Or => f.write_str("or"),
            Instruction::Not => f.write_str("not"),
            Instruction::Label(label) => write!(f, "label {}", label),
            Instruction::Goto(label) => write!(f, "goto {}", label),
            Instruction::IfGoto(label) => write!(f, "if-goto {}", label),
            Instruction::Call(name, n) => write!(f, "call {} {}", name, n),
            Instruction::Function(name, n) => write!(f, "function {} {}", name, n),
            Instruction::Return => f.write_str("return"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    Ctor,
    Func,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Lt,
    Gt,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Appends instructions for one class and hands out its branch labels.
#[derive(Debug, Default)]
pub struct VmWriter {
    instrs: Vec<Instruction>,
    labels: usize,
}

impl VmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn i(&mut self, instr: Instruction) {
        self.instrs.push(instr);
    }

    /// Returns a label never handed out before by this writer.
    pub fn new_label(&mut self) -> String {
        let label = format!("L{}", self.labels);
        self.labels += 1;
        label
    }

    /// Emits the function header. Constructors also allocate `size` words
    /// and point `this` at them.
    pub fn write_function(&mut self, kind: SubKind, name: &str, locals: u32, size: u32) {
        self.i(Instruction::Function(name.to_string(), locals));
        if kind == SubKind::Ctor {
            self.write_push(Segment::Constant, size);
            self.write_call(ALLOC_FUNC, 1);
            self.write_pop(Segment::Pointer, 0);
        }
    }

    pub fn write_push(&mut self, seg: Segment, v: u32) {
        self.i(Instruction::Push(seg, v))
    }

    pub fn write_pop(&mut self, seg: Segment, v: u32) {
        self.i(Instruction::Pop(seg, v))
    }

    pub fn write_binary_op(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Add => self.i(Instruction::Add),
            BinaryOp::Sub => self.i(Instruction::Sub),
            BinaryOp::Mul => self.write_call(MULTIPLY_FUNC, 2),
            BinaryOp::Div => self.write_call(DIVIDE_FUNC, 2),
            BinaryOp::And => self.i(Instruction::And),
            BinaryOp::Or => self.i(Instruction::Or),
            BinaryOp::Lt => self.i(Instruction::Lt),
            BinaryOp::Gt => self.i(Instruction::Gt),
            BinaryOp::Eq => self.i(Instruction::Eq),
        }
    }

    pub fn write_unary_op(&mut self, op: UnaryOp) {
        match op {
            UnaryOp::Neg => self.i(Instruction::Neg),
            UnaryOp::Not => self.i(Instruction::Not),
        }
    }

    /// Branches to `label` when the condition on top of the stack is false.
    pub fn write_if(&mut self, label: &str) {
        self.i(Instruction::Not);
        self.i(Instruction::IfGoto(label.to_string()));
    }

    pub fn write_goto(&mut self, label: &str) {
        self.i(Instruction::Goto(label.to_string()));
    }

    pub fn write_label(&mut self, label: &str) {
        self.i(Instruction::Label(label.to_string()));
    }

    /// Calls `name` and leaves its return value on the stack.
    pub fn write_call(&mut self, name: &str, args: u32) {
        self.i(Instruction::Call(name.to_string(), args))
    }

    /// Calls `name` for its side effects and discards the return value.
    pub fn write_do(&mut self, name: &str, args: u32) {
        self.write_call(name, args);
        self.write_pop(Segment::Temp, 0);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_push(Segment::Constant, s.chars().count() as u32);
        self.write_call(STRING_NEW_FUNC, 1);
        for c in s.chars() {
            self.write_push(Segment::Constant, c as u32);
            self.write_call(STRING_APPEND_FUNC, 2);
        }
    }

    pub fn write_return(&mut self) {
        self.i(Instruction::Return)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(writer: &VmWriter) -> Vec<String> {
        writer.instructions().iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_constructor_header() {
        let mut w = VmWriter::new();
        w.write_function(SubKind::Ctor, "Point.new", 1, 2);
        assert_eq!(
            lines(&w),
            [
                "function Point.new 1",
                "push constant 2",
                "call Memory.alloc 1",
                "pop pointer 0"
            ]
        );
    }

    #[test]
    fn test_plain_headers() {
        let mut w = VmWriter::new();
        w.write_function(SubKind::Func, "Main.main", 3, 5);
        w.write_function(SubKind::Method, "Point.getX", 0, 5);
        assert_eq!(lines(&w), ["function Main.main 3", "function Point.getX 0"]);
    }

    #[test]
    fn test_segments() {
        let mut w = VmWriter::new();
        for kind in [VarKind::Static, VarKind::Field, VarKind::Arg, VarKind::Local] {
            w.write_push(kind.into(), 4);
        }
        w.write_pop(Segment::That, 0);
        assert_eq!(
            lines(&w),
            [
                "push static 4",
                "push this 4",
                "push argument 4",
                "push local 4",
                "pop that 0"
            ]
        );
    }

    #[test]
    fn test_ops() {
        let mut w = VmWriter::new();
        w.write_binary_op(BinaryOp::Mul);
        w.write_binary_op(BinaryOp::Div);
        w.write_binary_op(BinaryOp::Sub);
        w.write_unary_op(UnaryOp::Neg);
        w.write_unary_op(UnaryOp::Not);
        assert_eq!(
            lines(&w),
            [
                "call Math.multiply 2",
                "call Math.divide 2",
                "sub",
                "neg",
                "not"
            ]
        );
    }

    #[test]
    fn test_labels_are_unique() {
        let mut w = VmWriter::new();
        let a = w.new_label();
        let b = w.new_label();
        assert_eq!((a.as_str(), b.as_str()), ("L0", "L1"));
        w.write_if(&a);
        w.write_goto(&b);
        w.write_label(&a);
        assert_eq!(lines(&w), ["not", "if-goto L0", "goto L1", "label L0"]);
    }

    #[test]
    fn test_do_discards_result() {
        let mut w = VmWriter::new();
        w.write_do("Output.printInt", 1);
        assert_eq!(lines(&w), ["call Output.printInt 1", "pop temp 0"]);
        let depth: i64 = w.instructions().iter().map(Instruction::stack_effect).sum();
        assert_eq!(depth, -1);
    }

    #[test]
    fn test_string() {
        let mut w = VmWriter::new();
        w.write_string("Hi");
        assert_eq!(
            lines(&w),
            [
                "push constant 2",
                "call String.new 1",
                "push constant 72",
                "call String.appendChar 2",
                "push constant 105",
                "call String.appendChar 2"
            ]
        );
        let depth: i64 = w.instructions().iter().map(Instruction::stack_effect).sum();
        assert_eq!(depth, 1);
    }
}
