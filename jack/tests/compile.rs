use jackc::compiler::{CodeGen, Cursor};
use jackc::symbols::VarKind;
use jackc::vm::Instruction;
use jackc::{compile, CompileError, LexError, Pos};

fn vm_lines(source: &str) -> Vec<String> {
    compile(source.as_bytes())
        .unwrap()
        .instructions
        .iter()
        .map(|i| i.to_string())
        .collect()
}

#[test]
fn test_empty_main() {
    assert_eq!(
        vm_lines("class Main { function void main(){ return; } }"),
        ["function Main.main 0", "push constant 0", "return"]
    );
}

#[test]
fn test_constructor_allocates_before_user_code() {
    let source = r#"
// A point on the screen.
class Point {
    field int x, y;

    constructor Point new(int ax, int ay) {
        let x = ax;
        let y = ay;
        return this;
    }

    method int getX() {
        return x;
    }
}
"#;
    assert_eq!(
        vm_lines(source),
        [
            "function Point.new 0",
            "push constant 2",
            "call Memory.alloc 1",
            "pop pointer 0",
            "push argument 0",
            "pop this 0",
            "push argument 1",
            "pop this 1",
            "push pointer 0",
            "return",
            "function Point.getX 0",
            "push argument 0",
            "pop pointer 0",
            "push this 0",
            "return",
        ]
    );
}

#[test]
fn test_constructor_size_counts_statics() {
    let source = "class Counter {
        static int total;
        field int n;
        constructor Counter new() { let total = total + 1; return this; }
    }";
    let lines = vm_lines(source);
    assert_eq!(&lines[..4], ["function Counter.new 0", "push constant 2", "call Memory.alloc 1", "pop pointer 0"]);
}

#[test]
fn test_if_without_else_has_no_else_code() {
    let source = r#"class Sign {
        field String state;
        method void update(int x) {
            if (x<0){ let state="negative"; }
            return;
        }
    }"#;
    let lines = vm_lines(source);
    let false_label = lines.iter().position(|l| l == "label L0").unwrap();
    assert_eq!(lines[false_label - 1], "goto L1");
    assert_eq!(lines[false_label - 2], "pop this 0");
    assert_eq!(lines[false_label + 1], "label L1");
    assert_eq!(&lines[false_label + 2..], ["push constant 0", "return"]);
}

#[test]
fn test_labels_are_unique_across_subroutines() {
    let source = "class Loop {
        function void a(int n) { while (n > 0) { let n = n - 1; } return; }
        function void b(int n) { if (n) { return; } else { return; } }
    }";
    let labels: Vec<String> = vm_lines(source)
        .into_iter()
        .filter_map(|l| l.strip_prefix("label ").map(str::to_string))
        .collect();
    assert_eq!(labels, ["L0", "L1", "L2", "L3"]);
}

#[test]
fn test_each_class_restarts_its_labels() {
    let a = vm_lines("class A { function void f() { while (true) { } return; } }");
    let b = vm_lines("class B { function void f() { while (true) { } return; } }");
    assert!(a.contains(&"label L0".to_string()));
    assert!(b.contains(&"label L0".to_string()));
}

#[test]
fn test_method_call_argument_counts() {
    let source = "class Game {
        field Square square;
        method void run(int dx, int dy) {
            do square.move(dx, dy);
            do redraw(dx);
            do Screen.clearScreen();
            return;
        }
    }";
    let lines = vm_lines(source);
    assert!(lines.contains(&"call Square.move 3".to_string()));
    assert!(lines.contains(&"call Game.redraw 2".to_string()));
    assert!(lines.contains(&"call Screen.clearScreen 0".to_string()));
}

#[test]
fn test_local_count_matches_symbol_table() {
    let mut cur =
        Cursor::new(b"method void f(int a) { var int i, j; var Array b; let b = a; return; }")
            .unwrap();
    let mut gen = CodeGen::new("T");
    gen.subroutine_dec(&mut cur).unwrap();

    let locals = gen.scopes().subroutine.var_count(VarKind::Local);
    assert_eq!(locals, 3);
    assert_eq!(gen.scopes().subroutine.var_count(VarKind::Arg), 2);
    assert_eq!(gen.scopes().subroutine.index_of("a"), Some(1));
    assert_eq!(
        gen.instructions()[0],
        Instruction::Function("T.f".to_string(), locals)
    );
}

#[test]
fn test_full_class() {
    let source = r#"
/** Reads numbers and prints their average. */
class Main {
    function void main() {
        var Array a;
        var int length, i, sum;

        let length = Keyboard.readInt("How many numbers? ");
        let a = Array.new(length);
        let i = 0;
        let sum = 0;
        while (i < length) {
            let a[i] = Keyboard.readInt("Enter a number: ");
            let sum = sum + a[i];
            let i = i + 1;
        }
        do Output.printInt(sum / length);
        return;
    }
}
"#;
    let class = compile(source.as_bytes()).unwrap();
    assert_eq!(class.name, "Main");
    let text = class.to_string();
    assert!(text.starts_with("function Main.main 4\n"));
    assert!(text.contains("call Keyboard.readInt 1\npop local 1\n"));
    assert!(text.contains("call Math.divide 2\ncall Output.printInt 1\npop temp 0\n"));
    assert!(text.ends_with("push constant 0\nreturn\n"));
}

#[test]
fn test_syntax_error_reports_position() {
    let err = compile(b"class Main {\n  function void main() {\n    let = 3;\n  }\n}").unwrap_err();
    assert_eq!(
        err,
        CompileError::UnexpectedToken {
            pos: Pos { ln: 3, col: 9 },
            found: "=".to_string(),
            expected: "identifier",
        }
    );
    assert_eq!(err.to_string(), "3:9: unexpected token =, expected identifier");
}

#[test]
fn test_lexical_error_aborts() {
    let err = compile(b"class Main { function void main() { return; } }\0").unwrap_err();
    assert_eq!(err, CompileError::Lex(LexError::NullByte(Pos { ln: 1, col: 48 })));
}

#[test]
fn test_trailing_tokens_are_rejected() {
    let err = compile(b"class A { } class B { }").unwrap_err();
    assert_eq!(err.pos(), Pos { ln: 1, col: 13 });
}

#[test]
fn test_undefined_variable_is_an_error() {
    let err = compile(b"class A { function void f() { let y = 1; return; } }").unwrap_err();
    assert!(matches!(err, CompileError::UndefinedVariable { ref name, .. } if name == "y"));
}

#[test]
fn test_duplicate_parameter_is_an_error() {
    let err = compile(b"class A { function void f(int a, char a) { return; } }").unwrap_err();
    assert!(matches!(err, CompileError::Redefined { ref name, .. } if name == "a"));
}
