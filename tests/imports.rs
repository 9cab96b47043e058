use pretty_assertions::assert_eq;
use std::{fs, path::Path};
use tempfile::tempdir;
use vglang::{DiagnosticKind, Interpreter, Output, VgError};

const MATH: &str = r#"
library Math {
    namespace Ops {
        const BASE = 10;
        var calls = 0;
        function addBase(x) { calls = calls + 1; return x + BASE; }
        function twice(x) { return addBase(addBase(x)); }
        namespace Deep {
            const ANSWER = 42;
        }
    }
    namespace Shapes {
        const UNIT = 1;
        class Square {
            var side = 0;
            constructor(side) { this.side = side; }
            function area() { return this.side * this.side * UNIT; }
        }
    }
}
"#;

fn session() -> (Interpreter, Output) {
    let output = Output::buffer();
    let mut interpreter = Interpreter::new().with_output(output.clone());
    interpreter.interpret(MATH).expect("library declaration succeeds");
    (interpreter, output)
}

fn run_in(interpreter: &mut Interpreter, output: &Output, source: &str) -> String {
    output.clear();
    interpreter
        .interpret(source)
        .expect("evaluation should succeed");
    output.contents()
}

fn error_in(interpreter: &mut Interpreter, source: &str) -> VgError {
    match interpreter.interpret(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

#[test]
fn library_members_resolve_through_qualified_paths() {
    let (mut interpreter, output) = session();
    let printed = run_in(
        &mut interpreter,
        &output,
        "print(Math.Ops.addBase(1), Math.Ops.twice(0), Math.Ops.Deep.ANSWER);",
    );
    assert_eq!(printed, "11 20 42\n");
    assert_eq!(interpreter.registry().names().collect::<Vec<_>>(), vec!["Math"]);
}

#[test]
fn namespace_functions_share_namespace_state() {
    let (mut interpreter, output) = session();
    let printed = run_in(
        &mut interpreter,
        &output,
        "Math.Ops.addBase(1); Math.Ops.addBase(2); print(Math.Ops.calls);",
    );
    assert_eq!(printed, "2\n");
}

#[test]
fn namespace_constants_reject_assignment() {
    let (mut interpreter, _) = session();
    let err = error_in(&mut interpreter, "Math.Ops.BASE = 1;");
    assert_eq!(err.kind(), DiagnosticKind::ConstError);
    interpreter
        .interpret("Math.Ops.calls = 7;")
        .expect("namespace variables are writable");
}

#[test]
fn importing_namespaces_and_symbols() {
    let (mut interpreter, output) = session();
    let printed = run_in(
        &mut interpreter,
        &output,
        r#"
        import Math.Ops;
        import Math.Ops.addBase as plus;
        import Math.Ops.Deep.ANSWER;
        print(Ops.addBase(5), plus(1), ANSWER);
        "#,
    );
    assert_eq!(printed, "15 11 42\n");
}

#[test]
fn imported_constants_stay_constant() {
    let (mut interpreter, _) = session();
    let err = error_in(&mut interpreter, "import Math.Ops.BASE; BASE = 3;");
    assert_eq!(err.kind(), DiagnosticKind::ConstError);
}

#[test]
fn explicit_import_replaces_a_local_binding() {
    let (mut interpreter, output) = session();
    let printed = run_in(
        &mut interpreter,
        &output,
        "var addBase = 0; import Math.Ops.addBase; print(addBase(1));",
    );
    assert_eq!(printed, "11\n");
}

#[test]
fn classes_inside_namespaces_see_their_namespace() {
    let (mut interpreter, output) = session();
    let printed = run_in(
        &mut interpreter,
        &output,
        r#"
        var s = new Math.Shapes.Square(3);
        import Math.Shapes.Square;
        var t = new Square(2);
        print(s.area(), t.area());
        "#,
    );
    assert_eq!(printed, "9 4\n");
}

#[test]
fn conflicting_wildcards_make_bare_names_ambiguous() {
    let mut interpreter = Interpreter::new().with_output(Output::Silent);
    interpreter
        .interpret(
            r#"
            library Alpha { namespace X { function foo() { return "alpha"; } } }
            library Beta { namespace Y { function foo() { return "beta"; } function bar() { return "bar"; } } }
            import Alpha.X.*;
            import Beta.Y.*;
            "#,
        )
        .expect("imports succeed");
    let err = error_in(&mut interpreter, "foo();");
    assert_eq!(err.kind(), DiagnosticKind::ImportError);
    assert!(err.message().contains("foo"));
    let value = interpreter
        .interpret("X.foo() + Y.foo() + bar();")
        .expect("qualified access is never ambiguous");
    assert_eq!(value.to_string(), "alphabetabar");
}

#[test]
fn repeated_wildcard_from_the_same_namespace_is_fine() {
    let (mut interpreter, output) = session();
    let printed = run_in(
        &mut interpreter,
        &output,
        "import Math.Ops.*; import Math.Ops.*; print(addBase(0), BASE);",
    );
    assert_eq!(printed, "10 10\n");
}

#[test]
fn unknown_import_targets_are_import_errors() {
    let (mut interpreter, _) = session();
    for source in [
        "import Nope.Ops;",
        "import Math.Nope;",
        "import Math.Ops.nope;",
        "import Math.Ops.Nope.deeper;",
        "import Math;",
        "import Nope.Ops.*;",
    ] {
        let err = error_in(&mut interpreter, source);
        assert_eq!(err.kind(), DiagnosticKind::ImportError, "{source}");
    }
}

#[test]
fn libraries_register_only_once() {
    let (mut interpreter, _) = session();
    let err = error_in(&mut interpreter, "library Math { namespace Other { } }");
    assert_eq!(err.kind(), DiagnosticKind::ImportError);
    assert_eq!(interpreter.registry().len(), 1);
}

#[test]
fn file_imports_resolve_relative_to_the_importing_file() {
    let dir = tempdir().expect("create temp dir");
    fs::create_dir(dir.path().join("lib")).expect("create lib dir");
    write(
        &dir.path().join("lib"),
        "util.vg",
        "function double(x) { return x * 2; } var loaded = true;",
    );
    write(
        dir.path(),
        "main.vg",
        r#"import "lib/util.vg"; print(double(21), loaded);"#,
    );

    let output = Output::buffer();
    let mut interpreter = Interpreter::new().with_output(output.clone());
    interpreter
        .run_file(dir.path().join("main.vg"))
        .expect("script runs");
    assert_eq!(output.contents(), "42 true\n");
    assert!(interpreter.current_file().is_none());
}

#[test]
fn file_import_alias_binds_the_single_class() {
    let dir = tempdir().expect("create temp dir");
    write(
        dir.path(),
        "shape.vg",
        "class Circle { var r = 2; function diameter() { return this.r * 2; } }",
    );
    write(
        dir.path(),
        "main.vg",
        r#"import "shape.vg" as Shape; print(new Shape().diameter());"#,
    );
    let output = Output::buffer();
    let mut interpreter = Interpreter::new().with_output(output.clone());
    interpreter
        .run_file(dir.path().join("main.vg"))
        .expect("script runs");
    assert_eq!(output.contents(), "4\n");
}

#[test]
fn file_import_alias_needs_exactly_one_class() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "two.vg", "class A { } class B { }");
    write(dir.path(), "none.vg", "var x = 1;");
    write(dir.path(), "main_two.vg", r#"import "two.vg" as T;"#);
    write(dir.path(), "main_none.vg", r#"import "none.vg" as N;"#);

    for main in ["main_two.vg", "main_none.vg"] {
        let mut interpreter = Interpreter::new().with_output(Output::Silent);
        let err = interpreter.run_file(dir.path().join(main)).unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::ImportError, "{main}");
    }
}

#[test]
fn circular_file_imports_are_rejected() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "a.vg", r#"import "b.vg";"#);
    write(dir.path(), "b.vg", r#"import "a.vg";"#);
    let mut interpreter = Interpreter::new().with_output(Output::Silent);
    let err = interpreter.run_file(dir.path().join("a.vg")).unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::ImportError);
    assert!(err.message().contains("circular"));
}

#[test]
fn missing_files_are_import_errors() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "main.vg", r#"import "missing.vg";"#);
    let mut interpreter = Interpreter::new().with_output(Output::Silent);
    let err = interpreter.run_file(dir.path().join("main.vg")).unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::ImportError);
}

#[test]
fn errors_inside_imported_files_name_the_file() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "broken.vg", "var ok = 1;\nvar bad = 1 / 0;");
    write(dir.path(), "main.vg", r#"import "broken.vg";"#);
    let mut interpreter = Interpreter::new().with_output(Output::Silent);
    let err = interpreter.run_file(dir.path().join("main.vg")).unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::ArithmeticError);
    assert_eq!(err.line(), 2);
    assert!(err.to_string().contains("while importing"));
    assert_eq!(interpreter.scope_depth(), 1);

    let main = dir.path().join("main.vg");
    let VgError::Diagnostic(diag) = err else {
        panic!("expected a diagnostic");
    };
    assert!(diag.file.as_deref().is_some_and(|file| file.ends_with("broken.vg")));
    let report = diag.render(Some(&main));
    let header = report.lines().next().unwrap_or_default();
    assert!(header.starts_with("VG Error: ArithmeticError at line 2:"), "{header}");
    assert!(header.ends_with("broken.vg'"), "{header}");
}

#[test]
fn import_failures_in_the_entry_script_keep_its_name() {
    let dir = tempdir().expect("create temp dir");
    write(dir.path(), "main.vg", "var a = 1;
import \"missing.vg\";");
    let main = dir.path().join("main.vg");
    let mut interpreter = Interpreter::new().with_output(Output::Silent);
    let VgError::Diagnostic(diag) = interpreter.run_file(&main).unwrap_err() else {
        panic!("expected a diagnostic");
    };
    assert!(diag.file.is_none());
    assert!(diag.render(Some(&main)).contains("main.vg"));
    assert_eq!(diag.line(), 2);
}

#[test]
fn library_directories_register_every_library() {
    let dir = tempdir().expect("create temp dir");
    fs::create_dir(dir.path().join("nested")).expect("create nested dir");
    write(
        dir.path(),
        "text.vglib",
        r#"
        library Text { namespace Fmt { function shout(s) { return s + "!"; } } }
        print("ignored");
        "#,
    );
    write(
        &dir.path().join("nested"),
        "numbers.vglib",
        "library Numbers { namespace Int { const ZERO = 0; } }",
    );
    write(dir.path(), "notes.txt", "not a library");

    let output = Output::buffer();
    let mut interpreter = Interpreter::new().with_output(output.clone());
    let loaded = interpreter.load_library_dir(dir.path()).expect("libraries load");
    assert_eq!(loaded, 2);
    assert_eq!(output.contents(), "");
    let value = interpreter
        .interpret("import Text.Fmt.shout; shout(\"hi\") + Numbers.Int.ZERO;")
        .expect("registered libraries are importable");
    assert_eq!(value.to_string(), "hi!0");
}
