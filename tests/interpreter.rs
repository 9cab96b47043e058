use pretty_assertions::assert_eq;
use std::{cell::Cell, rc::Rc, thread};
use vglang::{
    diagnostics::{DiagnosticKind, VgError},
    hook::{HookControl, HookEvent, HookEventKind, StepBudget},
    output::Output,
    repl::Repl,
    runtime::Interpreter,
    value::{Value, ValueKind},
};

fn interpreter() -> (Interpreter, Output) {
    let output = Output::buffer();
    (Interpreter::new().with_output(output.clone()), output)
}

fn eval(source: &str) -> Value {
    let (mut interpreter, _) = interpreter();
    interpreter
        .interpret(source)
        .expect("evaluation should succeed")
}

fn run(source: &str) -> String {
    let (mut interpreter, output) = interpreter();
    interpreter
        .interpret(source)
        .expect("evaluation should succeed");
    output.contents()
}

fn eval_error(source: &str) -> VgError {
    let (mut interpreter, _) = interpreter();
    match interpreter.interpret(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn expect_int(value: &Value) -> i64 {
    match value.kind() {
        ValueKind::Integer(n) => *n,
        _ => panic!("expected Integer, found {}", value.type_name()),
    }
}

fn expect_bool(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Boolean(b) => *b,
        _ => panic!("expected Boolean, found {}", value.type_name()),
    }
}

#[test]
fn evaluates_basic_arithmetic() {
    assert_eq!(expect_int(&eval("return 2 + 3 * 4;")), 14);
    assert_eq!(expect_int(&eval("return (2 + 3) * 4;")), 20);
    assert_eq!(expect_int(&eval("return 7 % 3;")), 1);
}

#[test]
fn integer_division_truncates_toward_zero() {
    assert_eq!(expect_int(&eval("return 7 / 2;")), 3);
    assert_eq!(expect_int(&eval("return -7 / 2;")), -3);
}

#[test]
fn division_by_zero_is_an_arithmetic_error() {
    let err = eval_error("var a = 1; var b = a / 0;");
    assert_eq!(err.kind(), DiagnosticKind::ArithmeticError);
    assert_eq!(err.line(), 1);
    let err = eval_error("return 5 % 0;");
    assert_eq!(err.kind(), DiagnosticKind::ArithmeticError);
}

#[test]
fn addition_promotes_and_concatenates() {
    assert_eq!(eval("return 1 + 2;").to_string(), "3");
    assert_eq!(eval("return 1 + 2.0;").to_string(), "3.0");
    assert_eq!(eval(r#"return "x" + 5;"#).to_string(), "x5");
    assert_eq!(eval(r#"return 5 + "x";"#).to_string(), "5x");
    assert_eq!(eval(r#"return "a" + null;"#).to_string(), "anull");
    let err = eval_error(r#"return "x" - 5;"#);
    assert_eq!(err.kind(), DiagnosticKind::TypeError);
}

#[test]
fn arrays_do_not_take_part_in_arithmetic() {
    let err = eval_error(r#"return [1] + "a";"#);
    assert_eq!(err.kind(), DiagnosticKind::TypeError);
}

#[test]
fn comparisons_require_numbers() {
    assert!(expect_bool(&eval("return 1 < 2.5;")));
    assert!(expect_bool(&eval("return 3 >= 3;")));
    let err = eval_error(r#"return "a" < "b";"#);
    assert_eq!(err.kind(), DiagnosticKind::TypeError);
}

#[test]
fn equality_is_structural() {
    assert!(expect_bool(&eval("return 1 == 1.0;")));
    assert!(expect_bool(&eval("return [1, [2]] == [1, [2]];")));
    assert!(expect_bool(&eval(r#"return "a" != "b";"#)));
    assert!(expect_bool(&eval("return null == null;")));
}

#[test]
fn logical_operators_short_circuit() {
    let output = run(
        r#"
        function loud() { print("called"); return true; }
        var a = false && loud();
        var b = true || loud();
        print(a, b);
        "#,
    );
    assert_eq!(output, "false true\n");
}

#[test]
fn truthiness_follows_value_kind() {
    let output = run(
        r#"
        if (0) print("zero"); else print("no zero");
        if ("") print("empty"); else print("no empty");
        if (null) print("null"); else print("no null");
        if ([]) print("array");
        "#,
    );
    assert_eq!(output, "no zero\nno empty\nno null\narray\n");
}

#[test]
fn block_variables_vanish_after_the_block() {
    let err = eval_error("{ var inner = 1; } return inner;");
    assert_eq!(err.kind(), DiagnosticKind::NameError);
    assert!(err.message().contains("inner"));
}

#[test]
fn for_init_variable_is_scoped_to_the_loop() {
    let err = eval_error("for (i = 0; i < 3; i = i + 1) { } return i;");
    assert_eq!(err.kind(), DiagnosticKind::NameError);
    let err = eval_error("for (var j = 0; j < 3; j++) { } return j;");
    assert_eq!(err.kind(), DiagnosticKind::NameError);
}

#[test]
fn for_loop_assigns_an_existing_variable() {
    assert_eq!(expect_int(&eval("var i = 10; for (i = 0; i < 3; i++) { } return i;")), 3);
}

#[test]
fn continue_skips_to_the_update() {
    let output = run("for (i = 0; i < 3; i = i + 1) { if (i == 1) continue; print(i); }");
    assert_eq!(output, "0\n2\n");
}

#[test]
fn while_and_do_while_loops() {
    let output = run(
        r#"
        var n = 0;
        while (true) { n++; if (n == 3) break; }
        print(n);
        var m = 10;
        do { m = m + 1; } while (m < 5);
        print(m);
        "#,
    );
    assert_eq!(output, "3\n11\n");
}

#[test]
fn for_each_iterates_arrays_and_strings() {
    let output = run(
        r#"
        var total = 0;
        for (var x : [1, 2, 3]) { total += x; }
        print(total);
        for (c : "hi") print(c);
        "#,
    );
    assert_eq!(output, "6\nh\ni\n");
    let err = eval_error("for (x : 5) { }");
    assert_eq!(err.kind(), DiagnosticKind::TypeError);
}

#[test]
fn compound_assignment_and_increments() {
    let output = run(
        r#"
        var x = 5;
        x += 2; x -= 1; x *= 3; x /= 2;
        print(x);
        var y = 1;
        print(y++, ++y, y--, y);
        "#,
    );
    assert_eq!(output, "9\n2 3 2 2\n");
}

#[test]
fn compound_targets_are_evaluated_once() {
    let output = run(
        r#"
        var a = [10, 20, 30];
        var i = 0;
        a[i++] += 1;
        print(a, i);

        var calls = 0;
        function slot() { calls++; return 2; }
        a[slot()]++;
        ++a[slot()];
        print(a, calls);

        class Box { var hits = 0; }
        var boxes = [new Box(), new Box()];
        var k = 0;
        boxes[k++].hits += 5;
        print(boxes[0].hits, boxes[1].hits, k);
        "#,
    );
    assert_eq!(output, "[11, 20, 30] 1\n[11, 20, 32] 2\n5 0 1\n");
}

#[test]
fn const_rejects_reassignment_regardless_of_outer_binding() {
    let err = eval_error("const x = 1; x = 2;");
    assert_eq!(err.kind(), DiagnosticKind::ConstError);
    let err = eval_error("var x = 0; { const x = 1; x = 2; }");
    assert_eq!(err.kind(), DiagnosticKind::ConstError);
}

#[test]
fn assigning_an_undeclared_name_is_a_name_error() {
    let err = eval_error("missing = 1;");
    assert_eq!(err.kind(), DiagnosticKind::NameError);
}

#[test]
fn switch_falls_through_until_break() {
    let output = run(
        r#"
        function describe(n) {
            switch (n) {
                case 1: print("one");
                case 2: print("two"); break;
                case 3: print("three");
                default: print("other");
            }
        }
        describe(1);
        describe(3);
        describe(9);
        "#,
    );
    assert_eq!(output, "one\ntwo\nthree\nother\nother\n");
}

#[test]
fn default_must_be_the_last_switch_label() {
    let err = eval_error("switch (1) { default: print(0); case 1: print(1); }");
    assert_eq!(err.kind(), DiagnosticKind::SyntaxError);
    assert_eq!(err.column(), 33);
}

#[test]
fn functions_are_hoisted_and_recursive() {
    let value = eval(
        r#"
        var result = fib(10);
        function fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        return result;
        "#,
    );
    assert_eq!(expect_int(&value), 55);
}

#[test]
fn functions_see_the_caller_scope() {
    let value = eval(
        r#"
        function readLimit() { return limit; }
        function withLimit() { var limit = 42; return readLimit(); }
        return withLimit();
        "#,
    );
    assert_eq!(expect_int(&value), 42);
}

#[test]
fn missing_return_yields_null() {
    assert!(eval("function f() { var a = 1; } return f();").is_null());
}

#[test]
fn wrong_argument_count_is_an_arity_error() {
    let err = eval_error("function f(a, b) { return a; } f(1);");
    assert_eq!(err.kind(), DiagnosticKind::ArityError);
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let err = eval_error("var x = 3; x();");
    assert_eq!(err.kind(), DiagnosticKind::TypeError);
}

#[test]
fn runaway_recursion_is_reported() {
    let mut interpreter = Interpreter::new()
        .with_output(Output::Silent)
        .with_max_call_depth(16);
    let err = interpreter
        .interpret("function spin(n) { return spin(n + 1); } spin(0);")
        .unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Runtime);
    assert!(err.message().contains("call depth"));
}

#[test]
fn function_references_capture_leading_arguments() {
    let output = run(
        r#"
        function add(a, b) { return a + b; }
        var plain = &add;
        var addTen = &add(10);
        print(plain(1, 2), addTen(5));
        "#,
    );
    assert_eq!(output, "3 15\n");
}

#[test]
fn arrays_share_state_between_holders() {
    let output = run(
        r#"
        var a = [1, 2];
        var b = a;
        append(b, 3);
        a[0] = 9;
        print(a, length(b), b[0]);
        "#,
    );
    assert_eq!(output, "[9, 2, 3] 3 9\n");
}

#[test]
fn array_index_errors() {
    assert_eq!(eval_error("var a = [1]; return a[1];").kind(), DiagnosticKind::RangeError);
    assert_eq!(eval_error("var a = [1]; a[-1] = 0;").kind(), DiagnosticKind::RangeError);
    assert_eq!(eval_error(r#"var a = [1]; return a["0"];"#).kind(), DiagnosticKind::TypeError);
    assert_eq!(eval_error("var n = 4; return n[0];").kind(), DiagnosticKind::TypeError);
}

#[test]
fn builtins_convert_and_inspect() {
    let output = run(
        r#"
        print(typeOf(1), typeOf(1.5), typeOf("s"), typeOf(null), typeOf([]));
        print(parseInt("12") + 1, parseDouble("1.5") * 2, toString(3.0));
        "#,
    );
    assert_eq!(output, "Integer Double String Null Array\n13 3.0 3.0\n");
}

#[test]
fn try_catch_binds_the_message() {
    let output = run(
        r#"
        try { throw "boom"; } catch (e) { print("caught " + e); }
        try { var x = 1 / 0; } catch (e) { print(e); } finally { print("done"); }
        "#,
    );
    assert_eq!(output, "caught boom\ndivision by zero\ndone\n");
}

#[test]
fn only_the_first_catch_clause_runs() {
    let output = run(r#"try { throw 1; } catch (a) { print("first"); } catch (b) { print("second"); }"#);
    assert_eq!(output, "first\n");
}

#[test]
fn finally_return_overrides_the_outcome() {
    let value = eval(
        r#"
        function f() {
            try { return 1; } finally { return 2; }
        }
        return f();
        "#,
    );
    assert_eq!(expect_int(&value), 2);
    let value = eval(
        r#"
        function g() {
            try { throw "lost"; } finally { return 3; }
        }
        return g();
        "#,
    );
    assert_eq!(expect_int(&value), 3);
}

#[test]
fn errors_in_a_catch_clause_escape_after_finally() {
    let (mut interpreter, output) = interpreter();
    let err = interpreter
        .interpret(
            r#"
            try { throw "first"; }
            catch (e) { print("caught " + e); throw "second"; }
            finally { print("cleanup"); }
            "#,
        )
        .unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Thrown);
    assert_eq!(err.message(), "second");
    assert_eq!(output.contents(), "caught first\ncleanup\n");
    assert_eq!(interpreter.scope_depth(), 1);

    let printed = run(
        r#"
        function risky() {
            try { throw "inner"; } catch (e) { throw e + "!"; } finally { print("finally"); }
        }
        try { risky(); } catch (e) { print("outer " + e); }
        "#,
    );
    assert_eq!(printed, "finally\nouter inner!\n");
}

#[test]
fn loop_signals_pass_through_try_and_run_finally() {
    let output = run(
        r#"
        for (var i = 0; i < 4; i++) {
            try {
                if (i == 1) continue;
                if (i == 3) break;
                print("body " + i);
            } catch (e) {
                print("caught");
            } finally {
                print("finally " + i);
            }
        }
        "#,
    );
    assert_eq!(
        output,
        "body 0\nfinally 0\nfinally 1\nbody 2\nfinally 2\nfinally 3\n"
    );
}

#[test]
fn return_inside_try_skips_the_catch_clause() {
    let output = run(
        r#"
        function pick() {
            try { return "try"; } catch (e) { return "catch"; }
            return "after";
        }
        print(pick());
        "#,
    );
    assert_eq!(output, "try\n");
}

#[test]
fn uncaught_throw_reports_position() {
    let err = eval_error("var a = 1;\n\n  throw \"bad\";");
    assert_eq!(err.kind(), DiagnosticKind::Thrown);
    assert_eq!(err.message(), "bad");
    assert_eq!(err.line(), 3);
    assert_eq!(err.column(), 3);
}

#[test]
fn break_outside_a_loop_is_a_runtime_error() {
    assert_eq!(eval_error("break;").kind(), DiagnosticKind::Runtime);
    assert_eq!(
        eval_error("function f() { continue; } f();").kind(),
        DiagnosticKind::Runtime
    );
}

#[test]
fn syntax_errors_carry_positions() {
    let err = eval_error("var s = \"bad \\q escape\";");
    assert_eq!(err.kind(), DiagnosticKind::SyntaxError);
    assert_eq!(err.line(), 1);
    let err = eval_error("var x = ;");
    assert_eq!(err.kind(), DiagnosticKind::SyntaxError);
    let err = eval_error("/# never closed");
    assert_eq!(err.kind(), DiagnosticKind::SyntaxError);
}

#[test]
fn comments_are_ignored() {
    let value = eval("## line comment\n/# block /# nested #/ #/ return 4;");
    assert_eq!(expect_int(&value), 4);
}

#[test]
fn enums_count_from_explicit_values() {
    let output = run("enum E { A, B, C = 10, D } print(E.A, E.B, E.C, E.D);");
    assert_eq!(output, "0 1 10 11\n");
    let err = eval_error("enum E { A } return E.Z;");
    assert_eq!(err.kind(), DiagnosticKind::NameError);
}

#[test]
fn structs_copy_defaults_per_value() {
    let output = run(
        r#"
        struct Point { x = 1; y = [0]; }
        var p = Point;
        p.x = 5;
        var q = Point;
        q.x = 7;
        print(p.x, q.x, Point.x);
        "#,
    );
    assert_eq!(output, "5 7 1\n");
}

#[test]
fn create_instance_builds_a_fresh_struct() {
    let output = run(
        r#"
        struct Point { x = 1; y = 2; }
        var p = Point.createInstance;
        p.x = 5;
        print(p, Point.createInstance, typeOf(p));
        "#,
    );
    assert_eq!(output, "Point{x=5, y=2} Point{x=1, y=2} Struct\n");
}

#[test]
fn self_containing_arrays_do_not_exhaust_the_stack() {
    let output = run(
        r#"
        var a = [1];
        append(a, a);
        print(a, "" + a, toString(a));
        var b = [1];
        append(b, b);
        print(a == b, a == [1]);
        class Holder { var items = a; }
        var h = new Holder();
        append(h.items, 2);
        print(h.items, a);
        "#,
    );
    assert_eq!(
        output,
        "[1, [...]] [1, [...]] [1, [...]]\ntrue false\n[1, [...], 2] [1, [...]]\n"
    );
}

#[test]
fn unknown_struct_field_is_a_name_error() {
    let err = eval_error("struct S { a; } var s = S; s.b = 1;");
    assert_eq!(err.kind(), DiagnosticKind::NameError);
}

#[test]
fn member_access_on_primitives_is_a_type_error() {
    let err = eval_error("var n = 1; return n.size;");
    assert_eq!(err.kind(), DiagnosticKind::TypeError);
}

#[test]
fn errors_leave_the_scope_stack_balanced() {
    let (mut interpreter, _) = interpreter();
    let err = interpreter
        .interpret("function f() { { var a = 1; throw \"x\"; } } f();")
        .unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Thrown);
    assert_eq!(interpreter.scope_depth(), 1);
    let value = interpreter.interpret("return 1 + 1;").unwrap();
    assert_eq!(expect_int(&value), 2);
}

#[test]
fn definitions_persist_between_calls() {
    let (mut interpreter, output) = interpreter();
    interpreter.interpret("var count = 1; function bump() { count++; }").unwrap();
    interpreter.interpret("bump(); bump();").unwrap();
    interpreter.interpret("print(count);").unwrap();
    assert_eq!(output.contents(), "3\n");
}

#[test]
fn last_expression_is_the_result() {
    assert_eq!(expect_int(&eval("var a = 2; a * 21;")), 42);
    assert!(eval("var a = 2;").is_null());
}

#[test]
fn hook_sees_statements_and_can_interrupt() {
    let (mut interpreter, _) = interpreter();
    let statements = Rc::new(Cell::new(0));
    let seen = Rc::clone(&statements);
    interpreter.set_hook(Box::new(move |event: &HookEvent<'_>| {
        if event.kind == HookEventKind::Statement {
            seen.set(seen.get() + 1);
        }
        if event.line >= 3 {
            HookControl::Interrupt
        } else {
            HookControl::Continue
        }
    }));
    let err = interpreter
        .interpret("var a = 1;\nvar b = 2;\nvar c = 3;")
        .unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Interrupted);
    assert_eq!(err.line(), 3);
    assert_eq!(statements.get(), 3);
    assert_eq!(expect_int(&interpreter.global("b").unwrap()), 2);
    assert!(interpreter.global("c").is_none());
}

#[test]
fn interruption_is_not_catchable() {
    let (mut interpreter, output) = interpreter();
    interpreter.set_hook(Box::new(StepBudget::new(50)));
    let err = interpreter
        .interpret(r#"try { while (true) { } } catch (e) { print("caught"); }"#)
        .unwrap_err();
    assert_eq!(err.kind(), DiagnosticKind::Interrupted);
    assert_eq!(output.contents(), "");
    assert_eq!(interpreter.scope_depth(), 1);

    interpreter.clear_hook();
    interpreter
        .interpret("var n = 0; while (n < 100) n++;")
        .expect("no budget once the hook is cleared");
    assert_eq!(expect_int(&interpreter.global("n").unwrap()), 100);
}

#[test]
fn repl_lines_share_one_interpreter() {
    let mut repl = Repl::with_interpreter(Interpreter::new().with_output(Output::Silent));
    repl.eval_line("var x = 20;");
    repl.eval_line("function bump() { x += 22; }");
    repl.eval_line("bump();");
    repl.eval_line("undefinedName;");
    assert_eq!(expect_int(&repl.interpreter().global("x").unwrap()), 42);
    assert_eq!(repl.interpreter().scope_depth(), 1);
}

#[test]
fn separate_interpreters_run_on_separate_threads() {
    let handles: Vec<_> = (0..4)
        .map(|n| {
            thread::spawn(move || {
                let mut interpreter = Interpreter::new().with_output(Output::Silent);
                let source = format!("var total = 0; for (i = 0; i <= {n}; i++) {{ total += i; }} total;");
                match interpreter.interpret(&source).map(|v| v.to_string()) {
                    Ok(text) => text,
                    Err(err) => err.to_string(),
                }
            })
        })
        .collect();
    let results: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread should not panic"))
        .collect();
    assert_eq!(results, vec!["0", "1", "3", "6"]);
}
