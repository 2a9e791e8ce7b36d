//! Black-box programs exercised end to end: compile, then interpret,
//! checking the `InterpretResult` rather than peeking at VM internals.

use wisp_runtime::{InterpretResult, VM};

fn run(source: &str) -> InterpretResult {
    match wispc_lib::compile(source) {
        Ok(function) => VM::new().interpret(function),
        Err(_) => InterpretResult::CompileError,
    }
}

#[test]
fn arithmetic_and_string_concatenation() {
    assert_eq!(run("print 1 + 2 * 3; print \"a\" + \"b\";"), InterpretResult::Ok);
}

#[test]
fn closure_counter_shares_state_across_calls() {
    assert_eq!(
        run(
            "func make_counter() { \
                 var count = 0; \
                 func counter() { count = count + 1; return count; } \
                 return counter; \
             } \
             var c1 = make_counter(); \
             var c2 = make_counter(); \
             print c1(); print c1(); print c2();"
        ),
        InterpretResult::Ok
    );
}

#[test]
fn single_inheritance_with_super_call() {
    assert_eq!(
        run(
            "class Animal { speak() { print \"...\"; } } \
             class Dog < Animal { speak() { super.speak(); print \"Woof\"; } } \
             Dog().speak();"
        ),
        InterpretResult::Ok
    );
}

#[test]
fn initializer_sets_instance_state_used_by_methods() {
    assert_eq!(
        run(
            "class Counter { init(start) { this.n = start; } tick() { this.n = this.n + 1; return this.n; } } \
             var k = Counter(5); \
             print k.tick(); \
             print k.tick();"
        ),
        InterpretResult::Ok
    );
}

#[test]
fn array_build_index_and_store() {
    assert_eq!(run("var a = [1, 2, 3]; a[0] = a[2]; print a[0];"), InterpretResult::Ok);
}

#[test]
fn reading_an_uninitialized_local_in_its_own_initializer_is_a_compile_error() {
    assert_eq!(run("{ var x = x; }"), InterpretResult::CompileError);
}

#[test]
fn self_inheriting_class_is_a_compile_error() {
    assert_eq!(run("class A < A {}"), InterpretResult::CompileError);
}

#[test]
fn top_level_return_is_a_compile_error() {
    assert_eq!(run("return 1;"), InterpretResult::CompileError);
}

#[test]
fn super_outside_a_class_is_a_compile_error() {
    assert_eq!(run("super.x;"), InterpretResult::CompileError);
}

#[test]
fn adding_a_number_to_a_string_is_not_a_type_error() {
    // Numbers coerce to their formatted text when added to a string
    // (Open Question 3) rather than raising a runtime error.
    assert_eq!(run("print 1 + \"a\";"), InterpretResult::Ok);
}

#[test]
fn calling_a_non_callable_value_is_a_runtime_error() {
    assert_eq!(run("var f = 1; f();"), InterpretResult::RuntimeError);
}

#[test]
fn out_of_bounds_array_access_is_a_runtime_error() {
    assert_eq!(run("print [1, 2][5];"), InterpretResult::RuntimeError);
}

#[test]
fn importing_math_makes_its_functions_callable() {
    assert_eq!(run("import(\"math\"); print sqrt(16);"), InterpretResult::Ok);
}

#[test]
fn importing_an_unknown_library_is_not_a_hard_failure() {
    assert_eq!(run("print import(\"not-a-real-library\");"), InterpretResult::Ok);
}

#[test]
fn vm_recovers_after_a_runtime_error_for_repl_style_reuse() {
    let mut vm = VM::new();
    let bad = wispc_lib::compile("var f = 1; f();").unwrap();
    assert_eq!(vm.interpret(bad), InterpretResult::RuntimeError);
    let good = wispc_lib::compile("print \"still alive\";").unwrap();
    assert_eq!(vm.interpret(good), InterpretResult::Ok);
}
