//! Black-box compile-error scenarios from spec.md §8, checked against the
//! exact diagnostic text the parser is required to produce.

#[test]
fn reading_a_local_in_its_own_initializer_is_rejected() {
    let errs = wispc_lib::compile("{ var x = x; }").unwrap_err();
    assert!(errs.iter().any(|e| e.contains("Can't read local variable in its own initializer")));
}

#[test]
fn a_class_cannot_inherit_from_itself() {
    let errs = wispc_lib::compile("class A < A {}").unwrap_err();
    assert!(errs.iter().any(|e| e.contains("A class cannot inherit from itself")));
}

#[test]
fn top_level_return_is_rejected_with_the_exact_message() {
    let errs = wispc_lib::compile("return 1;").unwrap_err();
    assert!(errs.iter().any(|e| e.contains("Cannot return from top-level code.")));
}

#[test]
fn super_outside_any_class_is_rejected() {
    let errs = wispc_lib::compile("super.x;").unwrap_err();
    assert!(errs.iter().any(|e| e.contains("'super'")));
}

#[test]
fn super_in_a_class_with_no_superclass_is_rejected() {
    let errs = wispc_lib::compile("class A { m() { super.m(); } }").unwrap_err();
    assert!(errs.iter().any(|e| e.contains("no superclass")));
}

#[test]
fn returning_a_value_from_an_initializer_is_rejected() {
    let errs = wispc_lib::compile("class A { init() { return 1; } }").unwrap_err();
    assert!(errs.iter().any(|e| e.contains("Can't return a value from an initializer")));
}

#[test]
fn a_compiler_reports_every_error_not_just_the_first() {
    let errs = wispc_lib::compile("var 1 = 2; class B < B {}").unwrap_err();
    assert!(errs.len() >= 2);
}

#[test]
fn well_formed_programs_compile_cleanly() {
    assert!(wispc_lib::compile(
        "class Shape { area() { return 0; } } \
         class Circle < Shape { init(r) { this.r = r; } area() { return this.r * this.r * 3; } } \
         var shapes = [Circle(1), Circle(2)]; \
         for (var i = 0; i < 2; i = i + 1) { print shapes[i].area(); }"
    )
    .is_ok());
}
