//! End-to-end coverage across the preprocessor, translation-unit
//! scanner, and compilation-unit export filter (spec.md §8's concrete
//! scenarios).

use std::io::Write;
use std::sync::Arc;

use cfrontend::cu::CompilationUnit;
use cfrontend::diagnostic::{self, Severity};
use cfrontend::error::ErrorStatus;
use cfrontend::intern::Interner;
use cfrontend::preprocessor::{preprocess_simple, CppState};
use cfrontend::source::LocKind;
use cfrontend::target::{get_target_desc, Arch, System};
use cfrontend::tu::TranslationUnit;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".c").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Scenario 1: a nested macro invocation's expansion chain reaches the
/// definition site when followed through `SourceLine.parent`.
#[test]
fn macro_backtrace_chain_reaches_definition_site() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("#define SQR(x) ((x)*(x))\nint y = SQR(SQR(1));\n");
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();

    assert!(!stream.is_empty());
    assert!(!err.has_reports(Severity::Error));

    let macro_token = stream
        .tokens
        .iter()
        .find(|t| matches!(stream.locations.get_loc(t.loc).kind, LocKind::Macro))
        .expect("expected at least one token produced by macro expansion");

    let loc = stream.locations.get_loc(macro_token.loc);
    let line = stream.locations.get_line(loc.line);
    assert!(line.is_synthetic(), "macro-expanded tokens should live on a synthetic <temp> line");

    // the synthetic line's parent is the invocation site, on the physical
    // line that calls SQR
    assert!(!line.parent.is_none(), "synthetic line should be parented at the invocation site");
    let invocation_loc = stream.locations.get_loc(line.parent);
    let invocation_line = stream.locations.get_line(invocation_loc.line);
    assert!(!invocation_line.is_synthetic());
    assert_eq!(invocation_line.line, 2);

    // the token's own expansion loc walks back to the #define's name
    assert!(!loc.expansion.is_none(), "macro-expanded tokens should carry a def_loc back to their #define");
    let def_display = stream.locations.display_location(loc.expansion);
    assert_eq!(def_display.line, 1);

    // the expanded text reflects the macro body, not the unexpanded
    // invocation
    let expanded: Vec<&str> = stream
        .tokens
        .iter()
        .filter(|t| matches!(stream.locations.get_loc(t.loc).kind, LocKind::Macro))
        .map(|t| t.spelling.as_str())
        .collect();
    assert!(expanded.contains(&"*"), "expected the macro body's '*' to survive expansion, got {:?}", expanded);
}

/// Scenario 2: thin-errors mode suppresses previews but still tallies.
#[test]
fn thin_errors_still_tallies_without_preview() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("int f() { return; }\n");
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();

    diagnostic::ENGINE.set_thin_errors(true);
    let loc = stream.tokens.first().map(|t| t.loc).unwrap();
    diagnostic::report(Severity::Error, Some(&err), &stream, loc, "example diagnostic");
    diagnostic::ENGINE.set_thin_errors(false);

    assert_eq!(err.count(Severity::Error), 1);
}

/// Scenario 3: the export filter keeps exactly the non-static,
/// non-extern, non-typedef, non-inline, non-function-typed globals and
/// the non-static, non-inline functions.
#[test]
fn export_filter_matches_expected_set() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp(
        "static int a;\nextern int b;\nint c;\ntypedef int d;\ninline int e(){}\nint f(){}\n",
    );
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();
    let tu = TranslationUnit::new(stream);

    let cu = CompilationUnit::create();
    cu.add(tu).unwrap();
    cu.internal_link();

    let mut exported: Vec<String> = cu.exported_names().iter().map(|n| n.to_string()).collect();
    exported.sort();
    assert_eq!(exported, vec!["c".to_string(), "f".to_string()]);
}

/// Scenario 4: two translation units attached concurrently both land in
/// the same compilation unit.
#[test]
fn concurrent_attach_yields_expected_count() {
    let interner = Arc::new(Interner::new());
    let cu = Arc::new(CompilationUnit::create());

    let make_tu = |contents: &str| {
        let mut cpp = CppState::new(interner.clone());
        let err = ErrorStatus::new();
        let file = write_temp(contents);
        let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();
        TranslationUnit::new(stream)
    };

    let tu_a = make_tu("int one(){}\n");
    let tu_b = make_tu("int two(){}\n");

    let cu_a = cu.clone();
    let cu_b = cu.clone();
    let handle_a = std::thread::spawn(move || cu_a.add(tu_a).unwrap());
    let handle_b = std::thread::spawn(move || cu_b.add(tu_b).unwrap());
    handle_a.join().unwrap();
    handle_b.join().unwrap();

    assert_eq!(cu.count(), 2);
}

/// Scenario 5: per-target predefines differ by system.
#[test]
fn predefines_differ_by_system() {
    let interner = Arc::new(Interner::new());
    let target = get_target_desc(Arch::X86_64);

    let mut windows = CppState::new(interner.clone());
    target.set_defines(&mut windows, System::Windows);
    let windows_defs: Vec<String> = windows.for_defines().map(|(k, _, _)| k.to_string()).collect();
    assert!(windows_defs.contains(&"_M_X64".to_string()));
    assert!(windows_defs.contains(&"_M_AMD64".to_string()));

    let mut linux = CppState::new(interner.clone());
    target.set_defines(&mut linux, System::Linux);
    let linux_defs: Vec<String> = linux.for_defines().map(|(k, _, _)| k.to_string()).collect();
    assert!(linux_defs.contains(&"__x86_64__".to_string()));
    assert!(linux_defs.contains(&"__amd64".to_string()));
    assert!(linux_defs.contains(&"__amd64__".to_string()));
}

/// Round-trip: a file containing only one `#define` yields exactly one
/// `for_defines` entry.
#[test]
fn single_define_round_trips_exactly_once() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("#define X Y\n");
    preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();

    let defs: Vec<_> = cpp.for_defines().collect();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].0.as_str(), "X");
    assert_eq!(defs[0].1, "Y");
}

/// Idempotence: calling `internal_link` twice has the same effect as
/// calling it once.
#[test]
fn internal_link_is_idempotent() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("int exported(){}\nstatic int hidden(){}\n");
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();
    let tu = TranslationUnit::new(stream);

    let cu = CompilationUnit::create();
    cu.add(tu).unwrap();

    cu.internal_link();
    let first: Vec<String> = {
        let mut v: Vec<String> = cu.exported_names().iter().map(|n| n.to_string()).collect();
        v.sort();
        v
    };

    cu.internal_link();
    let second: Vec<String> = {
        let mut v: Vec<String> = cu.exported_names().iter().map(|n| n.to_string()).collect();
        v.sort();
        v
    };

    assert_eq!(first, second);
}

/// P6: attaching an already-attached translation unit is rejected.
#[test]
fn attachment_uniqueness_is_enforced() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("int only(){}\n");
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();
    let mut tu = TranslationUnit::new(stream);
    tu.attached = true;

    let cu = CompilationUnit::create();
    assert!(cu.add(tu).is_err());
}

/// Scenario 6: `report_two_spots` with same-line locations tallies
/// exactly once and does not panic laying out two carets on one line.
#[test]
fn same_line_two_spot_report_tallies_once() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("int abc = def;\n");
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();

    let mut it = stream.tokens.iter();
    let loc1 = it.clone().nth(1).unwrap().loc;
    let loc2 = it.nth(3).map(|t| t.loc).unwrap_or(loc1);

    diagnostic::report_two_spots(
        Severity::Error,
        Some(&err),
        &stream,
        loc1,
        loc2,
        "conflicting declaration",
        "first here",
        "second here",
        None,
    );

    assert_eq!(err.count(Severity::Error), 1);
}

/// P2: `is_in_main_file` follows the location forest to the root file.
#[test]
fn main_file_predicate_matches_root_file() {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());
    let err = ErrorStatus::new();

    let file = write_temp("#define ONE 1\nint value = ONE;\n");
    let stream = preprocess_simple(&mut cpp, file.path(), &[], &[], &interner, &err).unwrap();
    let tu = TranslationUnit::new(stream);

    for decl in &tu.top_level {
        assert!(tu.is_in_main_file(decl.loc));
    }
}
