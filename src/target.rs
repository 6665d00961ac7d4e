//! Per-architecture target descriptors: predefined macros, the builtin
//! function name table, and builtin type-checking (spec.md §4.4).
//!
//! Reimplemented from the teacher's `clang-sys` target-triple plumbing
//! (which only ever forwarded a triple string to libclang) generalized
//! into an owned registry, with the x86-64 descriptor's exact
//! predefines and builtin set taken from
//! `examples/original_source/libCuik/lib/targets/x64_desc.c`.
//! `create_prototype`/`pass_parameter`/`compile_builtin` and the rest of
//! the backend-ABI hooks in that file assume a downstream IR module this
//! crate stops short of (spec.md Non-goals: "no code generation, no
//! backend IR construction"), so [`TargetDesc`] only carries the hooks
//! that make sense on this side of the boundary; see DESIGN.md's Open
//! Question decisions.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::preprocessor::CppState;

/// Instruction-set architecture a [`TargetDesc`] describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
}

/// Host/ABI flavor, independent of architecture (spec.md §4.4
/// "predefines differ by system as well as architecture").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum System {
    Windows,
    Linux,
}

/// A plugged-in per-architecture descriptor: predefines, the name set
/// of intrinsics it recognizes, and a minimal arity/type check for
/// each (spec.md §3 `TargetDesc`).
pub struct TargetDesc {
    pub arch: Arch,
    builtins: HashSet<&'static str>,
    set_defines: fn(&mut CppState, System),
    type_check_builtin: fn(name: &str, arg_count: usize) -> Result<(), String>,
}

impl TargetDesc {
    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Injects this architecture's predefined macros into `cpp` for the
    /// given `system` (spec.md §4.4 `set_defines`).
    pub fn set_defines(&self, cpp: &mut CppState, system: System) {
        (self.set_defines)(cpp, system)
    }

    /// Checks a call to one of this target's builtins by name and arity
    /// (spec.md §4.4 `type_check_builtin`). The original's version also
    /// checks argument *types* against a live `TranslationUnit`'s
    /// semantic state; without an expression-typed AST on this side of
    /// the boundary (spec.md §1, minimal declaration scanner only) this
    /// is narrowed to the arity check the original performs first.
    pub fn type_check_builtin(&self, name: &str, arg_count: usize) -> Result<(), String> {
        (self.type_check_builtin)(name, arg_count)
    }
}

fn generic_defines(cpp: &mut CppState, system: System) {
    cpp.define("__STDC__", "1");
    cpp.define("__STDC_HOSTED__", "1");
    match system {
        System::Windows => cpp.define("_WIN32", "1"),
        System::Linux => cpp.define("__linux__", "1"),
    }
}

fn x64_set_defines(cpp: &mut CppState, system: System) {
    generic_defines(cpp, system);
    match system {
        System::Windows => {
            cpp.define("_M_X64", "100");
            cpp.define("_AMD64_", "100");
            cpp.define("_M_AMD64", "100");
        }
        System::Linux => {
            cpp.define("__x86_64__", "1");
            cpp.define("__amd64", "1");
            cpp.define("__amd64__", "1");
        }
    }
}

fn x64_type_check_builtin(name: &str, arg_count: usize) -> Result<(), String> {
    match name {
        "_mm_setcsr" => {
            if arg_count != 1 {
                return Err(format!("{} requires 1 arguments", name));
            }
            Ok(())
        }
        "_mm_getcsr" => {
            if arg_count != 0 {
                return Err(format!("{} requires 0 arguments", name));
            }
            Ok(())
        }
        other => Err(format!("unimplemented builtin '{}'", other)),
    }
}

fn x64_desc() -> TargetDesc {
    TargetDesc {
        arch: Arch::X86_64,
        builtins: ["_mm_getcsr", "_mm_setcsr"].into_iter().collect(),
        set_defines: x64_set_defines,
        type_check_builtin: x64_type_check_builtin,
    }
}

static X64: OnceLock<TargetDesc> = OnceLock::new();

/// Looks up the process-wide descriptor for `arch` (spec.md §4.4
/// "pluggable per-architecture registry, a static singleton").
pub fn get_target_desc(arch: Arch) -> &'static TargetDesc {
    match arch {
        Arch::X86_64 => X64.get_or_init(x64_desc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use std::sync::Arc;

    #[test]
    fn windows_and_linux_predefines_differ() {
        let interner = Arc::new(Interner::new());
        let mut win = CppState::new(interner.clone());
        let mut linux = CppState::new(interner.clone());
        let desc = get_target_desc(Arch::X86_64);

        desc.set_defines(&mut win, System::Windows);
        desc.set_defines(&mut linux, System::Linux);

        assert!(win.macros.contains_key("_M_X64"));
        assert!(!win.macros.contains_key("__x86_64__"));
        assert!(linux.macros.contains_key("__x86_64__"));
        assert!(!linux.macros.contains_key("_M_X64"));
    }

    #[test]
    fn builtin_arity_is_checked() {
        let desc = get_target_desc(Arch::X86_64);
        assert!(desc.is_builtin("_mm_getcsr"));
        assert!(desc.type_check_builtin("_mm_getcsr", 0).is_ok());
        assert!(desc.type_check_builtin("_mm_getcsr", 1).is_err());
        assert!(desc.type_check_builtin("_mm_setcsr", 1).is_ok());
        assert!(desc.type_check_builtin("unknown_builtin", 0).is_err());
    }
}
