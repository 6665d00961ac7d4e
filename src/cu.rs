//! Aggregates translation units into one export table (spec.md §4.6).
//!
//! Reimplemented from the teacher's index/TU-list handling (which
//! tracked libclang handles under a `clang-sys` index) as a native
//! mutex-guarded list, with `internal_link`'s export predicate taken
//! verbatim in meaning from
//! `examples/original_source/libCuik/lib/compilation_unit.c`
//! (`cuik_internal_link_compilation_unit`): non-static, non-inline
//! function declarations, and non-static/non-extern/non-typedef/
//! non-inline named globals that are not themselves function-typed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::source::LocId;
use crate::tu::{DeclOp, TranslationUnit};

struct Inner {
    units: Vec<TranslationUnit>,
    export_table: HashMap<Arc<str>, LocId>,
}

/// A set of translation units sharing one export namespace (spec.md §3
/// `CompilationUnit`). The original's `mtx_t*` lock guards the
/// head/tail/count fields it protects; `parking_lot::Mutex` plays the
/// same role here around the whole unit list. The original's separate
/// `lock`/`unlock` entry points fold into Rust's guard-based locking:
/// every method below that touches `inner` takes the lock itself rather
/// than requiring a caller to hold it across several calls.
pub struct CompilationUnit {
    inner: Mutex<Inner>,
}

impl CompilationUnit {
    pub fn create() -> CompilationUnit {
        CompilationUnit {
            inner: Mutex::new(Inner {
                units: Vec::new(),
                export_table: HashMap::new(),
            }),
        }
    }

    /// Attaches `tu`, failing if it is already attached to a
    /// compilation unit (spec.md §4.6 `add`, the attachment-uniqueness
    /// invariant; the original instead asserts `tu->next == NULL`).
    pub fn add(&self, mut tu: TranslationUnit) -> CoreResult<()> {
        if tu.attached {
            return Err(CoreError::AlreadyAttached);
        }
        tu.attached = true;
        let mut inner = self.inner.lock();
        inner.units.push(tu);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.inner.lock().units.len()
    }

    /// Rebuilds the export table by scanning every attached unit's
    /// top-level declarations (spec.md §4.6 `internal_link`).
    pub fn internal_link(&self) {
        let mut inner = self.inner.lock();
        let mut export_table = HashMap::new();

        for tu in &inner.units {
            for decl in &tu.top_level {
                match decl.op {
                    DeclOp::FuncDecl => {
                        if !decl.attrs.is_static && !decl.attrs.is_inline {
                            export_table.insert(decl.name.clone(), decl.loc);
                        }
                    }
                    DeclOp::GlobalDecl | DeclOp::Decl => {
                        if !decl.attrs.is_static
                            && !decl.attrs.is_extern
                            && !decl.attrs.is_typedef
                            && !decl.attrs.is_inline
                            && !decl.is_function_type
                        {
                            export_table.insert(decl.name.clone(), decl.loc);
                        }
                    }
                }
            }
        }

        inner.export_table = export_table;
    }

    pub fn exported_names(&self) -> Vec<Arc<str>> {
        self.inner.lock().export_table.keys().cloned().collect()
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.inner.lock().export_table.contains_key(name)
    }

    pub fn destroy(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::source::LocKind;
    use crate::token::{Token, TokenKind, TokenStream};
    use crate::tu::DeclAttrs;

    fn unit_with(decls: Vec<(&str, DeclOp, DeclAttrs, bool)>) -> TranslationUnit {
        let interner = Interner::new();
        let main_file = interner.intern("a.c");
        let mut stream = TokenStream::new(main_file.clone());
        let line = stream
            .locations
            .intern_line(main_file, 1, Arc::from(""), 0..0, LocId::NONE);
        stream.push(Token::new(TokenKind::Identifier, "x", LocId::NONE));

        let mut tu = TranslationUnit::new(stream);
        tu.top_level = decls
            .into_iter()
            .map(|(name, op, attrs, is_function_type)| crate::tu::Decl {
                op,
                name: Arc::from(name),
                attrs,
                loc: LocId::NONE,
                is_function_type,
            })
            .collect();
        let _ = line;
        tu
    }

    #[test]
    fn export_table_excludes_static_and_extern() {
        let cu = CompilationUnit::create();

        let public_fn = DeclAttrs::default();
        let static_fn = DeclAttrs { is_static: true, ..Default::default() };
        let extern_global = DeclAttrs { is_extern: true, ..Default::default() };
        let plain_global = DeclAttrs::default();

        let tu = unit_with(vec![
            ("do_work", DeclOp::FuncDecl, public_fn, true),
            ("helper", DeclOp::FuncDecl, static_fn, true),
            ("g_count", DeclOp::GlobalDecl, extern_global, false),
            ("g_version", DeclOp::GlobalDecl, plain_global, false),
        ]);

        cu.add(tu).unwrap();
        cu.internal_link();

        let exported = cu.exported_names();
        assert!(exported.iter().any(|n| &**n == "do_work"));
        assert!(exported.iter().any(|n| &**n == "g_version"));
        assert!(!exported.iter().any(|n| &**n == "helper"));
        assert!(!exported.iter().any(|n| &**n == "g_count"));
    }

    #[test]
    fn attaching_twice_is_rejected() {
        let cu_a = CompilationUnit::create();
        let cu_b = CompilationUnit::create();
        let tu = unit_with(vec![]);

        cu_a.add(tu).unwrap();
        let tu2 = unit_with(vec![]);
        cu_b.add(tu2).unwrap();
        // Re-adding the *same* translation unit object is prevented by
        // Rust's move semantics (the first `add` consumed `tu`); the
        // `attached` flag instead guards against a unit built, attached,
        // torn back out and re-attached by hand.
        let mut reattached = unit_with(vec![]);
        reattached.attached = true;
        assert!(matches!(cu_a.add(reattached), Err(CoreError::AlreadyAttached)));
    }
}
