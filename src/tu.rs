//! Translation units: the top-level declarations scanned out of one
//! preprocessed file (spec.md §4.5).
//!
//! Reimplemented from the teacher's `TranslationUnit` (which wrapped a
//! `CXTranslationUnit` produced by libclang's full parser) as a much
//! narrower owner of a [`TokenStream`] plus the minimal declaration
//! scanner spec.md §1/§4.5 calls for — no expression or statement
//! grammar, just enough to find `STMT_FUNC_DECL` / `STMT_GLOBAL_DECL` /
//! `STMT_DECL` sites for `cu.rs`'s export-table filter, grounded on
//! `examples/original_source/libCuik/lib/compilation_unit.c`'s use of
//! those three operation tags.

use std::sync::Arc;

use crate::source::LocId;
use crate::token::{Token, TokenKind, TokenStream};

/// Which kind of top-level declaration a [`Decl`] represents (spec.md
/// §4.5, matching the `STMT_*` tags `internal_link` switches on).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeclOp {
    FuncDecl,
    GlobalDecl,
    Decl,
}

/// Storage-class and linkage attributes recognized by the scanner
/// (spec.md §4.5 `Decl.attrs`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclAttrs {
    pub is_static: bool,
    pub is_extern: bool,
    pub is_inline: bool,
    pub is_typedef: bool,
}

/// A minimally-scanned top-level declaration: its op, name, attributes,
/// and source location. No expression or type grammar is kept beyond
/// this (spec.md Non-goals: "no expression or statement grammar").
#[derive(Clone)]
pub struct Decl {
    pub op: DeclOp,
    pub name: Arc<str>,
    pub attrs: DeclAttrs,
    pub loc: LocId,
    /// `true` once a `(` follows the name, distinguishing a function
    /// declaration's `KIND_FUNC` type from an ordinary global.
    pub is_function_type: bool,
}

/// One file's scanned top-level declarations, linked into a
/// [`crate::cu::CompilationUnit`] at most once (spec.md §4.5
/// `TranslationUnit`).
pub struct TranslationUnit {
    pub tokens: TokenStream,
    pub top_level: Vec<Decl>,
    /// Set by [`crate::cu::CompilationUnit::add`]; used to enforce the
    /// attachment-uniqueness invariant (spec.md invariant: "a TU.next
    /// pointer is null until attached, and only becomes non-null
    /// once").
    pub attached: bool,
    pub debug_info: bool,
}

impl TranslationUnit {
    /// Scans `tokens` for top-level declarations and returns the owning
    /// translation unit (spec.md §4.5 "create").
    pub fn new(tokens: TokenStream) -> TranslationUnit {
        let top_level = scan_top_level(&tokens);
        TranslationUnit {
            tokens,
            top_level,
            attached: false,
            debug_info: false,
        }
    }

    /// True iff `loc` resolves to a line whose root ancestor is the
    /// translation unit's main file (spec.md §4.5 `is_in_main_file`,
    /// "walking to the topmost non-synthetic ancestor line").
    pub fn is_in_main_file(&self, loc: LocId) -> bool {
        let source_loc = self.tokens.locations.get_loc(loc);
        let root = self.tokens.locations.root_line(source_loc.line);
        self.tokens.locations.get_line(root).filepath == self.tokens.main_file
    }

    /// Calls `visitor` once per top-level declaration (spec.md §4.5
    /// `visit_top_level`). `user_data` stands in for the original's
    /// opaque `void*` callback context; a closure capturing state plays
    /// the same role in Rust.
    pub fn visit_top_level<F: FnMut(&Decl)>(&self, mut visitor: F) {
        for decl in &self.top_level {
            visitor(decl);
        }
    }

    pub fn destroy(self) {
        drop(self);
    }
}

/// Minimal storage-class/name/typedef scanner (spec.md §1 "a narrow
/// top-level declaration scanner: storage class, name, typedef — no
/// expression or statement grammar"). Scans the token stream for
/// `ident* ident ( ... ) { ... }`-shaped function declarations and
/// `ident* ident ;`-shaped globals, tracking brace depth so only
/// depth-0 declarations are recorded.
fn scan_top_level(tokens: &TokenStream) -> Vec<Decl> {
    const STORAGE_CLASSES: &[&str] = &["static", "extern", "inline", "typedef"];
    const TYPE_KEYWORDS: &[&str] = &[
        "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
        "const", "volatile", "struct", "union", "enum", "restrict",
    ];

    let mut decls = Vec::new();
    let mut depth = 0usize;
    let mut i = 0usize;
    let words = &tokens.tokens;

    while i < words.len() {
        let tok = &words[i];
        match tok.spelling.as_str() {
            "{" => {
                depth += 1;
                i += 1;
                continue;
            }
            "}" => {
                depth = depth.saturating_sub(1);
                i += 1;
                continue;
            }
            _ => {}
        }

        if depth != 0 {
            i += 1;
            continue;
        }

        if tok.kind != TokenKind::Keyword && tok.kind != TokenKind::Identifier {
            i += 1;
            continue;
        }

        let start = i;
        let mut attrs = DeclAttrs::default();
        let mut saw_type = false;

        while i < words.len() {
            let word = words[i].spelling.as_str();
            if STORAGE_CLASSES.contains(&word) {
                match word {
                    "static" => attrs.is_static = true,
                    "extern" => attrs.is_extern = true,
                    "inline" => attrs.is_inline = true,
                    "typedef" => attrs.is_typedef = true,
                    _ => {}
                }
                i += 1;
            } else if TYPE_KEYWORDS.contains(&word) {
                saw_type = true;
                i += 1;
            } else if words[i].kind == TokenKind::Punctuation && word == "*" {
                i += 1;
            } else {
                break;
            }
        }

        if !saw_type || i >= words.len() || words[i].kind != TokenKind::Identifier {
            i = (start + 1).max(i);
            continue;
        }

        let name: Arc<str> = Arc::from(words[i].spelling.as_str());
        let loc = words[i].loc;
        i += 1;

        let is_function_type = words.get(i).map(|t| t.spelling.as_str()) == Some("(");

        if is_function_type {
            let mut paren_depth = 0;
            while i < words.len() {
                match words[i].spelling.as_str() {
                    "(" => paren_depth += 1,
                    ")" => {
                        paren_depth -= 1;
                        if paren_depth == 0 {
                            i += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }

            decls.push(Decl { op: DeclOp::FuncDecl, name, attrs, loc, is_function_type });

            // Skip a following `{ ... }` body, if any, rather than
            // scanning it for nested top-level declarations.
            if words.get(i).map(|t| t.spelling.as_str()) == Some("{") {
                let mut body_depth = 0;
                loop {
                    match words.get(i).map(|t| t.spelling.as_str()) {
                        Some("{") => body_depth += 1,
                        Some("}") => {
                            body_depth -= 1;
                            if body_depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        None => break,
                        _ => {}
                    }
                    i += 1;
                }
            } else {
                // Skip to the terminating `;` of a bare prototype.
                while i < words.len() && words[i].spelling != ";" {
                    i += 1;
                }
                i += 1;
            }
        } else {
            decls.push(Decl {
                op: DeclOp::GlobalDecl,
                name,
                attrs,
                loc,
                is_function_type: false,
            });
            while i < words.len() && words[i].spelling != ";" {
                i += 1;
            }
            i += 1;
        }
    }

    decls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::source::LocKind;

    fn push(stream: &mut TokenStream, line: crate::source::LineId, spelling: &str, kind: TokenKind) {
        let loc = stream.locations.make_loc(line, 0, spelling.len() as u32, LocKind::File, LocId::NONE);
        stream.push(Token::new(kind, spelling, loc));
    }

    #[test]
    fn scans_static_function_and_exported_global() {
        let interner = Interner::new();
        let main_file = interner.intern("a.c");
        let mut stream = TokenStream::new(main_file.clone());
        let line = stream
            .locations
            .intern_line(main_file, 1, Arc::from(""), 0..0, LocId::NONE);

        for (s, k) in [
            ("static", TokenKind::Keyword),
            ("int", TokenKind::Keyword),
            ("helper", TokenKind::Identifier),
            ("(", TokenKind::Punctuation),
            (")", TokenKind::Punctuation),
            ("{", TokenKind::Punctuation),
            ("}", TokenKind::Punctuation),
            ("int", TokenKind::Keyword),
            ("counter", TokenKind::Identifier),
            (";", TokenKind::Punctuation),
        ] {
            push(&mut stream, line, s, k);
        }

        let tu = TranslationUnit::new(stream);
        assert_eq!(tu.top_level.len(), 2);
        assert_eq!(tu.top_level[0].op, DeclOp::FuncDecl);
        assert!(tu.top_level[0].attrs.is_static);
        assert_eq!(&*tu.top_level[1].name, "counter");
        assert_eq!(tu.top_level[1].op, DeclOp::GlobalDecl);
    }
}
