//! Lexed pieces of source files.
//!
//! Reimplemented from the teacher's `token.rs` (`TokenKind`, `Token`),
//! which wrapped a `CXToken`; here a token owns a packed source-location
//! reference into a [`SourceLocStore`] instead of an opaque libclang
//! handle, and the token stream also owns the location table it was
//! produced against (spec.md §3 `TokenStream`).

use crate::source::{LocId, SourceLocStore};

/// Categorization of a token (spec.md §3 `Token.kind`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Literal,
    Punctuation,
    Comment,
    Eof,
}

/// A lexed piece of a source file: its kind, the byte range `[start,
/// end)` it occupies in its originating buffer, and the location it
/// resolves to in the owning stream's [`SourceLocStore`].
#[derive(Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub spelling: String,
    pub loc: LocId,
}

impl Token {
    pub fn new(kind: TokenKind, spelling: impl Into<String>, loc: LocId) -> Token {
        Token {
            kind,
            spelling: spelling.into(),
            loc,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("kind", &self.kind)
            .field("spelling", &self.spelling)
            .finish()
    }
}

/// Ordered sequence of tokens plus the location table they were
/// produced against (spec.md §3 `TokenStream`). Produced by the
/// preprocessor, read-only afterward.
pub struct TokenStream {
    pub tokens: Vec<Token>,
    pub locations: SourceLocStore,
    pub main_file: crate::intern::Symbol,
}

impl TokenStream {
    pub fn new(main_file: crate::intern::Symbol) -> TokenStream {
        TokenStream {
            tokens: Vec::new(),
            locations: SourceLocStore::new(),
            main_file,
        }
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
