//! A C language frontend: preprocessing, diagnostics, and
//! translation-unit/compilation-unit aggregation.
//!
//! This crate stops at the boundary spec.md draws: it hands a caller a
//! [`token::TokenStream`] and a scanned list of top-level declarations,
//! not an expression-typed AST or generated code. See each module's
//! doc comment for the corresponding original-design source.

pub mod cu;
pub mod diagnostic;
pub mod error;
pub mod intern;
pub mod preprocessor;
pub mod source;
pub mod target;
pub mod token;
pub mod tu;
