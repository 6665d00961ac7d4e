//! Tokenizer, file search, macro table, and conditional-compilation
//! stack (spec.md §4.3).
//!
//! There is no teacher module to generalize here — the teacher wraps
//! libclang's own preprocessor and never re-implements one — so this is
//! grounded directly on spec.md §4.3's numbered design and on
//! `examples/other_examples/…armake2…preprocess.rs.rs` for the general
//! shape of a hand-written Rust preprocessor (`Definition` with an
//! optional parameter list standing for the object-like/function-like
//! split, a `Token` enum distinguishing macro invocations from plain
//! text). Macro backtraces are wired through [`crate::source`] exactly
//! as spec.md §4.3 step 4 describes.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{CoreError, CoreResult, ErrorStatus};
use crate::intern::{Interner, Symbol};
use crate::source::{LocId, LocKind};
use crate::token::{Token, TokenKind, TokenStream};

/// An object-like or function-like `#define` binding (spec.md §3
/// `Macro`).
#[derive(Clone)]
pub struct Macro {
    pub name: Symbol,
    /// `None` for an object-like macro; `Some(params)` for a
    /// function-like macro (possibly with zero parameters).
    pub params: Option<Vec<Symbol>>,
    pub is_variadic: bool,
    pub replacement: Vec<String>,
    pub def_loc: LocId,
}

enum CondState {
    /// Tokens are being emitted.
    Active,
    /// This branch's condition was false, but a sibling `#elif`/`#else`
    /// could still become active.
    Inactive,
    /// An earlier sibling branch in this `#if` chain was active, so no
    /// later sibling can become active.
    Done,
}

struct CondFrame {
    state: CondState,
    /// Once a branch in this chain has been active, siblings are
    /// permanently `Done` regardless of their own condition.
    ever_active: bool,
}

/// Preprocessor state: macro table, include search paths, conditional
/// stack, and the per-invocation "blue paint" bookkeeping lives on the
/// stack of [`expand_line`] calls rather than here (spec.md §3
/// `CppState`).
pub struct CppState {
    pub macros: HashMap<Symbol, Macro>,
    pub user_search_paths: Vec<PathBuf>,
    pub system_search_paths: Vec<PathBuf>,
    interner: Arc<Interner>,
    file_cache: HashMap<PathBuf, Arc<str>>,
    finalized: bool,
}

impl CppState {
    pub fn new(interner: Arc<Interner>) -> CppState {
        CppState {
            macros: HashMap::new(),
            user_search_paths: Vec::new(),
            system_search_paths: Vec::new(),
            interner,
            file_cache: HashMap::new(),
            finalized: false,
        }
    }

    /// Injects a macro definition as if from a command-line `-D`
    /// (spec.md §4.3 `define`). The definition location is a synthetic
    /// `<command-line>` line, so it is skipped like any other synthetic
    /// frame when walking up for a display location.
    pub fn define(&mut self, key: &str, value: &str) {
        let name = self.interner.intern(key);
        self.macros.insert(
            name.clone(),
            Macro {
                name,
                params: None,
                is_variadic: false,
                replacement: vec![value.to_string()],
                def_loc: LocId::NONE,
            },
        );
    }

    /// Yields every macro's key, value, and definition location
    /// (spec.md §4.3 `for_defines`).
    pub fn for_defines(&self) -> impl Iterator<Item = (&Symbol, String, LocId)> {
        self.macros
            .values()
            .map(|m| (&m.name, m.replacement.join(" "), m.def_loc))
    }

    /// Marks the macro table final; no further mutation is expected
    /// after this point (spec.md §4.3 `finalize`).
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Releases cached file contents. Idiomatic Rust gives us automatic
    /// double-free safety via ownership, but spec.md §5 calls for an
    /// explicit, detectable double-destroy, so this consumes `self`.
    pub fn deinit(self) {
        drop(self);
    }

    fn read_file(&mut self, path: &Path) -> CoreResult<Arc<str>> {
        if let Some(cached) = self.file_cache.get(path) {
            return Ok(cached.clone());
        }
        let text = fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let arc: Arc<str> = Arc::from(text);
        self.file_cache.insert(path.to_path_buf(), arc.clone());
        Ok(arc)
    }

    /// Resolves an `#include` path. `"…"` search order is the including
    /// file's own directory, then user search paths, then system
    /// search paths; `<…>` skips the including file's directory (spec.md
    /// §4.3 step 1).
    fn resolve_include(&self, including_dir: &Path, name: &str, angled: bool) -> Option<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if !angled {
            candidates.push(including_dir.join(name));
        }
        for path in self.user_search_paths.iter().chain(self.system_search_paths.iter()) {
            candidates.push(path.join(name));
        }
        candidates.into_iter().find(|p| p.exists())
    }
}

/// Drives preprocessing of one translation-unit root file (spec.md
/// §4.3 `preprocess_simple`). `system_libs` are appended to the search
/// order after `user_search_paths`.
#[instrument(skip(state, err, interner))]
pub fn preprocess_simple(
    state: &mut CppState,
    path: &Path,
    system_libs: &[PathBuf],
    user_search_paths: &[PathBuf],
    interner: &Arc<Interner>,
    err: &ErrorStatus,
) -> CoreResult<TokenStream> {
    state.user_search_paths = user_search_paths.to_vec();
    state.system_search_paths = system_libs.to_vec();

    let main_file = interner.intern(&path.to_string_lossy());
    let mut stream = TokenStream::new(main_file);

    let mut painted = HashSet::new();
    process_file(state, &mut stream, path, LocId::NONE, interner, err, &mut painted)?;
    Ok(stream)
}

#[instrument(skip_all, fields(path = %path.display()))]
fn process_file(
    state: &mut CppState,
    stream: &mut TokenStream,
    path: &Path,
    include_site: LocId,
    interner: &Arc<Interner>,
    err: &ErrorStatus,
    painted: &mut HashSet<Symbol>,
) -> CoreResult<()> {
    let text = state.read_file(path)?;
    let filepath = interner.intern(&path.to_string_lossy());
    let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

    debug!(file = %path.display(), "preprocessing file");

    let mut conditionals: Vec<CondFrame> = Vec::new();

    for (zero_based_line, raw_line) in text.split('\n').enumerate() {
        let line_number = (zero_based_line + 1) as u32;
        let line_text = raw_line.strip_suffix('\r').unwrap_or(raw_line);

        let trimmed = line_text.trim_start();
        let active = conditionals.iter().all(|f| matches!(f.state, CondState::Active));

        if let Some(directive) = trimmed.strip_prefix('#') {
            handle_directive(
                state,
                stream,
                &mut conditionals,
                filepath.clone(),
                line_number,
                Arc::from(line_text),
                directive.trim_start(),
                active,
                path,
                &dir,
                include_site,
                interner,
                err,
            )?;
            continue;
        }

        if !active {
            continue;
        }

        tokenize_line(
            state,
            stream,
            filepath.clone(),
            line_number,
            Arc::from(line_text),
            line_text,
            include_site,
            interner,
            err,
            painted,
        )?;
    }

    if !conditionals.is_empty() {
        crate::diagnostic::report_header(
            crate::diagnostic::Severity::Error,
            &format!("unbalanced #if in {}", path.display()),
        );
        err.bump(crate::diagnostic::Severity::Error);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_directive(
    state: &mut CppState,
    stream: &mut TokenStream,
    conditionals: &mut Vec<CondFrame>,
    filepath: Symbol,
    line_number: u32,
    buffer: Arc<str>,
    directive: &str,
    active: bool,
    current_file: &Path,
    current_dir: &Path,
    include_site: LocId,
    interner: &Arc<Interner>,
    err: &ErrorStatus,
) -> CoreResult<()> {
    let mut parts = directive.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();

    match keyword {
        "if" => {
            let value = active && eval_condition(state, rest) != 0;
            conditionals.push(CondFrame {
                state: if value { CondState::Active } else { CondState::Inactive },
                ever_active: value,
            });
        }
        "ifdef" => {
            let value = active && state.macros.contains_key(&interner.intern(rest));
            conditionals.push(CondFrame {
                state: if value { CondState::Active } else { CondState::Inactive },
                ever_active: value,
            });
        }
        "ifndef" => {
            let value = active && !state.macros.contains_key(&interner.intern(rest));
            conditionals.push(CondFrame {
                state: if value { CondState::Active } else { CondState::Inactive },
                ever_active: value,
            });
        }
        "elif" => {
            if conditionals.is_empty() {
                report_unbalanced(current_file, line_number, err);
            } else {
                let parent_active = conditionals[..conditionals.len() - 1]
                    .iter()
                    .all(|f| matches!(f.state, CondState::Active));
                let value = if parent_active { eval_condition(state, rest) != 0 } else { false };
                let frame = conditionals.last_mut().unwrap();
                if frame.ever_active || !parent_active {
                    frame.state = CondState::Done;
                } else {
                    frame.state = if value { CondState::Active } else { CondState::Inactive };
                    frame.ever_active = value;
                }
            }
        }
        "else" => match conditionals.last_mut() {
            Some(frame) => {
                if frame.ever_active {
                    frame.state = CondState::Done;
                } else {
                    frame.state = CondState::Active;
                    frame.ever_active = true;
                }
            }
            None => report_unbalanced(current_file, line_number, err),
        },
        "endif" => {
            if conditionals.pop().is_none() {
                report_unbalanced(current_file, line_number, err);
            }
        }
        "define" if active => {
            define_macro(state, stream, rest, interner, filepath, line_number, buffer)
        }
        "undef" if active => {
            state.macros.remove(&interner.intern(rest.trim()));
        }
        "include" if active => {
            include_file(state, stream, rest, current_dir, include_site, interner, err)?;
        }
        "pragma" | "error" | "warning" | "line" => {
            // Accepted but not acted on: out of scope per spec.md §1.
        }
        other if active => {
            crate::diagnostic::report_header(
                crate::diagnostic::Severity::Error,
                &format!("{}:{}: unknown directive '#{}'", current_file.display(), line_number, other),
            );
            err.bump(crate::diagnostic::Severity::Error);
        }
        _ => {}
    }

    Ok(())
}

fn report_unbalanced(file: &Path, line: u32, err: &ErrorStatus) {
    crate::diagnostic::report_header(
        crate::diagnostic::Severity::Error,
        &format!("{}:{}: unbalanced conditional directive", file.display(), line),
    );
    err.bump(crate::diagnostic::Severity::Error);
}

fn define_macro(
    state: &mut CppState,
    stream: &mut TokenStream,
    rest: &str,
    interner: &Arc<Interner>,
    filepath: Symbol,
    line_number: u32,
    buffer: Arc<str>,
) {
    let rest = rest.trim_start();
    let name_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let (name, mut tail) = rest.split_at(name_end);

    let (params, is_variadic) = if tail.starts_with('(') {
        let close = tail.find(')').unwrap_or(tail.len());
        let param_text = &tail[1..close];
        tail = &tail[(close + 1).min(tail.len())..];
        let is_variadic = param_text.trim_end().ends_with("...");
        let params = param_text
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty() && *p != "...")
            .map(|p| interner.intern(p))
            .collect();
        (Some(params), is_variadic)
    } else {
        (None, false)
    };

    let replacement = lex_replacement(tail.trim());

    // The definition location points at the macro name within the
    // `#define` line, matching spec.md §4.3 step 4 ("whose SourceLoc.
    // expansion points to the #define's name location"). `rest`/`name`
    // are slices of the file's own buffer, not of `buffer` (a separate
    // `Arc<str>` allocation with identical bytes), so the name's column
    // is found by content within `buffer` rather than by pointer
    // arithmetic across the two allocations.
    let column = buffer
        .find("define")
        .map(|after_hash| after_hash + "define".len())
        .and_then(|after_keyword| {
            let tail = &buffer[after_keyword..];
            let ws = tail.len() - tail.trim_start().len();
            buffer[after_keyword + ws..].find(name).map(|p| after_keyword + ws + p)
        })
        .unwrap_or(0);
    let def_line = stream.locations.intern_line(filepath, line_number, buffer.clone(), 0..buffer.len(), LocId::NONE);
    let def_loc = stream.locations.make_loc(def_line, column as u32, name.len() as u32, LocKind::File, LocId::NONE);

    let symbol = interner.intern(name);
    state.macros.insert(
        symbol.clone(),
        Macro {
            name: symbol,
            params,
            is_variadic,
            replacement,
            def_loc,
        },
    );
}

fn include_file(
    state: &mut CppState,
    stream: &mut TokenStream,
    rest: &str,
    current_dir: &Path,
    include_site: LocId,
    interner: &Arc<Interner>,
    err: &ErrorStatus,
) -> CoreResult<()> {
    let rest = rest.trim();
    let (angled, name) = if let Some(stripped) = rest.strip_prefix('<') {
        (true, stripped.trim_end_matches('>'))
    } else if let Some(stripped) = rest.strip_prefix('"') {
        (false, stripped.trim_end_matches('"'))
    } else {
        (false, rest)
    };

    match state.resolve_include(current_dir, name, angled) {
        Some(resolved) => {
            let mut painted = HashSet::new();
            process_file(state, stream, &resolved, include_site, interner, err, &mut painted)
        }
        None => {
            warn!(%name, angled, "include file not found on any search path");
            crate::diagnostic::report_header(
                crate::diagnostic::Severity::Error,
                &format!("cannot find include file '{}'", name),
            );
            err.bump(crate::diagnostic::Severity::Error);
            Ok(())
        }
    }
}

/// Tiny integer algebra for `#if`/`#elif` constant expressions (spec.md
/// §4.3 step 3). Supports `defined(X)`, decimal integers, and
/// `! + - * / % < <= > >= == != && || ( )`, left-to-right with minimal
/// precedence — enough for the conditionals a header-generation driver
/// actually needs, not a full C constant-expression evaluator.
fn eval_condition(state: &CppState, expr: &str) -> i64 {
    let mut tokens = lex_condition(expr);
    let mut pos = 0;
    eval_or(state, &mut tokens, &mut pos)
}

fn lex_condition(expr: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            if ["&&", "||", "==", "!=", "<=", ">=", "<<", ">>"].contains(&two.as_str()) {
                tokens.push(two);
                i += 2;
            } else {
                tokens.push(c.to_string());
                i += 1;
            }
        }
    }
    tokens
}

fn eval_or(state: &CppState, tokens: &[String], pos: &mut usize) -> i64 {
    let mut lhs = eval_and(state, tokens, pos);
    while tokens.get(*pos).map(String::as_str) == Some("||") {
        *pos += 1;
        let rhs = eval_and(state, tokens, pos);
        lhs = ((lhs != 0) || (rhs != 0)) as i64;
    }
    lhs
}

fn eval_and(state: &CppState, tokens: &[String], pos: &mut usize) -> i64 {
    let mut lhs = eval_cmp(state, tokens, pos);
    while tokens.get(*pos).map(String::as_str) == Some("&&") {
        *pos += 1;
        let rhs = eval_cmp(state, tokens, pos);
        lhs = ((lhs != 0) && (rhs != 0)) as i64;
    }
    lhs
}

fn eval_cmp(state: &CppState, tokens: &[String], pos: &mut usize) -> i64 {
    let lhs = eval_sum(state, tokens, pos);
    if let Some(op) = tokens.get(*pos).map(String::as_str) {
        if ["==", "!=", "<", "<=", ">", ">="].contains(&op) {
            let op = op.to_string();
            *pos += 1;
            let rhs = eval_sum(state, tokens, pos);
            return match op.as_str() {
                "==" => (lhs == rhs) as i64,
                "!=" => (lhs != rhs) as i64,
                "<" => (lhs < rhs) as i64,
                "<=" => (lhs <= rhs) as i64,
                ">" => (lhs > rhs) as i64,
                ">=" => (lhs >= rhs) as i64,
                _ => unreachable!(),
            };
        }
    }
    lhs
}

fn eval_sum(state: &CppState, tokens: &[String], pos: &mut usize) -> i64 {
    let mut lhs = eval_unary(state, tokens, pos);
    loop {
        match tokens.get(*pos).map(String::as_str) {
            Some("+") => {
                *pos += 1;
                lhs += eval_unary(state, tokens, pos);
            }
            Some("-") => {
                *pos += 1;
                lhs -= eval_unary(state, tokens, pos);
            }
            _ => break,
        }
    }
    lhs
}

fn eval_unary(state: &CppState, tokens: &[String], pos: &mut usize) -> i64 {
    match tokens.get(*pos).map(String::as_str) {
        Some("!") => {
            *pos += 1;
            (eval_unary(state, tokens, pos) == 0) as i64
        }
        Some("-") => {
            *pos += 1;
            -eval_unary(state, tokens, pos)
        }
        Some("defined") => {
            *pos += 1;
            let paren = tokens.get(*pos).map(String::as_str) == Some("(");
            if paren {
                *pos += 1;
            }
            let name = tokens.get(*pos).cloned().unwrap_or_default();
            *pos += 1;
            if paren && tokens.get(*pos).map(String::as_str) == Some(")") {
                *pos += 1;
            }
            state
                .macros
                .keys()
                .any(|k| k.as_str() == name)
                .then_some(1)
                .unwrap_or(0)
        }
        Some("(") => {
            *pos += 1;
            let value = eval_or(state, tokens, pos);
            if tokens.get(*pos).map(String::as_str) == Some(")") {
                *pos += 1;
            }
            value
        }
        Some(tok) => {
            let value = tok.parse::<i64>().unwrap_or(0);
            *pos += 1;
            value
        }
        None => 0,
    }
}

/// Classifies and pushes the tokens of one non-directive physical line,
/// expanding any macro invocations found (spec.md §4.3 steps 2 and 4).
#[allow(clippy::too_many_arguments)]
fn tokenize_line(
    state: &mut CppState,
    stream: &mut TokenStream,
    filepath: Symbol,
    line_number: u32,
    buffer: Arc<str>,
    text: &str,
    include_site: LocId,
    interner: &Arc<Interner>,
    err: &ErrorStatus,
    painted: &mut HashSet<Symbol>,
) -> CoreResult<()> {
    let line_id = stream
        .locations
        .intern_line(filepath, line_number, buffer.clone(), 0..buffer.len(), include_site);

    let words = lex_words(text);
    let mut i = 0;
    while i < words.len() {
        let (start, word) = &words[i];
        if is_ident_start(word) {
            if let Some(mac) = state.macros.get(word.as_str()).cloned() {
                if !painted.contains(&mac.name) {
                    let invocation_start = *start;
                    let (consumed, expanded) = expand_macro(state, &mac, &words, i, painted, err);
                    let last_idx = (i + consumed).saturating_sub(1).min(words.len() - 1);
                    let (last_start, last_word) = &words[last_idx];
                    let invocation_len = (last_start + last_word.len()).saturating_sub(invocation_start).max(1);

                    // The invocation site becomes the parent of a synthetic
                    // `<temp>` line backing the expansion, so `SourceLine.
                    // parent`/`root_line` reach back to the file (spec.md
                    // §4.3 step 4, §9's location forest).
                    let invocation_loc =
                        stream.locations.make_loc(line_id, invocation_start as u32, invocation_len as u32, LocKind::File, LocId::NONE);
                    let synth_text: Arc<str> = Arc::from(expanded.join(" "));
                    let synth_line = stream.locations.intern_line(
                        interner.intern("<temp>"),
                        line_number,
                        synth_text.clone(),
                        0..synth_text.len(),
                        invocation_loc,
                    );

                    let mut cursor = 0usize;
                    for piece in &expanded {
                        push_token(stream, synth_line, cursor, piece.len() as u32, LocKind::Macro, mac.def_loc, piece);
                        cursor += piece.len() + 1;
                    }
                    i += consumed;
                    continue;
                }
            }
            push_token(stream, line_id, *start, word.len() as u32, LocKind::File, LocId::NONE, word);
        } else {
            push_token(stream, line_id, *start, word.len() as u32, LocKind::File, LocId::NONE, word);
        }
        i += 1;
    }
    Ok(())
}

fn push_token(stream: &mut TokenStream, line_id: crate::source::LineId, column: usize, length: u32, kind: LocKind, expansion: LocId, spelling: &str) {
    let loc = stream.locations.make_loc(line_id, column as u32, length, kind, expansion);
    let token_kind = classify(spelling);
    stream.push(Token::new(token_kind, spelling, loc));
}

fn classify(word: &str) -> TokenKind {
    const KEYWORDS: &[&str] = &[
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
        "typedef", "union", "unsigned", "void", "volatile", "while",
    ];
    if word.is_empty() {
        TokenKind::Eof
    } else if word.starts_with("//") || word.starts_with("/*") {
        TokenKind::Comment
    } else if is_ident_start(word) {
        if KEYWORDS.contains(&word) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        }
    } else if word.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
        || word.starts_with('"')
        || word.starts_with('\'')
    {
        TokenKind::Literal
    } else {
        TokenKind::Punctuation
    }
}

fn is_ident_start(word: &str) -> bool {
    word.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
}

/// A crude word-level lexer good enough for macro expansion and the
/// minimal top-level scanner: splits on whitespace and punctuation but
/// keeps quoted literals intact. Returns `(byte offset, word)` pairs.
fn lex_words(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            while i < bytes.len() && bytes[i] as char != quote {
                if bytes[i] as char == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
        } else if c.is_alphanumeric() || c == '_' {
            while i < bytes.len() && ((bytes[i] as char).is_alphanumeric() || bytes[i] as char == '_') {
                i += 1;
            }
        } else {
            i += 1;
        }
        out.push((start, text[start..i].to_string()));
    }
    out
}

/// Tokenizes a `#define` replacement body the same way `lex_words` would,
/// then merges adjacent `#` `#` words into one `##` paste-operator token
/// so `expand_macro` sees it as a single piece rather than two stringize
/// operators.
fn lex_replacement(text: &str) -> Vec<String> {
    let words = lex_words(text);
    let mut out: Vec<String> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let word = &words[i].1;
        if word == "#" && words.get(i + 1).map(|(_, w)| w.as_str()) == Some("#") {
            out.push("##".to_string());
            i += 2;
        } else {
            out.push(word.clone());
            i += 1;
        }
    }
    out
}

/// Expands one function-like or object-like macro invocation starting
/// at `words[at]`. Returns the number of input words consumed and the
/// replacement text pieces, with the invoking macro name blue-painted
/// for the duration of expanding its own body (spec.md §9 "blue paint
/// for macros").
fn expand_macro(
    state: &CppState,
    mac: &Macro,
    words: &[(usize, String)],
    at: usize,
    painted: &mut HashSet<Symbol>,
    err: &ErrorStatus,
) -> (usize, Vec<String>) {
    painted.insert(mac.name.clone());

    let (consumed, args) = match &mac.params {
        None => (1, Vec::new()),
        Some(params) => {
            if words.get(at + 1).map(|(_, w)| w.as_str()) != Some("(") {
                painted.remove(&mac.name);
                return (1, vec![words[at].1.clone()]);
            }
            let mut depth = 0;
            let mut j = at + 1;
            let mut current = String::new();
            let mut collected = Vec::new();
            loop {
                let w = words.get(j).map(|(_, w)| w.as_str()).unwrap_or("");
                if w == "(" {
                    depth += 1;
                    if depth > 1 {
                        current.push_str(w);
                        current.push(' ');
                    }
                } else if w == ")" {
                    depth -= 1;
                    if depth == 0 {
                        if !current.trim().is_empty() || !collected.is_empty() || !params.is_empty() {
                            collected.push(current.trim().to_string());
                        }
                        j += 1;
                        break;
                    } else {
                        current.push_str(w);
                        current.push(' ');
                    }
                } else if w == "," && depth == 1 {
                    collected.push(current.trim().to_string());
                    current.clear();
                } else {
                    current.push_str(w);
                    current.push(' ');
                }
                if j >= words.len() {
                    break;
                }
                j += 1;
            }
            (j - at, collected)
        }
    };

    let mut out = Vec::new();
    let mut i = 0;
    while i < mac.replacement.len() {
        let piece = &mac.replacement[i];
        if piece == "#" {
            if let (Some(params), Some(next)) = (&mac.params, mac.replacement.get(i + 1)) {
                if let Some(idx) = params.iter().position(|p| p.as_str() == next) {
                    out.push(format!("\"{}\"", args.get(idx).cloned().unwrap_or_default().replace('"', "\\\"")));
                    i += 2;
                    continue;
                }
            }
            out.push(piece.clone());
        } else if piece == "##" {
            let lhs = out.pop().unwrap_or_default();
            let next = mac.replacement.get(i + 1).cloned().unwrap_or_default();
            let rhs = substitute(&next, &mac.params, &args);
            let pasted = format!("{}{}", lhs, rhs);
            if lex_words(&pasted).len() > 1 {
                crate::diagnostic::report_header(
                    crate::diagnostic::Severity::Error,
                    &format!("pasting '{}' and '{}' does not give a valid token", lhs, rhs),
                );
                err.bump(crate::diagnostic::Severity::Error);
            }
            out.push(pasted);
            i += 2;
        } else {
            out.push(substitute(piece, &mac.params, &args));
            i += 1;
        }
    }

    painted.remove(&mac.name);
    (consumed.max(1), out)
}

fn substitute(piece: &str, params: &Option<Vec<Symbol>>, args: &[String]) -> String {
    if let Some(params) = params {
        if let Some(idx) = params.iter().position(|p| p.as_str() == piece) {
            return args.get(idx).cloned().unwrap_or_default();
        }
    }
    piece.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_state() -> (CppState, Arc<Interner>) {
        let interner = Arc::new(Interner::new());
        (CppState::new(interner.clone()), interner)
    }

    #[test]
    fn define_and_for_defines_round_trip() {
        let (mut state, _interner) = new_state();
        state.define("X", "Y");
        let defs: Vec<_> = state.for_defines().map(|(k, v, _)| (k.to_string(), v)).collect();
        assert_eq!(defs, vec![("X".to_string(), "Y".to_string())]);
    }

    #[test]
    fn simple_object_macro_expands() {
        let (mut state, interner) = new_state();
        state.define("FOO", "42");
        let err = ErrorStatus::new();
        let mut stream = TokenStream::new(interner.intern("<temp>"));
        let mut painted = HashSet::new();
        tokenize_line(
            &mut state,
            &mut stream,
            interner.intern("a.c"),
            1,
            Arc::from("int x = FOO;"),
            "int x = FOO;",
            LocId::NONE,
            &interner,
            &err,
            &mut painted,
        )
        .unwrap();
        let spellings: Vec<_> = stream.tokens.iter().map(|t| t.spelling.as_str()).collect();
        assert!(spellings.contains(&"42"));
        assert!(!spellings.contains(&"FOO"));
    }

    #[test]
    fn conditional_evaluates_constant_expression() {
        let (state, _interner) = new_state();
        assert_eq!(eval_condition(&state, "1 + 1 == 2"), 1);
        assert_eq!(eval_condition(&state, "0"), 0);
    }

    #[test]
    fn function_like_macro_substitutes_parameter() {
        let (mut state, interner) = new_state();
        let err = ErrorStatus::new();
        let path = std::env::temp_dir().join(format!("cfrontend-test-sqr-{}.c", std::process::id()));
        std::fs::write(&path, "#define SQR(x) ((x)*(x))\nint y = SQR(1);\n").unwrap();
        let stream = preprocess_simple(&mut state, &path, &[], &[], &interner, &err).unwrap();
        let _ = std::fs::remove_file(&path);

        let spellings: Vec<_> = stream.tokens.iter().map(|t| t.spelling.as_str()).collect();
        assert!(spellings.contains(&"1"), "parameter 'x' should have been substituted with '1', got {:?}", spellings);
        assert!(spellings.contains(&"*"));
        assert!(!spellings.iter().any(|s| s.contains("x")), "unsubstituted parameter leaked through: {:?}", spellings);
    }

    #[test]
    fn ifdef_gates_emission() {
        let (mut state, interner) = new_state();
        state.define("ENABLED", "1");
        let err = ErrorStatus::new();
        let path = std::env::temp_dir().join(format!("cfrontend-test-{}.c", std::process::id()));
        std::fs::write(&path, "#ifdef ENABLED\nint on;\n#else\nint off;\n#endif\n").unwrap();
        let stream = preprocess_simple(&mut state, &path, &[], &[], &interner, &err).unwrap();
        let _ = std::fs::remove_file(&path);
        let spellings: Vec<_> = stream.tokens.iter().map(|t| t.spelling.as_str()).collect();
        assert!(spellings.contains(&"on"));
        assert!(!spellings.contains(&"off"));
    }
}
