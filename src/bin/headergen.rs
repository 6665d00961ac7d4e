//! CLI driver: preprocesses one root file and prints its `#define`s and
//! top-level declarations, mirroring
//! `examples/original_source/drivers/headergen_driver.c`'s
//! `da_visitor`/`CUIKPP_FOR_DEFINES` walk in Rust idiom. The original's
//! `-> TB_Module`/code-generation half is out of scope here (spec.md
//! Non-goals: no backend IR), so this driver stops at declaration
//! printing.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cfrontend::error::{CoreError, CoreResult, ErrorStatus};
use cfrontend::intern::Interner;
use cfrontend::preprocessor::{preprocess_simple, CppState};
use cfrontend::target::{get_target_desc, Arch, System};
use cfrontend::tu::{DeclOp, TranslationUnit};

/// Preprocesses a C source file and prints its macro table and
/// top-level declarations.
#[derive(Parser)]
#[command(name = "headergen")]
struct Args {
    /// Root C file to preprocess.
    root_file: PathBuf,

    /// Print `#line`-annotated tokens instead of declarations.
    #[arg(long)]
    dump_tokens: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    let interner = Arc::new(Interner::new());
    let mut cpp = CppState::new(interner.clone());

    let target = get_target_desc(Arch::X86_64);
    let system = if cfg!(windows) { System::Windows } else { System::Linux };
    target.set_defines(&mut cpp, system);

    let search_paths = match installation_search_paths() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    let err = ErrorStatus::new();

    let tokens = match preprocess_simple(&mut cpp, &args.root_file, &[], &search_paths, &interner, &err) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if args.dump_tokens {
        dump_tokens(&tokens);
        cpp.finalize();
        return 0;
    }

    let tu = TranslationUnit::new(tokens);

    for (key, value, loc) in cpp.for_defines() {
        if tu.is_in_main_file(loc) {
            println!("#define {} {}", key, value);
        }
    }

    cpp.finalize();

    tu.visit_top_level(|decl| {
        if !tu.is_in_main_file(decl.loc) {
            return;
        }
        match decl.op {
            DeclOp::FuncDecl | DeclOp::GlobalDecl | DeclOp::Decl => {
                println!("func {}();", decl.name);
            }
        }
    });

    if cfrontend::diagnostic::has_reports(cfrontend::diagnostic::Severity::Error, &err) {
        1
    } else {
        0
    }
}

/// Mirrors the original's "step out two directories from the
/// executable, then look under include/ and src/" search-path
/// discovery. Fails the way `get_exe_path`/`step_out_dir` do in
/// `headergen_driver.c` when the executable's own path can't be
/// resolved, rather than silently falling back to the current
/// directory.
fn installation_search_paths() -> CoreResult<Vec<PathBuf>> {
    let exe = std::env::current_exe().map_err(|source| CoreError::Io {
        path: PathBuf::from("<current executable>"),
        source,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| {
        CoreError::Internal("could not locate executable path".to_string())
    })?;

    let install_root = exe_dir.ancestors().nth(2).ok_or_else(|| {
        CoreError::Internal("could not locate executable path".to_string())
    })?;

    Ok(vec![install_root.join("include"), install_root.join("src")])
}

fn dump_tokens(tokens: &cfrontend::token::TokenStream) {
    let mut last_file: Option<String> = None;
    let mut last_line = 0u32;

    for token in &tokens.tokens {
        let loc = tokens.locations.get_loc(token.loc);
        let line = tokens.locations.get_line(loc.line);

        if last_file.as_deref() != Some(line.filepath.as_str()) && line.filepath.as_str() != "<temp>" {
            let escaped = line.filepath.as_str().replace('\\', "\\\\");
            print!("\n#line {} \"{}\"\t", line.line, escaped);
            last_file = Some(line.filepath.as_str().to_string());
        }

        if last_line != line.line {
            print!("\n/* line {:3} */\t", line.line);
            last_line = line.line;
        }

        print!("{} ", token.spelling);
    }
    println!();
}
