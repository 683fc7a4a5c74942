//! The `compile` subcommand: reads textual IR (spec's `scatha_ir::irtext`
//! grammar), runs the optimization pipeline, lowers to MIR, assembles, and
//! writes the resulting `Target` to disk. Grounded on the stage sequence in
//! `examples/original_source/include/scatha/Invocation/CompilerInvocation.h`'s
//! `run()` (parse/sema → irgen → opt → codegen → asm → link) with the
//! parse/sema stages dropped: this workspace carries no lexer or parser, so
//! `compile` always runs the `FrontendType::Ir` path, taking already-built
//! IR text as input rather than Scatha source.
//!
//! `-O` picks a default optimization pipeline; `--pipeline` overrides it
//! outright (mirrors the original's "ignored unless optLevel is 0" caveat
//! by making the two mutually exclusive rather than layered, which is
//! simpler to reason about and equally expressive).

use crate::invocation::{CompilerCallbacks, Control, NullCallbacks};
use clap::Args;
use scatha_asm::Target;
use scatha_ir::context::Context;
use scatha_ir::pass::PassManager;
use scatha_mir::CodegenConfig;
use scatha_support::diagnostics::IssueHandler;
use scatha_support::ScathaError;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Input IR text files. Concatenated in order before parsing.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Optimization level (0-3); selects a default pass pipeline unless
    /// `--pipeline` is given.
    #[arg(short = 'O', default_value_t = 0)]
    pub opt_level: u8,

    /// Explicit pass-pipeline string (spec §4.5 grammar); overrides `-O`.
    #[arg(long)]
    pub pipeline: Option<String>,

    /// Also write `<output>.debug.json` (source map) and
    /// `<output>.symtab.json` (symbol table) alongside the binary.
    #[arg(long)]
    pub debug: bool,

    /// Output path for the assembled binary.
    #[arg(short = 'o', long = "output", default_value = "a.out")]
    pub output: PathBuf,

    /// FFI library names, in declaration-slot order, for functions declared
    /// `foreign`.
    #[arg(short = 'L', long = "lib")]
    pub libraries: Vec<String>,

    /// Name of the function the assembled binary starts execution at.
    #[arg(long, default_value = "main")]
    pub entry: String,

    /// Print wall-clock time spent in each compilation stage.
    #[arg(long)]
    pub time: bool,

    /// Increase log verbosity. Repeatable (`-v`, `-vv`).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runs the `compile` subcommand and returns a process exit code.
pub fn execute(args: CompileArgs) -> i32 {
    scatha_support::logging::init(args.verbose);
    let mut callbacks = NullCallbacks;
    match run(&args, &mut callbacks) {
        Ok(issues) => {
            report_issues(&issues);
            issues.exit_code()
        }
        Err(err) => {
            log::error!("{err}");
            1
        }
    }
}

fn default_pipeline(level: u8) -> &'static str {
    match level {
        0 => "",
        1 => "mem2reg,simplify-cfg,dce",
        2 => "mem2reg,sroa,simplify-cfg,inst-combine,gvn,dce",
        _ => "mem2reg,sroa,simplify-cfg,inst-combine,gvn,\
              inline(mem2reg,sroa,inst-combine,dce),\
              tail-rec-elim,loop-canonicalize,global-dce,dce,simplify-cfg",
    }
}

fn timed<T>(args: &CompileArgs, stage: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    if args.time {
        println!("{stage}: {:?}", start.elapsed());
    }
    result
}

fn run(args: &CompileArgs, callbacks: &mut dyn CompilerCallbacks) -> Result<IssueHandler, ScathaError> {
    let issues = IssueHandler::new();
    let mut ctx = Context::new();

    let mut text = String::new();
    for path in &args.files {
        text.push_str(&std::fs::read_to_string(path)?);
        text.push('\n');
    }

    let mut module = timed(args, "irgen", || scatha_ir::irtext::parse(&mut ctx, &text)).map_err(|e| ScathaError::ir_gen(e.to_string()))?;

    if callbacks.after_irgen(&ctx, &module) == Control::Stop {
        return Ok(issues);
    }

    let pipeline_text = args.pipeline.as_deref().unwrap_or_else(|| default_pipeline(args.opt_level));
    if !pipeline_text.is_empty() {
        let manager = PassManager::parse(pipeline_text).map_err(|e| ScathaError::pipeline(e.to_string()))?;
        timed(args, "optimize", || manager.run_to_fixpoint(&mut ctx, &mut module)).map_err(|e| ScathaError::pipeline(e.to_string()))?;
    }

    if callbacks.after_opt(&ctx, &module) == Control::Stop {
        return Ok(issues);
    }

    let mir = timed(args, "codegen", || scatha_mir::lower_module(&ctx, &module, CodegenConfig::default()));

    if callbacks.after_codegen(&ctx, &mir) == Control::Stop {
        return Ok(issues);
    }

    // `assemble` wants a `'static` entry name; the CLI only ever hands it
    // one per process, so leaking the (tiny, one-time) string is cheaper
    // than threading a lifetime through the whole assembler for a value
    // that outlives the process either way.
    let entry: &'static str = Box::leak(args.entry.clone().into_boxed_str());
    let assembled = timed(args, "assemble", || scatha_asm::assemble(&ctx, &module, &mir, &args.libraries, entry)).map_err(|e| ScathaError::assembly(e.to_string()))?;

    if callbacks.after_asm(&assembled) == Control::Stop {
        return Ok(issues);
    }

    let debug_info = args.debug.then(|| assembled.debug_info.clone());
    let target = Target::new(assembled.to_bytes(), debug_info);

    if callbacks.after_binary(&target) == Control::Stop {
        return Ok(issues);
    }

    let (dir, base_name) = split_output(&args.output);
    timed(args, "write", || target.write_to_disk(dir, base_name))?;

    Ok(issues)
}

fn split_output(output: &Path) -> (&Path, &str) {
    let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let base_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("a.out");
    (dir, base_name)
}

fn report_issues(issues: &IssueHandler) {
    for issue in issues.iter() {
        eprintln!("{issue}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_ir(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn compiles_a_trivial_module_to_a_binary_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_ir(dir.path(), "main.ir", "func @main() -> i64 {\nentry:\n  return i64 0\n}\n");
        let out = dir.path().join("out.scbin");
        let args = CompileArgs {
            files: vec![input],
            opt_level: 0,
            pipeline: None,
            debug: true,
            output: out.clone(),
            libraries: Vec::new(),
            entry: "main".to_string(),
            time: false,
            verbose: 0,
        };
        let mut callbacks = NullCallbacks;
        let issues = run(&args, &mut callbacks).expect("compiles");
        assert!(!issues.has_errors());
        assert!(out.exists());
        assert!(dir.path().join("out.scbin.debug.json").exists());
        assert!(dir.path().join("out.scbin.symtab.json").exists());
    }

    #[test]
    fn missing_entry_function_surfaces_as_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_ir(dir.path(), "lib.ir", "func @helper() -> void {\nentry:\n  return void\n}\n");
        let args = CompileArgs {
            files: vec![input],
            opt_level: 0,
            pipeline: None,
            debug: false,
            output: dir.path().join("out.scbin"),
            libraries: Vec::new(),
            entry: "main".to_string(),
            time: false,
            verbose: 0,
        };
        let mut callbacks = NullCallbacks;
        let err = run(&args, &mut callbacks).unwrap_err();
        assert!(matches!(err, ScathaError::Assembly { .. }));
    }

    #[test]
    fn an_irgen_stop_callback_skips_every_later_stage() {
        struct StopEarly;
        impl CompilerCallbacks for StopEarly {
            fn after_irgen(&mut self, _ctx: &Context, _module: &scatha_ir::module::Module) -> Control {
                Control::Stop
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let input = write_ir(dir.path(), "main.ir", "func @main() -> i64 {\nentry:\n  return i64 0\n}\n");
        let args = CompileArgs {
            files: vec![input],
            opt_level: 0,
            pipeline: None,
            debug: false,
            output: dir.path().join("out.scbin"),
            libraries: Vec::new(),
            entry: "main".to_string(),
            time: false,
            verbose: 0,
        };
        let mut callbacks = StopEarly;
        run(&args, &mut callbacks).expect("stopping is not an error");
        assert!(!dir.path().join("out.scbin").exists());
    }
}
