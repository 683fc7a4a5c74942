//! The staged pipeline a single compiler invocation drives through, with
//! per-stage callbacks a caller can use to inspect intermediate artifacts
//! and stop early (spec §4.10), grounded on
//! `examples/original_source/include/scatha/Invocation/CompilerInvocation.h`'s
//! `CompilerCallbacks` struct and `stop()`/`continueCompilation` flag.
//!
//! The original distinguishes a `Scatha` frontend (parse + sema + IR-gen)
//! from an `IR` frontend (IR text straight in). This workspace has no
//! lexer/parser crate, so `FrontendType::Scatha` is kept only to mirror
//! that framing; the driver can only ever select `Ir`.

use scatha_asm::{AssembledOutput, Target};
use scatha_ir::context::Context;
use scatha_ir::module::Module as IrModule;
use scatha_mir::module::Module as MirModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendType {
    Scatha,
    Ir,
}

/// Returned by a callback to decide whether compilation proceeds past the
/// stage that just ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Per-stage inspection hooks. Every method defaults to `Continue` so a
/// caller only overrides the stages it cares about.
pub trait CompilerCallbacks {
    fn after_irgen(&mut self, _ctx: &Context, _module: &IrModule) -> Control {
        Control::Continue
    }

    fn after_opt(&mut self, _ctx: &Context, _module: &IrModule) -> Control {
        Control::Continue
    }

    fn after_codegen(&mut self, _ctx: &Context, _module: &MirModule) -> Control {
        Control::Continue
    }

    fn after_asm(&mut self, _output: &AssembledOutput) -> Control {
        Control::Continue
    }

    fn after_binary(&mut self, _target: &Target) -> Control {
        Control::Continue
    }
}

/// The callback set the CLI runs with: never stops, inspects nothing.
pub struct NullCallbacks;

impl CompilerCallbacks for NullCallbacks {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct StopAfterIrgen;
    impl CompilerCallbacks for StopAfterIrgen {
        fn after_irgen(&mut self, _ctx: &Context, _module: &IrModule) -> Control {
            Control::Stop
        }
    }

    #[test]
    fn default_callbacks_never_stop() {
        let mut cb = NullCallbacks;
        let ctx = Context::new();
        let module = IrModule::new();
        assert_eq!(cb.after_irgen(&ctx, &module), Control::Continue);
        assert_eq!(cb.after_opt(&ctx, &module), Control::Continue);
    }

    #[test]
    fn a_callback_can_request_stop() {
        let mut cb = StopAfterIrgen;
        let ctx = Context::new();
        let module = IrModule::new();
        assert_eq!(cb.after_irgen(&ctx, &module), Control::Stop);
    }
}
