//! Hard pipeline errors: failures that abort the current stage outright,
//! as opposed to the soft, accumulating issues in [`crate::diagnostics`].

use thiserror::Error;

/// Errors that abort a compiler stage rather than being recorded as an
/// issue and survived. Each stage of the pipeline (IR-gen, optimization,
/// codegen, assembly) returns `ScathaResult<T>` and propagates with `?`.
#[derive(Error, Debug, Clone)]
pub enum ScathaError {
    #[error("pipeline error: {message}")]
    Pipeline { message: String },

    #[error("IR generation error: {message}")]
    IrGen { message: String },

    #[error("code generation error: {message}")]
    Codegen { message: String },

    #[error("assembly error: {message}")]
    Assembly { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

pub type ScathaResult<T> = Result<T, ScathaError>;

impl ScathaError {
    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline { message: message.into() }
    }

    pub fn ir_gen(message: impl Into<String>) -> Self {
        Self::IrGen { message: message.into() }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen { message: message.into() }
    }

    pub fn assembly(message: impl Into<String>) -> Self {
        Self::Assembly { message: message.into() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

impl From<std::io::Error> for ScathaError {
    fn from(err: std::io::Error) -> Self {
        ScathaError::io(err.to_string())
    }
}

/// Internal-compiler-error assertion. Unlike `debug_assert!`, this fires in
/// release builds too: violations of an IR invariant should never be
/// silently skipped just because optimizations are on.
#[macro_export]
macro_rules! ice {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!("internal compiler error at {}:{}: {}", file!(), line!(), format!($($arg)+));
        }
    };
}
