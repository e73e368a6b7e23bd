use thiserror::Error;

/// Failures raised while lowering an AST to an instruction sequence.
///
/// Every public entry point in this crate returns `Result<_, LowerError>`.
/// Lowering never recovers locally: the first error aborts the whole
/// transformation and propagates to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("root node must be a block, found `{0}`")]
    UnexpectedRoot(String),

    #[error("no lowering for construct `{0}`")]
    UnknownConstruct(String),

    #[error("unsupported literal kind `{0}`")]
    UnknownLiteral(String),

    #[error("hash literal has an odd number of items")]
    OddHashItems,

    #[error("constant owner slot has unexpected shape `{0}`")]
    UnknownConstantName(String),

    #[error("block form's embedded call is not a `call` node, found `{0}`")]
    UnexpectedIterCall(String),

    /// Raised only by `lower_program` when `DebugConfig::validate` is set
    /// and the emitted stream fails its own invariants — a bug in this
    /// pass, surfaced immediately rather than discovered downstream.
    #[error("emitted instructions failed validation: {0}")]
    Invalid(#[from] crate::validate::ValidationError),
}
