//! Debug/dump configuration for the lowering driver, mirroring the
//! opt-in-dump-to-stderr convention used elsewhere in this compiler's
//! pipeline (`pipeline::config::DebugConfig`). Neither flag here changes
//! the instructions produced — both are purely observational.

/// Configuration for `lower_program`'s diagnostic behavior.
#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    /// Write the emitted instruction stream to stderr after a successful
    /// lowering, one instruction per line.
    pub dump: bool,
    /// Run [`crate::validate::validate`] against the emitted stream before
    /// returning it, turning a stack-effect or scope-balance bug in this
    /// pass into an immediate error at the call site that triggered it.
    pub validate: bool,
}

impl DebugConfig {
    /// All diagnostics disabled — the default used by `lower_program`.
    pub fn none() -> Self {
        Self::default()
    }

    /// Both diagnostics enabled, useful while developing a new transform.
    pub fn verbose() -> Self {
        Self {
            dump: true,
            validate: true,
        }
    }
}

pub(crate) fn dump_instructions(instructions: &[crate::instruction::Instruction]) {
    eprintln!("=== instructions ===");
    for inst in instructions {
        eprintln!("{inst:?}");
    }
    eprintln!("=== end instructions ===\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_disables_everything() {
        let cfg = DebugConfig::none();
        assert!(!cfg.dump);
        assert!(!cfg.validate);
    }

    #[test]
    fn verbose_enables_everything() {
        let cfg = DebugConfig::verbose();
        assert!(cfg.dump);
        assert!(cfg.validate);
    }
}
