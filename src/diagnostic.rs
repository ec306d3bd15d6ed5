use crate::config::ResolutionMode;
use basemodel_core::{BaseModelError, Result};

/// A relation or lookup target that was skipped during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Table the request was made against
    pub table: String,
    /// Relation, lookup or table that could not be resolved
    pub target: String,
    pub reason: String,
}

impl Diagnostic {
    pub fn new(
        table: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: skipped {} ({})", self.table, self.target, self.reason)
    }
}

/// Records `diagnostic` in lenient mode; fails the request in strict mode.
pub(crate) fn skip(
    mode: ResolutionMode,
    diagnostic: Diagnostic,
    out: &mut Vec<Diagnostic>,
) -> Result<()> {
    match mode {
        ResolutionMode::Strict => Err(BaseModelError::Schema(diagnostic.to_string())),
        ResolutionMode::Lenient => {
            tracing::warn!(
                table = %diagnostic.table,
                target = %diagnostic.target,
                reason = %diagnostic.reason,
                "basemodel.resolution.skip"
            );
            out.push(diagnostic);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_fails() {
        let mut out = Vec::new();
        let diag = Diagnostic::new("orders", "ghostsList", "table not registered");
        assert!(skip(ResolutionMode::Lenient, diag.clone(), &mut out).is_ok());
        assert_eq!(out, [diag.clone()]);

        let err = skip(ResolutionMode::Strict, diag, &mut out).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema error: orders: skipped ghostsList (table not registered)"
        );
    }
}
