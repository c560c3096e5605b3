use std::fmt;

/// Why a discovery candidate was not admitted into the module set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("no Main-Class entry point declared")]
    MissingEntryPoint,

    #[error("error loading package: {0}")]
    LoadError(String),

    #[error("contract mismatch: {0}")]
    ContractMismatch(String),

    #[error("'{0}' is not in the allowed namespace")]
    NamespaceViolation(String),

    #[error("module is not visible")]
    NotVisible,
}

impl SkipReason {
    /// Machine readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingEntryPoint => "MISSING_ENTRY_POINT",
            Self::LoadError(_) => "LOAD_ERROR",
            Self::ContractMismatch(_) => "CONTRACT_MISMATCH",
            Self::NamespaceViolation(_) => "NAMESPACE_VIOLATION",
            Self::NotVisible => "NOT_VISIBLE",
        }
    }
}

/// Result of merging an admitted candidate into the module set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStatus {
    Loaded,
    /// Replaced an existing entry; carries the replaced type's simple name
    Overwrite(String),
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Overwrite(old) => write!(f, "overwrite({})", old),
        }
    }
}

/// Final outcome for one external package, as reported in the discovery log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Merged(MergeStatus),
    Skipped(SkipReason),
}

impl fmt::Display for PackageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged(status) => status.fmt(f),
            Self::Skipped(reason) => write!(f, "skipped ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        assert_eq!(PackageOutcome::Merged(MergeStatus::Loaded).to_string(), "loaded");
        assert_eq!(
            PackageOutcome::Merged(MergeStatus::Overwrite("Forge".into())).to_string(),
            "overwrite(Forge)"
        );
        assert_eq!(
            PackageOutcome::Skipped(SkipReason::NotVisible).to_string(),
            "skipped (module is not visible)"
        );
    }

    #[test]
    fn test_reason_codes_are_distinct() {
        let reasons = [
            SkipReason::MissingEntryPoint,
            SkipReason::LoadError(String::new()),
            SkipReason::ContractMismatch(String::new()),
            SkipReason::NamespaceViolation(String::new()),
            SkipReason::NotVisible,
        ];
        let mut codes: Vec<_> = reasons.iter().map(SkipReason::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), reasons.len());
    }
}
