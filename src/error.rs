use crate::progress::Step;
use thiserror::Error;

/// Errors surfaced by the sync pipeline.
///
/// Everything except [`SyncError::Config`] and [`SyncError::IncompatiblePlugin`]
/// is scoped to a single source: it aborts that source's remaining steps and
/// leaves sibling sources running.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid project configuration: {0}")]
    Config(String),

    #[error("failed to fetch spec for source '{source_id}' from {url}: {reason}")]
    SpecFetch {
        source_id: String,
        url: String,
        reason: String,
    },

    #[error("malformed spec for source '{source_id}': {reason}")]
    SpecParse { source_id: String, reason: String },

    #[error("unsupported spec feature in source '{source_id}': {reason}")]
    UnsupportedFeature { source_id: String, reason: String },

    #[error(
        "duplicate operation '{operation_id}' in source '{source_id}' \
         ({content_type} -> {response_type}) declared by {first} and {second}"
    )]
    DuplicateDescriptor {
        source_id: String,
        operation_id: String,
        content_type: String,
        response_type: String,
        first: String,
        second: String,
    },

    #[error("plugin '{plugin}' {version} requires core {compat}, running {core}")]
    IncompatiblePlugin {
        plugin: String,
        version: String,
        compat: String,
        core: String,
    },

    #[error("plugin '{plugin}' failed to generate source '{source_id}': {reason}")]
    PluginGeneration {
        plugin: String,
        source_id: String,
        reason: String,
    },

    #[error("{step} cancelled")]
    Cancelled { step: Step },

    #[error("{step} panicked for source '{source_id}': {reason}")]
    Panicked {
        source_id: String,
        step: Step,
        reason: String,
    },
}

impl SyncError {
    pub(crate) fn spec_parse(source_id: &str, reason: impl Into<String>) -> Self {
        Self::SpecParse {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(source_id: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_scoped_errors_name_the_source() {
        let err = SyncError::spec_parse("petstore", "missing info");
        assert_eq!(err.to_string(), "malformed spec for source 'petstore': missing info");

        let err = SyncError::Panicked {
            source_id: "petstore".into(),
            step: Step::FetchingSpec,
            reason: "resolver bug".into(),
        };
        assert_eq!(
            err.to_string(),
            "FETCHING_SPEC panicked for source 'petstore': resolver bug"
        );
    }

    #[test]
    fn cancelled_message_names_the_step() {
        let err = SyncError::Cancelled {
            step: Step::FetchingSpec,
        };
        assert_eq!(err.to_string(), "FETCHING_SPEC cancelled");
    }
}
