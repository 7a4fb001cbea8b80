use itertools::Itertools;
use std::{
    io,
    path::{Path, PathBuf},
};

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Various error variants the harness can surface to a test.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Invalid harness configuration, e.g. a malformed version number or an
    /// absolute path where a relative resource name was expected.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// IO failure during workspace setup, listing, read, write, or close.
    #[error("\"{}\": {io}", path.display())]
    Io {
        io: io::Error,
        path: PathBuf,
    },

    /// A write was attempted on a read-only container (archives are always
    /// read-only).
    #[error("container \"{container}\" is read-only")]
    ReadOnlyContainer { container: String },

    /// An operation was attempted on a container after it was closed.
    #[error("container \"{container}\" is closed")]
    ClosedContainer { container: String },

    /// The compiler raised an exception or panicked. The original cause is
    /// preserved in the chain.
    #[error("the compiler raised an exception")]
    CompilerCrashed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The compiler returned no definitive verdict.
    #[error("the compiler returned no definitive verdict")]
    CompilerIndeterminate,

    /// Aggregate failure while releasing resources; every underlying cause is
    /// attached.
    #[error("failed to close {} resource(s): [{}]", causes.len(), causes.iter().join("; "))]
    CloseFailure { causes: Vec<HarnessError> },

    /// A service loader was requested on a location scoped to a single module.
    #[error("cannot build a service loader for module-scoped location {location}")]
    UnsupportedOnModuleLocation { location: String },

    /// A module was looked up under a module-oriented location but does not
    /// exist there. Close matches, if any, are listed in the message.
    #[error(
        "no module named \"{module}\" exists in {location}{}",
        fmt_suggestions(suggestions)
    )]
    NoSuchModule {
        location: String,
        module: String,
        suggestions: Vec<String>,
    },
}

impl HarnessError {
    /// Wrap an IO error together with the path that produced it.
    pub fn io(io: io::Error, path: impl AsRef<Path>) -> Self {
        Self::Io { io, path: path.as_ref().to_path_buf() }
    }

    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Wrap an arbitrary error as a compiler crash, preserving the cause.
    pub fn crashed<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CompilerCrashed(Box::new(cause))
    }
}

fn fmt_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!("; did you mean one of: {}?", suggestions.iter().join(", "))
    }
}

/// Fold a series of close results into at most one [`HarnessError::CloseFailure`].
pub(crate) fn aggregate_close<I>(results: I) -> Result<()>
where
    I: IntoIterator<Item = Result<()>>,
{
    let causes: Vec<_> = results.into_iter().filter_map(Result::err).collect();
    if causes.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::CloseFailure { causes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_carry_the_path() {
        let err = HarnessError::io(io::Error::new(io::ErrorKind::NotFound, "gone"), "/some/root");
        assert!(err.to_string().contains("/some/root"));
    }

    #[test]
    fn close_failures_aggregate_all_causes() {
        let result = aggregate_close([
            Ok(()),
            Err(HarnessError::ClosedContainer { container: "a.jar".into() }),
            Err(HarnessError::ClosedContainer { container: "b.jar".into() }),
        ]);
        match result {
            Err(HarnessError::CloseFailure { causes }) => assert_eq!(causes.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_module_message_lists_suggestions() {
        let err = HarnessError::NoSuchModule {
            location: "MODULE_SOURCE_PATH".into(),
            module: "foo.bar".into(),
            suggestions: vec!["foo.baz".into(), "foo.bork".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("foo.baz"));
        assert!(msg.contains("foo.bork"));
        assert!(msg.contains("did you mean"));
    }
}
