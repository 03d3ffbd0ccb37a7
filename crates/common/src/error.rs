use thiserror::Error;

/// Catch-all error for glue code that has no richer domain error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl FromSource for Error {
    fn from_source(context: String, source: BoxedSource) -> Self {
        Self::External { context, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Error types with a variant that wraps a lower-level failure together with
/// a note on what was being attempted.
pub trait FromSource: Sized {
    fn from_source(context: String, source: BoxedSource) -> Self;
}

/// Define a crate-local `Context` trait adding `.with_context()` to any
/// `Result` whose error is a real `std::error::Error`. The source is kept as
/// the `#[source]` of the resulting error rather than flattened to text.
///
/// ```ignore
/// courier_common::impl_context!(Error);
/// ```
#[macro_export]
macro_rules! impl_context {
    ($error:ty) => {
        pub trait Context<T> {
            fn with_context<C, F>(self, f: F) -> std::result::Result<T, $error>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E> Context<T> for std::result::Result<T, E>
        where
            E: std::error::Error + Send + Sync + 'static,
        {
            fn with_context<C, F>(self, f: F) -> std::result::Result<T, $error>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <$error as $crate::FromSource>::from_source(f().into(), Box::new(source))
                })
            }
        }
    };
}
