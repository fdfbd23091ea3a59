//! Status source abstraction.

use std::fmt;

use online_linker_core::SourceKind;

/// A provider of an online count sample.
///
/// `fetch` never fails at the type level: a source that cannot produce a
/// usable count returns a negative value (see
/// [`FETCH_FAILED`](online_linker_core::FETCH_FAILED)) after logging the cause.
/// Implementations may block (network, shared store) and are only called from
/// refresh workers, one refresh at a time.
pub trait StatusSource: Send + Sync + fmt::Debug {
    /// Fetch the current count, or a negative value on failure.
    fn fetch(&self) -> i32;

    /// Variant of this source.
    fn kind(&self) -> SourceKind;
}

impl<S: StatusSource + ?Sized> StatusSource for Box<S> {
    fn fetch(&self) -> i32 {
        (**self).fetch()
    }

    fn kind(&self) -> SourceKind {
        (**self).kind()
    }
}

impl<S: StatusSource + ?Sized> StatusSource for std::sync::Arc<S> {
    fn fetch(&self) -> i32 {
        (**self).fetch()
    }

    fn kind(&self) -> SourceKind {
        (**self).kind()
    }
}
