//! Local count reported by the host.

use std::fmt;

use online_linker_core::{OnlineSupplier, SourceKind};

use crate::source::StatusSource;

/// Source returning the host's own online count.
#[derive(Clone)]
pub struct SelfSource {
    supplier: OnlineSupplier,
}

impl SelfSource {
    /// Create a source reading `supplier`.
    pub fn new(supplier: OnlineSupplier) -> Self {
        Self { supplier }
    }
}

impl fmt::Debug for SelfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfSource").finish_non_exhaustive()
    }
}

impl StatusSource for SelfSource {
    fn fetch(&self) -> i32 {
        (self.supplier)()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SelfCount
    }
}
