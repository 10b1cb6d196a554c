//! Clock port - the only source of "now" for the billing engine.

use crate::domain::foundation::Timestamp;

/// Supplies the current instant.
///
/// Injected into every handler and the scheduler so time-dependent
/// behavior can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_object_safe() {
        fn _accepts_dyn(_clock: &dyn Clock) {}
    }
}
