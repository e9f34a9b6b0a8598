//! Three-state result carried on every live stream.
//!
//! A subscription emits `Loading` immediately on attach, then `Ready`
//! snapshots as the underlying query fires, or a single `Failed` after which
//! the stream is terminated and the caller must re-subscribe to recover.

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The subscription is attached but no snapshot has arrived yet.
    Loading,
    /// A consistent snapshot of the query result.
    Ready(T),
    /// The listener failed.  No further values will be emitted.
    Failed(CoreError),
}

impl<T> Outcome<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Outcome::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    /// Return the snapshot, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Map the snapshot value, passing `Loading` and `Failed` through.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Loading => Outcome::Loading,
            Outcome::Ready(value) => Outcome::Ready(f(value)),
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }

    /// Map the snapshot through a fallible conversion; a conversion error
    /// becomes `Failed`.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, CoreError>) -> Outcome<U> {
        match self {
            Outcome::Loading => Outcome::Loading,
            Outcome::Ready(value) => match f(value) {
                Ok(mapped) => Outcome::Ready(mapped),
                Err(err) => Outcome::Failed(err),
            },
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_passes_states_through() {
        let ready: Outcome<u32> = Outcome::Ready(2);
        assert_eq!(ready.map(|n| n * 2), Outcome::Ready(4));

        let loading: Outcome<u32> = Outcome::Loading;
        assert!(loading.map(|n| n * 2).is_loading());

        let failed: Outcome<u32> = Outcome::Failed(CoreError::Unauthenticated);
        assert_eq!(
            failed.map(|n| n * 2),
            Outcome::Failed(CoreError::Unauthenticated)
        );
    }

    #[test]
    fn and_then_converts_errors() {
        let ready: Outcome<&str> = Outcome::Ready("x");
        let failed = ready.and_then(|_| Err::<u32, _>(CoreError::Validation("bad".into())));
        assert_eq!(failed, Outcome::Failed(CoreError::Validation("bad".into())));
    }
}
