use std::{
    fmt::{self, Debug, Formatter},
    ops::{Deref, DerefMut},
};

/// A mutable value that is either owned or borrowed.
///
/// [`ReceivedBody`](crate::ReceivedBody) uses this to borrow the
/// transport, buffer, and read state from an in-flight exchange, or to own
/// them outright when the body outlives the exchange (streaming).
#[doc(hidden)]
pub enum MaybeOwned<'a, T> {
    Owned(T),
    Borrowed(&'a mut T),
}

impl<T> MaybeOwned<'_, T> {
    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, MaybeOwned::Owned(_))
    }

    /// Take the owned value.
    ///
    /// Panics when borrowed; callers gate on [`MaybeOwned::is_owned`].
    pub(crate) fn unwrap_owned(self) -> T {
        match self {
            MaybeOwned::Owned(t) => t,
            MaybeOwned::Borrowed(_) => panic!("attempted to unwrap a borrowed value"),
        }
    }
}

impl<T> Deref for MaybeOwned<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            MaybeOwned::Owned(t) => t,
            MaybeOwned::Borrowed(t) => t,
        }
    }
}

impl<T> DerefMut for MaybeOwned<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            MaybeOwned::Owned(t) => t,
            MaybeOwned::Borrowed(t) => t,
        }
    }
}

impl<T> From<T> for MaybeOwned<'_, T> {
    fn from(t: T) -> Self {
        MaybeOwned::Owned(t)
    }
}

impl<'a, T> From<&'a mut T> for MaybeOwned<'a, T> {
    fn from(t: &'a mut T) -> Self {
        MaybeOwned::Borrowed(t)
    }
}

impl<T: Debug> Debug for MaybeOwned<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MaybeOwned::Owned(t) => f.debug_tuple("Owned").field(t).finish(),
            MaybeOwned::Borrowed(t) => f.debug_tuple("Borrowed").field(t).finish(),
        }
    }
}
