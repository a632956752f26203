use crate::HeaderValue;
use smallvec::{smallvec, SmallVec};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Deref, DerefMut},
};

/// One or more [`HeaderValue`]s for a single header name.
///
/// Most headers carry exactly one value, which smallvec keeps inline.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderValues(SmallVec<[HeaderValue; 1]>);

impl HeaderValues {
    /// Construct an empty `HeaderValues`.
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// The singular value for this header. When several values are
    /// present, the most recently appended wins.
    pub fn one(&self) -> Option<&HeaderValue> {
        self.0.last()
    }

    /// [`HeaderValues::one`] as a str, when it is utf8.
    pub fn as_str(&self) -> Option<&str> {
        self.one().and_then(HeaderValue::as_str)
    }

    /// Add a value after any already present.
    pub fn append(&mut self, value: impl Into<HeaderValue>) {
        self.0.push(value.into());
    }

    /// Append all of `values`.
    pub fn extend(&mut self, values: impl Into<HeaderValues>) {
        self.0.extend(values.into().0);
    }
}

impl Default for HeaderValues {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for HeaderValues {
    type Target = [HeaderValue];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for HeaderValues {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Debug for HeaderValues {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.one() {
            Some(value) if self.0.len() == 1 => Debug::fmt(value, f),
            _ => f.debug_list().entries(&self.0).finish(),
        }
    }
}

impl Display for HeaderValues {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.one() {
            Some(value) => Display::fmt(value, f),
            None => Ok(()),
        }
    }
}

impl IntoIterator for HeaderValues {
    type Item = HeaderValue;
    type IntoIter = smallvec::IntoIter<[HeaderValue; 1]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a HeaderValues {
    type Item = &'a HeaderValue;
    type IntoIter = std::slice::Iter<'a, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<V: Into<HeaderValue>> From<V> for HeaderValues {
    fn from(value: V) -> Self {
        Self(smallvec![value.into()])
    }
}

impl<V: Into<HeaderValue>> FromIterator<V> for HeaderValues {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
