use crate::{HeaderName, HeaderValue, HeaderValues};
use std::fmt::{self, Display, Formatter};

/// An ordered, case-insensitive header multimap.
///
/// Entries keep insertion order, which is also serialization order. Lookup
/// is linear; a client request or response carries few enough headers that
/// anything cleverer costs more than it saves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[must_use]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValues)>,
}

impl Headers {
    /// Construct an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct header names present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Are there zero headers?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: impl Into<HeaderName>) -> Option<usize> {
        let name = name.into();
        self.entries.iter().position(|(n, _)| *n == name)
    }

    /// Add values for this name after any already present. To replace
    /// instead, use [`Headers::insert`].
    pub fn append(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.extend(values.into()),
            None => self.entries.push((name, values.into())),
        }
    }

    /// Set the values for this name, replacing any already present. To
    /// combine instead, use [`Headers::append`].
    pub fn insert(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values.into(),
            None => self.entries.push((name, values.into())),
        }
    }

    /// Set the values for this name only if it is not already present.
    pub fn try_insert(&mut self, name: impl Into<HeaderName>, values: impl Into<HeaderValues>) {
        let name = name.into();
        if self.position(name.clone()).is_none() {
            self.entries.push((name, values.into()));
        }
    }

    /// Like [`Headers::try_insert`], but the values are only computed when
    /// the name is absent.
    pub fn try_insert_with<V>(&mut self, name: impl Into<HeaderName>, values: impl FnOnce() -> V)
    where
        V: Into<HeaderValues>,
    {
        let name = name.into();
        if self.position(name.clone()).is_none() {
            self.entries.push((name, values().into()));
        }
    }

    /// All values for this name, or None if it is absent.
    pub fn get_values(&self, name: impl Into<HeaderName>) -> Option<&HeaderValues> {
        let name = name.into();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// The singular value for this name; see [`HeaderValues::one`].
    pub fn get(&self, name: impl Into<HeaderName>) -> Option<&HeaderValue> {
        self.get_values(name).and_then(HeaderValues::one)
    }

    /// The singular value for this name as a str.
    pub fn get_str(&self, name: impl Into<HeaderName>) -> Option<&str> {
        self.get_values(name).and_then(HeaderValues::as_str)
    }

    /// Whether any value is present for this name.
    pub fn has_header(&self, name: impl Into<HeaderName>) -> bool {
        self.position(name).is_some()
    }

    /// Whether the value for this name is ascii-case-insensitively equal
    /// to `needle`. False when the name is absent.
    pub fn eq_ignore_ascii_case(&self, name: impl Into<HeaderName>, needle: &str) -> bool {
        self.get_str(name)
            .is_some_and(|value| value.eq_ignore_ascii_case(needle))
    }

    /// Whether any comma-or-standalone value for this name matches
    /// `needle` case-insensitively. `Connection: Upgrade, keep-alive`
    /// contains `keep-alive`.
    pub fn contains_ignore_ascii_case(&self, name: impl Into<HeaderName>, needle: &str) -> bool {
        self.get_str(name).is_some_and(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(needle))
        })
    }

    /// Remove and return all values for this name.
    pub fn remove(&mut self, name: impl Into<HeaderName>) -> Option<HeaderValues> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Append every entry of `other`, preserving its order after existing
    /// entries.
    pub fn append_all(&mut self, other: Headers) {
        for (name, values) in other.entries {
            self.append(name, values);
        }
    }

    /// Insert every entry of `other`, replacing existing values.
    pub fn insert_all(&mut self, other: Headers) {
        for (name, values) in other.entries {
            self.insert(name, values);
        }
    }

    /// Iterate over `(&HeaderName, &HeaderValues)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValues)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    /// Chainable [`Headers::insert`].
    pub fn with_inserted_header(
        mut self,
        name: impl Into<HeaderName>,
        values: impl Into<HeaderValues>,
    ) -> Self {
        self.insert(name, values);
        self
    }

    /// Chainable [`Headers::append`].
    pub fn with_appended_header(
        mut self,
        name: impl Into<HeaderName>,
        values: impl Into<HeaderValues>,
    ) -> Self {
        self.append(name, values);
        self
    }

    /// Chainable [`Headers::remove`].
    pub fn without_header(mut self, name: impl Into<HeaderName>) -> Self {
        self.remove(name);
        self
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (name, values) in &self.entries {
            for value in values {
                write!(f, "{name}: {value}\r\n")?;
            }
        }
        Ok(())
    }
}

impl<N, V> Extend<(N, V)> for Headers
where
    N: Into<HeaderName>,
    V: Into<HeaderValues>,
{
    fn extend<T: IntoIterator<Item = (N, V)>>(&mut self, iter: T) {
        for (name, values) in iter {
            self.append(name, values);
        }
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<HeaderName>,
    V: Into<HeaderValues>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        headers.extend(iter);
        headers
    }
}

impl IntoIterator for Headers {
    type Item = (HeaderName, HeaderValues);
    type IntoIter = std::vec::IntoIter<(HeaderName, HeaderValues)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a HeaderName, &'a HeaderValues);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (HeaderName, HeaderValues)>,
        fn(&'a (HeaderName, HeaderValues)) -> (&'a HeaderName, &'a HeaderValues),
    >;

    fn into_iter(self) -> Self::IntoIter {
        let entry_refs: fn(&'a (HeaderName, HeaderValues)) -> (&'a HeaderName, &'a HeaderValues) =
            |(name, values)| (name, values);
        self.entries.iter().map(entry_refs)
    }
}

#[cfg(test)]
mod tests {
    use super::Headers;
    use crate::KnownHeaderName;

    #[test]
    fn insert_replaces_and_append_accumulates() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::ContentType, "text/plain");
        headers.insert("content-TYPE", "application/json");
        assert_eq!(
            headers.get_str(KnownHeaderName::ContentType),
            Some("application/json")
        );
        assert_eq!(headers.len(), 1);

        headers.append(KnownHeaderName::SetCookie, "a=1");
        headers.append(KnownHeaderName::SetCookie, "b=2");
        assert_eq!(
            headers.get_values(KnownHeaderName::SetCookie).unwrap().len(),
            2
        );
    }

    #[test]
    fn try_insert_defers_to_existing() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::UserAgent, "custom");
        headers.try_insert(KnownHeaderName::UserAgent, "default");
        assert_eq!(headers.get_str(KnownHeaderName::UserAgent), Some("custom"));
    }

    #[test]
    fn display_serializes_wire_lines() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::Host, "example.com");
        headers.insert("x-one", "1");
        assert_eq!(headers.to_string(), "Host: example.com\r\nx-one: 1\r\n");
    }

    #[test]
    fn connection_token_scan() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::Connection, "Upgrade, Keep-Alive");
        assert!(headers.contains_ignore_ascii_case(KnownHeaderName::Connection, "keep-alive"));
        assert!(!headers.eq_ignore_ascii_case(KnownHeaderName::Connection, "keep-alive"));
    }
}
