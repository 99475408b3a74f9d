//! Case-insensitive, insertion-ordered header multi-map.
//!
//! [`HeaderCollection`] backs both request and response headers. Names are
//! normalized through [`HeaderName`] (lower case), values keep their bytes as
//! received. Unlike `http::HeaderMap`, iteration order is exactly insertion
//! order, which keeps the HTTP/1.1 head we write byte-for-byte predictable.

use http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCollection {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Number of name/value pairs, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry while keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces all values of `name` with `value`.
    ///
    /// The entry keeps the position of the first existing occurrence, so
    /// overwriting a header does not move it to the end of the block.
    pub fn set<N, V>(&mut self, name: N, value: V) -> Result<(), http::Error>
    where
        HeaderName: TryFrom<N>,
        <HeaderName as TryFrom<N>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(Into::into)?;
        let value = HeaderValue::try_from(value).map_err(Into::into)?;
        self.insert(name, value);
        Ok(())
    }

    /// Adds another value for `name` without touching existing ones.
    pub fn append<N, V>(&mut self, name: N, value: V) -> Result<(), http::Error>
    where
        HeaderName: TryFrom<N>,
        <HeaderName as TryFrom<N>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(Into::into)?;
        let value = HeaderValue::try_from(value).map_err(Into::into)?;
        self.entries.push((name, value));
        Ok(())
    }

    /// Infallible form of [`set`](Self::set) for already validated parts.
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter().position(|(n, _)| *n == name) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut index = 0;
                self.entries.retain(|(n, _)| {
                    let keep = index <= first || *n != name;
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Infallible form of [`append`](Self::append).
    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// First value stored for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(n, _)| n.as_str().eq_ignore_ascii_case(name)).map(|(_, v)| v)
    }

    /// First value for `name` if it is visible ASCII.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        self.entries.iter().filter(move |(n, _)| n.as_str().eq_ignore_ascii_case(name)).map(|(_, v)| v)
    }

    /// All values for `name` joined with `", "`, the way HTTP folds repeated fields.
    pub fn joined(&self, name: &str) -> Option<String> {
        let mut values = self.get_all(name).filter_map(|v| v.to_str().ok());
        let first = values.next()?;
        let mut joined = first.to_owned();
        for value in values {
            joined.push_str(", ");
            joined.push_str(value);
        }
        Some(joined)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every value for `name`, returning how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.as_str().eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    /// Copies the entries into an `http::HeaderMap`, keeping repeated names.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

impl From<&HeaderMap> for HeaderCollection {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Self::with_capacity(map.len());
        for (name, value) in map {
            headers.push(name.clone(), value.clone());
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderCollection::new();
        headers.set("Content-Type", "text/plain").unwrap();

        assert_eq!(headers.get_str("content-type"), Some("text/plain"));
        assert_eq!(headers.get_str("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.contains("Content-type"));
        assert!(!headers.contains("content-length"));
    }

    #[test]
    fn last_set_wins_and_keeps_position() {
        let mut headers = HeaderCollection::new();
        headers.set("X-First", "1").unwrap();
        headers.append("X-Multi", "a").unwrap();
        headers.set("X-Last", "z").unwrap();
        headers.append("x-multi", "b").unwrap();

        headers.set("X-MULTI", "c").unwrap();

        let names: Vec<_> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x-first", "x-multi", "x-last"]);
        assert_eq!(headers.get_str("x-multi"), Some("c"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn append_keeps_every_value() {
        let mut headers = HeaderCollection::new();
        headers.append("Set-Cookie", "a=1").unwrap();
        headers.append("set-cookie", "b=2").unwrap();

        assert_eq!(headers.get_all("SET-COOKIE").count(), 2);
        assert_eq!(headers.joined("set-cookie").as_deref(), Some("a=1, b=2"));
        assert_eq!(headers.joined("missing"), None);
    }

    #[test]
    fn remove_drops_all_values() {
        let mut headers = HeaderCollection::new();
        headers.append("Accept", "a").unwrap();
        headers.append("Accept", "b").unwrap();
        headers.set("Host", "example.com").unwrap();

        assert_eq!(headers.remove("accept"), 2);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove("accept"), 0);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut headers = HeaderCollection::new();
        assert!(headers.set("bad header", "x").is_err());
        assert!(headers.set("x-ok", "line\nbreak").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn converts_to_and_from_header_map() {
        let mut headers = HeaderCollection::new();
        headers.append("Vary", "accept").unwrap();
        headers.append("Vary", "origin").unwrap();

        let map = headers.to_header_map();
        assert_eq!(map.get_all("vary").iter().count(), 2);

        let back = HeaderCollection::from(&map);
        assert_eq!(back.joined("vary").as_deref(), Some("accept, origin"));
    }
}
