//! The engine's backslash-delimited key/value "info-string" format.
//!
//! Configuration blocks cross the engine boundary as strings of the form
//! `\key1\value1\key2\value2`. Keys keep their first-seen position; a
//! repeated key overwrites the value in place.

use tracing::warn;

/// An ordered key/value mapping matching info-string semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoMap {
    entries: Vec<(String, String)>,
}

impl InfoMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, String)> for InfoMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = InfoMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

/// Parse an info-string into an [`InfoMap`].
///
/// An odd number of tokens means the string was truncated somewhere; the
/// pairs parsed up to that point are returned and the problem is logged.
pub fn parse_variables(infostring: &str) -> InfoMap {
    let mut res = InfoMap::new();
    if infostring.trim().is_empty() {
        return res;
    }

    let vars: Vec<&str> = infostring.trim_start_matches('\\').split('\\').collect();
    for pair in vars.chunks(2) {
        match pair {
            [key, value] => res.set(*key, *value),
            _ => {
                warn!(
                    target: "vadrigar",
                    "Uneven number of keys and values: {}",
                    infostring
                );
            }
        }
    }

    res
}

/// Serialize an [`InfoMap`] back into an info-string. Exact inverse of
/// [`parse_variables`] for well-formed input.
pub fn stringify_variables(variables: &InfoMap) -> String {
    variables
        .iter()
        .map(|(k, v)| format!("\\{}\\{}", k, v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let map = parse_variables("\\a\\1\\b\\2");
        assert_eq!(map.get("a"), Some("1"));
        assert_eq!(map.get("b"), Some("2"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_parse_without_leading_backslash() {
        let map = parse_variables("name\\Vadrigar\\rate\\25000");
        assert_eq!(map.get("name"), Some("Vadrigar"));
        assert_eq!(map.get("rate"), Some("25000"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_variables("").is_empty());
        assert!(parse_variables("   ").is_empty());
    }

    #[test]
    fn test_duplicate_key_overwrites_in_place() {
        let map = parse_variables("\\a\\1\\b\\2\\a\\3");
        assert_eq!(map.get("a"), Some("3"));
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_odd_token_count_returns_partial() {
        let map = parse_variables("\\a\\1\\b");
        assert_eq!(map.get("a"), Some("1"));
        assert_eq!(map.get("b"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_stringify() {
        let mut map = InfoMap::new();
        map.set("a", "1");
        map.set("b", "2");
        assert_eq!(stringify_variables(&map), "\\a\\1\\b\\2");
    }

    #[test]
    fn test_round_trip() {
        let s = "\\sv_hostname\\vadrigar test\\g_gametype\\4\\mapname\\overkill";
        let once = parse_variables(s);
        let twice = parse_variables(&stringify_variables(&once));
        assert_eq!(once, twice);
    }
}
