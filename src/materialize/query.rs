/// Decoded query-string pairs in arrival order.
///
/// Repeated keys are kept; scalar lookups take the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    pairs: Vec<(String, String)>,
}

impl QueryValues {
    /// Parse a raw query string. A leading `?` is ignored.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// Query part of a request target such as `/users?name=Ann`.
    #[must_use]
    pub fn from_target(target: &str) -> Self {
        match target.split_once('?') {
            Some((_, query)) => Self::parse(query),
            None => Self::default(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    #[must_use]
    pub fn last(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for a slice field, accepting both `name=` and `name[]=`.
    #[must_use]
    pub fn all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name || strip_brackets(k, name) == Some(""))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// `name[key]=value` entries for a map field. Later keys overwrite earlier ones.
    #[must_use]
    pub fn map_entries(&self, name: &str) -> Vec<(String, &str)> {
        let mut out: Vec<(String, &str)> = Vec::new();
        for (k, v) in &self.pairs {
            let Some(key) = strip_brackets(k, name) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            match out.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = v.as_str(),
                None => out.push((key.to_string(), v.as_str())),
            }
        }
        out
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// `name[inner]` yields `inner`.
fn strip_brackets<'a>(key: &'a str, name: &str) -> Option<&'a str> {
    key.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('['))
        .and_then(|rest| rest.strip_suffix(']'))
}
