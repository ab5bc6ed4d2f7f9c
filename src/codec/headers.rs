use std::fmt;

/// Ordered header multimap with case-insensitive names.
///
/// Each header keeps the name as first seen and an ordered list of values, so
/// repeated headers and comma separated lists both land in the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap { entries: Vec::new() }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Appends a value, creating the header if needed.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(idx) => self.entries[idx].1.push(value),
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    /// Appends several values at once.
    pub fn extend_values<I>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = String>,
    {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                self.entries.push((name.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        self.entries[idx].1.extend(values);
    }

    /// Replaces any existing values for `name`, keeping its original position.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(idx) => self.entries[idx].1 = vec![value],
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, values) in &self.entries {
            let joined = values.join(", ");
            if joined.is_empty() {
                write!(f, "{}:\r\n", name)?;
            } else {
                write!(f, "{}: {}\r\n", name, joined)?;
            }
        }
        Ok(())
    }
}

/// Splits a raw header value into its individual values.
///
/// Unquoted commas separate values; commas inside double quotes do not.
/// Values keep their quotes, except a bare `""` which stands for an empty value.
pub(crate) fn split_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                values.push(finish_value(&current));
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    values.push(finish_value(&current));
    values
}

fn finish_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "\"\"" {
        String::new()
    } else {
        trimmed.to_string()
    }
}
