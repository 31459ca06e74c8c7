use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A normalized DNS zone origin: lowercase, fully qualified, "." for the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneName(Arc<str>);

impl ZoneName {
    pub fn root() -> Self {
        Self(Arc::from("."))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == "."
    }

    pub fn label_count(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.trim_end_matches('.').split('.').count()
        }
    }

    /// True when `qname` equals the zone or sits below it on a label boundary.
    pub fn contains(&self, qname: &str) -> bool {
        if self.is_root() {
            return true;
        }
        let qname = normalize(qname);
        if qname == *self.0 {
            return true;
        }
        qname.len() > self.0.len()
            && qname.ends_with(&*self.0)
            && qname.as_bytes()[qname.len() - self.0.len() - 1] == b'.'
    }
}

fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() || lower == "." {
        ".".to_string()
    } else if lower.ends_with('.') {
        lower
    } else {
        format!("{}.", lower)
    }
}

impl FromStr for ZoneName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        if normalized != "."
            && normalized
                .trim_end_matches('.')
                .split('.')
                .any(|label| label.is_empty() || label.len() > 63)
        {
            return Err(format!("Invalid zone name '{}'", s));
        }
        Ok(Self(normalized.into()))
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the index of the most specific zone containing `qname`.
pub fn longest_match<'a, I>(zones: I, qname: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'a ZoneName>,
{
    zones
        .into_iter()
        .enumerate()
        .filter(|(_, zone)| zone.contains(qname))
        .max_by_key(|(_, zone)| zone.label_count())
        .map(|(index, _)| index)
}
