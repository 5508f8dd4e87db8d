//! Selection of the ancillary chunks kept in the private data.
//!
//! A filter is `+` (keep only the listed chunks) or `-` (keep all but the
//! listed chunks), followed by a separator character and the separated ids:
//! `+/bext/cue` keeps `bext` and `cue `, `-` keeps everything, `+` nothing.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFilter {
    inclusive: bool,
    ids: Vec<[u8; 4]>,
}

impl ChunkFilter {
    pub fn keep_all() -> Self {
        Self {
            inclusive: false,
            ids: Vec::new(),
        }
    }

    pub fn keep_none() -> Self {
        Self {
            inclusive: true,
            ids: Vec::new(),
        }
    }

    pub fn accepts(&self, id: &[u8; 4]) -> bool {
        self.ids.contains(id) == self.inclusive
    }

    pub fn is_exclude_all(&self) -> bool {
        self.inclusive && self.ids.is_empty()
    }
}

impl Default for ChunkFilter {
    fn default() -> Self {
        Self::keep_all()
    }
}

impl FromStr for ChunkFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let inclusive = match chars.next() {
            Some('+') => true,
            Some('-') => false,
            _ => return Err("expected '+' or '-' followed by chunk ids".to_string()),
        };

        let Some(separator) = chars.next() else {
            return Ok(Self {
                inclusive,
                ids: Vec::new(),
            });
        };

        let mut ids = Vec::new();
        for name in chars.as_str().split(separator).filter(|n| !n.is_empty()) {
            let id = parse_id(name).ok_or_else(|| format!("invalid chunk id '{name}'"))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        Ok(Self { inclusive, ids })
    }
}

/// Pads ids shorter than four characters with spaces.
fn parse_id(name: &str) -> Option<[u8; 4]> {
    let bytes = name.as_bytes();
    if bytes.len() > 4 || !bytes.iter().all(|b| (0x20..=0x7E).contains(b)) {
        return None;
    }
    let mut id = [b' '; 4];
    id[..bytes.len()].copy_from_slice(bytes);
    Some(id)
}

impl fmt::Display for ChunkFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.inclusive { '+' } else { '-' })?;
        for id in &self.ids {
            write!(f, "/{}", String::from_utf8_lossy(id).trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusive_list() -> Result<(), String> {
        let filter: ChunkFilter = "+/bext/cue".parse()?;
        assert!(filter.accepts(b"bext"));
        assert!(filter.accepts(b"cue "));
        assert!(!filter.accepts(b"LIST"));
        assert!(!filter.is_exclude_all());
        assert_eq!(filter.to_string(), "+/bext/cue");
        Ok(())
    }

    #[test]
    fn exclusive_list_with_other_separator() -> Result<(), String> {
        let filter: ChunkFilter = "-,NAME,,ANNO".parse()?;
        assert!(!filter.accepts(b"NAME"));
        assert!(!filter.accepts(b"ANNO"));
        assert!(filter.accepts(b"MARK"));
        Ok(())
    }

    #[test]
    fn bare_signs() -> Result<(), String> {
        let all: ChunkFilter = "-".parse()?;
        assert_eq!(all, ChunkFilter::keep_all());
        assert!(all.accepts(b"LIST"));

        let none: ChunkFilter = "+".parse()?;
        assert_eq!(none, ChunkFilter::keep_none());
        assert!(none.is_exclude_all());
        assert!(!none.accepts(b"LIST"));
        Ok(())
    }

    #[test]
    fn invalid_filters() {
        for filter in ["", "bext", "*/bext", "+/toolong", "+/caf\u{e9}"] {
            assert!(filter.parse::<ChunkFilter>().is_err(), "{filter:?}");
        }
    }
}
