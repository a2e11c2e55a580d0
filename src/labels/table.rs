use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};

use crate::error::LabelError;

/// Immutable mapping from class index (0..N-1) to human-readable name.
///
/// Built once at startup from a label file where every line reads
/// `index: 'name',` (the ImageNet class list format). Double quotes, a
/// missing trailing comma, and the braces of a Python dict dump are all
/// accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabelTable {
    names: Vec<String>,
}

impl ClassLabelTable {
    /// Reads and parses a label file.
    pub fn load(path: impl AsRef<Path>) -> Result<ClassLabelTable, LabelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = ClassLabelTable::parse(&text)?;
        info!("loaded {} class labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parses label file contents. Line numbers in errors are 1-based.
    pub fn parse(text: &str) -> Result<ClassLabelTable, LabelError> {
        let mut entries: BTreeMap<usize, String> = BTreeMap::new();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            let line = line.strip_prefix('{').unwrap_or(line);
            let line = line.strip_suffix('}').unwrap_or(line).trim();
            if line.is_empty() {
                continue;
            }

            let (index, name) = parse_line(line).map_err(|reason| LabelError::Parse {
                line: line_no,
                reason,
            })?;
            if entries.insert(index, name).is_some() {
                return Err(LabelError::DuplicateIndex { line: line_no, index });
            }
        }

        let max = match entries.keys().next_back() {
            Some(&max) => max,
            None => return Err(LabelError::Empty),
        };
        if let Some(missing) = entries.keys().enumerate().find(|&(pos, &k)| pos != k).map(|(pos, _)| pos) {
            return Err(LabelError::Gap { missing, max });
        }

        debug!("parsed {} label entries", entries.len());
        Ok(ClassLabelTable { names: entries.into_values().collect() })
    }

    /// Builds a table directly from names in index order.
    pub fn from_names<I, S>(names: I) -> Result<ClassLabelTable, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for (i, name) in names.into_iter().enumerate() {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(LabelError::Parse { line: i + 1, reason: "empty class name".into() });
            }
            out.push(name);
        }
        if out.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(ClassLabelTable { names: out })
    }

    /// Name for `index`, or `None` when the index is out of range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// (index, name) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }
}

/// Splits `index: 'name',` into its parts.
fn parse_line(line: &str) -> Result<(usize, String), String> {
    let (index, name) = line
        .split_once(':')
        .ok_or_else(|| format!("expected `index: name`, got '{}'", line))?;

    let index = index.trim();
    let index: usize = index
        .parse()
        .map_err(|_| format!("invalid class index '{}'", index))?;

    let name = name.trim();
    let name = name.strip_suffix(',').unwrap_or(name).trim_end();
    let name = strip_quotes(name);
    if name.trim().is_empty() {
        return Err(format!("empty class name for index {}", index));
    }
    Ok((index, name.to_owned()))
}

/// Removes one pair of matching surrounding quotes, if present.
fn strip_quotes(s: &str) -> &str {
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
