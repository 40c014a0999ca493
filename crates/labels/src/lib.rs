//! Security labels and the lattice they live in.
//!
//! A [`Label`] pairs a confidentiality level with a set of handling
//! categories. The [`Lattice`] orders levels totally and categories by
//! inclusion; `can_flow` is the product order and `join` the product join.
//! Every mixing point in the pipeline goes through [`Lattice::join_labels`],
//! so label propagation is deterministic and associative.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("cannot join an empty label set")]
    EmptyJoin,
    #[error("level `{0}` is not part of the configured lattice")]
    UnknownLevel(String),
    #[error("duplicate lattice level `{0}`")]
    DuplicateLevel(String),
    #[error("invalid label `{0}`")]
    InvalidLabel(String),
}

/// A confidentiality level plus a set of handling categories.
///
/// Immutable by convention: the pipeline never mutates a label in place,
/// it derives new ones via [`Lattice::join_labels`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub level: String,
    /// Sorted, unique category tags. `BTreeSet` keeps the serialized form
    /// sorted, which the on-disk store format requires.
    #[serde(default)]
    pub categories: BTreeSet<String>,
}

impl Label {
    pub fn new<L, C, S>(level: L, categories: C) -> Self
    where
        L: Into<String>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            level: level.into(),
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// A label with no categories.
    pub fn bare(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            categories: BTreeSet::new(),
        }
    }
}

impl fmt::Display for Label {
    /// `level` when there are no categories, else `level+c1,c2,…` with
    /// categories in sorted order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.categories.is_empty() {
            return write!(f, "{}", self.level);
        }
        let cats = self
            .categories
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}+{}", self.level, cats)
    }
}

impl FromStr for Label {
    type Err = LabelError;

    /// Parses the `Display` form back: `Secret`, `Confidential+PII,Untrusted`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, cats) = match s.split_once('+') {
            Some((level, cats)) => (level, Some(cats)),
            None => (s, None),
        };
        let level = level.trim();
        if level.is_empty() {
            return Err(LabelError::InvalidLabel(s.to_string()));
        }
        let categories: BTreeSet<String> = cats
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            level: level.to_string(),
            categories,
        })
    }
}

/// The ordered level sequence. Rank of a level is its index, 0 lowest.
#[derive(Debug, Clone)]
pub struct Lattice {
    levels: Vec<String>,
    rank: HashMap<String, usize>,
}

impl Lattice {
    pub fn new<I, S>(levels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Vec<String> = levels.into_iter().map(Into::into).collect();
        let mut rank = HashMap::with_capacity(levels.len());
        for (idx, level) in levels.iter().enumerate() {
            if rank.insert(level.clone(), idx).is_some() {
                return Err(LabelError::DuplicateLevel(level.clone()));
            }
        }
        Ok(Self { levels, rank })
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn is_valid_level(&self, level: &str) -> bool {
        self.rank.contains_key(level)
    }

    fn rank_of(&self, level: &str) -> Result<usize, LabelError> {
        self.rank
            .get(level)
            .copied()
            .ok_or_else(|| LabelError::UnknownLevel(level.to_string()))
    }

    /// The higher-ranked of two levels. Ties pick `a` (they are equal).
    pub fn join_level<'a>(&self, a: &'a str, b: &'a str) -> Result<&'a str, LabelError> {
        let ra = self.rank_of(a)?;
        let rb = self.rank_of(b)?;
        Ok(if ra >= rb { a } else { b })
    }

    /// Level dominance plus category containment.
    ///
    /// Labels whose level is not in the lattice never flow anywhere.
    pub fn can_flow(&self, src: &Label, dst: &Label) -> bool {
        match (self.rank.get(&src.level), self.rank.get(&dst.level)) {
            (Some(rs), Some(rd)) => rs <= rd && src.categories.is_subset(&dst.categories),
            _ => false,
        }
    }

    /// Least upper bound of a non-empty set of labels: the max-rank level
    /// and the union of all categories.
    pub fn join_labels<'a, I>(&self, labels: I) -> Result<Label, LabelError>
    where
        I: IntoIterator<Item = &'a Label>,
    {
        let mut level: Option<&str> = None;
        let mut categories = BTreeSet::new();
        for label in labels {
            level = Some(match level {
                Some(current) => self.join_level(current, label.level.as_str())?,
                None => {
                    self.rank_of(&label.level)?;
                    label.level.as_str()
                }
            });
            categories.extend(label.categories.iter().cloned());
        }
        let level = level.ok_or(LabelError::EmptyJoin)?;
        Ok(Label {
            level: level.to_string(),
            categories,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
