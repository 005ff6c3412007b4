use std::cmp::Ordering;
use std::fmt;

use crate::error::{GalleryError, Result};

/// What entries are ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortType {
    Name,
    Date,
    Size,
    Count,
    Score,
    Rating,
}

impl SortType {
    /// Every type, in cycling order
    pub const ALL: [SortType; 6] = [
        SortType::Name,
        SortType::Date,
        SortType::Size,
        SortType::Count,
        SortType::Score,
        SortType::Rating,
    ];

    /// Stable ordinal used by the sort-state file
    pub fn ordinal(self) -> i32 {
        match self {
            SortType::Name => 0,
            SortType::Date => 1,
            SortType::Size => 2,
            SortType::Count => 3,
            SortType::Score => 4,
            SortType::Rating => 5,
        }
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.ordinal() == ordinal)
    }

    /// Names read A-Z; everything numeric reads biggest/newest first
    pub fn default_direction(self) -> SortDirection {
        match self {
            SortType::Name => SortDirection::Ascending,
            _ => SortDirection::Descending,
        }
    }

    fn next(self) -> Self {
        let i = self.ordinal() as usize;
        Self::ALL[(i + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn ordinal(self) -> i32 {
        match self {
            SortDirection::Ascending => 0,
            SortDirection::Descending => 1,
        }
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            0 => Some(SortDirection::Ascending),
            1 => Some(SortDirection::Descending),
            _ => None,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// A named collection the sort engine operates over
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortContext {
    Files,
    Category,
    Creator,
    Status,
    Tags,
    /// Any context this build doesn't know; no sort type is valid for it
    Other(String),
}

impl SortContext {
    pub fn key(&self) -> &str {
        match self {
            SortContext::Files => "Files",
            SortContext::Category => "Category",
            SortContext::Creator => "Creator",
            SortContext::Status => "Status",
            SortContext::Tags => "Tags",
            SortContext::Other(key) => key,
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            "Files" => SortContext::Files,
            "Category" => SortContext::Category,
            "Creator" => SortContext::Creator,
            "Status" => SortContext::Status,
            "Tags" => SortContext::Tags,
            other => SortContext::Other(other.to_string()),
        }
    }

    pub fn is_valid(&self, sort_type: SortType) -> bool {
        use SortType::*;
        match self {
            SortContext::Files => matches!(sort_type, Name | Date | Size | Rating),
            SortContext::Category
            | SortContext::Creator
            | SortContext::Status
            | SortContext::Tags => matches!(sort_type, Name | Count),
            SortContext::Other(_) => false,
        }
    }

    pub fn valid_types(&self) -> Vec<SortType> {
        SortType::ALL
            .into_iter()
            .filter(|t| self.is_valid(*t))
            .collect()
    }
}

impl fmt::Display for SortContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Immutable sort preference. "Changing" it produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortState {
    pub sort_type: SortType,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self::new(SortType::Name, SortDirection::Ascending)
    }
}

impl SortState {
    pub const fn new(sort_type: SortType, direction: SortDirection) -> Self {
        Self {
            sort_type,
            direction,
        }
    }

    /// Advance to the next sort type valid for `context`, resetting the
    /// direction to that type's default.
    ///
    /// Fails instead of looping when the context has no valid type at all.
    pub fn cycle_type(self, context: &SortContext) -> Result<SortState> {
        let mut next = self.sort_type;
        for _ in 0..SortType::ALL.len() {
            next = next.next();
            if context.is_valid(next) {
                return Ok(SortState::new(next, next.default_direction()));
            }
        }
        Err(GalleryError::NoValidSortType {
            context: context.key().to_string(),
        })
    }

    pub fn toggle_direction(self) -> SortState {
        SortState::new(self.sort_type, self.direction.reversed())
    }
}

/// Anything the sort engine can order.
///
/// Keys a kind of entry doesn't have default to zero. Rating and score are
/// never intrinsic; they come from a lookup passed to `sort_entries_with`.
pub trait Sortable {
    fn sort_name(&self) -> &str;

    fn sort_date(&self) -> i64 {
        0
    }

    fn sort_size(&self) -> u64 {
        0
    }

    fn sort_count(&self) -> u64 {
        0
    }
}

/// Case-insensitive lexical comparison without allocating
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Sort in place by an intrinsic key. Rating and Score have no intrinsic
/// value and fall back to name order.
pub fn sort_entries<T: Sortable>(entries: &mut [T], state: SortState) {
    sort_entries_with(entries, state, |_| 0);
}

/// Sort in place, using `external` for Rating and Score.
///
/// Numeric ties are broken by name, ascending.
pub fn sort_entries_with<T, F>(entries: &mut [T], state: SortState, mut external: F)
where
    T: Sortable,
    F: FnMut(&T) -> i64,
{
    let direction = state.direction;
    entries.sort_by(|a, b| {
        let primary = match state.sort_type {
            SortType::Name => return direction.apply(compare_names(a.sort_name(), b.sort_name())),
            SortType::Date => a.sort_date().cmp(&b.sort_date()),
            SortType::Size => a.sort_size().cmp(&b.sort_size()),
            SortType::Count => a.sort_count().cmp(&b.sort_count()),
            SortType::Score | SortType::Rating => external(a).cmp(&external(b)),
        };
        direction
            .apply(primary)
            .then_with(|| compare_names(a.sort_name(), b.sort_name()))
    });
}
