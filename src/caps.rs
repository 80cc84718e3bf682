//! Capability sets and their algebra.
//!
//! A [`Caps`] value describes what a pad or endpoint can carry: an ordered
//! list of [`Structure`]s, each naming a media type plus typed field
//! constraints. Template caps may hold ranges and lists of alternatives;
//! fixated caps hold exactly one structure with only concrete values.
//!
//! The planner never looks inside structures directly — it works through
//! the algebra: [`Caps::intersects`], [`Caps::intersect`], [`Caps::union`],
//! [`Caps::normalize`], [`Caps::intersect_with_filter`], [`Caps::is_fixed`]
//! and [`Caps::fixate`].

use std::collections::BTreeMap;
use std::fmt;

use compact_str::CompactString;

// =============================================================================
// FieldValue
// =============================================================================

/// A typed constraint on one structure field.
///
/// `Str` and `Int` are concrete; `IntRange` and `List` describe sets of
/// alternatives and only appear in template caps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A concrete string value (e.g. a format name).
    Str(CompactString),
    /// A concrete integer value.
    Int(i64),
    /// An inclusive integer range.
    IntRange(i64, i64),
    /// A list of alternatives, any of which satisfies the field.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Inclusive range constructor that keeps `min <= max`.
    pub fn range(min: i64, max: i64) -> Self {
        if min <= max {
            FieldValue::IntRange(min, max)
        } else {
            FieldValue::IntRange(max, min)
        }
    }

    /// A value is fixed when it names exactly one concrete alternative.
    pub fn is_fixed(&self) -> bool {
        match self {
            FieldValue::Str(_) | FieldValue::Int(_) => true,
            FieldValue::IntRange(min, max) => min == max,
            FieldValue::List(items) => items.len() == 1 && items[0].is_fixed(),
        }
    }

    /// Collapse to a single concrete value: ranges pick their lower bound,
    /// lists pick their first entry.
    pub fn fixate(&self) -> FieldValue {
        match self {
            FieldValue::Str(s) => FieldValue::Str(s.clone()),
            FieldValue::Int(v) => FieldValue::Int(*v),
            FieldValue::IntRange(min, _) => FieldValue::Int(*min),
            FieldValue::List(items) => items
                .first()
                .map(FieldValue::fixate)
                .unwrap_or(FieldValue::List(Vec::new())),
        }
    }

    /// Intersection of two field constraints, `None` when disjoint.
    pub fn intersect(&self, other: &FieldValue) -> Option<FieldValue> {
        use FieldValue::*;
        match (self, other) {
            (Str(a), Str(b)) => (a == b).then(|| Str(a.clone())),
            (Int(a), Int(b)) => (a == b).then_some(Int(*a)),
            (Int(v), IntRange(min, max)) | (IntRange(min, max), Int(v)) => {
                (min <= v && v <= max).then_some(Int(*v))
            }
            (IntRange(a0, a1), IntRange(b0, b1)) => {
                let lo = *a0.max(b0);
                let hi = *a1.min(b1);
                if lo > hi {
                    None
                } else if lo == hi {
                    Some(Int(lo))
                } else {
                    Some(IntRange(lo, hi))
                }
            }
            (List(items), other) | (other, List(items)) => {
                let hits: Vec<FieldValue> =
                    items.iter().filter_map(|v| v.intersect(other)).collect();
                match hits.len() {
                    0 => None,
                    1 => Some(hits.into_iter().next().unwrap()),
                    _ => Some(List(hits)),
                }
            }
            // Mismatched value kinds never intersect
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(CompactString::from(s))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::IntRange(min, max) => write!(f, "[{min},{max}]"),
            FieldValue::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// =============================================================================
// Structure
// =============================================================================

/// One media type plus its field constraints.
///
/// Fields are kept in a `BTreeMap` so iteration order (and therefore
/// display, hashing and comparison) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    media: CompactString,
    fields: BTreeMap<CompactString, FieldValue>,
}

impl Structure {
    /// Create a structure with a media type and no field constraints.
    pub fn new(media: impl AsRef<str>) -> Self {
        Self {
            media: CompactString::from(media.as_ref()),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field constraint.
    pub fn field(mut self, name: impl AsRef<str>, value: impl Into<FieldValue>) -> Self {
        self.fields
            .insert(CompactString::from(name.as_ref()), value.into());
        self
    }

    /// The media type name.
    pub fn media(&self) -> &str {
        &self.media
    }

    /// Look up a field constraint.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Iterate fields in deterministic (name) order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fixed means every field names exactly one concrete value.
    pub fn is_fixed(&self) -> bool {
        self.fields.values().all(FieldValue::is_fixed)
    }

    /// Intersect two structures. Media types must match exactly; fields
    /// present on both sides must intersect, fields present on one side
    /// only are kept as-is (an absent field is unconstrained).
    pub fn intersect(&self, other: &Structure) -> Option<Structure> {
        if self.media != other.media {
            return None;
        }
        let mut fields = BTreeMap::new();
        for (name, a) in &self.fields {
            match other.fields.get(name) {
                Some(b) => {
                    fields.insert(name.clone(), a.intersect(b)?);
                }
                None => {
                    fields.insert(name.clone(), a.clone());
                }
            }
        }
        for (name, b) in &other.fields {
            if !self.fields.contains_key(name) {
                fields.insert(name.clone(), b.clone());
            }
        }
        Some(Structure {
            media: self.media.clone(),
            fields,
        })
    }

    /// Collapse every field to a concrete value.
    pub fn fixate(&self) -> Structure {
        Structure {
            media: self.media.clone(),
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.fixate()))
                .collect(),
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media)?;
        for (name, value) in &self.fields {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Caps
// =============================================================================

/// An ordered union of structures.
///
/// The empty caps intersects nothing; the ANY caps intersects everything
/// non-empty. Structure order is meaningful: fixation and tie-breaking
/// always prefer earlier structures, which is what makes planning
/// deterministic in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Caps {
    any: bool,
    structures: Vec<Structure>,
}

impl Caps {
    /// The empty caps (intersects nothing, fixates to nothing).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The unconstrained caps, used by utility pad templates that accept
    /// whatever arrives (splitter, null sink).
    pub fn any() -> Self {
        Caps {
            any: true,
            structures: Vec::new(),
        }
    }

    /// True for the unconstrained caps.
    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Caps holding a single bare media type.
    pub fn media(name: impl AsRef<str>) -> Self {
        Structure::new(name).into()
    }

    /// Caps from an explicit structure list.
    pub fn from_structures(structures: Vec<Structure>) -> Self {
        Caps {
            any: false,
            structures,
        }
        .normalize()
    }

    /// Append an alternative structure.
    pub fn with(mut self, structure: Structure) -> Self {
        self.structures.push(structure);
        self.normalize()
    }

    pub fn is_empty(&self) -> bool {
        !self.any && self.structures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Iterate structures in order.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.iter()
    }

    /// First structure, if any.
    pub fn first(&self) -> Option<&Structure> {
        self.structures.first()
    }

    /// True when some pair of structures from `self` and `other` intersects.
    /// ANY intersects everything except the empty caps.
    pub fn intersects(&self, other: &Caps) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.any || other.any {
            return true;
        }
        self.structures
            .iter()
            .any(|a| other.structures.iter().any(|b| a.intersect(b).is_some()))
    }

    /// Pairwise intersection, ordered by `self` first then `other`.
    /// ANY is the identity.
    pub fn intersect(&self, other: &Caps) -> Caps {
        if self.any {
            return other.clone().normalize();
        }
        if other.any {
            return self.clone().normalize();
        }
        let mut out = Vec::new();
        for a in &self.structures {
            for b in &other.structures {
                if let Some(s) = a.intersect(b) {
                    out.push(s);
                }
            }
        }
        Caps {
            any: false,
            structures: out,
        }
        .normalize()
    }

    /// Union keeps the left operand's alternatives first. ANY absorbs.
    pub fn union(&self, other: &Caps) -> Caps {
        if self.any || other.any {
            return Caps::any();
        }
        let mut out = self.structures.clone();
        out.extend(other.structures.iter().cloned());
        Caps {
            any: false,
            structures: out,
        }
        .normalize()
    }

    /// Drop structurally equal duplicates, keeping first occurrences.
    pub fn normalize(mut self) -> Caps {
        if self.any {
            return Caps::any();
        }
        let mut seen: Vec<Structure> = Vec::with_capacity(self.structures.len());
        for s in self.structures.drain(..) {
            if !seen.contains(&s) {
                seen.push(s);
            }
        }
        Caps {
            any: false,
            structures: seen,
        }
    }

    /// Intersect with a filter and normalize, the shape every capability
    /// query returns. An empty filter means "no constraint".
    pub fn intersect_with_filter(&self, filter: &Caps) -> Caps {
        if filter.is_empty() {
            self.clone().normalize()
        } else {
            self.intersect(filter)
        }
    }

    /// Fixed caps carry exactly one structure with only concrete values.
    pub fn is_fixed(&self) -> bool {
        !self.any && self.structures.len() == 1 && self.structures[0].is_fixed()
    }

    /// Reduce to a single fully concrete structure, preferring the first
    /// alternative. Empty and ANY caps cannot be fixated.
    pub fn fixate(&self) -> Option<Caps> {
        self.structures.first().map(|s| Caps {
            any: false,
            structures: vec![s.fixate()],
        })
    }
}

impl From<Structure> for Caps {
    fn from(structure: Structure) -> Self {
        Caps {
            any: false,
            structures: vec![structure],
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any {
            return write!(f, "ANY");
        }
        if self.structures.is_empty() {
            return write!(f, "EMPTY");
        }
        for (i, s) in self.structures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
