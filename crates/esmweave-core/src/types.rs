//! Identity types shared across esmweave
//!
//! Records are addressed either by a case-insensitive string id (world
//! objects, scripts, topics), by a [`RefNum`] (placed references), or by a
//! grid coordinate (cells, terrain tiles).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Four-character type code used by records and sub-records
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Create a tag from its four bytes
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Raw bytes of the tag
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Interpret as a little-endian integer (the on-disk order)
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Build from a little-endian integer
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    /// Whether every byte is one a record type code may contain.
    ///
    /// Type codes are upper-case ASCII letters, digits and `_`.
    pub fn is_valid_record_tag(&self) -> bool {
        self.0
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'_')
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02X}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("tag must be 4 bytes: {s:?}")))?;
        Ok(Tag(bytes))
    }
}

/// Case-insensitive string identity.
///
/// Keeps the spelling it was created with but compares, hashes and orders
/// ASCII-lowercased, so `"Foobar"` and `"foobar"` name the same record.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new record id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as originally spelled
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lower-cased form, used for sorted display exports
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for RecordId {}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_u8(0xFF);
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let rhs = other.0.bytes().map(|b| b.to_ascii_lowercase());
        lhs.cmp(rhs)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Narrow on-disk reference number, exactly as stored in a content file.
///
/// The top byte is a slot into the *writing file's* dependency list, so a
/// raw value means nothing until it is resolved against that list. Only
/// this type can be decoded; the resolved [`RefNum`] cannot be decoded
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawRefNum(pub u32);

impl RawRefNum {
    /// Mask selecting the 24-bit local index
    pub const INDEX_MASK: u32 = 0x00FF_FFFF;

    /// Dependency slot stored in the top byte (0 = the writing file)
    pub const fn local_slot(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// 24-bit object index
    pub const fn index(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }
}

/// Resolved reference number.
///
/// `content_file` always indexes the global load order once a reference
/// has been loaded; `None` marks a reference that was never resolved
/// (for instance one created in memory) and cannot be written in the
/// narrow form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefNum {
    /// Object index within its originating file
    pub index: u32,
    /// Originating file, as a global load-order index
    pub content_file: Option<u32>,
}

impl RefNum {
    /// Create a resolved reference number
    pub const fn new(index: u32, content_file: u32) -> Self {
        Self {
            index,
            content_file: Some(content_file),
        }
    }

    /// Create a reference number with no originating file
    pub const fn unresolved(index: u32) -> Self {
        Self {
            index,
            content_file: None,
        }
    }

    /// Whether the originating file is known
    pub const fn is_resolved(&self) -> bool {
        self.content_file.is_some()
    }
}

impl fmt::Display for RefNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.content_file {
            Some(file) => write!(f, "{}:{}", file, self.index),
            None => write!(f, "-:{}", self.index),
        }
    }
}

/// Opaque 32-bit identity used by the sibling record format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormId(pub u32);

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Cell identity: interior cells by name, exterior cells by grid position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellId {
    /// Named interior cell
    Interior(RecordId),
    /// Exterior cell on the world grid
    Exterior { x: i32, y: i32 },
}

impl CellId {
    /// Whether this is an exterior grid cell
    pub fn is_exterior(&self) -> bool {
        matches!(self, CellId::Exterior { .. })
    }

    /// Parse the textual form produced by `Display`
    pub fn parse(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix('#') {
            let mut parts = rest.split_whitespace().map(str::parse::<i32>);
            if let (Some(Ok(x)), Some(Ok(y)), None) = (parts.next(), parts.next(), parts.next()) {
                return CellId::Exterior { x, y };
            }
        }
        CellId::Interior(RecordId::from(text))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellId::Interior(name) => write!(f, "{}", name),
            CellId::Exterior { x, y } => write!(f, "#{} {}", x, y),
        }
    }
}

/// Terrain tile identity (exterior grid position)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LandId {
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for LandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_record_id_case_insensitive() {
        let a = RecordId::from("Foobar");
        let b = RecordId::from("foobar");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_record_id_keeps_spelling() {
        let id = RecordId::from("Rat_01");
        assert_eq!(id.to_string(), "Rat_01");
        assert_eq!(id.to_lowercase(), "rat_01");
    }

    #[test]
    fn test_record_id_ordering() {
        let mut ids = vec![RecordId::from("b"), RecordId::from("A"), RecordId::from("c")];
        ids.sort();
        let names: Vec<_> = ids.iter().map(RecordId::as_str).collect();
        assert_eq!(names, ["A", "b", "c"]);
    }

    #[test]
    fn test_tag_display_and_validity() {
        let tag = Tag::new(b"NPC_");
        assert_eq!(tag.to_string(), "NPC_");
        assert!(tag.is_valid_record_tag());
        assert!(!Tag::new(b"ab\0c").is_valid_record_tag());
        assert_eq!(Tag::from_u32(tag.to_u32()), tag);
    }

    #[test]
    fn test_raw_refnum_parts() {
        let raw = RawRefNum(0x0200_1234);
        assert_eq!(raw.local_slot(), 2);
        assert_eq!(raw.index(), 0x1234);
    }

    #[test]
    fn test_cell_id_display_parse() {
        let ext = CellId::Exterior { x: -2, y: 7 };
        assert_eq!(ext.to_string(), "#-2 7");
        assert_eq!(CellId::parse("#-2 7"), ext);
        assert_eq!(
            CellId::parse("Balmora, Guild of Mages"),
            CellId::Interior(RecordId::from("balmora, guild of mages"))
        );
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(id: &RecordId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    proptest! {
        #[test]
        fn test_case_variants_are_one_identity(name in "[a-zA-Z0-9_ ]{1,24}") {
            let upper = RecordId::from(name.to_ascii_uppercase());
            let lower = RecordId::from(name.to_ascii_lowercase());
            prop_assert_eq!(&upper, &lower);
            prop_assert_eq!(hash_of(&upper), hash_of(&lower));
            prop_assert_eq!(upper.cmp(&lower), Ordering::Equal);
        }
    }
}
