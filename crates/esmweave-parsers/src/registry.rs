//! Record kind registry
//!
//! Maps top-level record tags to the closed set of [`RecordKind`]s the
//! loader knows how to merge, with a little metadata for listings. The
//! loader consults the registry once per record; tags with no registration
//! are skipped.

use std::collections::HashMap;

use esmweave_core::Tag;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::records::tags;

/// Every record kind with a typed model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Global,
    GameSetting,
    Script,
    Npc,
    Creature,
    Container,
    Dialogue,
    DialogueInfo,
    Cell,
    Land,
    LandTexture,
}

impl RecordKind {
    pub const ALL: [RecordKind; 11] = [
        RecordKind::Global,
        RecordKind::GameSetting,
        RecordKind::Script,
        RecordKind::Npc,
        RecordKind::Creature,
        RecordKind::Container,
        RecordKind::Dialogue,
        RecordKind::DialogueInfo,
        RecordKind::Cell,
        RecordKind::Land,
        RecordKind::LandTexture,
    ];

    /// Top-level record tag
    pub fn tag(self) -> Tag {
        match self {
            RecordKind::Global => tags::GLOB,
            RecordKind::GameSetting => tags::GMST,
            RecordKind::Script => tags::SCPT,
            RecordKind::Npc => tags::NPC_,
            RecordKind::Creature => tags::CREA,
            RecordKind::Container => tags::CONT,
            RecordKind::Dialogue => tags::DIAL,
            RecordKind::DialogueInfo => tags::INFO,
            RecordKind::Cell => tags::CELL,
            RecordKind::Land => tags::LAND,
            RecordKind::LandTexture => tags::LTEX,
        }
    }

    pub fn from_tag(tag: Tag) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Short lowercase name, as accepted on the command line
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Global => "global",
            RecordKind::GameSetting => "gmst",
            RecordKind::Script => "script",
            RecordKind::Npc => "npc",
            RecordKind::Creature => "creature",
            RecordKind::Container => "container",
            RecordKind::Dialogue => "dialogue",
            RecordKind::DialogueInfo => "info",
            RecordKind::Cell => "cell",
            RecordKind::Land => "land",
            RecordKind::LandTexture => "ltex",
        }
    }

    /// Parse a name or a four-character tag, ignoring case
    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            kind.name().eq_ignore_ascii_case(text) || kind.tag().to_string().eq_ignore_ascii_case(text)
        })
    }
}

/// Registration entry for one record kind
#[derive(Debug, Clone, Serialize)]
pub struct RecordRegistration {
    pub kind: RecordKind,
    pub tag: Tag,
    /// Human-readable name
    pub name: String,
    pub description: String,
    /// Whether modified entries of this kind are written by `save`
    pub write_back: bool,
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Record kind '{0}' already registered")]
    DuplicateKind(&'static str),

    #[error("Tag {0} already claimed by another record kind")]
    DuplicateTag(Tag),

    #[error("Record kind '{0}' not registered")]
    NotFound(&'static str),

    #[error("No record kind registered for tag {0}")]
    NoKindForTag(Tag),

    #[error("Incomplete registration: {0}")]
    Incomplete(&'static str),
}

/// Tag to record kind table
#[derive(Default)]
pub struct RecordRegistry {
    kinds: RwLock<HashMap<RecordKind, RecordRegistration>>,
    by_tag: RwLock<HashMap<Tag, RecordKind>>,
}

impl RecordRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in kind
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        register_builtin_kinds(&registry);
        registry
    }

    pub fn register(&self, registration: RecordRegistration) -> Result<(), RegistryError> {
        let mut kinds = self.kinds.write();
        let mut by_tag = self.by_tag.write();

        if kinds.contains_key(&registration.kind) {
            return Err(RegistryError::DuplicateKind(registration.kind.name()));
        }
        if by_tag.contains_key(&registration.tag) {
            return Err(RegistryError::DuplicateTag(registration.tag));
        }

        by_tag.insert(registration.tag, registration.kind);
        kinds.insert(registration.kind, registration);
        Ok(())
    }

    pub fn unregister(&self, kind: RecordKind) -> Result<RecordRegistration, RegistryError> {
        let mut kinds = self.kinds.write();
        let registration = kinds
            .remove(&kind)
            .ok_or(RegistryError::NotFound(kind.name()))?;
        self.by_tag.write().remove(&registration.tag);
        Ok(registration)
    }

    pub fn get(&self, kind: RecordKind) -> Result<RecordRegistration, RegistryError> {
        self.kinds
            .read()
            .get(&kind)
            .cloned()
            .ok_or(RegistryError::NotFound(kind.name()))
    }

    /// Kind handling a top-level record tag
    pub fn get_for_tag(&self, tag: Tag) -> Result<RecordKind, RegistryError> {
        self.by_tag
            .read()
            .get(&tag)
            .copied()
            .ok_or(RegistryError::NoKindForTag(tag))
    }

    /// All registrations, in load dispatch order
    pub fn list(&self) -> Vec<RecordRegistration> {
        let mut all: Vec<_> = self.kinds.read().values().cloned().collect();
        all.sort_by_key(|r| r.kind);
        all
    }
}

/// Global registry instance
pub static GLOBAL_REGISTRY: Lazy<RecordRegistry> = Lazy::new(RecordRegistry::with_builtin);

/// Register every built-in kind the registry does not already claim.
/// Returns how many were added.
fn register_builtin_kinds(registry: &RecordRegistry) -> usize {
    let builtin: [(RecordKind, &str, &str); 11] = [
        (RecordKind::Global, "Global variable", "Script-visible short, long or float value"),
        (RecordKind::GameSetting, "Game setting", "Engine tuning value"),
        (RecordKind::Script, "Script", "Compiled script with deferred source text"),
        (RecordKind::Npc, "NPC", "Non-player character"),
        (RecordKind::Creature, "Creature", "Creature with combat statistics"),
        (RecordKind::Container, "Container", "Container with an inventory"),
        (RecordKind::Dialogue, "Dialogue topic", "Owner of the INFO records that follow it"),
        (RecordKind::DialogueInfo, "Dialogue response", "Linked response within a topic"),
        (RecordKind::Cell, "Cell", "Interior or exterior cell and its references"),
        (RecordKind::Land, "Landscape", "Terrain tile with deferred layers"),
        (RecordKind::LandTexture, "Landscape texture", "Terrain texture index"),
    ];

    let mut added = 0;
    for (kind, name, description) in builtin {
        let result = RecordRegistrationBuilder::new()
            .kind(kind)
            .name(name)
            .description(description)
            .build()
            .and_then(|registration| registry.register(registration));
        match result {
            Ok(()) => added += 1,
            Err(e) => warn!(kind = kind.name(), "Skipping built-in record kind: {e}"),
        }
    }
    added
}

/// Builder for record registrations
#[derive(Debug, Default)]
pub struct RecordRegistrationBuilder {
    kind: Option<RecordKind>,
    tag: Option<Tag>,
    name: Option<String>,
    description: String,
    write_back: bool,
}

impl RecordRegistrationBuilder {
    pub fn new() -> Self {
        Self {
            write_back: true,
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Override the tag; defaults to the kind's own
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn write_back(mut self, write_back: bool) -> Self {
        self.write_back = write_back;
        self
    }

    pub fn build(self) -> Result<RecordRegistration, RegistryError> {
        let kind = self.kind.ok_or(RegistryError::Incomplete("kind is required"))?;

        Ok(RecordRegistration {
            kind,
            tag: self.tag.unwrap_or_else(|| kind.tag()),
            name: self.name.unwrap_or_else(|| kind.name().to_string()),
            description: self.description,
            write_back: self.write_back,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_kind() {
        let registry = RecordRegistry::with_builtin();
        let listed: Vec<_> = registry.list().into_iter().map(|r| r.kind).collect();
        assert_eq!(listed, RecordKind::ALL);

        for kind in RecordKind::ALL {
            assert_eq!(registry.get_for_tag(kind.tag()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let registry = RecordRegistry::with_builtin();
        let err = registry.get_for_tag(Tag::new(b"BOOK")).unwrap_err();
        assert!(matches!(err, RegistryError::NoKindForTag(_)));
    }

    #[test]
    fn test_duplicates_rejected() {
        let registry = RecordRegistry::new();
        let global = RecordRegistrationBuilder::new()
            .kind(RecordKind::Global)
            .build()
            .unwrap();
        registry.register(global.clone()).unwrap();
        assert!(matches!(
            registry.register(global),
            Err(RegistryError::DuplicateKind("global"))
        ));

        let clash = RecordRegistrationBuilder::new()
            .kind(RecordKind::GameSetting)
            .tag(tags::GLOB)
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(clash),
            Err(RegistryError::DuplicateTag(_))
        ));
    }

    #[test]
    fn test_builtin_skips_claimed_tag() {
        let registry = RecordRegistry::new();
        let clash = RecordRegistrationBuilder::new()
            .kind(RecordKind::GameSetting)
            .tag(tags::GLOB)
            .build()
            .unwrap();
        registry.register(clash).unwrap();

        assert_eq!(register_builtin_kinds(&registry), RecordKind::ALL.len() - 2);
        assert!(registry.get(RecordKind::Global).is_err());
        assert_eq!(registry.get_for_tag(tags::GLOB).unwrap(), RecordKind::GameSetting);
        assert!(registry.get(RecordKind::Creature).is_ok());
    }

    #[test]
    fn test_unregister_frees_tag() {
        let registry = RecordRegistry::with_builtin();
        let removed = registry.unregister(RecordKind::Land).unwrap();
        assert_eq!(removed.tag, tags::LAND);
        assert!(registry.get_for_tag(tags::LAND).is_err());
        assert!(registry.get(RecordKind::Land).is_err());
        assert!(registry.unregister(RecordKind::Land).is_err());
    }

    #[test]
    fn test_builder_requires_kind() {
        let err = RecordRegistrationBuilder::new().name("nameless").build().unwrap_err();
        assert!(matches!(err, RegistryError::Incomplete(_)));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(RecordKind::parse("NPC_"), Some(RecordKind::Npc));
        assert_eq!(RecordKind::parse("Gmst"), Some(RecordKind::GameSetting));
        assert_eq!(RecordKind::parse("info"), Some(RecordKind::DialogueInfo));
        assert_eq!(RecordKind::parse("book"), None);
    }
}
