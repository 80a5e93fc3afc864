//! Merged content of a load session
//!
//! One overlay container per record kind, plus the response chains, the
//! per-cell reference summaries and the reference-to-cell index that
//! write-back needs to put references back under their cells.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use esmweave_core::{CellId, LandId, RecordId, RefNum};
use esmweave_parsers::records::tags;
use esmweave_parsers::{
    write_role_marker, Cell, CellRef, Container, Creature, Dialogue, DialogueInfo, EsmRecord,
    EsmWriter, FileHeader, GameSetting, Global, Identified, Land, LandTexture, Npc, ParseResult,
    RecordKind, RefNumCodec, ReferenceRole, Script, TextCodec, GLOBAL_REGISTRY,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cell_groups::CellGroups;
use crate::collection::{Collection, CollectionStats, Entry, Layer, RecordState};
use crate::info_order::InfoOrder;

#[derive(Debug, Clone, Default)]
pub struct ContentData {
    pub globals: Collection<Global>,
    pub game_settings: Collection<GameSetting>,
    pub scripts: Collection<Script>,
    pub npcs: Collection<Npc>,
    pub creatures: Collection<Creature>,
    pub containers: Collection<Container>,
    pub dialogues: Collection<Dialogue>,
    pub infos: Collection<DialogueInfo>,
    pub info_order: InfoOrder,
    pub cells: Collection<Cell>,
    pub references: Collection<CellRef>,
    pub cell_groups: CellGroups,
    pub lands: Collection<Land>,
    pub land_textures: Collection<LandTexture>,
    /// Cell each reference was last read under
    pub(crate) reference_cells: HashMap<RefNum, CellId>,
}

/// Parse the textual form of a terrain tile id: `#x y` or `x,y`
pub fn parse_land_id(text: &str) -> Option<LandId> {
    let text = text.trim().trim_start_matches('#');
    let mut parts = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(str::parse::<i32>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Some(LandId { x, y }),
        _ => None,
    }
}

fn entry_json<T>(collection: &Collection<T>, id: &T::Id) -> serde_json::Result<Option<Value>>
where
    T: Identified + Clone + Serialize,
    T::Id: Serialize,
{
    collection.get_by_id(id).map(serde_json::to_value).transpose()
}

impl ContentData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell a reference belongs to
    pub fn cell_of(&self, refnum: RefNum) -> Option<&CellId> {
        self.reference_cells.get(&refnum)
    }

    /// Whether `id` names a live record of `kind`
    pub fn has_identity(&self, kind: RecordKind, id: &str) -> bool {
        let rid = RecordId::from(id);
        match kind {
            RecordKind::Global => self.globals.has_identity(&rid),
            RecordKind::GameSetting => self.game_settings.has_identity(&rid),
            RecordKind::Script => self.scripts.has_identity(&rid),
            RecordKind::Npc => self.npcs.has_identity(&rid),
            RecordKind::Creature => self.creatures.has_identity(&rid),
            RecordKind::Container => self.containers.has_identity(&rid),
            RecordKind::Dialogue => self.dialogues.has_identity(&rid),
            RecordKind::DialogueInfo => self.infos.has_identity(&rid),
            RecordKind::Cell => self.cells.has_identity(&CellId::parse(id)),
            RecordKind::Land => parse_land_id(id).is_some_and(|land| self.lands.has_identity(&land)),
            RecordKind::LandTexture => self.land_textures.has_identity(&rid),
        }
    }

    /// One entry, both layers and its state, as JSON
    pub fn entry_json(&self, kind: RecordKind, id: &str) -> serde_json::Result<Option<Value>> {
        let rid = RecordId::from(id);
        match kind {
            RecordKind::Global => entry_json(&self.globals, &rid),
            RecordKind::GameSetting => entry_json(&self.game_settings, &rid),
            RecordKind::Script => entry_json(&self.scripts, &rid),
            RecordKind::Npc => entry_json(&self.npcs, &rid),
            RecordKind::Creature => entry_json(&self.creatures, &rid),
            RecordKind::Container => entry_json(&self.containers, &rid),
            RecordKind::Dialogue => entry_json(&self.dialogues, &rid),
            RecordKind::DialogueInfo => entry_json(&self.infos, &rid),
            RecordKind::Cell => entry_json(&self.cells, &CellId::parse(id)),
            RecordKind::Land => match parse_land_id(id) {
                Some(land) => entry_json(&self.lands, &land),
                None => Ok(None),
            },
            RecordKind::LandTexture => entry_json(&self.land_textures, &rid),
        }
    }

    /// Per-kind tallies, in registry order
    pub fn stats(&self) -> Vec<(RecordKind, CollectionStats)> {
        RecordKind::ALL
            .into_iter()
            .map(|kind| {
                let stats = match kind {
                    RecordKind::Global => self.globals.stats(),
                    RecordKind::GameSetting => self.game_settings.stats(),
                    RecordKind::Script => self.scripts.stats(),
                    RecordKind::Npc => self.npcs.stats(),
                    RecordKind::Creature => self.creatures.stats(),
                    RecordKind::Container => self.containers.stats(),
                    RecordKind::Dialogue => self.dialogues.stats(),
                    RecordKind::DialogueInfo => self.infos.stats(),
                    RecordKind::Cell => self.cells.stats(),
                    RecordKind::Land => self.lands.stats(),
                    RecordKind::LandTexture => self.land_textures.stats(),
                };
                (kind, stats)
            })
            .collect()
    }

    /// Live responses of a topic in chain order
    pub fn ordered_infos(&self, topic: &RecordId) -> Vec<&DialogueInfo> {
        self.info_order
            .ordered(topic)
            .into_iter()
            .filter_map(|info| self.infos.find(&DialogueInfo::key(topic, info)))
            .collect()
    }

    /// Live references of a cell, grouped by role
    pub fn cell_references(&self, cell: &CellId) -> Vec<&CellRef> {
        let Some(summary) = self.cell_groups.get(cell) else {
            return Vec::new();
        };
        [
            ReferenceRole::Persistent,
            ReferenceRole::Temporary,
            ReferenceRole::VisibleDistant,
        ]
        .into_iter()
        .flat_map(|role| summary.list(role).to_vec())
        .filter_map(|refnum| self.references.find(&refnum))
        .collect()
    }

    /// Write every entry that differs from the masters as one content file.
    ///
    /// `refnums` describes the written file's place in the load order so
    /// reference numbers can be packed against its masters. The header's
    /// record count is filled in. Returns the number of records written.
    pub fn write_plugin<W: Write>(
        &self,
        out: &mut W,
        header: &FileHeader,
        refnums: &RefNumCodec,
        text: Arc<dyn TextCodec>,
    ) -> ParseResult<u32> {
        let mut body = EsmWriter::new(Vec::new()).with_codec(Arc::clone(&text));

        if writes(RecordKind::Global) {
            write_changed(&self.globals, &mut body)?;
        }
        if writes(RecordKind::GameSetting) {
            write_changed(&self.game_settings, &mut body)?;
        }
        if writes(RecordKind::Script) {
            write_changed(&self.scripts, &mut body)?;
        }
        if writes(RecordKind::LandTexture) {
            write_changed(&self.land_textures, &mut body)?;
        }
        if writes(RecordKind::Npc) {
            write_changed(&self.npcs, &mut body)?;
        }
        if writes(RecordKind::Creature) {
            write_changed(&self.creatures, &mut body)?;
        }
        if writes(RecordKind::Container) {
            write_changed(&self.containers, &mut body)?;
        }
        if writes(RecordKind::Cell) {
            self.write_cells(&mut body, refnums)?;
        }
        if writes(RecordKind::Land) {
            write_changed(&self.lands, &mut body)?;
        }
        if writes(RecordKind::Dialogue) {
            self.write_dialogue(&mut body)?;
        }

        let records = body.records_written();
        let header = FileHeader {
            record_count: records,
            ..header.clone()
        };
        let mut head = EsmWriter::new(&mut *out).with_codec(text);
        header.write(&mut head)?;
        out.write_all(&body.into_inner())?;

        debug!(records, masters = header.masters.len(), "Wrote plugin");
        Ok(records)
    }

    fn write_cells<W: Write>(&self, writer: &mut EsmWriter<W>, refnums: &RefNumCodec) -> ParseResult<()> {
        let mut changed_refs: HashMap<&CellId, Vec<&Entry<CellRef>>> = HashMap::new();
        for entry in self.references.changed() {
            if let Some(cell) = self.reference_cells.get(entry.id()) {
                changed_refs.entry(cell).or_default().push(entry);
            }
        }

        for entry in self.cells.iter_all() {
            let refs = changed_refs.remove(entry.id()).unwrap_or_default();
            if entry.state() == RecordState::BaseOnly && refs.is_empty() {
                continue;
            }
            if entry.is_deleted() {
                self.cells.write_entry(entry.id(), Layer::Modified, writer)?;
                continue;
            }
            let Some(cell) = entry.current() else {
                continue;
            };

            writer.start_record(tags::CELL, cell.record_flags())?;
            cell.save(writer, false)?;
            for role in [
                ReferenceRole::Persistent,
                ReferenceRole::Temporary,
                ReferenceRole::VisibleDistant,
            ] {
                let in_role: Vec<_> = refs
                    .iter()
                    .filter_map(|r| r.last_known().map(|value| (value, r.is_deleted())))
                    .filter(|(value, _)| value.role == role)
                    .collect();
                if in_role.is_empty() {
                    continue;
                }
                let count = u32::try_from(in_role.len()).unwrap_or(u32::MAX);
                write_role_marker(writer, role, count)?;
                for (value, deleted) in in_role {
                    value.save(writer, refnums, deleted)?;
                }
            }
            writer.end_record()?;
        }
        Ok(())
    }

    fn write_dialogue<W: Write>(&self, writer: &mut EsmWriter<W>) -> ParseResult<()> {
        let mut changed_infos: HashMap<&RecordId, Vec<&Entry<DialogueInfo>>> = HashMap::new();
        for entry in self.infos.changed() {
            if let Some(info) = entry.last_known() {
                changed_infos.entry(&info.topic).or_default().push(entry);
            }
        }

        for entry in self.dialogues.iter_all() {
            let topic = entry.id();
            let infos = changed_infos.remove(topic).unwrap_or_default();
            if entry.state() == RecordState::BaseOnly && infos.is_empty() {
                continue;
            }
            let layer = if entry.state() == RecordState::BaseOnly {
                Layer::Base
            } else {
                Layer::Modified
            };
            self.dialogues.write_entry(topic, layer, writer)?;
            if entry.is_deleted() {
                continue;
            }

            // Live responses in chain order, then tombstones.
            let mut written = Vec::with_capacity(infos.len());
            for id in self.info_order.ordered(topic) {
                let key = DialogueInfo::key(topic, id);
                if infos.iter().any(|e| *e.id() == key) {
                    self.infos.write_entry(&key, Layer::Modified, writer)?;
                    written.push(key);
                }
            }
            for info in &infos {
                if !written.contains(info.id()) {
                    self.infos.write_entry(info.id(), Layer::Modified, writer)?;
                }
            }
        }
        Ok(())
    }
}

fn writes(kind: RecordKind) -> bool {
    GLOBAL_REGISTRY.get(kind).is_ok_and(|r| r.write_back)
}

fn write_changed<T: EsmRecord, W: Write>(
    collection: &Collection<T>,
    writer: &mut EsmWriter<W>,
) -> ParseResult<()> {
    for entry in collection.changed() {
        collection.write_entry(entry.id(), Layer::Modified, writer)?;
    }
    Ok(())
}
