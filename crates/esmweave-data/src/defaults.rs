//! Fallback records
//!
//! Scripts and the engine expect a handful of globals and game settings
//! that older master files do not define. After the last file is loaded,
//! any that are still missing are added to the base layer.

use esmweave_core::RecordId;
use esmweave_parsers::{GameSetting, Global, SettingValue, VarType};
use tracing::debug;

use crate::collection::Collection;

const GLOBALS: [(&str, VarType, f32); 3] = [
    ("DaysPassed", VarType::Long, 1.0),
    ("PCWerewolf", VarType::Short, 0.0),
    ("PCYear", VarType::Short, 427.0),
];

const STRING_SETTINGS: [(&str, &str); 8] = [
    ("sCompanionShare", "Companion Share"),
    ("sCompanionWarningButtonOne", "Let the mercenary quit."),
    ("sCompanionWarningButtonTwo", "Return to Companion Share display."),
    (
        "sCompanionWarningMessage",
        "Your mercenary is poorer now than when the contract began. \
         They will quit if you do not give them gold or goods to bring their Profit Value to a positive value.",
    ),
    ("sProfitValue", "Profit Value"),
    ("sTeleportDisabled", "Teleportation magic does not work here."),
    ("sLevitateDisabled", "Levitation magic does not work here."),
    ("sDifficulty", "Difficulty"),
];

const INT_SETTINGS: [(&str, i32); 1] = [("iMaxInfoDist", 200)];

/// Add every missing fallback; returns the ids that were added
pub fn synthesize(
    globals: &mut Collection<Global>,
    settings: &mut Collection<GameSetting>,
) -> Vec<RecordId> {
    let mut added = Vec::new();

    for (name, kind, value) in GLOBALS {
        let id = RecordId::from(name);
        if globals.search_any(&id).is_none() {
            globals.load_from_base(Global::new(id.clone(), kind, value));
            added.push(id);
        }
    }

    let settings_iter = STRING_SETTINGS
        .into_iter()
        .map(|(name, text)| (name, SettingValue::String(text.to_string())))
        .chain(INT_SETTINGS.into_iter().map(|(name, v)| (name, SettingValue::Int(v))));
    for (name, value) in settings_iter {
        let id = RecordId::from(name);
        if settings.search_any(&id).is_none() {
            settings.load_from_base(GameSetting::new(id.clone(), value));
            added.push(id);
        }
    }

    if !added.is_empty() {
        debug!(count = added.len(), "Added fallback records");
    }
    added
}
