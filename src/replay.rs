//! Replay records as returned by the remote API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Fact-table columns in storage order. The CSV sink writes its header and
/// rows in this order, and the SQLite sink uses it for inserts.
pub const COLUMNS: [&str; 30] = [
    "battle_at",
    "battle_id",
    "battle_type",
    "game_version",
    "p1_area_id",
    "p1_chara_id",
    "p1_lang",
    "p1_name",
    "p1_polaris_id",
    "p1_power",
    "p1_rank",
    "p1_rating_before",
    "p1_rating_change",
    "p1_region_id",
    "p1_rounds",
    "p1_user_id",
    "p2_area_id",
    "p2_chara_id",
    "p2_lang",
    "p2_name",
    "p2_polaris_id",
    "p2_power",
    "p2_rank",
    "p2_rating_before",
    "p2_rating_change",
    "p2_region_id",
    "p2_rounds",
    "p2_user_id",
    "stage_id",
    "winner",
];

/// One completed match.
///
/// Field order matches [`COLUMNS`]; serde serialization relies on it.
/// Unknown JSON fields are ignored. A missing or null `winner` decodes as
/// `0` (unknown outcome).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub battle_at: i64,
    pub battle_id: String,
    pub battle_type: i64,
    pub game_version: i64,

    pub p1_area_id: Option<i64>,
    pub p1_chara_id: i64,
    pub p1_lang: Option<String>,
    pub p1_name: String,
    pub p1_polaris_id: String,
    pub p1_power: i64,
    pub p1_rank: i64,
    pub p1_rating_before: Option<i64>,
    pub p1_rating_change: Option<i64>,
    pub p1_region_id: Option<i64>,
    pub p1_rounds: i64,
    pub p1_user_id: i64,

    pub p2_area_id: Option<i64>,
    pub p2_chara_id: i64,
    pub p2_lang: Option<String>,
    pub p2_name: String,
    pub p2_polaris_id: String,
    pub p2_power: i64,
    pub p2_rank: i64,
    pub p2_rating_before: Option<i64>,
    pub p2_rating_change: Option<i64>,
    pub p2_region_id: Option<i64>,
    pub p2_rounds: i64,
    pub p2_user_id: i64,

    pub stage_id: i64,
    #[serde(default, deserialize_with = "null_as_unknown")]
    pub winner: i64,
}

fn null_as_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Records decoded from one API response.
#[derive(Debug, Default)]
pub struct DecodedWindow {
    pub records: Vec<ReplayRecord>,
    /// Items that were not valid replay objects, with the decoder error.
    pub malformed: Vec<(usize, String)>,
}

/// Decodes a response body item by item.
///
/// The body must be a JSON array; an item that does not decode as a
/// [`ReplayRecord`] is set aside in [`DecodedWindow::malformed`] and the
/// rest of the window is kept.
///
/// # Errors
///
/// Returns the decoder error if the body is not a JSON array.
pub fn decode_window(body: &[u8]) -> Result<DecodedWindow, serde_json::Error> {
    let items: Vec<Value> = serde_json::from_slice(body)?;
    let mut window = DecodedWindow {
        records: Vec::with_capacity(items.len()),
        malformed: Vec::new(),
    };
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(record) => window.records.push(record),
            Err(e) => window.malformed.push((index, e.to_string())),
        }
    }
    Ok(window)
}

/// Match outcome decoded from the `winner` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Player1,
    Player2,
    Tie,
    Unknown,
}

impl Winner {
    /// Maps a raw `winner` code: 1, 2, 3, anything else unknown.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Player1,
            2 => Self::Player2,
            3 => Self::Tie,
            _ => Self::Unknown,
        }
    }
}

impl ReplayRecord {
    /// Decoded match outcome.
    #[must_use]
    pub fn outcome(&self) -> Winner {
        Winner::from_code(self.winner)
    }
}
