//! Static reference data for the lookup tables.
//!
//! Each table is an ordered list of `(id, name)` pairs. The same constants
//! seed the SQLite lookup tables and validate incoming codes.

/// A named lookup table.
#[derive(Debug, Clone, Copy)]
pub struct LookupTable {
    /// SQL table name.
    pub name: &'static str,
    /// `(id, name)` rows.
    pub rows: &'static [(i64, &'static str)],
}

impl LookupTable {
    /// Returns the display name for a code.
    #[must_use]
    pub fn name_of(&self, id: i64) -> Option<&'static str> {
        self.rows
            .iter()
            .find(|(row_id, _)| *row_id == id)
            .map(|(_, name)| *name)
    }

    /// Whether the code exists in the table.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.name_of(id).is_some()
    }
}

pub const CHARACTERS: LookupTable = LookupTable {
    name: "Characters",
    rows: &[
        (0, "Paul"),
        (1, "Law"),
        (2, "King"),
        (3, "Yoshimitsu"),
        (4, "Hwoarang"),
        (5, "Xiaoyu"),
        (6, "Jin"),
        (7, "Bryan"),
        (8, "Kazuya"),
        (9, "Steve"),
        (10, "Jack_8"),
        (11, "Asuka"),
        (12, "Devil_Jin"),
        (13, "Feng"),
        (14, "Lili"),
        (15, "Dragunov"),
        (16, "Leo"),
        (17, "Lars"),
        (18, "Alisa"),
        (19, "Claudio"),
        (20, "Shaheen"),
        (21, "Nina"),
        (22, "Lee"),
        (23, "Kuma"),
        (24, "Panda"),
        (28, "Zafina"),
        (29, "Leroy"),
        (32, "Jun"),
        (33, "Reina"),
        (34, "Azucena"),
        (35, "Victor"),
        (36, "Raven"),
        (38, "Eddy"),
        (39, "Lidia"),
        (40, "Heihachi"),
        (41, "Clive"),
        (42, "Anna"),
        (43, "Fahkumram"),
    ],
};

/// Rank code substituted for codes missing from [`RANKS`].
pub const RANK_OVERFLOW: i64 = 1000;

pub const RANKS: LookupTable = LookupTable {
    name: "Ranks",
    rows: &[
        (0, "Beginner"),
        (1, "First_Dan"),
        (2, "Second_Dan"),
        (3, "Fighter"),
        (4, "Strategist"),
        (5, "Combatant"),
        (6, "Brawler"),
        (7, "Ranger"),
        (8, "Cavalry"),
        (9, "Warrior"),
        (10, "Assailant"),
        (11, "Dominator"),
        (12, "Vanquisher"),
        (13, "Destroyer"),
        (14, "Eliminator"),
        (15, "Garyu"),
        (16, "Shinryu"),
        (17, "Tenryu"),
        (18, "Mighty_Ruler"),
        (19, "Flame_Ruler"),
        (20, "Battle_Ruler"),
        (21, "Fujin"),
        (22, "Raijin"),
        (23, "Kishin"),
        (24, "Bushin"),
        (25, "Tekken_King"),
        (26, "Tekken_Emperor"),
        (27, "Tekken_God"),
        (28, "Tekken_God_Supreme"),
        (29, "God_of_Destruction"),
        (30, "God_of_Destruction_1"),
        (31, "God_of_Destruction_2"),
        (32, "God_of_Destruction_3"),
        (33, "God_of_Destruction_4"),
        (34, "God_of_Destruction_5"),
        (35, "God_of_Destruction_6"),
        (36, "God_of_Destruction_7"),
        (RANK_OVERFLOW, "God_of_Destruction_Infinity"),
    ],
};

pub const BATTLE_TYPES: LookupTable = LookupTable {
    name: "BattleTypes",
    rows: &[
        (1, "Quick_Match"),
        (2, "Ranked_Match"),
        (3, "Group_Match"),
        (4, "Player_Match"),
    ],
};

pub const REGIONS: LookupTable = LookupTable {
    name: "Regions",
    rows: &[
        (0, "Asia"),
        (1, "Middle_East"),
        (2, "Oceania"),
        (3, "America"),
        (4, "Europe"),
        (5, "Africa"),
    ],
};

pub const STAGES: LookupTable = LookupTable {
    name: "Stages",
    rows: &[
        (100, "Arena"),
        (101, "Arena_Underground"),
        (200, "Urban_Square"),
        (201, "Urban_Square_Evening"),
        (300, "Yakushima"),
        (400, "Coliseum_of_Fate"),
        (500, "Rebel_Hangar"),
        (700, "Fallen_Destiny"),
        (900, "Descent_Into_Subconscious"),
        (1000, "Sanctum"),
        (1100, "Into_the_Stratosphere"),
        (1200, "Ortiz_Farm"),
        (1300, "Celebration_On_The_Seine"),
        (1400, "Secluded_Training_Ground"),
        (1500, "Elegant_Palace"),
        (1600, "Midnight_Siege"),
    ],
};

/// All lookup tables, in seeding order.
pub const ALL_TABLES: [LookupTable; 5] = [BATTLE_TYPES, CHARACTERS, REGIONS, RANKS, STAGES];

/// Maps a rank code to itself if known, otherwise to [`RANK_OVERFLOW`].
#[must_use]
pub fn normalize_rank(code: i64) -> i64 {
    if RANKS.contains(code) {
        code
    } else {
        RANK_OVERFLOW
    }
}

/// Keeps a known region code; unknown codes become `None`.
#[must_use]
pub fn normalize_region(code: Option<i64>) -> Option<i64> {
    code.filter(|id| REGIONS.contains(*id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_tables_have_unique_ids() {
        for table in ALL_TABLES {
            let ids: HashSet<i64> = table.rows.iter().map(|(id, _)| *id).collect();
            assert_eq!(ids.len(), table.rows.len(), "duplicate id in {}", table.name);
        }
    }

    #[test]
    fn test_unknown_rank_falls_back_to_overflow() {
        assert_eq!(normalize_rank(27), 27);
        assert_eq!(normalize_rank(37), RANK_OVERFLOW);
        assert_eq!(normalize_rank(-1), RANK_OVERFLOW);
        assert_eq!(RANKS.name_of(RANK_OVERFLOW), Some("God_of_Destruction_Infinity"));
    }

    #[test]
    fn test_unknown_region_becomes_none() {
        assert_eq!(normalize_region(Some(4)), Some(4));
        assert_eq!(normalize_region(Some(99)), None);
        assert_eq!(normalize_region(None), None);
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(CHARACTERS.name_of(8), Some("Kazuya"));
        assert_eq!(CHARACTERS.name_of(25), None);
        assert_eq!(STAGES.name_of(1600), Some("Midnight_Siege"));
        assert!(BATTLE_TYPES.contains(2));
    }
}
