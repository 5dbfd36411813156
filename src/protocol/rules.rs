//! Ruleset configuration for the Royal Game of Ur family.
//!
//! A `RuleSet` is immutable once built. Everything the turn engine asks
//! about the board (rosette membership, shared-lane membership, which
//! physical square an opponent occupies when we land on a shared square)
//! is a pure query against this structure.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Immutable rule configuration plus derived pure queries.
///
/// Positions are track indices: `-1` is the start pool, `0..path_length`
/// is the track, and `path_length` itself is the bear-off slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub path_length: i8,
    pub rosettes: HashSet<i8>,
    pub pieces_per_player: usize,
    pub dice_count: u8,
    pub shared_lane_start: i8,
    pub shared_lane_end: i8,
    /// Maps a landed-on shared square to the physical square it aliases
    /// for the opposing side. Identity on symmetric boards.
    pub capture_map: HashMap<i8, i8>,
    /// Rosettes shield occupying pieces from capture.
    pub safe_rosettes: bool,
    /// Landing on a rosette grants another roll.
    pub rosette_extra_roll: bool,
    /// Capturing grants another roll.
    pub capture_extra_roll: bool,
    /// Substituted effective roll when the raw roll is zero.
    pub zero_roll_value: Option<u8>,
    /// Same-side pieces may share a rosette and move as one stack.
    pub allow_stacking: bool,
    /// Pieces on the track may also move backward.
    pub allow_backward_moves: bool,
    /// The turn may be skipped voluntarily when only backward moves exist.
    pub allow_voluntary_skip: bool,
}

impl RuleSet {
    /// Build a ruleset with an identity capture map over the shared lane.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        rosettes: HashSet<i8>,
        pieces_per_player: usize,
        path_length: i8,
        shared_lane_start: i8,
        shared_lane_end: i8,
        dice_count: u8,
    ) -> Self {
        let capture_map = (shared_lane_start..=shared_lane_end)
            .map(|p| (p, p))
            .collect();
        Self {
            name: name.into(),
            path_length,
            rosettes,
            pieces_per_player,
            dice_count,
            shared_lane_start,
            shared_lane_end,
            capture_map,
            safe_rosettes: true,
            rosette_extra_roll: true,
            capture_extra_roll: false,
            zero_roll_value: None,
            allow_stacking: false,
            allow_backward_moves: false,
            allow_voluntary_skip: false,
        }
    }

    pub fn is_rosette(&self, position: i8) -> bool {
        self.rosettes.contains(&position)
    }

    /// A square is in the shared lane when the capture map knows about it.
    pub fn is_shared_lane(&self, position: i8) -> bool {
        self.capture_map.contains_key(&position)
    }

    /// Physical opposing-side square aliased by `position`. Identity when
    /// no explicit mapping was supplied.
    pub fn capture_target(&self, position: i8) -> i8 {
        self.capture_map.get(&position).copied().unwrap_or(position)
    }

    /// Standard board per the Finkel reconstruction: 4 binary dice,
    /// 7 pieces, middle lane 5..=12 shared, rosettes at 4, 8 and 14.
    pub fn finkel() -> Self {
        Self::new("Finkel", HashSet::from([4, 8, 14]), 7, 15, 5, 12, 4)
    }

    /// Finkel board without the late rosette; good for quick games.
    pub fn simple() -> Self {
        Self::new("Simple", HashSet::from([4, 8]), 7, 15, 5, 12, 4)
    }

    /// Masters variant: 16-square path, 3 dice, a zero roll counts as 4,
    /// and the tail of the track is physically shared, so landing on 11
    /// threatens the opposing square 15 and vice versa.
    pub fn masters() -> Self {
        let mut capture_map: HashMap<i8, i8> = (4..=10).map(|p| (p, p)).collect();
        capture_map.extend([(11, 15), (12, 14), (13, 13), (14, 12), (15, 11)]);
        Self {
            name: "Masters".into(),
            path_length: 16,
            rosettes: HashSet::from([3, 7, 11, 15]),
            pieces_per_player: 7,
            dice_count: 3,
            shared_lane_start: 4,
            shared_lane_end: 15,
            capture_map,
            safe_rosettes: false,
            rosette_extra_roll: true,
            capture_extra_roll: false,
            zero_roll_value: Some(4),
            allow_stacking: false,
            allow_backward_moves: false,
            allow_voluntary_skip: false,
        }
    }

    /// Masters board with 5 pieces, 4 dice and extra rolls on capture.
    pub fn blitz() -> Self {
        let mut rules = Self::masters();
        rules.name = "Blitz".into();
        rules.pieces_per_player = 5;
        rules.dice_count = 4;
        rules.capture_extra_roll = true;
        rules.zero_roll_value = None;
        rules
    }

    /// Masters board under tournament conventions: safe rosettes, no
    /// bonus rolls, stacking, backward moves and voluntary skips.
    pub fn tournament() -> Self {
        let mut rules = Self::masters();
        rules.name = "Tournament".into();
        rules.pieces_per_player = 5;
        rules.dice_count = 4;
        rules.safe_rosettes = true;
        rules.rosette_extra_roll = false;
        rules.zero_roll_value = None;
        rules.allow_stacking = true;
        rules.allow_backward_moves = true;
        rules.allow_voluntary_skip = true;
        rules
    }

    /// Resolve a preset by name. Unknown names fall back to Finkel.
    pub fn by_name(name: &str) -> Self {
        match name {
            "Simple" => Self::simple(),
            "Masters" => Self::masters(),
            "Blitz" => Self::blitz(),
            "Tournament" => Self::tournament(),
            _ => Self::finkel(),
        }
    }
}
