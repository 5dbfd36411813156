//! Turn-protocol properties exercised through the public API.

use std::collections::HashSet;

use royalur::protocol::{
    BoardState, BoardStateBuilder, CoinDice, FixedDice, MoveResult, PlayerSide, RuleSet,
    TurnEngine,
};
use royalur::Error;

fn assert_conservation(engine: &TurnEngine) {
    let board = engine.board();
    let n = board.rules().pieces_per_player;
    for side in [PlayerSide::Light, PlayerSide::Dark] {
        let total = board.pieces_at_start(side)
            + board.pieces_on_track(side)
            + board.pieces_borne_off(side);
        assert_eq!(total, n, "piece count drifted for {side:?}");
    }
}

/// Play up to `max_turns` turns taking the first legal move every time.
/// Checks the core invariants after every transition.
fn play_random(rules: RuleSet, seed: u64, max_turns: usize) -> TurnEngine {
    let dice = CoinDice::seeded(rules.dice_count, seed);
    let mut engine = TurnEngine::new(BoardState::new(rules), Box::new(dice));

    for _ in 0..max_turns {
        if engine.board().is_game_over() {
            break;
        }
        engine.roll().unwrap();
        let moves = engine.legal_moves().unwrap();

        let mut seen = HashSet::new();
        for m in &moves {
            assert!(seen.insert((m.from, m.to)), "duplicate (from, to) surfaced");
        }

        if moves.is_empty() {
            engine.forfeit().unwrap();
        } else {
            engine.execute(&moves[0]).unwrap();
        }
        assert_conservation(&engine);
    }
    engine
}

#[test]
fn test_invariants_hold_across_all_presets() {
    for rules in [
        RuleSet::finkel(),
        RuleSet::simple(),
        RuleSet::masters(),
        RuleSet::blitz(),
        RuleSet::tournament(),
    ] {
        for seed in 0..4 {
            let engine = play_random(rules.clone(), seed, 2000);
            if let Some(winner) = engine.board().winner() {
                let n = engine.board().rules().pieces_per_player;
                assert_eq!(engine.board().pieces_borne_off(winner), n);
            }
        }
    }
}

#[test]
fn test_finished_engine_refuses_everything() {
    // Drive a one-piece game to a win, then poke at the corpse.
    let rules = RuleSet::new("Mini", HashSet::from([2]), 1, 4, 2, 3, 2);
    let mut engine = TurnEngine::new(BoardState::new(rules), Box::new(FixedDice::new([2, 3, 2])));

    engine.roll().unwrap();
    let mv = engine.legal_moves().unwrap()[0];
    engine.execute(&mv).unwrap(); // Light to 1

    engine.roll().unwrap();
    let mv = engine.legal_moves().unwrap()[0];
    let outcome = engine.execute(&mv).unwrap(); // Dark enters the rosette
    assert_eq!(outcome.result, MoveResult::ExtraTurn);

    engine.roll().unwrap();
    let mv = engine.legal_moves().unwrap()[0];
    let outcome = engine.execute(&mv).unwrap();
    assert_eq!(outcome.result, MoveResult::Win);

    assert!(matches!(engine.roll(), Err(Error::GameOver)));
    // The winning move cleared the pending roll, so the roll guard
    // trips before the game-over guard; either way, contract violation.
    let err = engine.execute(&mv).unwrap_err();
    assert!(matches!(err, Error::RollRequired));
    assert!(err.is_contract_violation());
}

#[test]
fn test_last_piece_exact_bear_off_wins() {
    // Path length 15, piece at 13, roll 2: 13 + 2 == 15 is a bear-off,
    // and with every other piece already off it is the win.
    let mut builder = BoardStateBuilder::new(RuleSet::finkel());
    for _ in 0..6 {
        builder = builder.with_piece(PlayerSide::Light, 15);
    }
    let board = builder.with_piece(PlayerSide::Light, 13).build();
    let mut engine = TurnEngine::new(board, Box::new(FixedDice::new([2])));

    engine.roll().unwrap();
    let moves = engine.legal_moves().unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!((moves[0].from, moves[0].to), (13, 15));

    let outcome = engine.execute(&moves[0]).unwrap();
    assert_eq!(outcome.result, MoveResult::Win);
    assert_eq!(engine.board().winner(), Some(PlayerSide::Light));
}

#[test]
fn test_cross_zone_capture_hits_mapped_square() {
    // Masters tail: landing on 11 captures the piece physically at 15.
    let board = BoardStateBuilder::new(RuleSet::masters())
        .with_piece(PlayerSide::Light, 8)
        .with_piece(PlayerSide::Dark, 15)
        .with_piece(PlayerSide::Dark, 11)
        .build();
    let mut engine = TurnEngine::new(board, Box::new(FixedDice::new([3])));

    engine.roll().unwrap();
    let mv = engine
        .legal_moves()
        .unwrap()
        .into_iter()
        .find(|m| m.from == 8 && m.to == 11)
        .unwrap();
    engine.execute(&mv).unwrap();

    // The mapped occupant went home; the piece literally on 11 did not.
    assert!(!engine.board().is_occupied_by(PlayerSide::Dark, 15));
    assert!(engine.board().is_occupied_by(PlayerSide::Dark, 11));
}

#[test]
fn test_safe_rosette_flag_gates_capturing_destination() {
    let setup = |rules: RuleSet| {
        BoardStateBuilder::new(rules)
            .with_piece(PlayerSide::Light, 6)
            .with_piece(PlayerSide::Dark, 8)
            .build()
    };

    let mut safe = TurnEngine::new(setup(RuleSet::finkel()), Box::new(FixedDice::new([2])));
    safe.roll().unwrap();
    assert!(!safe
        .legal_moves()
        .unwrap()
        .iter()
        .any(|m| m.from == 6 && m.to == 8));

    let mut unsafe_rules = RuleSet::finkel();
    unsafe_rules.safe_rosettes = false;
    let mut open = TurnEngine::new(setup(unsafe_rules), Box::new(FixedDice::new([2])));
    open.roll().unwrap();
    assert!(open
        .legal_moves()
        .unwrap()
        .iter()
        .any(|m| m.from == 6 && m.to == 8));
}

#[test]
fn test_zero_roll_behavior_per_ruleset() {
    // No substitution: zero means a stuck turn.
    let mut finkel = TurnEngine::new(
        BoardState::new(RuleSet::finkel()),
        Box::new(FixedDice::new([0])),
    );
    finkel.roll().unwrap();
    assert!(finkel.legal_moves().unwrap().is_empty());
    finkel.forfeit().unwrap();

    // Masters substitutes 4 and plays on.
    let mut masters = TurnEngine::new(
        BoardState::new(RuleSet::masters()),
        Box::new(FixedDice::new([0])),
    );
    masters.roll().unwrap();
    assert_eq!(masters.board().effective_roll(), 4);
    assert!(!masters.legal_moves().unwrap().is_empty());
}

#[test]
fn test_stacked_capture_clears_entire_square() {
    let board = BoardStateBuilder::new(RuleSet::tournament())
        .with_piece(PlayerSide::Light, 6)
        .with_piece(PlayerSide::Light, 6)
        .with_piece(PlayerSide::Light, 6)
        .with_piece(PlayerSide::Dark, 8)
        .with_piece(PlayerSide::Dark, 8)
        .build();
    let mut engine = TurnEngine::new(board, Box::new(FixedDice::new([2])));

    engine.roll().unwrap();
    let mv = engine
        .legal_moves()
        .unwrap()
        .into_iter()
        .find(|m| m.from == 6 && m.to == 8)
        .unwrap();
    engine.execute(&mv).unwrap();

    assert_eq!(engine.board().piece_count_at(PlayerSide::Light, 8), 3);
    assert_eq!(engine.board().pieces_at_start(PlayerSide::Dark), 5);
}

#[test]
fn test_protocol_misuse_flags_as_contract_violation() {
    let mut engine = TurnEngine::new(
        BoardState::new(RuleSet::finkel()),
        Box::new(FixedDice::new([1, 1])),
    );
    assert!(engine.legal_moves().unwrap_err().is_contract_violation());
    engine.roll().unwrap();
    assert!(engine.roll().unwrap_err().is_contract_violation());
    assert!(engine.forfeit().unwrap_err().is_contract_violation());
}
