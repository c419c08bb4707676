//! Integration tests for the room system: registry, actor, games, and
//! secret reveal wired together.

use std::sync::Arc;

use parlor_protocol::{
    Color, GameOverReason, GameType, PlayerId, PublicState, RoomCode,
    ServerEvent,
};
use parlor_room::{
    MoveReport, OracleError, PlayerSender, PositionToken, RoomError,
    RoomRegistry, RulesOracle,
};
use parlor_vault::SecretVault;
use tokio::sync::mpsc;

// =========================================================================
// Scripted oracle: accepts everything, mates on `to == "mate"`.
// =========================================================================

struct ScriptedOracle;

impl RulesOracle for ScriptedOracle {
    fn starting_position(&self) -> PositionToken {
        PositionToken("start".into())
    }

    fn apply_move(
        &self,
        position: &PositionToken,
        _mover: Color,
        from: &str,
        to: &str,
    ) -> Result<MoveReport, OracleError> {
        if from == "bad" {
            return Err(OracleError::Rejected("no piece there".into()));
        }
        Ok(MoveReport {
            position: PositionToken(format!("{} {from}{to}", position.0)),
            descriptor: format!("{from}-{to}"),
            terminal: (to == "mate")
                .then_some(parlor_room::TerminalReport::Checkmate),
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn registry() -> RoomRegistry {
    RoomRegistry::new(
        Arc::new(SecretVault::with_random_key()),
        Arc::new(ScriptedOracle),
    )
}

fn player_channel() -> (PlayerSender, mpsc::UnboundedReceiver<ServerEvent>) {
    mpsc::unbounded_channel()
}

/// Collects every event currently queued for a player.
fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn find_secret(events: &[ServerEvent]) -> Option<&str> {
    events.iter().find_map(|ev| match ev {
        ServerEvent::SecretRevealed { secret, .. } => Some(secret.as_str()),
        _ => None,
    })
}

fn find_game_over(
    events: &[ServerEvent],
) -> Option<(GameOverReason, Option<PlayerId>)> {
    events.iter().find_map(|ev| match ev {
        ServerEvent::GameOver { reason, winner, .. } => {
            Some((*reason, *winner))
        }
        _ => None,
    })
}

// =========================================================================
// Registry tests
// =========================================================================

#[tokio::test]
async fn test_create_room_generates_confusable_free_codes() {
    let mut reg = registry();
    let mut codes = std::collections::HashSet::new();
    for i in 0..50 {
        let code = reg.create_room(pid(i), format!("p{i}"), player_channel().0);
        assert_eq!(code.as_str().len(), 4);
        for c in code.as_str().chars() {
            assert!(
                "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".contains(c),
                "unexpected character {c:?} in code {code}"
            );
        }
        codes.insert(code);
    }
    assert_eq!(codes.len(), 50, "codes must be unique");
    assert_eq!(reg.len(), 50);
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let reg = registry();
    let result = reg.handle(&RoomCode::from("ZZZZ"));
    assert!(matches!(result, Err(RoomError::NotFound(_))));
}

#[tokio::test]
async fn test_empty_room_is_destroyed() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "Ada".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();

    let outcome = handle.leave(pid(1)).await.unwrap();
    assert!(outcome.room_empty);
    reg.reap(&code, outcome);

    assert!(matches!(
        reg.handle(&code),
        Err(RoomError::NotFound(_))
    ));
    assert!(reg.is_empty());
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test]
async fn test_join_already_joined_rejected() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "Ada".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();

    let result = handle.join(pid(1), "Ada again".into(), player_channel().0).await;
    assert!(matches!(result, Err(RoomError::AlreadyJoined(_))));
}

#[tokio::test]
async fn test_lobby_holds_at_most_four() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "p1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();

    for i in 2..=4 {
        handle
            .join(pid(i), format!("p{i}"), player_channel().0)
            .await
            .unwrap();
    }
    let result = handle.join(pid(5), "p5".into(), player_channel().0).await;
    assert!(matches!(result, Err(RoomError::RoomFull(_))));
}

#[tokio::test]
async fn test_capacity_tightens_once_grid_selected() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "p1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "p2".into(), player_channel().0).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    let result = handle.join(pid(3), "p3".into(), player_channel().0).await;
    assert!(matches!(result, Err(RoomError::RoomFull(_))));
}

#[tokio::test]
async fn test_host_transfers_to_next_join_order() {
    let mut reg = registry();
    let (tx1, _rx1) = player_channel();
    let (tx2, mut rx2) = player_channel();
    let code = reg.create_room(pid(1), "p1".into(), tx1);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "p2".into(), tx2).await.unwrap();
    handle.join(pid(3), "p3".into(), player_channel().0).await.unwrap();

    assert_eq!(handle.snapshot().await.unwrap().host, pid(1));
    handle.leave(pid(1)).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().host, pid(2));

    // The membership change was broadcast with the new host.
    let events = drain(&mut rx2);
    let last_update = events
        .iter()
        .rev()
        .find_map(|ev| match ev {
            ServerEvent::RoomUpdate { host, players, .. } => {
                Some((*host, players.len()))
            }
            _ => None,
        })
        .expect("room_update after departure");
    assert_eq!(last_update, (pid(2), 2));
}

#[tokio::test]
async fn test_submit_secret_flips_has_secret_flag() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "Ada".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();

    handle.submit_secret(pid(1), "tea stash".into()).await.unwrap();

    let snap = handle.snapshot().await.unwrap();
    assert!(snap.players[0].has_secret);
}

// =========================================================================
// Game selection
// =========================================================================

#[tokio::test]
async fn test_set_game_requires_fitting_player_count() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "solo".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();

    let result = handle.set_game(pid(1), GameType::Grid).await;
    assert!(matches!(
        result,
        Err(RoomError::InvalidForPlayerCount { players: 1, .. })
    ));
}

#[tokio::test]
async fn test_set_game_none_returns_to_lobby() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "p1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "p2".into(), player_channel().0).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    handle.set_game(pid(1), GameType::None).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().game, GameType::None);
    assert!(matches!(
        handle.grid_move(pid(1), 0).await,
        Err(RoomError::NoActiveGame)
    ));
}

#[tokio::test]
async fn test_wrong_game_action_rejected() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "p1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "p2".into(), player_channel().0).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    assert!(matches!(
        handle.race_roll(pid(1)).await,
        Err(RoomError::WrongGame(GameType::Grid))
    ));
}

// =========================================================================
// Grid end-to-end
// =========================================================================

#[tokio::test]
async fn test_grid_game_reveals_losers_secret_to_winner_only() {
    let mut reg = registry();
    let (tx1, mut rx1) = player_channel();
    let (tx2, mut rx2) = player_channel();
    let code = reg.create_room(pid(1), "P1".into(), tx1);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "P2".into(), tx2).await.unwrap();

    handle.submit_secret(pid(1), "p1 secret".into()).await.unwrap();
    handle.submit_secret(pid(2), "p2 secret".into()).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    // P1 takes the top row.
    handle.grid_move(pid(1), 0).await.unwrap();
    handle.grid_move(pid(2), 4).await.unwrap();
    handle.grid_move(pid(1), 1).await.unwrap();
    handle.grid_move(pid(2), 8).await.unwrap();
    let state = handle.grid_move(pid(1), 2).await.unwrap();
    assert!(matches!(state, PublicState::Grid { .. }));

    let p1_events = drain(&mut rx1);
    let p2_events = drain(&mut rx2);

    assert_eq!(
        find_game_over(&p1_events),
        Some((GameOverReason::Win, Some(pid(1))))
    );
    assert_eq!(
        find_game_over(&p2_events),
        Some((GameOverReason::Win, Some(pid(1))))
    );
    assert_eq!(find_secret(&p1_events), Some("p2 secret"));
    assert_eq!(find_secret(&p2_events), None, "losers learn nothing");

    // The table is closed until a new game is selected.
    assert!(matches!(
        handle.grid_move(pid(2), 3).await,
        Err(RoomError::GameFinished)
    ));
}

#[tokio::test]
async fn test_grid_draw_reveals_nothing() {
    let mut reg = registry();
    let (tx1, mut rx1) = player_channel();
    let (tx2, mut rx2) = player_channel();
    let code = reg.create_room(pid(1), "P1".into(), tx1);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "P2".into(), tx2).await.unwrap();
    handle.submit_secret(pid(1), "a".into()).await.unwrap();
    handle.submit_secret(pid(2), "b".into()).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    for &(player, cell) in &[
        (1u64, 0),
        (2, 1),
        (1, 2),
        (2, 4),
        (1, 3),
        (2, 5),
        (1, 7),
        (2, 6),
        (1, 8),
    ] {
        handle.grid_move(pid(player), cell).await.unwrap();
    }

    let p1_events = drain(&mut rx1);
    let p2_events = drain(&mut rx2);
    assert_eq!(
        find_game_over(&p1_events),
        Some((GameOverReason::Draw, None))
    );
    assert_eq!(find_secret(&p1_events), None);
    assert_eq!(find_secret(&p2_events), None);
}

#[tokio::test]
async fn test_racing_moves_resolve_to_exactly_one_accepted() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "P1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "P2".into(), player_channel().0).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    // Both players contend for cell 0 on the same turn. The room's
    // command channel serializes them; whichever lands second must be
    // rejected as stale.
    let h1 = handle.clone();
    let h2 = handle.clone();
    let (r1, r2) = tokio::join!(h1.grid_move(pid(1), 0), h2.grid_move(pid(2), 0));

    let accepted = [r1.is_ok(), r2.is_ok()].iter().filter(|&&ok| ok).count();
    assert_eq!(accepted, 1, "exactly one of two racing moves may land");
    let rejection = [r1, r2].into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        rejection,
        RoomError::NotYourTurn | RoomError::CellOccupied(0)
    ));
}

// =========================================================================
// Departure mid-game
// =========================================================================

#[tokio::test]
async fn test_disconnect_mid_grid_game_forfeits_to_remaining_player() {
    let mut reg = registry();
    let (tx1, mut rx1) = player_channel();
    let code = reg.create_room(pid(1), "P1".into(), tx1);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "P2".into(), player_channel().0).await.unwrap();
    handle.submit_secret(pid(2), "leaver's secret".into()).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();
    handle.grid_move(pid(1), 0).await.unwrap();

    let outcome = handle.leave(pid(2)).await.unwrap();
    assert!(!outcome.room_empty);

    let events = drain(&mut rx1);
    assert_eq!(
        find_game_over(&events),
        Some((GameOverReason::Forfeit, Some(pid(1))))
    );
    assert_eq!(find_secret(&events), Some("leaver's secret"));

    // Actions referencing the vacated player are rejected.
    assert!(matches!(
        handle.submit_secret(pid(2), "ghost".into()).await,
        Err(RoomError::NotInRoom(_))
    ));
}

#[tokio::test]
async fn test_race_continues_when_three_remain() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "p1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    for i in 2..=4 {
        handle
            .join(pid(i), format!("p{i}"), player_channel().0)
            .await
            .unwrap();
    }
    handle.set_game(pid(1), GameType::Race).await.unwrap();

    handle.leave(pid(4)).await.unwrap();
    assert_eq!(handle.snapshot().await.unwrap().game, GameType::Race);
}

#[tokio::test]
async fn test_race_with_one_left_reverts_to_lobby() {
    let mut reg = registry();
    let (tx1, mut rx1) = player_channel();
    let code = reg.create_room(pid(1), "p1".into(), tx1);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "p2".into(), player_channel().0).await.unwrap();
    handle.set_game(pid(1), GameType::Race).await.unwrap();

    handle.leave(pid(2)).await.unwrap();

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.game, GameType::None);
    // No forfeit is declared for an abandoned race.
    let events = drain(&mut rx1);
    assert_eq!(find_game_over(&events), None);
}

#[tokio::test]
async fn test_injected_forfeit_ends_the_game_without_departure() {
    let mut reg = registry();
    let (tx2, mut rx2) = player_channel();
    let code = reg.create_room(pid(1), "P1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "P2".into(), tx2).await.unwrap();
    handle.submit_secret(pid(1), "timed out".into()).await.unwrap();
    handle.set_game(pid(1), GameType::Grid).await.unwrap();

    // A timer layer would hold a handle clone and do exactly this.
    handle.forfeit(pid(1)).await.unwrap();

    let events = drain(&mut rx2);
    assert_eq!(
        find_game_over(&events),
        Some((GameOverReason::Forfeit, Some(pid(2))))
    );
    assert_eq!(find_secret(&events), Some("timed out"));

    // The forfeiter is still a member.
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.players.len(), 2);
}

// =========================================================================
// Race game over the actor
// =========================================================================

#[tokio::test]
async fn test_race_roll_and_entry() {
    let mut reg = registry();
    let code = reg.create_room(pid(1), "p1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "p2".into(), player_channel().0).await.unwrap();
    handle.set_game(pid(1), GameType::Race).await.unwrap();

    // All tokens start off-board, so turns alternate until someone
    // rolls a 6 and can enter.
    let mut on_turn = 1u64;
    for _ in 0..200 {
        let value = handle.race_roll(pid(on_turn)).await.unwrap();
        assert!((1..=6).contains(&value));
        if value == 6 {
            let state = handle.race_move(pid(on_turn), 0).await.unwrap();
            match state {
                PublicState::Race { lanes, .. } => {
                    let lane = lanes
                        .iter()
                        .find(|l| l.player == pid(on_turn))
                        .unwrap();
                    assert_eq!(lane.tokens[0], 0, "entered at step 0");
                }
                other => panic!("unexpected state: {other:?}"),
            }
            return;
        }
        on_turn = if on_turn == 1 { 2 } else { 1 };
    }
    panic!("no 6 in 200 rolls");
}

// =========================================================================
// Delegated-rules game over the actor
// =========================================================================

#[tokio::test]
async fn test_rules_game_mate_reveals_secret() {
    let mut reg = registry();
    let (tx2, mut rx2) = player_channel();
    let code = reg.create_room(pid(1), "P1".into(), player_channel().0);
    let handle = reg.handle(&code).unwrap();
    handle.join(pid(2), "P2".into(), tx2).await.unwrap();
    handle.submit_secret(pid(1), "white's secret".into()).await.unwrap();
    handle
        .set_game(pid(1), GameType::DelegatedRules)
        .await
        .unwrap();

    handle
        .rules_move(pid(1), "e2".into(), "e4".into())
        .await
        .unwrap();
    assert!(matches!(
        handle.rules_move(pid(1), "d2".into(), "d4".into()).await,
        Err(RoomError::NotYourTurn)
    ));
    assert!(matches!(
        handle.rules_move(pid(2), "bad".into(), "e5".into()).await,
        Err(RoomError::IllegalMove(_))
    ));
    handle
        .rules_move(pid(2), "d8".into(), "mate".into())
        .await
        .unwrap();

    let events = drain(&mut rx2);
    assert_eq!(
        find_game_over(&events),
        Some((GameOverReason::Checkmate, Some(pid(2))))
    );
    assert_eq!(find_secret(&events), Some("white's secret"));
}
