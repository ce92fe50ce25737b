use glam::Vec3;
use uuid::Uuid;

use super::*;
use crate::game::combat::INFINITE_AMMO;
use crate::game::rules::RulesetPatch;
use crate::game::{PlayerAction, Recipient};
use crate::ws::protocol::{CombatantPatch, HitboxKind, MatchMode, Rotation};

const START: u64 = AUTO_START_DELAY_MS;

fn engine_with(rules: Ruleset) -> MatchEngine {
    MatchEngine::new(Uuid::new_v4(), "TEST42".to_string(), rules, 6, 42)
}

fn join(engine: &mut MatchEngine, nickname: &str) -> CombatantId {
    let id = Uuid::new_v4();
    engine
        .add_human(id, nickname.to_string(), ClassId::Sniper, 0)
        .expect("join should succeed");
    id
}

/// Two humans, game started
fn duel(rules: Ruleset) -> (MatchEngine, CombatantId, CombatantId) {
    let mut engine = engine_with(rules);
    let a = join(&mut engine, "alpha");
    let b = join(&mut engine, "bravo");
    engine.run_due(START);
    assert_eq!(engine.status(), MatchStatus::InProgress);
    engine.drain_events();
    (engine, a, b)
}

fn messages(engine: &mut MatchEngine) -> Vec<ServerMsg> {
    engine.drain_events().into_iter().map(|e| e.msg).collect()
}

/// Shooter at (-12,0,0) facing a victim 5m down -z, both yaw 0
fn line_up(engine: &mut MatchEngine, shooter: CombatantId, victim: CombatantId) {
    let s = engine.combatants.get_mut(&shooter).unwrap();
    s.position = Vec3::new(-12.0, 0.0, 0.0);
    s.rotation = Rotation::default();
    let v = engine.combatants.get_mut(&victim).unwrap();
    v.position = Vec3::new(-12.0, 0.0, -5.0);
    v.rotation = Rotation::default();
}

fn head_shot() -> PlayerAction {
    PlayerAction::Shoot {
        origin: Vec3::new(-12.0, 1.7, 0.0),
        direction: Vec3::new(0.0, 0.0, -1.0),
        // Far from any capture, resolves against live positions
        timestamp: 0,
    }
}

fn sky_shot() -> PlayerAction {
    PlayerAction::Shoot {
        origin: Vec3::new(-12.0, 1.6, 0.0),
        direction: Vec3::Y,
        timestamp: 0,
    }
}

#[test]
fn test_pvp_waits_for_two_players() {
    let mut engine = engine_with(Ruleset::default());
    let host = join(&mut engine, "alpha");
    assert_eq!(engine.host_id(), Some(host));

    engine.run_due(60_000);
    assert_eq!(engine.status(), MatchStatus::Waiting);

    join(&mut engine, "bravo");
    engine.run_due(START - 1);
    assert_eq!(engine.status(), MatchStatus::Waiting);
    engine.run_due(START);
    assert_eq!(engine.status(), MatchStatus::InProgress);

    let msgs = messages(&mut engine);
    assert!(msgs.iter().any(|m| matches!(m, ServerMsg::MatchStart { round: 1, .. })));
    assert!(msgs
        .iter()
        .any(|m| matches!(m, ServerMsg::RoundStart { spawns, .. } if spawns.len() == 2)));
}

#[test]
fn test_request_start_is_host_only() {
    let rules = Ruleset {
        match_mode: MatchMode::DeathmatchBot,
        bot_count: 0,
        ..Default::default()
    };
    let mut engine = engine_with(rules);
    let host = join(&mut engine, "alpha");
    let guest = join(&mut engine, "bravo");

    engine.handle_action(guest, PlayerAction::RequestStart, 10);
    assert_eq!(engine.status(), MatchStatus::Waiting);

    engine.handle_action(host, PlayerAction::RequestStart, 10);
    assert_eq!(engine.status(), MatchStatus::InProgress);
}

#[test]
fn test_opponent_joined_skips_joiner() {
    let mut engine = engine_with(Ruleset::default());
    let a = join(&mut engine, "alpha");
    engine.drain_events();
    let b = join(&mut engine, "bravo");

    let events = engine.drain_events();
    let joined = events
        .iter()
        .find(|e| matches!(e.msg, ServerMsg::OpponentJoined { .. }))
        .unwrap();
    assert_eq!(joined.recipient, Recipient::AllExcept(b));
    assert!(joined.is_for(a));
}

#[test]
fn test_capacity_is_enforced() {
    let mut engine = MatchEngine::new(Uuid::new_v4(), "FULL22".into(), Ruleset::default(), 2, 1);
    join(&mut engine, "alpha");
    join(&mut engine, "bravo");
    let result = engine.add_human(Uuid::new_v4(), "charlie".into(), ClassId::Rifle, 0);
    assert_eq!(result, Err(JoinRejected::Full));
}

#[test]
fn test_late_joiner_gets_match_start() {
    let (mut engine, _, _) = duel(Ruleset::default());
    let late = join(&mut engine, "charlie");

    let events = engine.drain_events();
    assert!(events.iter().any(|e| {
        e.recipient == Recipient::Only(late) && matches!(e.msg, ServerMsg::MatchStart { .. })
    }));
}

#[test]
fn test_late_joiner_sees_stationary_combatants() {
    let (mut engine, a, b) = duel(Ruleset::default());
    engine.tick(START + 33);
    engine.drain_events();

    let late = join(&mut engine, "charlie");
    engine.tick(START + 66);
    engine.tick(START + 100);

    let mut seen: BTreeMap<CombatantId, CombatantPatch> = BTreeMap::new();
    for envelope in engine.drain_events() {
        if !envelope.is_for(late) {
            continue;
        }
        if let ServerMsg::StateUpdate(update) = envelope.msg {
            for (id, patch) in update.players {
                seen.entry(id).or_insert(patch);
            }
        }
    }

    for (id, nickname) in [(a, "alpha"), (b, "bravo")] {
        let patch = seen.get(&id).expect("existing combatant missing from joiner's state");
        let combatant = engine.combatant(&id).unwrap();
        assert_eq!(patch.nickname.as_deref(), Some(nickname));
        assert_eq!(patch.is_bot, Some(false));
        assert_eq!(patch.class_id, Some(combatant.class_id));
        assert_eq!(patch.position, Some(combatant.position));
        assert_eq!(patch.health, Some(combatant.health));
    }
}

#[test]
fn test_headshot_kill_then_delayed_respawn() {
    let (mut engine, shooter, victim) = duel(Ruleset::default());
    line_up(&mut engine, shooter, victim);

    let now = 10_000;
    engine.handle_action(shooter, head_shot(), now);

    let msgs = messages(&mut engine);
    assert!(matches!(msgs[0], ServerMsg::PlayerFired { shooter_id } if shooter_id == shooter));
    match &msgs[1] {
        ServerMsg::HitConfirmed {
            victim_id,
            hitbox,
            damage,
            fatal,
            is_shooter_bot,
            ..
        } => {
            assert_eq!(*victim_id, victim);
            assert_eq!(*hitbox, HitboxKind::Head);
            assert_eq!(*damage, 100);
            assert!(*fatal);
            assert!(!is_shooter_bot);
        }
        other => panic!("expected hit, got {other:?}"),
    }
    assert!(matches!(msgs[2], ServerMsg::PlayerDied { killer_id, .. } if killer_id == shooter));
    assert_eq!(engine.scores()[&shooter], 1);
    assert!(!engine.combatant(&victim).unwrap().alive);

    // Respawn happens after the delay, not at death
    engine.run_due(now + TRANSITION_DELAY_MS - 1);
    assert!(!engine.combatant(&victim).unwrap().alive);
    engine.run_due(now + TRANSITION_DELAY_MS);
    let respawned = engine.combatant(&victim).unwrap();
    assert!(respawned.alive);
    assert_eq!(respawned.health, 100);
    assert!(messages(&mut engine)
        .iter()
        .any(|m| matches!(m, ServerMsg::PlayerRespawn { combatant_id, .. } if *combatant_id == victim)));
}

#[test]
fn test_dead_combatant_cannot_act() {
    let (mut engine, shooter, victim) = duel(Ruleset::default());
    line_up(&mut engine, shooter, victim);
    engine.handle_action(shooter, head_shot(), 10_000);
    engine.drain_events();

    let before = engine.combatant(&victim).unwrap().position;
    engine.handle_action(
        victim,
        PlayerAction::Move {
            position: before + Vec3::new(1.0, 0.0, 0.0),
            rotation: Rotation::default(),
            velocity: Vec3::ZERO,
        },
        10_010,
    );
    engine.handle_action(victim, sky_shot(), 10_010);
    assert_eq!(engine.combatant(&victim).unwrap().position, before);
    assert!(engine.drain_events().is_empty());

    // Unknown ids are ignored too
    engine.handle_action(Uuid::new_v4(), sky_shot(), 10_010);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn test_match_ends_exactly_at_rounds_to_win() {
    let rules = Ruleset {
        rounds_to_win: 2,
        ..Default::default()
    };
    let (mut engine, shooter, victim) = duel(rules);

    line_up(&mut engine, shooter, victim);
    engine.handle_action(shooter, head_shot(), 10_000);
    assert_eq!(engine.status(), MatchStatus::InProgress);

    engine.run_due(12_000);
    line_up(&mut engine, shooter, victim);
    engine.drain_events();
    engine.handle_action(shooter, head_shot(), 13_000);
    assert_eq!(engine.status(), MatchStatus::MatchEnd);

    let msgs = messages(&mut engine);
    assert!(msgs.iter().any(|m| matches!(
        m,
        ServerMsg::MatchEnd { winner_id: Some(w), .. } if *w == shooter
    )));

    // Ticks stop once the match is over
    engine.tick(13_033);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn test_magazine_then_timed_reload() {
    let (mut engine, shooter, _) = duel(Ruleset::default());

    for i in 0..5 {
        engine.handle_action(shooter, sky_shot(), 10_000 + i);
    }
    let c = engine.combatant(&shooter).unwrap();
    assert_eq!((c.ammo, c.reserve_ammo), (0, 20));
    engine.drain_events();

    // Empty magazine: dropped silently
    engine.handle_action(shooter, sky_shot(), 10_010);
    assert!(engine.drain_events().is_empty());

    engine.handle_action(shooter, PlayerAction::Reload, 11_000);
    assert!(engine.combatant(&shooter).unwrap().is_reloading());

    engine.run_due(12_499);
    assert_eq!(engine.combatant(&shooter).unwrap().ammo, 0);

    engine.run_due(12_500);
    let c = engine.combatant(&shooter).unwrap();
    assert_eq!((c.ammo, c.reserve_ammo), (5, 15));
    assert!(!c.is_reloading());
    assert!(c.within_bounds(false));
}

#[test]
fn test_shots_dropped_while_reloading() {
    let (mut engine, shooter, _) = duel(Ruleset::default());
    engine.handle_action(shooter, sky_shot(), 10_000);
    engine.handle_action(shooter, PlayerAction::Reload, 10_100);
    engine.drain_events();

    engine.handle_action(shooter, sky_shot(), 10_200);
    assert!(engine.drain_events().is_empty());
    assert_eq!(engine.combatant(&shooter).unwrap().ammo, 4);
}

#[test]
fn test_reload_completing_after_death_is_noop() {
    let (mut engine, shooter, victim) = duel(Ruleset::default());
    engine.handle_action(victim, sky_shot(), 10_000);
    engine.handle_action(victim, PlayerAction::Reload, 10_000);

    line_up(&mut engine, shooter, victim);
    engine.handle_action(shooter, head_shot(), 10_100);
    assert!(!engine.combatant(&victim).unwrap().alive);

    engine.run_due(11_600);
    let v = engine.combatant(&victim).unwrap();
    assert_eq!(v.ammo, 4);
    assert_eq!(v.reserve_ammo, 20);
}

#[test]
fn test_move_slides_along_wall() {
    let (mut engine, a, _) = duel(Ruleset::default());
    engine.combatants.get_mut(&a).unwrap().position = Vec3::new(29.0, 0.0, 5.0);

    engine.handle_action(
        a,
        PlayerAction::Move {
            position: Vec3::new(29.5, 0.0, 5.5),
            rotation: Rotation::new(1.0, 0.2),
            velocity: Vec3::ZERO,
        },
        10_000,
    );
    let c = engine.combatant(&a).unwrap();
    assert_eq!(c.position, Vec3::new(29.0, 0.0, 5.5));
    assert_eq!(c.rotation, Rotation::new(1.0, 0.2));

    // Non-finite input is dropped
    engine.handle_action(
        a,
        PlayerAction::Move {
            position: Vec3::new(f32::NAN, 0.0, 0.0),
            rotation: Rotation::default(),
            velocity: Vec3::ZERO,
        },
        10_010,
    );
    assert_eq!(engine.combatant(&a).unwrap().position, Vec3::new(29.0, 0.0, 5.5));
}

#[test]
fn test_round_ends_on_time_limit() {
    let rules = Ruleset {
        round_time_secs: 10.0,
        ..Default::default()
    };
    let (mut engine, _, _) = duel(rules);

    engine.tick(START + 9_000);
    assert_eq!(engine.status(), MatchStatus::InProgress);

    engine.tick(START + 10_000);
    assert_eq!(engine.status(), MatchStatus::RoundEnd);
    assert!(messages(&mut engine).iter().any(|m| matches!(
        m,
        ServerMsg::RoundEnd {
            reason: RoundEndReason::TimeLimit,
            winner_id: None,
            ..
        }
    )));

    engine.run_due(START + 10_000 + TRANSITION_DELAY_MS);
    assert_eq!(engine.status(), MatchStatus::InProgress);
    assert_eq!(engine.round(), 2);
}

#[test]
fn test_tick_records_history_and_delta() {
    let (mut engine, a, b) = duel(Ruleset::default());
    engine.tick(START + 33);
    assert_eq!(engine.history().len(), 1);

    let msgs = messages(&mut engine);
    let ServerMsg::StateUpdate(update) = &msgs[0] else {
        panic!("expected state update");
    };
    assert_eq!(update.players.len(), 2);
    assert!(update.players[&a].nickname.is_some());

    // Nothing moved: second update carries no per-combatant entries
    engine.tick(START + 66);
    let msgs = messages(&mut engine);
    let ServerMsg::StateUpdate(update) = &msgs[0] else {
        panic!("expected state update");
    };
    assert!(update.players.is_empty());
    assert!(update.time_remaining < 180.0);
    assert!(!update.players.contains_key(&b));
}

#[test]
fn test_rematch_needs_every_human() {
    let rules = Ruleset {
        rounds_to_win: 1,
        ..Default::default()
    };
    let (mut engine, a, b) = duel(rules);
    line_up(&mut engine, a, b);
    engine.handle_action(a, head_shot(), 10_000);
    assert_eq!(engine.status(), MatchStatus::MatchEnd);

    engine.handle_action(a, PlayerAction::RequestRematch, 10_100);
    assert_eq!(engine.status(), MatchStatus::MatchEnd);

    engine.drain_events();
    engine.handle_action(b, PlayerAction::RequestRematch, 10_200);
    assert_eq!(engine.status(), MatchStatus::InProgress);
    assert_eq!(engine.round(), 1);
    assert!(engine.scores().values().all(|s| *s == 0));
    assert!(engine.combatants().values().all(|c| c.alive && !c.wants_rematch));

    let msgs = messages(&mut engine);
    assert!(matches!(msgs[0], ServerMsg::MatchReset { round: 1, .. }));
    assert!(msgs.iter().any(|m| matches!(m, ServerMsg::MatchStart { .. })));
}

#[test]
fn test_auto_rematch_after_delay() {
    let rules = Ruleset {
        rounds_to_win: 1,
        auto_rematch: true,
        ..Default::default()
    };
    let (mut engine, a, b) = duel(rules);
    line_up(&mut engine, a, b);
    engine.handle_action(a, head_shot(), 10_000);
    assert_eq!(engine.status(), MatchStatus::MatchEnd);

    engine.run_due(10_000 + TRANSITION_DELAY_MS);
    assert_eq!(engine.status(), MatchStatus::InProgress);
    assert_eq!(engine.scores()[&a], 0);
}

#[test]
fn test_settings_host_only_and_infinite_ammo() {
    let (mut engine, host, guest) = duel(Ruleset::default());
    let infinite = RulesetPatch {
        infinite_ammo: Some(true),
        ..Default::default()
    };

    engine.handle_action(guest, PlayerAction::UpdateSettings { settings: infinite.clone() }, 10_000);
    assert!(!engine.rules().infinite_ammo);
    assert!(engine.drain_events().is_empty());

    engine.handle_action(host, PlayerAction::UpdateSettings { settings: infinite }, 10_000);
    assert!(engine.rules().infinite_ammo);
    assert!(engine
        .combatants()
        .values()
        .all(|c| c.ammo == INFINITE_AMMO && c.reserve_ammo == INFINITE_AMMO));
    assert!(matches!(
        messages(&mut engine)[0],
        ServerMsg::SettingsUpdated { ref settings } if settings.infinite_ammo
    ));

    let finite = RulesetPatch {
        infinite_ammo: Some(false),
        ..Default::default()
    };
    engine.handle_action(host, PlayerAction::UpdateSettings { settings: finite }, 10_100);
    assert!(engine.combatants().values().all(|c| c.within_bounds(false)));
    assert_eq!(engine.combatant(&guest).unwrap().ammo, 5);
}

#[test]
fn test_switch_class_broadcasts_state() {
    let (mut engine, a, _) = duel(Ruleset::default());
    engine.tick(START + 33);
    engine.drain_events();

    engine.handle_action(a, PlayerAction::SwitchClass { class_id: ClassId::Rifle }, START + 40);
    let msgs = messages(&mut engine);
    assert!(matches!(
        msgs[0],
        ServerMsg::ClassSwitched { class_id: ClassId::Rifle, .. }
    ));
    let ServerMsg::StateUpdate(update) = &msgs[1] else {
        panic!("expected state update");
    };
    assert_eq!(update.players[&a].class_id, Some(ClassId::Rifle));
    assert_eq!(engine.combatant(&a).unwrap().ammo, 30);
}

#[test]
fn test_leave_moves_host_then_closes() {
    let mut engine = engine_with(Ruleset::default());
    let a = join(&mut engine, "alpha");
    let b = join(&mut engine, "bravo");
    engine.drain_events();

    engine.remove(a, 100);
    assert_eq!(engine.host_id(), Some(b));
    assert!(!engine.is_closed());
    assert!(matches!(
        messages(&mut engine)[0],
        ServerMsg::PlayerLeft { combatant_id } if combatant_id == a
    ));

    engine.remove(b, 200);
    assert!(engine.is_closed());
    assert_eq!(
        engine.add_human(Uuid::new_v4(), "late".into(), ClassId::Sniper, 300),
        Err(JoinRejected::Closed)
    );
}

#[test]
fn test_bots_join_once_and_keep_invariants() {
    let rules = Ruleset::for_new_match(&RulesetPatch {
        match_mode: Some(MatchMode::DeathmatchBot),
        bot_count: Some(3),
        ..Default::default()
    });
    let mut engine = engine_with(rules);
    join(&mut engine, "alpha");
    engine.run_due(START);
    assert_eq!(engine.status(), MatchStatus::InProgress);
    assert_eq!(engine.combatants().len(), 4);

    let mut names: Vec<&str> = engine
        .combatants()
        .values()
        .filter(|c| c.is_bot)
        .map(|c| c.nickname.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["bot1", "bot2", "bot3"]);

    let mut now = START;
    for _ in 0..600 {
        now += 33;
        engine.run_due(now);
        engine.tick(now);
        engine.drain_events();
        for c in engine.combatants().values() {
            assert!(c.within_bounds(false), "{} out of bounds", c.nickname);
        }
    }

    engine.reset(now);
    assert_eq!(engine.combatants().len(), 4);
}

#[test]
fn test_bot_match_is_reproducible_from_seed() {
    fn run(seed: u64) -> Vec<(Vec3, i32)> {
        let rules = Ruleset {
            match_mode: MatchMode::DeathmatchBot,
            bot_count: 4,
            ..Default::default()
        };
        let mut engine = MatchEngine::new(Uuid::from_u128(1), "SEED00".into(), rules, 6, seed);
        engine
            .add_human(Uuid::from_u128(2), "alpha".into(), ClassId::Sniper, 0)
            .unwrap();
        let mut now = START;
        engine.run_due(now);
        for _ in 0..90 {
            now += 33;
            engine.run_due(now);
            engine.tick(now);
        }
        engine
            .combatants()
            .values()
            .map(|c| (c.position, c.health))
            .collect()
    }

    assert_eq!(run(7), run(7));
}
