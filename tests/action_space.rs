use pokerbots_env::actions::{CALL, CHECK, FIRST_RAISE, FOLD};
use pokerbots_env::config::{ConfigError, Stakes, default_strategic_sizes};
use pokerbots_env::protocol::ActionToken;
use pokerbots_env::{ACTION_SPACE_SIZE, ActionSpace, EnvConfig, ProfileKind, RaiseScheme, parse_line};

fn space(profile: ProfileKind) -> ActionSpace {
    EnvConfig {
        profile,
        ..EnvConfig::default()
    }
    .action_space()
    .expect("built-in profiles are valid")
}

fn raise_amount(space: &ActionSpace, index: usize) -> u32 {
    match space.decode(index) {
        ActionToken::Raise(amount) => amount,
        other => panic!("index {index} decoded to {other}"),
    }
}

#[test]
fn fixed_indices_map_to_fold_call_check() {
    for profile in [ProfileKind::Compact, ProfileKind::Extended] {
        let space = space(profile);
        assert_eq!(space.size(), 103);
        assert_eq!(space.decode(FOLD), ActionToken::Fold);
        assert_eq!(space.decode(CALL), ActionToken::Call);
        assert_eq!(space.decode(CHECK), ActionToken::Check);
    }
}

#[test]
fn out_of_range_indices_check() {
    let space = space(ProfileKind::Extended);
    assert_eq!(space.decode(ACTION_SPACE_SIZE), ActionToken::Check);
    assert_eq!(space.decode(999), ActionToken::Check);
    assert_eq!(space.describe(999), "Unknown action 999");
}

#[test]
fn raises_span_min_to_max_and_never_shrink() {
    for profile in [ProfileKind::Compact, ProfileKind::Extended] {
        let space = space(profile);
        assert_eq!(raise_amount(&space, FIRST_RAISE), 2);
        assert_eq!(raise_amount(&space, ACTION_SPACE_SIZE - 1), 400);

        let amounts: Vec<u32> = (FIRST_RAISE..ACTION_SPACE_SIZE)
            .map(|index| raise_amount(&space, index))
            .collect();
        assert!(
            amounts.windows(2).all(|pair| pair[0] <= pair[1]),
            "{profile:?}: {amounts:?}"
        );
    }
}

#[test]
fn strategic_sizes_lead_the_raise_block() {
    let space = space(ProfileKind::Extended);
    assert_eq!(space.decode(4), ActionToken::Raise(3));
    assert_eq!(space.decode(5), ActionToken::Raise(4));
    assert_eq!(space.decode(16), ActionToken::Raise(100));
    assert_eq!(space.decode(17), ActionToken::Raise(103));
    assert_eq!(space.describe(16), "Raise 100");
}

#[test]
fn linear_sizes_are_evenly_spaced() {
    let space = space(ProfileKind::Compact);
    assert_eq!(space.decode(4), ActionToken::Raise(6));
    assert_eq!(space.decode(52), ActionToken::Raise(198));
    assert!(matches!(space.raise_scheme(), RaiseScheme::Linear { min: 2, max: 400 }));
}

#[test]
fn strategic_sizes_scale_with_the_big_blind() {
    let stakes = Stakes {
        starting_stack: 200,
        big_blind: 10,
        small_blind: 5,
    };
    let sizes = default_strategic_sizes(&stakes);
    assert_eq!(sizes.first(), Some(&10));
    assert!(sizes.iter().all(|size| *size <= 200));
    assert!(sizes.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn invalid_raise_schemes_are_rejected() {
    let cases = [
        RaiseScheme::linear(0, 400),
        RaiseScheme::linear(500, 400),
        RaiseScheme::strategic(vec![], 2, 400),
        RaiseScheme::strategic(vec![4, 8], 2, 400),
        RaiseScheme::strategic(vec![2, 8, 6], 2, 400),
        RaiseScheme::strategic(vec![2, 800], 2, 400),
        RaiseScheme::strategic((2..=101).collect(), 2, 400),
    ];
    for case in cases {
        assert!(matches!(case, Err(ConfigError::RaiseScheme(_))), "{case:?}");
    }
}

#[test]
fn custom_strategic_sizes_come_from_config() {
    let config = EnvConfig {
        strategic_raises: Some(vec![2, 10, 50]),
        ..EnvConfig::default()
    };
    let space = config.action_space().expect("valid sizes");
    assert_eq!(space.decode(4), ActionToken::Raise(10));
    assert_eq!(space.decode(5), ActionToken::Raise(50));
    assert_eq!(space.decode(102), ActionToken::Raise(400));

    let broken = EnvConfig {
        strategic_raises: Some(vec![3, 10]),
        ..EnvConfig::default()
    };
    assert!(broken.action_space().is_err());
}

#[test]
fn everything_is_legal_before_the_first_message() {
    let space = space(ProfileKind::Extended);
    assert_eq!(space.legal_actions(None), (0..ACTION_SPACE_SIZE).collect::<Vec<_>>());
    assert!(space.legal_mask(None).into_iter().all(|legal| legal));
}

#[test]
fn facing_a_raise_allows_call_but_not_check() {
    let space = space(ProfileKind::Extended);
    let message = parse_line("P0 H2s,3h R10").expect("line");
    let legal = space.legal_actions(Some(&message));
    assert!(legal.contains(&FOLD));
    assert!(legal.contains(&CALL));
    assert!(!legal.contains(&CHECK));
    assert!(legal.contains(&FIRST_RAISE));
    assert_eq!(legal.len(), ACTION_SPACE_SIZE - 1);
}

#[test]
fn unraised_pot_allows_check_but_not_call() {
    let space = space(ProfileKind::Extended);
    let message = parse_line("P0 H2s,3h").expect("line");
    let mask = space.legal_mask(Some(&message));
    assert!(mask[FOLD]);
    assert!(!mask[CALL]);
    assert!(mask[CHECK]);
}

#[test]
fn fold_is_withdrawn_once_the_game_is_over() {
    let space = space(ProfileKind::Extended);
    let message = parse_line("D10 Q").expect("line");
    let legal = space.legal_actions(Some(&message));
    assert!(!legal.contains(&FOLD));
    assert!(legal.contains(&CHECK));
}
