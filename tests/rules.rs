use dual_life::rules::{RULE_SLOTS, RuleGroup};
use dual_life::{RuleParseError, RuleTable};
use pretty_assertions::assert_eq;

fn table(spec: &str) -> RuleTable {
    RuleTable::build(spec).unwrap_or_else(|err| panic!("{spec:?} rejected: {err}"))
}

#[test]
fn conway_table_layout() {
    let rules = table("2,3/3");
    let mut expected = [0u8; RULE_SLOTS];
    expected[3] = 1;
    expected[9 + 2] = 1;
    expected[9 + 3] = 1;
    assert_eq!(rules.as_bytes(), &expected);
    assert_eq!(rules, RuleTable::life());
}

#[test]
fn accepts_boundary_rules() {
    let all = table("0,1,2,3,4,5,6,7,8/0,1,2,3,4,5,6,7,8");
    assert_eq!(all.as_bytes(), &[1u8; RULE_SLOTS]);

    let none = table("/");
    assert_eq!(none.as_bytes(), &[0u8; RULE_SLOTS]);

    let seeds = table("/2");
    assert_eq!(seeds.survival().count(), 0);
    assert_eq!(seeds.birth().collect::<Vec<_>>(), vec![2]);

    let unordered = table("3,2/3");
    assert_eq!(unordered, RuleTable::life());
}

#[test]
fn next_state_follows_groups() {
    let rules = table("2,3/3,6");
    assert!(rules.next_state(false, 3));
    assert!(rules.next_state(false, 6));
    assert!(!rules.next_state(false, 2));
    assert!(rules.next_state(true, 2));
    assert!(!rules.next_state(true, 6));
    assert!(!rules.next_state(true, 9));
}

#[test]
fn rejects_malformed_rules() {
    assert_eq!(
        RuleTable::build("23"),
        Err(RuleParseError::MissingDelimiter("23".to_owned()))
    );
    assert_eq!(
        RuleTable::build("2/3/4"),
        Err(RuleParseError::ExtraDelimiter("2/3/4".to_owned()))
    );
    assert_eq!(
        RuleTable::build("23/3"),
        Err(RuleParseError::MultiDigit {
            group: RuleGroup::Survival,
            token: "23".to_owned()
        })
    );
    assert_eq!(
        RuleTable::build("2,9/3"),
        Err(RuleParseError::OutOfRange {
            group: RuleGroup::Survival,
            digit: 9
        })
    );
    assert_eq!(
        RuleTable::build("2,3/9"),
        Err(RuleParseError::OutOfRange {
            group: RuleGroup::Birth,
            digit: 9
        })
    );
    assert_eq!(
        RuleTable::build("2,2/3"),
        Err(RuleParseError::Duplicate {
            group: RuleGroup::Survival,
            digit: 2
        })
    );
    for bad in ["2,/3", "a/3", "2,3/ 3", "2;3/3", "-1/3"] {
        assert!(
            matches!(
                RuleTable::build(bad),
                Err(RuleParseError::InvalidToken { .. })
            ),
            "{bad:?} should be an invalid token"
        );
    }
}

#[test]
fn display_is_canonical() {
    assert_eq!(table("3,2/3").to_string(), "2,3/3");
    assert_eq!(table("/").to_string(), "/");
    let round: RuleTable = "8,0/1".parse().unwrap();
    assert_eq!(round.to_string(), "0,8/1");
}

#[test]
fn presets_resolve_by_name() {
    assert_eq!(RuleTable::from_name_or_spec("Life").unwrap(), RuleTable::life());
    assert_eq!(
        RuleTable::from_name_or_spec("highlife").unwrap(),
        table("2,3/3,6")
    );
    assert_eq!(RuleTable::from_name_or_spec("seeds").unwrap(), table("/2"));
    assert_eq!(
        RuleTable::from_name_or_spec("1,5/3").unwrap(),
        table("1,5/3")
    );
    assert!(RuleTable::from_name_or_spec("no-such-rule").is_err());
}
