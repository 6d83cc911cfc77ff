//! Property and concurrency tests

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{section, setup};
use proptest::prelude::*;
use refacl::constants::{PUSH, READ, REFS_CONFIG};
use refacl::{
    AccessSection, AclError, Caller, ConfigStore, GroupRef, Permission, PermissionRule, ProjectConfig,
    RefPattern,
};

proptest! {
    #[test]
    fn prop_range_is_ordered(a in any::<i32>(), b in any::<i32>()) {
        let rule = PermissionRule::new(GroupRef::named("Devs")).with_range(a, b);
        prop_assert!(rule.min() <= rule.max());
        prop_assert_eq!((rule.min(), rule.max()), (a.min(b), a.max(b)));
    }

    #[test]
    fn prop_stored_range_is_ordered(a in -10i32..10, b in -10i32..10) {
        let json = format!(r#"{{"group":{{"name":"Devs"}},"min":{},"max":{}}}"#, a, b);
        let rule: PermissionRule = serde_json::from_str(&json).unwrap();
        prop_assert!(rule.min() <= rule.max());

        let text = format!("{}..{} group Devs", a, b);
        let parsed: PermissionRule = text.parse().unwrap();
        prop_assert_eq!((parsed.min(), parsed.max()), (a.min(b), a.max(b)));
    }

    #[test]
    fn prop_pattern_display_parses_back(raw in "[a-z]{1,6}(/[a-z]{1,6}){0,3}(/\\*)?") {
        prop_assume!(!raw.starts_with("refs/"));
        let p = RefPattern::parse(&raw).unwrap();
        prop_assert!(p.ownership_scope().starts_with("refs/heads/"));
        prop_assert_eq!(RefPattern::parse(&p.to_string()).unwrap(), p.clone());
        prop_assert!(p.covers(&p));
    }

    #[test]
    fn prop_wildcard_covers_everything_below(prefix in "[a-z]{1,6}", rest in "[a-z]{1,6}(/[a-z]{1,6}){0,2}") {
        let wild = RefPattern::parse(&format!("{}/*", prefix)).unwrap();
        let below = RefPattern::parse(&format!("{}/{}", prefix, rest)).unwrap();
        prop_assert!(wild.covers(&below));
        prop_assert!(!below.covers(&wild));
        prop_assert!(wild.matches(below.ownership_scope()));
    }
}

#[test]
fn test_racing_commits_one_winner() {
    let w = setup();
    w.project("p", None);
    let base = w.head("p");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|who| {
            let store = w.store.clone();
            let barrier = barrier.clone();
            let base = base.clone();
            let users = w.users.clone();
            thread::spawn(move || {
                let config = ProjectConfig::new("p").with_section(
                    AccessSection::new(&format!("refs/heads/{}/*", who))
                        .unwrap()
                        .with_permission(Permission::new(PUSH).with_rule(PermissionRule::new(users))),
                );
                barrier.wait();
                store.commit("p", &base, &config, "race\n", &Caller::new(who))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser, &AclError::StaleBase { expected: base.to_string(), actual: winners[0].to_string() });
    assert_eq!(&w.head("p"), winners[0]);
}

#[test]
fn test_read_rejects_foreign_revision() {
    let w = setup();
    w.project("p", None);
    w.project("q", None);
    let err = w.store.read("p", Some(&w.head("q"))).unwrap_err();
    assert_eq!(err, AclError::NoSuchRevision(w.head("q").to_string()));
}

#[test]
fn test_revisions_are_content_addressed() {
    let w = setup();
    w.project("p", None);
    let base = w.head("p");
    let config = ProjectConfig::new("p").with_section(section("refs/*", READ, &["Registered Users"]));
    let rev = w.store.commit("p", &base, &config, "same\n", &w.admin).unwrap();
    let record = w.store.commit_record(&rev).unwrap().unwrap();
    assert_eq!(record.revision().unwrap(), rev);
    assert_eq!(record.parent, Some(base));
    assert_eq!(w.store.refs("p").unwrap(), vec![(REFS_CONFIG.to_string(), rev)]);
    assert!(w.store.projects().unwrap().contains(&"p".to_string()));
    assert!(w.store.head("nope").unwrap().is_none());
}
