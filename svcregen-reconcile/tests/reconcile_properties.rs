//! Behavioural properties of the reconciler over a spread of registries.

use rstest::rstest;
use serde_yaml::Value;

use svcregen_core::types::{CONFFILES_KEY, STATUS_KEY};
use svcregen_core::{BaselineRegistry, ServiceName, ServiceRegistry};
use svcregen_reconcile::{reconcile, Change};

fn current(yaml: &str) -> ServiceRegistry {
    serde_yaml::from_str(yaml).expect("current yaml")
}

fn baseline(yaml: &str) -> BaselineRegistry {
    serde_yaml::from_str(yaml).expect("baseline yaml")
}

const CURRENTS: &[&str] = &[
    "{}",
    "nginx: {start: a}\n",
    "nginx: {start: a, status: s, conffiles: {x: y}}\nmysql: {start: m}\n",
    "nginx: null\nssh: {port: 22, status: s}\n",
    "ssh: {start: sshd, conffiles: {}}\nold: {start: o}\n",
];

const BASELINES: &[&str] = &[
    "{}",
    "mysql: null\n",
    "nginx: {start: b}\nmysql: null\ndovecot: {start: d}\n",
    "ssh: {start: sshd, status: s}\nold: null\n",
    "nginx: {start: a, log: /var/log/nginx}\n",
    "nginx: {}\nssh: {}\n",
];

fn all_pairs() -> impl Iterator<Item = (ServiceRegistry, BaselineRegistry)> {
    CURRENTS.iter().flat_map(|c| {
        BASELINES
            .iter()
            .map(move |b| (current(c), baseline(b)))
    })
}

#[test]
fn removal_completeness() {
    for (cur, base) in all_pairs() {
        let out = reconcile(&cur, &base);
        for (service, conf) in &base {
            if conf.as_ref().map_or(true, |c| c.is_empty()) {
                assert!(!out.registry.contains_key(service), "{service} survived removal");
            }
        }
    }
}

#[test]
fn addition_totality() {
    for (cur, base) in all_pairs() {
        let out = reconcile(&cur, &base);
        for (service, conf) in &base {
            let Some(conf) = conf.as_ref().filter(|c| !c.is_empty()) else { continue };
            if cur.get(service).map_or(true, |e| e.is_empty()) {
                assert_eq!(&out.registry[service], conf, "{service} not added verbatim");
            }
        }
    }
}

#[test]
fn conffiles_preserved_for_surviving_entries() {
    for (cur, base) in all_pairs() {
        let out = reconcile(&cur, &base);
        for (service, entry) in &cur {
            let Some(held) = entry.get(CONFFILES_KEY) else { continue };
            if !matches!(base.get(service), Some(Some(c)) if !c.is_empty()) || entry.is_empty() {
                continue;
            }
            if held.as_mapping().map_or(false, |m| m.is_empty()) {
                continue;
            }
            assert_eq!(out.registry[service].get(CONFFILES_KEY), Some(held));
        }
    }
}

#[test]
fn status_retracted_when_baseline_lacks_it() {
    for (cur, base) in all_pairs() {
        let out = reconcile(&cur, &base);
        for (service, conf) in &base {
            let (Some(conf), Some(entry)) = (conf, cur.get(service)) else { continue };
            if conf.is_empty() || entry.is_empty() || conf.contains_key(STATUS_KEY) {
                continue;
            }
            assert!(!out.registry[service].contains_key(STATUS_KEY));
        }
    }
}

#[test]
fn services_outside_baseline_are_untouched() {
    for (cur, base) in all_pairs() {
        let out = reconcile(&cur, &base);
        for (service, entry) in &cur {
            if !base.contains_key(service) {
                assert_eq!(&out.registry[service], entry);
            }
        }
    }
}

#[test]
fn second_pass_is_a_noop_without_admin_extras() {
    for (cur, base) in all_pairs() {
        let first = reconcile(&cur, &base);
        let second = reconcile(&first.registry, &base);
        let has_extras = first.registry.iter().any(|(service, entry)| {
            matches!(base.get(service), Some(Some(conf))
                if entry.iter().any(|(k, _)| {
                    k.as_str() != Some(CONFFILES_KEY) && conf.get(k.as_str().unwrap_or("")).is_none()
                }))
        });
        if has_extras {
            continue;
        }
        assert!(!second.changed(), "changed again: {:?}", second.changes);
        assert_eq!(second.registry, first.registry);
    }
}

#[rstest]
#[case::extra_field("ssh: {start: x, port: 2222}\n", "ssh: {start: x}\n", true)]
#[case::identical("ssh: {start: x}\n", "ssh: {start: x}\n", false)]
#[case::only_conffiles_differs("ssh: {start: x, conffiles: {a: b}}\n", "ssh: {start: x}\n", false)]
#[case::baseline_adds_field("ssh: {start: x}\n", "ssh: {start: x, port: 22}\n", true)]
#[case::absent_removal("ssh: {start: x}\n", "mysql: null\n", false)]
#[case::empty_entry_removal("ssh: {start: x}\n", "ssh: {}\n", true)]
#[case::empty_entry_absent("ssh: {start: x}\n", "mysql: {}\n", false)]
#[case::unlisted_service("ssh: {start: x}\n", "{}", false)]
fn changed_flag(#[case] cur: &str, #[case] base: &str, #[case] expected: bool) {
    assert_eq!(reconcile(&current(cur), &baseline(base)).changed(), expected);
}

#[test]
fn extras_survive_a_merge() {
    let out = reconcile(
        &current("ssh:\n  start: old\n  port: 2222\n  allow: [alice]\n"),
        &baseline("ssh:\n  start: new\n"),
    );
    let ssh = &out.registry[&ServiceName::from("ssh")];
    assert_eq!(ssh.get("start"), Some(&Value::from("new")));
    assert_eq!(ssh.get("port").and_then(Value::as_u64), Some(2222));
    assert!(ssh.get("allow").is_some());
    assert_eq!(
        out.changes,
        vec![Change::Updated {
            service: ServiceName::from("ssh"),
            fields: vec!["start".to_owned()],
        }]
    );
}
