mod common;

use std::collections::BTreeSet;

use common::{goal, registry};
use elicit_core::{Priority, ReferencePoint, ReferencePointRegistry};
use proptest::prelude::*;
use proptest::sample::Index;

fn tier(n: u8) -> Priority {
    Priority::ALL[usize::from(n % 4)]
}

/// Goal `i` may depend on goals with a lower index, so the graph is acyclic.
fn goal_set() -> impl Strategy<Value = Vec<ReferencePoint>> {
    prop::collection::vec(
        (0u8..4, any::<bool>(), prop::collection::vec(any::<Index>(), 0..3)),
        1..14,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (p, required, deps))| {
                let mut g = ReferencePoint::new(format!("g{i:02}"), format!("Goal {i}"), tier(p));
                if required {
                    g = g.required();
                }
                if i > 0 {
                    for d in deps {
                        g = g.depends_on(format!("g{:02}", d.index(i)));
                    }
                }
                g
            })
            .collect()
    })
}

#[test]
fn empty_tiers_are_never_complete() {
    let mut reg = registry(vec![goal("d", Priority::P2Desirable), goal("o", Priority::P3Optional)]);
    reg.mark_completed("d", 1.0).unwrap();
    reg.mark_completed("o", 1.0).unwrap();
    let p = reg.progress();
    assert_eq!(p.overall_completion, 1.0);
    assert!(!p.critical_completed);
    assert!(!p.important_completed);
    assert!(!reg.can_stop(0.0));

    let mut only_critical = registry(vec![goal("c", Priority::P0Critical)]);
    only_critical.mark_completed("c", 1.0).unwrap();
    assert!(only_critical.progress().critical_completed);
    assert!(!only_critical.progress().important_completed);
}

#[test]
fn empty_registry_reports_nothing_complete() {
    let p = ReferencePointRegistry::new().progress();
    assert_eq!(p.total_goals, 0);
    assert_eq!(p.overall_completion, 0.0);
    assert!(!p.critical_completed && !p.important_completed);
}

proptest! {
    #[test]
    fn completed_goals_are_never_selected_again(points in goal_set()) {
        let mut reg = ReferencePointRegistry::from_points(points.clone()).unwrap();
        let mut done = BTreeSet::new();

        for _ in 0..points.len() {
            let Some(next) = reg.select_next(true).map(|p| p.id.clone()) else { break };
            prop_assert!(!done.contains(&next), "{next} selected after completion");
            reg.mark_completed(&next, 1.0).unwrap();
            done.insert(next);
        }

        // acyclic graph: every goal is reachable
        prop_assert_eq!(done.len(), points.len());
        prop_assert!(reg.select_next(true).is_none());
    }

    #[test]
    fn dependents_wait_for_their_dependencies(points in goal_set()) {
        let mut reg = ReferencePointRegistry::from_points(points.clone()).unwrap();

        while let Some(next) = reg.select_next(true).map(|p| p.clone()) {
            for dep in &next.depends_on {
                prop_assert!(reg.get(dep).unwrap().is_complete(), "{} selected before {dep}", next.id);
            }
            reg.mark_completed(&next.id, 1.0).unwrap();

            // unblocked on the same call the dependency completes
            for dependent in reg.enabled_by(&next.id) {
                let d = reg.get(dependent).unwrap();
                let ready = d.depends_on.iter().all(|x| reg.get(x).unwrap().is_complete());
                prop_assert_eq!(reg.is_blocked(dependent), !ready);
            }
        }
    }

    #[test]
    fn selection_respects_priority_order(points in goal_set()) {
        let reg = ReferencePointRegistry::from_points(points).unwrap();
        if let Some(next) = reg.select_next(true) {
            let best = reg
                .iter()
                .filter(|p| !reg.is_blocked(&p.id))
                .map(|p| p.priority)
                .min()
                .unwrap();
            prop_assert_eq!(next.priority, best);
        }
    }
}
