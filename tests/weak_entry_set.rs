// WeakEntrySet integration tests.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Set parity: with every member kept alive, the set behaves like an
//   insertion-ordered identity set.
// - Self-healing reads: a collected member is never reported by `has` or
//   yielded by iteration, even before finalizers run.
// - Iteration: each step resumes after the last visited member; removals and
//   insertions made during traversal are honored.
// - Finalizers: every removal path cancels the member's registration.
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use weak_collections::WeakEntrySet;

type Set = WeakEntrySet<Weak<u32>>;

fn objects(n: u32) -> Vec<Rc<u32>> {
    (0..n).map(Rc::new).collect()
}

// Test: construction from nothing and from sequences.
// Assumes: construction applies `add` in sequence order.
// Verifies: empty inputs give an empty set; duplicates collapse.
#[test]
fn construction() {
    assert_eq!(Set::new().len(), 0);
    assert_eq!(Set::default().len(), 0);
    assert!(Set::new().is_empty());

    let none: Vec<Rc<u32>> = Vec::new();
    let set: Set = none.into_iter().collect();
    assert_eq!(set.len(), 0);

    let objs = objects(3);
    let set: Set = objs.iter().cloned().chain(objs.iter().cloned()).collect();
    assert_eq!(set.len(), 3);
    let seen: Vec<u32> = set.iter().map(|v| *v).collect();
    assert_eq!(seen, [0, 1, 2]);

    let mut extended = Set::new();
    extended.extend(objs.iter().rev().cloned());
    let seen: Vec<u32> = extended.iter().map(|v| *v).collect();
    assert_eq!(seen, [2, 1, 0]);
}

// Test: basic add/has/delete/clear against a live population.
// Assumes: members are kept alive by the test.
// Verifies: add returns the set; duplicates do not grow the set; delete
// returns true then false; clear empties.
#[test]
fn add_has_delete_clear() {
    let set = Set::new();
    let a = Rc::new(1);
    let b = Rc::new(1);

    assert!(!set.has(&a));
    assert!(std::ptr::eq(set.add(&a), &set));
    assert!(set.has(&a));
    assert!(!set.has(&b), "membership is by identity, not by value");
    assert_eq!(set.len(), 1);

    set.add(&a).add(&a.clone());
    assert_eq!(set.len(), 1);

    set.add(&b);
    assert_eq!(set.len(), 2);

    assert!(set.delete(&a));
    assert!(!set.delete(&a));
    assert!(!set.has(&a));
    assert_eq!(set.len(), 1);

    set.clear();
    assert_eq!(set.len(), 0);
    assert!(!set.has(&b));
    assert_eq!(set.pending_finalizers(), 0);

    set.clear();
    assert_eq!(set.len(), 0);
}

// Test: re-adding keeps position.
// Assumes: insertion order is iteration order.
// Verifies: re-adding an existing member changes neither len nor order;
// deleting and re-adding moves it to the end.
#[test]
fn readd_keeps_position() {
    let objs = objects(3);
    let set: Set = objs.iter().cloned().collect();
    set.add(&objs[0]);
    let seen: Vec<u32> = set.iter().map(|v| *v).collect();
    assert_eq!(seen, [0, 1, 2]);

    set.delete(&objs[0]);
    set.add(&objs[0]);
    let seen: Vec<u32> = set.iter().map(|v| *v).collect();
    assert_eq!(seen, [1, 2, 0]);
    assert_eq!(set.len(), 3);
}

// Test: views and for_each agree with default iteration.
// Assumes: all members alive.
// Verifies: keys/values/entries/for_each visit in the same order, once each;
// for_each passes the same set instance and threads an explicit context.
#[test]
fn views_and_for_each() {
    let objs = objects(3);
    let set: Set = objs.iter().cloned().collect();

    let default: Vec<u32> = (&set).into_iter().map(|v| *v).collect();
    let keys: Vec<u32> = set.keys().map(|v| *v).collect();
    let values: Vec<u32> = set.values().map(|v| *v).collect();
    assert_eq!(default, [0, 1, 2]);
    assert_eq!(keys, default);
    assert_eq!(values, default);
    for (i, (a, b)) in set.entries().enumerate() {
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a, &objs[i]));
    }

    let mut visited = Vec::new();
    set.for_each(|v, s| {
        assert!(std::ptr::eq(s, &set));
        visited.push(*v);
    });
    assert_eq!(visited, default);

    let mut ctx = String::from(":D");
    let mut calls = 0;
    set.for_each_with(&mut ctx, |this, v, s| {
        assert_eq!(this.as_str(), ":D");
        assert!(std::ptr::eq(s, &set));
        assert_eq!(*v, default[calls]);
        calls += 1;
    });
    assert_eq!(calls, 3);
}

// Test: collected members vanish from reads before any finalizer runs.
// Assumes: finalizers have not run; len may overcount.
// Verifies: iteration skips the dead member and prunes it, after which len
// and the pending registration count both drop.
#[test]
fn collected_member_is_never_yielded() {
    let mut objs: Vec<Option<Rc<u32>>> = objects(3).into_iter().map(Some).collect();
    let set = Set::new();
    for o in objs.iter().flatten() {
        set.add(o);
    }
    objs[1] = None;
    assert_eq!(set.len(), 3, "overcount until a read or finalizer");

    let seen: Vec<u32> = set.iter().map(|v| *v).collect();
    assert_eq!(seen, [0, 2]);
    assert_eq!(set.len(), 2);
    assert_eq!(set.pending_finalizers(), 2);
    assert_eq!(set.run_finalizers(), 0, "the read already removed it");
}

// Test: finalizer path.
// Assumes: no read touches the dead member first.
// Verifies: run_finalizers removes exactly the collected members.
#[test]
fn finalizers_remove_collected_members() {
    let keep = objects(2);
    let set = Set::new();
    for o in &keep {
        set.add(o);
        let temp = Rc::new(99);
        set.add(&temp);
    }
    assert_eq!(set.len(), 4);
    assert_eq!(set.run_finalizers(), 2);
    assert_eq!(set.len(), 2);
    assert_eq!(set.run_finalizers(), 0);
    let seen: Vec<u32> = set.iter().map(|v| *v).collect();
    assert_eq!(seen, [0, 1]);
}

// Test: eager pruning.
// Verifies: prune removes every dead member and cancels its registration.
#[test]
fn prune_removes_dead_members() {
    let keep = Rc::new(1);
    let set = Set::new();
    set.add(&keep);
    for i in 0..5 {
        set.add(&Rc::new(i));
    }
    assert_eq!(set.len(), 6);
    assert_eq!(set.prune(), 5);
    assert_eq!(set.len(), 1);
    assert_eq!(set.pending_finalizers(), 1);
    assert_eq!(set.run_finalizers(), 0);
}

// Test: mutation during traversal.
// Assumes: step semantics resume after the last visited member.
// Verifies: a member deleted before being reached is not visited; deleting
// the current member does not disturb the rest; a member added during
// traversal is visited at the end.
#[test]
fn mutation_during_iteration() {
    let objs = objects(4);
    let set: Set = objs.iter().cloned().collect();
    let late = Rc::new(9);

    let mut seen = Vec::new();
    for v in &set {
        if *v == 0 {
            assert!(set.delete(&objs[2]));
            set.add(&late);
        }
        if *v == 1 {
            assert!(set.delete(&objs[1]));
        }
        seen.push(*v);
    }
    assert_eq!(seen, [0, 1, 3, 9]);
    assert_eq!(set.len(), 3);
}

// Test: members dying mid-traversal.
// Assumes: the callback drops the last strong reference of a later member.
// Verifies: the callback is not invoked for it.
#[test]
fn for_each_skips_members_that_die_before_visit() {
    let holders: RefCell<Vec<Option<Rc<u32>>>> =
        RefCell::new(objects(4).into_iter().map(Some).collect());
    let set = Set::new();
    for o in holders.borrow().iter().flatten() {
        set.add(o);
    }

    let mut visited = Vec::new();
    set.for_each(|v, _| {
        visited.push(*v);
        if *v == 1 {
            holders.borrow_mut()[3] = None;
        }
    });
    assert_eq!(visited, [0, 1, 2]);
    assert_eq!(set.len(), 3);
}

// Test: independent iterations.
// Verifies: two interleaved iterators each see the full live sequence.
#[test]
fn independent_iterations() {
    let objs = objects(3);
    let set: Set = objs.iter().cloned().collect();
    let mut it1 = set.iter();
    let mut it2 = set.iter();
    assert_eq!(it1.next().map(|v| *v), Some(0));
    assert_eq!(it2.next().map(|v| *v), Some(0));
    assert_eq!(it1.next().map(|v| *v), Some(1));
    assert_eq!(it1.next().map(|v| *v), Some(2));
    assert_eq!(it2.next().map(|v| *v), Some(1));
    assert!(it1.next().is_none());
    assert_eq!(it2.next().map(|v| *v), Some(2));
    assert!(it2.next().is_none());
}

// Test: instances do not share finalizer state.
// Verifies: deleting from one set leaves the other's registration intact,
// and each set finalizes only its own entry.
#[test]
fn instances_are_independent() {
    let a = Set::new();
    let b = Set::new();
    let obj = Rc::new(1);
    a.add(&obj);
    b.add(&obj);
    assert!(a.delete(&obj));
    assert_eq!(a.pending_finalizers(), 0);
    assert_eq!(b.pending_finalizers(), 1);

    drop(obj);
    assert_eq!(a.run_finalizers(), 0);
    assert_eq!(b.run_finalizers(), 1);
    assert!(b.is_empty());
}

// Test: thread-safe handles and unsized targets.
// Verifies: the same contract holds for `Arc<str>` members.
#[test]
fn arc_members() {
    use std::sync::Arc;
    let set: WeakEntrySet<std::sync::Weak<str>> = WeakEntrySet::new();
    let hello: Arc<str> = Arc::from("hello");
    let world: Arc<str> = Arc::from("world");
    set.add(&hello).add(&world);
    assert!(set.has(&hello));
    drop(world);
    let seen: Vec<String> = set.iter().map(|s| s.to_string()).collect();
    assert_eq!(seen, ["hello"]);
}
