//! End-to-end ordering and batching scenarios for the layout coordinator.

use arbor_core::{CoordinatorState, LayoutCoordinator, ViewId};
use arbor_testing::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

struct Fixture {
    arena: Arc<ViewArena>,
    scheduler: Arc<ManualScheduler>,
    coordinator: Arc<LayoutCoordinator<ViewArena>>,
}

impl Fixture {
    fn new() -> Self {
        let arena = Arc::new(ViewArena::new());
        arena.bind_ui_thread();
        let scheduler = ManualScheduler::new();
        let coordinator = LayoutCoordinator::new(arena.clone(), scheduler.clone());
        Self {
            arena,
            scheduler,
            coordinator,
        }
    }

    /// Root R with child C1 with child C2.
    fn with_chain() -> (Self, ViewId, ViewId, ViewId) {
        let fixture = Self::new();
        let root = fixture.arena.root();
        let chain = fixture.arena.insert_chain(root, 2).expect("chain");
        (fixture, root, chain[0], chain[1])
    }
}

#[test]
fn sizing_runs_deepest_first() {
    let (fx, root, c1, c2) = Fixture::with_chain();

    fx.coordinator.request_sizing_update(c1);
    fx.coordinator.request_sizing_update(root);
    fx.coordinator.request_sizing_update(c2);
    fx.scheduler.run_queued();

    assert_eq!(sizing_order(&fx.arena.calls()), vec![c2, c1, root]);
}

#[test]
fn layout_runs_shallowest_first() {
    let (fx, root, c1, c2) = Fixture::with_chain();

    fx.coordinator.request_layout_update(c2);
    fx.coordinator.request_layout_update(root);
    fx.coordinator.request_layout_update(c1);
    fx.scheduler.run_queued();

    assert_eq!(layout_order(&fx.arena.calls()), vec![root, c1, c2]);
}

#[test]
fn sizing_phase_completes_before_layout_phase() {
    let (fx, root, c1, c2) = Fixture::with_chain();

    fx.coordinator.request_layout_update(root);
    fx.coordinator.request_sizing_update(c2);
    fx.coordinator.request_layout_update(c1);
    fx.coordinator.request_sizing_update(root);
    fx.scheduler.run_queued();

    assert_eq!(
        fx.arena.calls(),
        vec![
            LayoutCall::Sizing(c2),
            LayoutCall::Sizing(root),
            LayoutCall::Layout(root),
            LayoutCall::Layout(c1),
        ]
    );
}

#[test]
fn equal_depth_views_run_in_id_order() {
    let fx = Fixture::new();
    let root = fx.arena.root();
    let a = fx.arena.insert_child(root).expect("a");
    let b = fx.arena.insert_child(root).expect("b");
    let c = fx.arena.insert_child(root).expect("c");

    for view in [c, a, b] {
        fx.coordinator.request_sizing_update(view);
        fx.coordinator.request_layout_update(view);
    }
    fx.scheduler.run_queued();

    let calls = fx.arena.calls();
    assert_eq!(sizing_order(&calls), vec![a, b, c]);
    assert_eq!(layout_order(&calls), vec![a, b, c]);
}

#[test]
fn duplicate_requests_collapse_to_one_recompute() {
    let (fx, root, c1, _) = Fixture::with_chain();

    for _ in 0..3 {
        fx.coordinator.request_sizing_update(c1);
        fx.coordinator.request_layout_update(root);
    }
    assert_eq!(fx.scheduler.posted(), 1);
    fx.scheduler.run_queued();

    let calls = fx.arena.calls();
    assert_call_count(&calls, LayoutCall::Sizing(c1), 1);
    assert_call_count(&calls, LayoutCall::Layout(root), 1);
    assert_eq!(calls.len(), 2);
}

#[test]
fn burst_on_ui_thread_is_deferred_into_one_pass() {
    let (fx, root, c1, c2) = Fixture::with_chain();

    for view in [root, c1, c2] {
        fx.coordinator.request_layout_update(view);
    }

    assert!(fx.arena.calls().is_empty(), "requests must not run inline");
    assert_eq!(fx.coordinator.state(), CoordinatorState::Scheduled);
    assert_eq!(fx.scheduler.queued(), 1);

    fx.scheduler.run_queued();
    assert_eq!(fx.arena.calls().len(), 3);
    assert_eq!(fx.coordinator.state(), CoordinatorState::Idle);
}

#[test]
fn sizing_request_for_parent_is_drained_in_same_phase() {
    let (fx, root, c1, c2) = Fixture::with_chain();
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        fx.arena.on_sizing(c2, move |_| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.request_sizing_update(c1);
            }
        });
    }

    fx.coordinator.request_sizing_update(c2);
    fx.coordinator.request_layout_update(root);
    fx.scheduler.run_one();

    assert_eq!(
        fx.arena.calls(),
        vec![
            LayoutCall::Sizing(c2),
            LayoutCall::Sizing(c1),
            LayoutCall::Layout(root),
        ]
    );
}

#[test]
fn layout_requests_raised_during_sizing_join_the_same_pass() {
    let (fx, root, c1, c2) = Fixture::with_chain();
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        fx.arena.on_sizing(c2, move |_| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.request_layout_update(c1);
            }
        });
    }

    fx.coordinator.request_sizing_update(c2);
    fx.coordinator.request_layout_update(root);
    fx.scheduler.run_one();

    assert_eq!(
        fx.arena.calls(),
        vec![
            LayoutCall::Sizing(c2),
            LayoutCall::Layout(root),
            LayoutCall::Layout(c1),
        ]
    );
}

#[test]
fn layout_request_for_child_is_drained_in_same_phase() {
    let (fx, root, c1, c2) = Fixture::with_chain();
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        fx.arena.on_layout(root, move |_| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.request_layout_update(c1);
                coordinator.request_layout_update(c2);
            }
        });
    }

    fx.coordinator.request_layout_update(root);
    fx.scheduler.run_one();

    assert_eq!(layout_order(&fx.arena.calls()), vec![root, c1, c2]);
}

#[test]
fn sizing_raised_during_layout_waits_for_a_fresh_pass() {
    let (fx, root, c1, _) = Fixture::with_chain();
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        fx.arena.on_layout(root, move |_| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.request_sizing_update(c1);
            }
        });
    }

    fx.coordinator.request_layout_update(root);
    fx.scheduler.run_one();

    assert_eq!(fx.arena.take_calls(), vec![LayoutCall::Layout(root)]);
    assert!(fx.coordinator.has_pending_updates());
    assert_eq!(fx.scheduler.queued(), 1, "a new pass was posted");

    fx.scheduler.run_one();
    assert_eq!(fx.arena.take_calls(), vec![LayoutCall::Sizing(c1)]);
    assert!(!fx.coordinator.has_pending_updates());
}

#[test]
fn concurrent_producers_schedule_a_single_pass() {
    const PRODUCERS: usize = 8;

    let fx = Fixture::new();
    let views: Vec<ViewId> = (0..PRODUCERS)
        .map(|_| fx.arena.insert_child(fx.arena.root()).expect("child"))
        .collect();
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let handles: Vec<_> = views
        .iter()
        .copied()
        .map(|view| {
            let coordinator = fx.coordinator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.request_sizing_update(view);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer thread");
    }

    assert_eq!(fx.scheduler.posted(), 1);
    assert_eq!(fx.scheduler.run_queued(), 1);

    let calls = fx.arena.calls();
    assert_eq!(calls.len(), PRODUCERS);
    for view in views {
        assert_call_count(&calls, LayoutCall::Sizing(view), 1);
    }
}

#[test]
fn update_now_off_ui_thread_is_a_no_op() {
    let (fx, _, c1, _) = Fixture::with_chain();
    fx.coordinator.request_sizing_update(c1);

    {
        let coordinator = fx.coordinator.clone();
        thread::spawn(move || coordinator.update_now())
            .join()
            .expect("background thread");
    }

    assert!(fx.arena.calls().is_empty());
    assert_eq!(fx.coordinator.state(), CoordinatorState::Scheduled);
    assert_eq!(fx.scheduler.queued(), 1);

    fx.scheduler.run_queued();
    assert_eq!(fx.arena.calls(), vec![LayoutCall::Sizing(c1)]);
}

#[test]
fn update_now_on_ui_thread_runs_inline() {
    let (fx, root, c1, _) = Fixture::with_chain();
    fx.coordinator.request_sizing_update(c1);
    fx.coordinator.request_layout_update(root);

    fx.coordinator.update_now();

    assert_eq!(
        fx.arena.take_calls(),
        vec![LayoutCall::Sizing(c1), LayoutCall::Layout(root)]
    );
    fx.scheduler.run_queued();
    assert!(fx.arena.calls().is_empty());
}

#[test]
fn nested_update_now_inside_a_pass_is_ignored() {
    let (fx, root, c1, _) = Fixture::with_chain();
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        fx.arena.on_layout(root, move |_| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.request_layout_update(c1);
                coordinator.update_now();
            }
        });
    }

    fx.coordinator.request_layout_update(root);
    fx.coordinator.update_now();

    assert_eq!(layout_order(&fx.arena.calls()), vec![root, c1]);
    assert_eq!(fx.coordinator.stats().passes, 1);
}

#[test]
fn detached_view_is_skipped() {
    let (fx, root, c1, c2) = Fixture::with_chain();
    let sibling = fx.arena.insert_child(root).expect("sibling");

    fx.coordinator.request_sizing_update(c2);
    fx.coordinator.request_sizing_update(sibling);
    fx.coordinator.request_layout_update(c1);
    fx.coordinator.request_layout_update(root);
    fx.arena.detach(c1).expect("detach");
    fx.scheduler.run_queued();

    assert_eq!(
        fx.arena.calls(),
        vec![LayoutCall::Sizing(sibling), LayoutCall::Layout(root)]
    );
    assert_eq!(fx.coordinator.stats().stale_skipped, 2);
}

#[test]
fn removed_view_is_skipped() {
    let (fx, root, c1, c2) = Fixture::with_chain();

    fx.coordinator.request_layout_update(c2);
    fx.coordinator.request_layout_update(root);
    fx.arena.remove(c1).expect("remove");
    fx.scheduler.run_queued();

    assert_eq!(fx.arena.calls(), vec![LayoutCall::Layout(root)]);
}

#[test]
fn view_moved_between_request_and_pass_uses_new_depth() {
    let (fx, root, c1, c2) = Fixture::with_chain();
    let other = fx.arena.insert_child(root).expect("other");

    fx.coordinator.request_sizing_update(other);
    fx.coordinator.request_sizing_update(c2);
    // `other` now sits below c2 and must be sized before it.
    fx.arena.reattach(other, c2).expect("reattach");
    fx.coordinator.request_sizing_update(c1);
    fx.scheduler.run_queued();

    assert_eq!(sizing_order(&fx.arena.calls()), vec![other, c2, c1]);
}

#[test]
fn waiting_view_moved_by_a_callback_is_reordered_on_re_request() {
    let fx = Fixture::new();
    let root = fx.arena.root();
    let chain = fx.arena.insert_chain(root, 3).expect("chain");
    let (mid, deep) = (chain[0], chain[2]);
    let moved = fx.arena.insert_child(root).expect("moved");
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        let arena = Arc::downgrade(&fx.arena);
        fx.arena.on_sizing(deep, move |_| {
            if let (Some(coordinator), Some(arena)) = (coordinator.upgrade(), arena.upgrade()) {
                arena.reattach(moved, deep).expect("reattach");
                coordinator.request_sizing_update(moved);
                coordinator.request_sizing_update(mid);
            }
        });
    }

    fx.coordinator.request_sizing_update(deep);
    fx.coordinator.request_sizing_update(moved);
    fx.scheduler.run_queued();

    let calls = fx.arena.calls();
    assert_eq!(sizing_order(&calls), vec![deep, moved, mid]);
    assert_called_before(&calls, LayoutCall::Sizing(moved), LayoutCall::Sizing(mid));
}

#[test]
fn pass_swallowed_by_a_nested_queue_pump_is_rescheduled() {
    let (fx, root, c1, _) = Fixture::with_chain();
    {
        let coordinator = Arc::downgrade(&fx.coordinator);
        let scheduler = fx.scheduler.clone();
        fx.arena.on_layout(root, move |_| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.request_sizing_update(c1);
            }
            // A modal loop inside the callback services the UI queue.
            scheduler.run_queued();
        });
    }

    fx.coordinator.request_layout_update(root);
    fx.scheduler.run_one();

    assert_eq!(fx.arena.take_calls(), vec![LayoutCall::Layout(root)]);
    assert!(fx.coordinator.has_pending_updates());
    assert_eq!(fx.coordinator.state(), CoordinatorState::Scheduled);
    assert_eq!(fx.scheduler.queued(), 1);

    fx.scheduler.run_queued();
    assert_eq!(fx.arena.take_calls(), vec![LayoutCall::Sizing(c1)]);
    assert!(!fx.coordinator.has_pending_updates());
    assert_eq!(fx.coordinator.state(), CoordinatorState::Idle);
}

#[test]
fn views_requested_in_both_phases_get_one_call_per_phase() {
    let (fx, root, c1, c2) = Fixture::with_chain();

    for view in [c1, root, c2, c1, root] {
        fx.coordinator.request_sizing_update(view);
        fx.coordinator.request_layout_update(view);
    }
    fx.scheduler.run_queued();

    let calls = fx.arena.calls();
    for view in [root, c1, c2] {
        assert_call_count(&calls, LayoutCall::Sizing(view), 1);
        assert_call_count(&calls, LayoutCall::Layout(view), 1);
    }
    assert_called_before(&calls, LayoutCall::Sizing(c2), LayoutCall::Sizing(root));
    assert_called_before(&calls, LayoutCall::Layout(root), LayoutCall::Layout(c2));
}

#[test]
fn dropped_coordinator_leaves_posted_pass_harmless() {
    let (fx, _, c1, _) = Fixture::with_chain();
    let Fixture {
        arena,
        scheduler,
        coordinator,
    } = fx;

    coordinator.request_sizing_update(c1);
    drop(coordinator);

    assert_eq!(scheduler.run_queued(), 1);
    assert!(arena.calls().is_empty());
}
