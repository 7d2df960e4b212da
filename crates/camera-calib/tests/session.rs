mod common;

use camera_calib::{CalibrationSession, StepOutcome};
use common::{ground_truth, pattern, poses, projected_views, tagged_frame, ScriptedSource, SlotSource, TaggedFinder};

fn finder() -> TaggedFinder {
    TaggedFinder {
        views: projected_views(&ground_truth(), &poses(3)),
    }
}

#[test]
fn seventh_consecutive_detection_commits_the_slot() {
    common::init_logger();
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 3, 6);
    let frame = tagged_frame(1);

    for expected in 1..=6 {
        assert_eq!(
            session.process_frame(&frame, &finder),
            StepOutcome::Tracking { consecutive: expected }
        );
        assert_eq!(session.accepted_count(), 0);
    }
    match session.process_frame(&frame, &finder) {
        StepOutcome::Accepted { index, flash } => {
            assert_eq!(index, 0);
            assert_eq!(flash.dimensions(), frame.dimensions());
            // The flash is a negative of the frame.
            assert_eq!(flash.get_pixel(1, 1)[0], 255 - 40);
        }
        other => panic!("expected a commit, got {other:?}"),
    }
    assert_eq!(session.accepted_count(), 1);
    assert_eq!(session.consecutive_successes(), 0);

    let stored = session.correspondences().view(0).expect("entry 0");
    assert_eq!(stored.image, finder.views[0].as_slice());
    assert_eq!(stored.object, pattern().object_points().as_slice());
}

#[test]
fn a_miss_resets_the_streak() {
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 3, 6);
    let hit = tagged_frame(1);
    let miss = tagged_frame(0);

    for _ in 0..5 {
        session.process_frame(&hit, &finder);
    }
    assert_eq!(session.consecutive_successes(), 5);
    assert_eq!(session.process_frame(&miss, &finder), StepOutcome::NotFound);
    assert_eq!(session.consecutive_successes(), 0);

    for _ in 0..6 {
        assert!(matches!(
            session.process_frame(&hit, &finder),
            StepOutcome::Tracking { .. }
        ));
    }
    assert!(matches!(
        session.process_frame(&hit, &finder),
        StepOutcome::Accepted { index: 0, .. }
    ));
}

#[test]
fn misses_are_counted_per_slot() {
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 3, 0);
    let miss = tagged_frame(0);

    session.process_frame(&miss, &finder);
    session.process_frame(&miss, &finder);
    assert_eq!(session.misses(), 2);
    // A streak does not clear the count; only a commit does.
    assert!(matches!(
        session.process_frame(&tagged_frame(1), &finder),
        StepOutcome::Accepted { index: 0, .. }
    ));
    assert_eq!(session.misses(), 0);
    session.process_frame(&miss, &finder);
    assert_eq!(session.misses(), 1);
}

#[test]
fn zero_debounce_commits_every_detection() {
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 3, 0);
    for slot in 0..3 {
        let outcome = session.process_frame(&tagged_frame(slot as u8 + 1), &finder);
        assert!(matches!(outcome, StepOutcome::Accepted { index, .. } if index == slot));
        assert_eq!(session.accepted_count(), slot + 1);
    }
    assert!(session.is_complete());
    assert_eq!(session.process_frame(&tagged_frame(1), &finder), StepOutcome::Complete);
}

#[test]
fn step_pulls_frames_until_complete() {
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 3, 2);
    let mut source = SlotSource;
    let mut commits = 0;
    let mut steps = 0;
    while !session.is_complete() {
        if let StepOutcome::Accepted { .. } = session.step(&mut source, &finder).expect("grab") {
            commits += 1;
        }
        steps += 1;
        assert!(steps < 100, "session never completed");
    }
    assert_eq!(commits, 3);
    assert_eq!(steps, 9);
    assert_eq!(session.into_correspondences().len(), 3);
}

#[test]
fn exhausted_source_reports_no_frame() {
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 1, 6);
    let mut source = ScriptedSource::new(&[1, 0]);
    assert_eq!(
        session.step(&mut source, &finder).expect("grab"),
        StepOutcome::Tracking { consecutive: 1 }
    );
    assert_eq!(session.step(&mut source, &finder).expect("grab"), StepOutcome::NotFound);
    assert_eq!(session.step(&mut source, &finder).expect("grab"), StepOutcome::NoFrame);
}

#[test]
fn zero_images_is_complete_immediately() {
    let finder = finder();
    let mut session = CalibrationSession::new(pattern(), 0, 6);
    assert!(session.is_complete());
    assert_eq!(session.step(&mut SlotSource, &finder).expect("grab"), StepOutcome::Complete);
    assert!(session.correspondences().is_empty());
}
