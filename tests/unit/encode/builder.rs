use super::*;
use crate::encode::InMemoryEncoder;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

fn frame(v: u16) -> Picture {
    Picture::solid(4, 2, [v, v, v], None).unwrap()
}

fn builder(duration: u64, strict: bool, block: bool) -> VideoBuilder<InMemoryEncoder> {
    let mut opts = VideoBuilderOpts::new(4, 2, duration);
    opts.strict_mode = strict;
    opts.block_write = block;
    VideoBuilder::new(InMemoryEncoder::with_size(4, 2), opts).unwrap()
}

fn values(enc: &InMemoryEncoder) -> Vec<u16> {
    enc.frames()
        .iter()
        .map(|p| p.rgb16_at(0, 0).unwrap()[0])
        .collect()
}

fn no_regen(i: FrameIndex) -> FramecutResult<Picture> {
    panic!("unexpected regeneration of {i}")
}

#[test]
fn block_write_releases_frames_in_index_order() {
    let b = builder(4, true, true);
    b.append(2, frame(2)).unwrap();
    b.append(0, frame(0)).unwrap();
    assert_eq!(b.written_count(), 1);
    assert_eq!(b.status(2), Some(FrameStatus::Pending));
    b.append(1, frame(1)).unwrap();
    assert_eq!(b.next_index(), 3);
    b.append(3, frame(3)).unwrap();
    b.finish(&mut no_regen, 4).unwrap();

    let enc = b.into_encoder();
    assert!(enc.is_finished());
    assert_eq!(values(&enc), vec![0, 1, 2, 3]);
}

#[test]
fn strict_duplicate_is_an_error() {
    let b = builder(10, true, true);
    b.append(5, frame(5)).unwrap();
    let err = b.append(5, frame(6)).unwrap_err();
    assert!(matches!(err, FramecutError::DuplicateFrame { index: 5 }));
}

#[test]
fn lenient_duplicate_is_dropped() {
    let b = builder(6, false, true);
    for i in 0..6 {
        b.append(i, frame(i as u16)).unwrap();
    }
    b.append(5, frame(999)).unwrap();
    b.finish(&mut no_regen, 6).unwrap();
    assert_eq!(values(&b.into_encoder()), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn frame_beyond_duration_is_rejected_or_dropped() {
    let strict = builder(3, true, true);
    let err = strict.append(3, frame(0)).unwrap_err();
    assert!(matches!(
        err,
        FramecutError::FrameBeyondDuration {
            index: 3,
            duration: 3
        }
    ));

    let lenient = builder(3, false, true);
    lenient.append(7, frame(0)).unwrap();
    assert!(!lenient.contains(7));
}

#[test]
fn finish_regenerates_gaps() {
    let b = builder(6, true, false);
    b.append(0, frame(0)).unwrap();
    b.append(3, frame(3)).unwrap();
    b.append(5, frame(5)).unwrap();
    let mut regenerated = Vec::new();
    b.finish(
        &mut |i| {
            regenerated.push(i.0);
            Ok(frame(100 + i.0 as u16))
        },
        6,
    )
    .unwrap();
    assert_eq!(regenerated, vec![1, 2, 4]);
    assert_eq!(values(&b.into_encoder()), vec![0, 101, 102, 3, 104, 5]);
}

#[test]
fn finish_fills_trailing_frames_up_to_total() {
    let b = builder(4, true, true);
    b.append(0, frame(0)).unwrap();
    b.finish(&mut |i| Ok(frame(i.0 as u16)), 4).unwrap();
    assert_eq!(values(&b.into_encoder()), vec![0, 1, 2, 3]);
}

#[test]
fn writer_thread_orders_concurrent_appends() {
    let b = builder(64, true, false);
    std::thread::scope(|s| {
        let writer = s.spawn(|| b.run_writer());
        let producers: Vec<_> = (0..4u64)
            .map(|t| {
                let b = &b;
                s.spawn(move || {
                    for i in (0..64u64).rev().filter(|i| i % 4 == t) {
                        b.append(i, frame(i as u16)).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        b.stop();
        writer.join().unwrap().unwrap();
    });
    b.finish(&mut no_regen, 64).unwrap();
    let got = values(&b.into_encoder());
    assert_eq!(got, (0..64u16).collect::<Vec<_>>());
}

#[test]
fn appending_after_finish_fails() {
    let b = builder(1, true, true);
    b.append(0, frame(0)).unwrap();
    b.finish(&mut no_regen, 1).unwrap();
    assert!(b.append(0, frame(0)).is_err());
}

#[test]
fn frames_of_the_wrong_size_are_rejected() {
    for strict in [true, false] {
        let b = builder(2, strict, true);
        let err = b
            .append(0, Picture::solid(8, 4, [7, 7, 7], None).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            FramecutError::FrameSizeMismatch {
                got_w: 8,
                got_h: 4,
                expected_w: 4,
                expected_h: 2,
            }
        ));
        assert!(!b.contains(0));
        assert_eq!(b.written_count(), 0);

        // The index stays free for a correctly sized frame.
        b.append(0, frame(0)).unwrap();
        b.append(1, frame(1)).unwrap();
        b.finish(&mut no_regen, 2).unwrap();
        assert_eq!(values(&b.into_encoder()), vec![0, 1]);
    }
}

#[test]
fn encoder_size_check_surfaces_from_append() {
    let mut opts = VideoBuilderOpts::new(4, 2, 2);
    opts.block_write = true;
    let b = VideoBuilder::new(InMemoryEncoder::with_size(8, 8), opts).unwrap();
    let err = b.append(0, frame(0)).unwrap_err();
    assert!(matches!(err, FramecutError::FrameSizeMismatch { .. }));
}

#[test]
fn progress_reports_written_fraction() {
    let last = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&last);
    let mut opts = VideoBuilderOpts::new(4, 2, 4);
    opts.block_write = true;
    let b = VideoBuilder::new(InMemoryEncoder::with_size(4, 2), opts)
        .unwrap()
        .with_progress(move |p| seen.store((p * 100.0) as u64, Ordering::SeqCst));
    b.append(0, frame(0)).unwrap();
    b.append(1, frame(1)).unwrap();
    assert_eq!(last.load(Ordering::SeqCst), 50);
}

#[test]
fn preview_interval_has_a_floor() {
    let mut opts = VideoBuilderOpts::new(4, 2, 30);
    opts.block_write = true;
    opts.preview_every = 3;
    let b = VideoBuilder::new(InMemoryEncoder::with_size(4, 2), opts).unwrap();
    assert_eq!(b.opts().preview_every, MIN_PREVIEW_INTERVAL);
    let rx = b.preview_receiver().unwrap();
    for i in 0..9 {
        b.append(i, frame(i as u16)).unwrap();
    }
    assert!(rx.try_recv().is_err());
    b.append(9, frame(9)).unwrap();
    let (idx, pic) = rx.try_recv().unwrap();
    assert_eq!(idx, FrameIndex(9));
    assert_eq!(pic.rgb16_at(0, 0), Some([9, 9, 9]));
}

#[test]
fn close_keeps_the_contiguous_prefix_only() {
    let b = builder(5, true, false);
    b.append(0, frame(0)).unwrap();
    b.append(1, frame(1)).unwrap();
    b.append(3, frame(3)).unwrap();
    assert_eq!(b.close().unwrap(), 1);
    let enc = b.into_encoder();
    assert!(enc.is_finished());
    assert_eq!(values(&enc), vec![0, 1]);
}
