use super::*;

#[test]
fn empty_batch_returns_input() {
    let p = Picture::solid(3, 3, [1, 2, 3], None).unwrap();
    let out = process_batch(&[], p.clone()).unwrap();
    assert!(out.same_pixels(&p));
}

#[test]
fn batch_equals_sequential_application_for_integer_geometry() {
    let p = Picture::solid(8, 6, [100, 200, 300], Some(0.5)).unwrap();
    let steps = vec![
        ProcessStep::new(
            "crop",
            GeometryOp::Crop {
                x: 1,
                y: 1,
                width: 4,
                height: 4,
            },
        ),
        ProcessStep::new(
            "place",
            GeometryOp::Place {
                x: 2,
                y: -1,
                canvas_width: 8,
                canvas_height: 6,
            },
        ),
    ];
    let batched = process_batch(&steps, p.clone()).unwrap();
    let mut seq = p;
    for s in &steps {
        seq = seq.apply(s.op).unwrap();
    }
    assert!(batched.same_pixels(&seq));

    // Upscaling after a crop must not sample pixels the crop removed.
    let row: Vec<u8> = [0u8, 0, 255, 255]
        .iter()
        .flat_map(|&v| [v, v, v, 255])
        .collect();
    let p = Picture::from_rgba8(4, 1, &row).unwrap();
    let steps = vec![
        ProcessStep::new(
            "crop",
            GeometryOp::Crop {
                x: 0,
                y: 0,
                width: 2,
                height: 1,
            },
        ),
        ProcessStep::new(
            "resize",
            GeometryOp::Resize {
                width: 4,
                height: 1,
                preserve_aspect: false,
            },
        ),
    ];
    let batched = process_batch(&steps, p.clone()).unwrap();
    let mut seq = p;
    for s in &steps {
        seq = seq.apply(s.op).unwrap();
    }
    assert!(batched.same_pixels(&seq));
    for x in 0..4 {
        assert_eq!(batched.rgb16_at(x, 0), Some([0, 0, 0]));
    }
}

#[test]
fn invalid_step_fails_the_batch() {
    let p = Picture::solid(4, 4, [0; 3], None).unwrap();
    let steps = vec![ProcessStep::new(
        "crop",
        GeometryOp::Crop {
            x: 10,
            y: 0,
            width: 1,
            height: 1,
        },
    )];
    assert!(process_batch(&steps, p).is_err());
}
