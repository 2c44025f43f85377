use super::*;
use crate::picture::{BitDepth, Picture};

fn checker(w: u32, h: u32) -> Picture {
    let mut data = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = ((x * 37 + y * 91) % 256) as u8;
            data.extend_from_slice(&[v, 255 - v, v / 2, 255]);
        }
    }
    Picture::from_rgba8(w, h, &data).unwrap()
}

#[test]
fn single_op_plan_matches_direct_operation() {
    let p = checker(16, 12);
    let ops = [
        GeometryOp::Crop {
            x: 3,
            y: 2,
            width: 8,
            height: 7,
        },
        GeometryOp::Resize {
            width: 9,
            height: 20,
            preserve_aspect: false,
        },
        GeometryOp::Place {
            x: -4,
            y: 5,
            canvas_width: 20,
            canvas_height: 10,
        },
    ];
    for op in ops {
        let direct = p.clone().apply(op).unwrap();
        let mut plan = GeometryPlan::new(16, 12);
        plan.push(op).unwrap();
        let planned = plan.execute(p.clone()).unwrap();
        assert!(direct.same_pixels(&planned), "{op:?}");
    }
}

#[test]
fn crop_then_place_composes_into_one_exact_pass() {
    let p = checker(10, 10);
    let stepwise = p
        .clone()
        .crop(2, 2, 4, 4)
        .unwrap()
        .place(3, 1, 10, 10)
        .unwrap();
    let mut plan = GeometryPlan::new(10, 10);
    plan.push(GeometryOp::Crop {
        x: 2,
        y: 2,
        width: 4,
        height: 4,
    })
    .unwrap();
    plan.push(GeometryOp::Place {
        x: 3,
        y: 1,
        canvas_width: 10,
        canvas_height: 10,
    })
    .unwrap();
    assert_eq!(plan.output_size(), (10, 10));
    let batched = plan.execute(p).unwrap();
    assert!(stepwise.same_pixels(&batched));
}

#[test]
fn plan_tracks_output_size_through_resize() {
    let mut plan = GeometryPlan::new(100, 50);
    plan.push(GeometryOp::Resize {
        width: 40,
        height: 40,
        preserve_aspect: true,
    })
    .unwrap();
    assert_eq!(plan.output_size(), (40, 20));
    plan.push(GeometryOp::Crop {
        x: 0,
        y: 0,
        width: 10,
        height: 10,
    })
    .unwrap();
    assert_eq!(plan.output_size(), (10, 10));
    assert_eq!(plan.op_count(), 2);
}

#[test]
fn execute_rejects_wrong_source_size() {
    let plan = GeometryPlan::new(4, 4);
    let p = Picture::transparent(3, 4, BitDepth::Eight).unwrap();
    assert!(plan.execute(p).is_err());
}

#[test]
fn resize_target_keeps_at_least_one_pixel() {
    assert_eq!(resize_target(1000, 1, 10, 10, true).unwrap(), (10, 1));
    assert_eq!(resize_target(4, 4, 8, 2, false).unwrap(), (8, 2));
}
