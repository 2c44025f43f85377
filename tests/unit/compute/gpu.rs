use super::*;
use crate::compute::{CpuBackend, KERNEL_EPSILON};

fn backend() -> Option<WgpuBackend> {
    match WgpuBackend::new() {
        Ok(b) => Some(b),
        Err(e) => {
            eprintln!("skipping gpu test: {e}");
            None
        }
    }
}

#[test]
fn shader_source_bakes_parameters() {
    let src = shader_source(&Kernel::ColorKey {
        r: 0.25,
        g: 0.5,
        b: 0.75,
        tolerance: 0.125,
        alpha: 0.0,
    });
    assert!(src.contains("abs(a - 0.25) <= 0.125"));
    assert!(src.contains("@workgroup_size(64)"));
}

#[test]
fn gpu_matches_cpu_within_epsilon() {
    let Some(gpu) = backend() else {
        return;
    };
    let n = 70_001;
    let a: Vec<f32> = (0..n).map(|i| (i % 997) as f32 / 996.0).collect();
    let b: Vec<f32> = (0..n).map(|i| (i % 251) as f32 / 250.0).collect();
    let c: Vec<f32> = (0..n).map(|i| (i % 13) as f32 / 12.0).collect();
    let d: Vec<f32> = (0..n).map(|i| (i % 7) as f32 / 6.0).collect();
    let inputs: [&[f32]; 4] = [&a, &b, &c, &d];
    for k in [
        Kernel::OverlayColor,
        Kernel::OverlayAlpha,
        Kernel::Add,
        Kernel::ColorCorrection {
            brightness: 0.9,
            contrast: 1.1,
        },
    ] {
        let want = CpuBackend.compute(&k, &inputs).unwrap();
        let got = gpu.compute(&k, &inputs).unwrap();
        assert_eq!(want.len(), got.len());
        for (x, y) in want.iter().zip(&got) {
            assert!((x - y).abs() <= KERNEL_EPSILON, "{}: {x} vs {y}", k.name());
        }
    }
    gpu.release();
    assert!(gpu.pipelines.lock().is_empty());
}
