use super::*;
use crate::compute::KERNEL_EPSILON;

fn ramp(n: usize, phase: f32) -> Vec<f32> {
    (0..n)
        .map(|i| ((i as f32 * 0.37 + phase).sin() * 0.5 + 0.5).clamp(0.0, 1.0))
        .collect()
}

fn all_kernels() -> Vec<Kernel> {
    vec![
        Kernel::Identity,
        Kernel::ColorCorrection {
            brightness: 1.2,
            contrast: 0.8,
        },
        Kernel::ColorKey {
            r: 0.5,
            g: 0.5,
            b: 0.5,
            tolerance: 0.2,
            alpha: 0.0,
        },
        Kernel::ReplaceAlpha,
        Kernel::Add,
        Kernel::Minus,
        Kernel::Multiply,
        Kernel::Max,
        Kernel::OverlayColor,
        Kernel::OverlayAlpha,
    ]
}

#[test]
fn parallel_backend_matches_reference() {
    let n = 10_000;
    let ops: Vec<Vec<f32>> = (0..4).map(|k| ramp(n, k as f32)).collect();
    let inputs: Vec<&[f32]> = ops.iter().map(|v| v.as_slice()).collect();
    let cpu = CpuBackend;
    let par = ParallelCpuBackend::default();
    for k in all_kernels() {
        let a = cpu.compute(&k, &inputs).unwrap();
        let b = par.compute(&k, &inputs).unwrap();
        assert_eq!(a.len(), n);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() <= KERNEL_EPSILON, "{}", k.name());
        }
    }
}

#[test]
fn output_length_follows_first_operand() {
    let a = vec![0.1f32; 5];
    let b = vec![0.2f32; 2];
    let out = CpuBackend.compute(&Kernel::Add, &[&a, &b]).unwrap();
    assert_eq!(out.len(), 5);
    assert!((out[4] - 0.1).abs() < 1e-7);
}

#[test]
fn backend_kind_parses_cli_names() {
    assert_eq!(
        "cpu-parallel".parse::<ComputeBackendKind>().unwrap(),
        ComputeBackendKind::CpuParallel
    );
    assert!("opencl".parse::<ComputeBackendKind>().is_err());
}

#[test]
fn auto_always_yields_a_backend() {
    let b = create_backend(ComputeBackendKind::Auto).unwrap();
    let out = b.compute(&Kernel::Identity, &[&[0.5]]).unwrap();
    assert_eq!(out, vec![0.5]);
    b.release();
}

#[cfg(not(feature = "gpu"))]
#[test]
fn gpu_without_feature_is_a_validation_error() {
    let err = create_backend(ComputeBackendKind::Gpu).err().unwrap();
    assert!(matches!(err, FramecutError::Validation(_)));
}
