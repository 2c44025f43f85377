use super::*;

#[test]
fn interleaving_roundtrips_channel_order() {
    let buf = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 48_000).unwrap();
    assert_eq!(buf.sample_count(), 3);
    assert_eq!(buf.channel(0).unwrap(), &[0.1, 0.2, 0.3]);
    assert_eq!(buf.channel(1).unwrap(), &[-0.1, -0.2, -0.3]);
    assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
}

#[test]
fn ragged_or_empty_formats_are_rejected() {
    assert!(AudioBuffer::from_interleaved(&[0.0; 5], 2, 48_000).is_err());
    assert!(AudioBuffer::silent(0, 10, 48_000).is_err());
    assert!(AudioBuffer::silent(2, 10, 0).is_err());
    assert!(AudioBuffer::from_planar(vec![vec![0.0; 3], vec![0.0; 2]], 48_000).is_err());
}

#[test]
fn slice_clips_to_the_buffer() {
    let buf = AudioBuffer::from_planar(vec![vec![1.0, 2.0, 3.0, 4.0]], 10).unwrap();
    assert_eq!(buf.slice(1, Some(2)).channel(0).unwrap(), &[2.0, 3.0]);
    assert_eq!(buf.slice(3, Some(10)).channel(0).unwrap(), &[4.0]);
    assert_eq!(buf.slice(9, None).sample_count(), 0);
}

#[test]
fn resample_interpolates_linearly() {
    let buf = AudioBuffer::from_planar(vec![vec![0.0, 1.0, 0.0, -1.0]], 2).unwrap();
    let up = buf.resample(4).unwrap();
    assert_eq!(up.sample_rate(), 4);
    assert_eq!(up.sample_count(), 8);
    assert_eq!(up.channel(0).unwrap()[..4], [0.0, 0.5, 1.0, 0.5]);

    let same = buf.resample(2).unwrap();
    assert_eq!(same, buf);
}

#[test]
fn stretch_changes_length_not_rate() {
    let buf = AudioBuffer::from_planar(vec![vec![0.0, 1.0, 2.0, 3.0]], 100).unwrap();
    let slow = buf.stretch(2.0);
    assert_eq!(slow.sample_rate(), 100);
    assert_eq!(slow.sample_count(), 8);
    assert_eq!(slow.channel(0).unwrap()[..3], [0.0, 0.5, 1.0]);
    assert_eq!(buf.stretch(1.0), buf);
}

#[test]
fn f32le_output_is_interleaved_little_endian() {
    let dir = std::env::temp_dir().join(format!("framecut-audio-{}", std::process::id()));
    let path = dir.join("out.f32le");
    let buf = AudioBuffer::from_interleaved(&[0.5, -0.5], 2, 48_000).unwrap();
    buf.write_f32le(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 8);
    assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0.5);
    assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), -0.5);
    let _ = std::fs::remove_dir_all(dir);
}
