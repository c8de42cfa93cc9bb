use std::hint::black_box;
use std::time::Duration;

use audio_receiver_core::audio::jitter_buffer::JitterBuffer;
use audio_receiver_core::protocol::{AudioFrame, PacketCodec};
use criterion::{criterion_group, criterion_main, Criterion};

fn sample_wire_packet() -> Vec<u8> {
    let frame = AudioFrame {
        sample_rate: 48_000,
        channels: 2,
        seq: 42,
        send_time_us: 123_456_789,
        samples_per_channel: 240,
        payload: vec![0i16; 480],
    };
    PacketCodec::encode(&frame).to_vec()
}

fn bench_parse(c: &mut Criterion) {
    let wire = sample_wire_packet();
    c.bench_function("PacketCodec::parse", |b| {
        b.iter(|| {
            let frame = PacketCodec::parse(black_box(&wire)).unwrap();
            black_box(frame);
        })
    });
}

fn frame(seq: u32) -> AudioFrame {
    AudioFrame {
        sample_rate: 48_000,
        channels: 2,
        seq,
        send_time_us: 0,
        samples_per_channel: 240,
        payload: vec![0i16; 480],
    }
}

fn bench_push(c: &mut Criterion) {
    c.bench_function("JitterBuffer::push", |b| {
        let jb = JitterBuffer::new(8, 32);
        let mut seq = 0u32;
        b.iter(|| {
            jb.push(black_box(frame(seq)));
            seq = seq.wrapping_add(1);
        })
    });
}

fn bench_push_pop_roundtrip(c: &mut Criterion) {
    c.bench_function("JitterBuffer::push_pop_roundtrip", |b| {
        let jb = JitterBuffer::new(4, 16);
        for seq in 0..4 {
            jb.push(frame(seq));
        }
        let mut seq = 4u32;
        b.iter(|| {
            jb.push(frame(seq));
            seq = seq.wrapping_add(1);
            black_box(jb.pop(Duration::from_millis(1)));
        })
    });
}

criterion_group!(benches, bench_parse, bench_push, bench_push_pop_roundtrip);
criterion_main!(benches);
