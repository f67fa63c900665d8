//! Codec throughput benchmarks.
//!
//! Full decode of each built-in layout and a small read-modify-write encode,
//! the two operations on the poll and actuation paths.

use criterion::{Criterion, criterion_group, criterion_main};
use fab_common::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

fn codec(id: &str) -> StateCodec {
    let layout = Arc::new(builtin_layout(id).expect("builtin layout"));
    let catalog = Arc::new(AlarmCatalog::builtin(layout.kind()).expect("builtin catalog"));
    StateCodec::new(layout, catalog)
}

fn bench_decode(c: &mut Criterion) {
    for id in builtin_layout_ids() {
        let codec = codec(id);
        let regs: Vec<u16> = (0..codec.layout().required_len())
            .map(|i| (i as u16).wrapping_mul(2654))
            .collect();

        c.bench_function(&format!("decode_{}", id.replace('/', "_")), |b| {
            b.iter(|| {
                let _state = black_box(codec.decode(black_box(&regs)).unwrap());
            });
        });
    }
}

fn bench_encode_delta(c: &mut Criterion) {
    let codec = codec("gas_cabinet/v1");
    let baseline = vec![0xA5A5u16; codec.layout().required_len()];
    let delta = StateDelta::new()
        .with("basic_signals.emg_signal", true)
        .with("valves.av1a", false)
        .with("valves.av1b", false)
        .with("port_a.operation.gas_supply", false);

    c.bench_function("encode_emergency_delta", |b| {
        b.iter(|| {
            let _writes = black_box(codec.encode(black_box(&delta), Some(&baseline)));
        });
    });
}

fn bench_encode_full(c: &mut Criterion) {
    let codec = codec("gas_cabinet/v2");
    let state = codec
        .decode(&vec![0x0041u16; codec.layout().required_len()])
        .unwrap();

    c.bench_function("encode_full_gas_cabinet_v2", |b| {
        b.iter(|| {
            let _image = black_box(codec.encode_full(black_box(&state)).unwrap());
        });
    });
}

criterion_group!(benches, bench_decode, bench_encode_delta, bench_encode_full);
criterion_main!(benches);
