use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chip8vm::prelude::*;

/// Bounces a sprite around the screen, forever.
#[rustfmt::skip]
const BOUNCE: &[u8] = &[
    0x60, 0x00, // 200: LD V0, 0
    0x61, 0x00, // 202: LD V1, 0
    0xA0, 0x00, // 204: LD I, 0x000
    0xD0, 0x15, // 206: DRW V0, V1, 5
    0xC2, 0x03, // 208: RND V2, 0x03
    0xD0, 0x15, // 20A: DRW V0, V1, 5
    0x80, 0x24, // 20C: ADD V0, V2
    0x71, 0x01, // 20E: ADD V1, 1
    0xF0, 0x33, // 210: LD B, V0
    0x12, 0x06, // 212: JP 0x206
];

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut vm = Chip8Vm::new(Chip8Conf {
            seed: Some(1),
            ..Chip8Conf::default()
        });
        vm.load_program(BOUNCE).unwrap();

        c.bench_function("bounce cycles", |b| {
            b.iter(|| {
                let step_count = black_box(1000_usize);
                black_box(vm.run_steps(step_count))
            })
        });
    }

    {
        c.bench_function("disassemble", |b| {
            b.iter(|| black_box(Disassembler::new(black_box(BOUNCE)).listing()))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
