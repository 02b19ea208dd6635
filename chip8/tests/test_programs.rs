use chip8vm::{constants::*, prelude::*};
use simple_logger::SimpleLogger;

fn init_logger() {
    let _ = SimpleLogger::new().env().init();
}

fn load(program: &[u8]) -> Chip8Vm {
    let mut vm = Chip8Vm::new(Chip8Conf {
        seed: Some(0xC8),
        ..Chip8Conf::default()
    });
    vm.load_program(program).unwrap();
    vm
}

/// Prints the decimal value of a register using the built-in font.
#[rustfmt::skip]
const PRINT_DECIMAL: &[u8] = &[
    0x60, 0x7B, // 200: LD V0, 123
    0xA3, 0x00, // 202: LD I, 0x300
    0xF0, 0x33, // 204: LD B, V0
    0xF2, 0x65, // 206: LD V2, [I]
    0x63, 0x00, // 208: LD V3, 0       ; x
    0x64, 0x00, // 20A: LD V4, 0       ; y
    0x22, 0x1A, // 20C: CALL 0x21A
    0x80, 0x10, // 20E: LD V0, V1
    0x22, 0x1A, // 210: CALL 0x21A
    0x80, 0x20, // 212: LD V0, V2
    0x22, 0x1A, // 214: CALL 0x21A
    0x12, 0x18, // 216: JP 0x218
    0x12, 0x18, // 218: JP 0x218      ; halt
    0xF0, 0x29, // 21A: LD F, V0
    0xD3, 0x45, // 21C: DRW V3, V4, 5
    0x73, 0x05, // 21E: ADD V3, 5
    0x00, 0xEE, // 220: RET
];

#[test]
fn test_print_decimal() {
    init_logger();

    let mut vm = load(PRINT_DECIMAL);
    let mut draws = 0;

    for _ in 0..32 {
        if vm.step().unwrap() == Flow::Draw {
            draws += 1;
        }
    }

    assert_eq!(draws, 3);
    assert_eq!(&vm.ram()[0x300..0x303], &[1, 2, 3]);
    assert_eq!(vm.pc(), 0x218);
    assert_eq!(vm.sp(), 0);
    assert_eq!(vm.registers()[3], 15);
    // Glyphs are drawn side by side, without overlap.
    assert_eq!(vm.registers()[0xF], 0);

    let dump = vm.dump_display().unwrap();
    let rows: Vec<&str> = dump.lines().collect();
    assert_eq!(&rows[0][..15], "..#..####.####.");
    assert_eq!(&rows[4][..15], ".###.####.####.");
    assert!(rows[5].chars().all(|c| c == '.'));
}

#[test]
#[rustfmt::skip]
fn test_countdown_loop() {
    init_logger();

    let mut vm = load(&[
        0x60, 0x0A, // 200: LD V0, 10
        0x61, 0x00, // 202: LD V1, 0
        0x71, 0x03, // 204: ADD V1, 3
        0x70, 0xFF, // 206: ADD V0, -1
        0x30, 0x00, // 208: SE V0, 0
        0x12, 0x04, // 20A: JP 0x204
        0x12, 0x0C, // 20C: JP 0x20C
    ]);

    vm.run_steps(2 + 10 * 4).unwrap();
    assert_eq!(vm.registers()[0], 0);
    assert_eq!(vm.registers()[1], 30);
    assert_eq!(vm.pc(), 0x20C);
}

#[test]
#[rustfmt::skip]
fn test_nested_calls() {
    init_logger();

    let mut vm = load(&[
        0x22, 0x06, // 200: CALL 0x206
        0x12, 0x02, // 202: JP 0x202
        0x00, 0x00, // 204: NOP
        0x70, 0x01, // 206: ADD V0, 1
        0x30, 0x10, // 208: SE V0, 16
        0x22, 0x06, // 20A: CALL 0x206
        0x00, 0xEE, // 20C: RET
    ]);

    // Recursing sixteen levels deep uses every stack slot.
    let mut max_depth = 0;
    for _ in 0..100 {
        vm.step().unwrap();
        max_depth = max_depth.max(vm.sp());
    }

    assert_eq!(max_depth, STACK_SIZE);
    assert_eq!(vm.registers()[0], 16);
    assert_eq!(vm.sp(), 0);
    assert_eq!(vm.pc(), 0x202);
}

#[test]
#[rustfmt::skip]
fn test_runaway_recursion() {
    init_logger();

    let mut vm = load(&[
        0x22, 0x00, // 200: CALL 0x200
    ]);

    let err = vm.run_steps(100).unwrap_err();
    assert!(matches!(err, Chip8Error::StackOverflow { pc: 0x200 }));
    assert_eq!(vm.sp(), STACK_SIZE);
    assert_eq!(err.to_string(), "call stack overflow at 0x200");
}

#[test]
fn test_runs_off_end_of_memory() {
    init_logger();

    // JP 0xFFE, which holds a NOP
    let mut vm = load(&[0x1F, 0xFE]);

    assert_eq!(vm.step().unwrap(), Flow::Jump);
    assert_eq!(vm.step().unwrap(), Flow::Ok);
    assert!(matches!(
        vm.step(),
        Err(Chip8Error::PcOutOfBounds { pc: MEM_SIZE })
    ));
}

#[test]
#[rustfmt::skip]
fn test_reload_clears_previous_program() {
    init_logger();

    let mut vm = load(&[
        0x6A, 0x42, // LD VA, 0x42
        0xA9, 0x99, // LD I, 0x999
        0x00, 0x00,
        0x00, 0x00,
    ]);
    vm.run_steps(2).unwrap();

    vm.load_program(&[0x00, 0xE0]).unwrap();
    assert_eq!(vm.pc(), MEM_START);
    assert_eq!(vm.registers()[0xA], 0);
    assert_eq!(vm.address(), 0);
    assert_eq!(&vm.ram()[MEM_START..MEM_START + 4], &[0x00, 0xE0, 0x00, 0x00]);
}

#[test]
fn test_random_is_reproducible() {
    init_logger();

    // RND V0, 0xFF ; LD V1, V0 ; RND V0, 0xFF
    let program = [0xC0, 0xFF, 0x81, 0x00, 0xC0, 0xFF];
    let mut a = load(&program);
    let mut b = load(&program);

    a.run_steps(3).unwrap();
    b.run_steps(3).unwrap();
    assert_eq!(a.registers(), b.registers());

    // Reinitializing restarts the sequence.
    let first = a.registers()[1];
    a.load_program(&program).unwrap();
    a.run_steps(1).unwrap();
    assert_eq!(a.registers()[0], first);
}

#[test]
fn test_dump_ram() {
    init_logger();

    let vm = load(PRINT_DECIMAL);
    let dump = vm.dump_ram(6).unwrap();
    assert_eq!(
        dump,
        "0200: 607B  LD V0, 0x7B\n0202: A300  LD I, 0x300\n0204: F033  LD B, V0\n"
    );
}

#[test]
fn test_disassemble_program() {
    let listing = Disassembler::new(PRINT_DECIMAL).listing().unwrap();
    let lines: Vec<&str> = listing.lines().collect();

    assert_eq!(lines.len(), PRINT_DECIMAL.len() / 2);
    assert_eq!(lines[6], "020C: 221A  CALL 0x21A");
    assert_eq!(lines[13], "021A: F029  LD F, V0");
    assert_eq!(lines[16], "0220: 00EE  RET");
}

#[cfg(feature = "serde")]
#[test]
fn test_config_quirks() {
    init_logger();

    let conf = Chip8Conf::from_yaml_str("quirks:\n  shift_reads_vy: true\n").unwrap();
    let mut vm = Chip8Vm::new(conf);
    // LD V1, 0x80 ; SHL V0, V1
    vm.load_program(&[0x61, 0x80, 0x80, 0x1E]).unwrap();
    vm.run_steps(2).unwrap();

    assert_eq!(vm.registers()[0], 0);
    assert_eq!(vm.registers()[0xF], 1);
    assert_eq!(vm.registers()[1], 0x80);
}
