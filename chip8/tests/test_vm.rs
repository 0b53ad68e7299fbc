use chip8::{constants::*, prelude::*, FONTSET};

const MAZE: &[u8] = include_bytes!("../programs/maze");

fn seeded() -> Chip8Vm {
    Chip8Vm::new(Chip8Conf { seed: Some(0xC0FFEE) })
}

#[test]
fn test_load_program_into_memory() {
    let mut vm = seeded();
    vm.load_bytecode(MAZE).unwrap();

    for (i, byte) in MAZE.iter().enumerate() {
        assert_eq!(vm.cpu().ram()[MEM_START + i], *byte);
    }

    let start = FONTSET_START as usize;
    assert_eq!(&vm.cpu().ram()[start..start + FONTSET_DATA_LENGTH], &FONTSET);
}

#[test]
fn test_reload_replaces_program() {
    let mut vm = seeded();
    vm.load_bytecode(MAZE).unwrap();
    vm.run_steps(100).unwrap();

    vm.reload(&[0x60, 0x2A]).unwrap();
    assert_eq!(vm.cpu().pc(), MEM_START as Address);
    assert_eq!(vm.cpu().registers(), &[0; REGISTER_COUNT]);
    assert!(vm.display_buffer().iter().all(|px| !px));
    assert_eq!(&vm.cpu().ram()[MEM_START..MEM_START + 4], &[0x60, 0x2A, 0, 0]);

    vm.step().unwrap();
    assert_eq!(vm.cpu().registers()[0], 0x2A);
}

#[test]
fn test_reload_too_large_keeps_state() {
    let mut vm = seeded();
    vm.load_bytecode(MAZE).unwrap();
    vm.run_steps(10).unwrap();
    let pc = vm.cpu().pc();

    let err = vm.reload(&vec![0; PROGRAM_CAPACITY + 1]).unwrap_err();
    assert!(matches!(err, Chip8Error::LargeProgram { .. }));
    assert_eq!(vm.cpu().pc(), pc);
    assert_eq!(vm.cpu().ram()[MEM_START], MAZE[0]);
}

/// Same program, same seed, same number of steps.
#[test]
fn test_deterministic_runs() {
    let mut a = seeded();
    a.load_bytecode(MAZE).unwrap();
    a.run_steps(700).unwrap();

    let mut b = seeded();
    b.load_bytecode(MAZE).unwrap();
    b.run_steps(700).unwrap();

    assert_eq!(a.display_buffer(), b.display_buffer());
    assert_eq!(a.cpu().registers(), b.cpu().registers());
    assert_eq!(a.cpu().index(), b.cpu().index());

    // Reloading on the same instance starts over identically.
    a.reload(MAZE).unwrap();
    a.run_steps(700).unwrap();
    assert_eq!(a.display_buffer(), b.display_buffer());
    assert_eq!(a.cpu().registers(), b.cpu().registers());
}

#[test]
fn test_maze_completes() {
    let mut vm = seeded();
    vm.load_bytecode(MAZE).unwrap();
    vm.run_steps(2000).unwrap();

    // Program ends in a tight loop on itself.
    assert_eq!(vm.cpu().pc(), 0x218);
    assert!(vm.consume_redraw());
    assert!(vm.display_buffer().iter().any(|px| *px));
    assert_eq!(vm.cpu().registers()[1], 32);
}

#[test]
fn test_timer_countdown_without_timer_ops() {
    #[rustfmt::skip]
    let program = [
        0x60, 0x01, // LD v0, 1
        0xF0, 0x15, // LD DT, v0  ; ticked to 0 by the same step
        0x60, 0x03, // LD v0, 3
        0xF0, 0x15, // LD DT, v0
        0x61, 0x00, // LD v1, 0
    ];
    let mut vm = seeded();
    vm.load_bytecode(&program).unwrap();

    vm.run_steps(2).unwrap();
    assert_eq!(vm.cpu().delay_timer(), 0);

    vm.run_steps(3).unwrap();
    assert_eq!(vm.cpu().delay_timer(), 1);
}

#[test]
fn test_errors_surface_to_host() {
    let mut vm = seeded();
    vm.load_bytecode(&[0x60, 0x01, 0xFF, 0xFF]).unwrap();

    let err = vm.run_steps(10).unwrap_err();
    assert_eq!(
        err,
        Chip8Error::Decode {
            opcode: 0xFFFF,
            address: 0x202
        }
    );
    assert_eq!(err.to_string(), "unsupported opcode FFFF at 0x0202");

    // Halted on the faulting instruction.
    assert_eq!(vm.cpu().pc(), 0x202);
    assert_eq!(vm.step(), Err(err));

    // Host may reset and try again.
    vm.reset();
    assert_eq!(vm.step(), Ok(Flow::Ok));
}
