//! Headless host driving the virtual machine.
use std::io::Write;

use chip8::prelude::*;
use log::{debug, error, info, trace, warn};

use crate::{
    clock::Clock,
    config::{Action, HostConf},
    error::AppError,
};

/// Host lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// No program is running. Either nothing was loaded yet, the
    /// step limit was reached, the program faulted, or exit was requested.
    Idle,
    /// Stepping the loaded program.
    Running,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of host loop iterations.
    pub ticks: usize,
    /// Number of frames the VM asked to redraw.
    pub frames: usize,
}

pub struct Host {
    vm: Chip8Vm,
    conf: HostConf,
    clock: Clock,
    rom: Vec<u8>,
    state: HostState,
    /// Index of the next scripted input event.
    input_cursor: usize,
    buzzer_state: bool,
    summary: RunSummary,
}

impl Host {
    pub fn new(conf: HostConf) -> Self {
        Self {
            vm: Chip8Vm::new(conf.chip8_conf()),
            clock: Clock::new(conf.frequency()),
            conf,
            rom: Vec::new(),
            state: HostState::Idle,
            input_cursor: 0,
            buzzer_state: false,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn vm(&self) -> &Chip8Vm {
        &self.vm
    }

    /// Load a ROM image and start running it.
    pub fn load_rom(&mut self, rom: Vec<u8>) -> Result<(), AppError> {
        info!("load rom: {} bytes", rom.len());

        self.vm.reload(&rom)?;
        self.rom = rom;
        self.transition(HostState::Running);

        Ok(())
    }

    /// Reset the VM and load the current ROM again.
    pub fn reload(&mut self) -> Result<(), AppError> {
        info!("reload rom");

        self.vm.reload(&self.rom)?;
        self.buzzer_state = false;
        self.clock.reset();
        self.transition(HostState::Running);

        Ok(())
    }

    fn transition(&mut self, state: HostState) {
        if self.state != state {
            debug!("host state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Run until the host becomes idle.
    ///
    /// Frames are written to `out` when the VM requests a redraw
    /// and `show_frames` is set, and once more when the run ends,
    /// including when the program faults.
    pub fn run(&mut self, out: &mut impl Write) -> Result<RunSummary, AppError> {
        self.clock.reset();

        let result = loop {
            match self.tick(out) {
                Ok(true) => {}
                Ok(false) => break Ok(self.summary),
                Err(err) => break Err(err),
            }
        };

        write!(out, "{}", self.vm.dump_display()?)?;
        out.flush()?;

        result
    }

    /// One iteration of the host loop.
    ///
    /// Returns `false` once the host is idle.
    pub fn tick(&mut self, out: &mut impl Write) -> Result<bool, AppError> {
        if self.state == HostState::Idle {
            return Ok(false);
        }

        if self.summary.ticks >= self.conf.max_steps() {
            warn!("step limit of {} reached", self.conf.max_steps());
            self.transition(HostState::Idle);
            return Ok(false);
        }

        self.apply_input()?;
        if self.state == HostState::Idle {
            return Ok(false);
        }

        self.clock.wait();

        match self.vm.step() {
            Ok(Flow::KeyWait) => trace!("waiting for key press"),
            Ok(_) => {}
            Err(err) => {
                error!("vm halted: {err}");
                self.transition(HostState::Idle);
                return Err(err.into());
            }
        }

        let sound = self.vm.is_sound_active();
        if sound != self.buzzer_state {
            self.buzzer_state = sound;
            info!("buzzer {}", if sound { "on" } else { "off" });
        }

        if self.vm.consume_redraw() {
            self.summary.frames += 1;
            if self.conf.show_frames {
                writeln!(out, "{}", self.vm.dump_display()?)?;
            }
        }

        self.summary.ticks += 1;

        Ok(true)
    }

    /// Merge scripted input events for the current tick into the VM.
    fn apply_input(&mut self) -> Result<(), AppError> {
        while let Some(def) = self.conf.input.get(self.input_cursor) {
            if def.step > self.summary.ticks {
                break;
            }
            let def = def.clone();
            self.input_cursor += 1;

            if let Some(key) = def.chip8 {
                debug!("key {key} pressed={}", def.pressed);
                self.vm.set_key(key, def.pressed);
            }

            match def.action {
                Some(Action::Reload) => self.reload()?,
                Some(Action::Exit) => {
                    info!("exit");
                    self.transition(HostState::Idle);
                }
                None => {}
            }

            let keys = self.vm.dump_keys()?;
            if !keys.is_empty() {
                trace!("{keys}");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use chip8::constants::MEM_START;

    use super::*;
    use crate::error::ErrorKind;

    fn host(yaml: &str) -> Host {
        Host::new(HostConf::from_yaml(yaml).unwrap())
    }

    #[test]
    fn test_idle_until_loaded() {
        let mut host = host("{}");
        let mut out = Vec::new();

        assert_eq!(host.state(), HostState::Idle);
        assert!(!host.tick(&mut out).unwrap());
    }

    #[test]
    fn test_step_limit() {
        let mut host = host("max_steps: 5");
        // JP 0x200
        host.load_rom(vec![0x12, 0x00]).unwrap();
        assert_eq!(host.state(), HostState::Running);

        let mut out = Vec::new();
        let summary = host.run(&mut out).unwrap();

        assert_eq!(summary.ticks, 5);
        assert_eq!(host.state(), HostState::Idle);
        // Final frame is always written.
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 32);
    }

    #[test]
    fn test_scripted_key_and_exit() {
        let mut host = host(
            r#"
max_steps: 100
input:
  - step: 3
    chip8: 7
  - step: 6
    action: exit
"#,
        );
        #[rustfmt::skip]
        let rom = vec![
            0xF1, 0x0A, // LD v1, K
            0x12, 0x02, // JP 0x202
        ];
        host.load_rom(rom).unwrap();

        let mut out = Vec::new();
        let summary = host.run(&mut out).unwrap();

        assert_eq!(summary.ticks, 6);
        assert_eq!(host.vm().cpu().registers()[1], 7);
        assert_eq!(host.vm().cpu().pc(), 0x202);
    }

    #[test]
    fn test_reload_action() {
        let mut host = host(
            r#"
max_steps: 4
input:
  - step: 3
    action: reload
"#,
        );
        #[rustfmt::skip]
        let rom = vec![
            0x70, 0x01, // ADD v0, 1
            0x12, 0x00, // JP 0x200
        ];
        host.load_rom(rom).unwrap();

        let mut out = Vec::new();
        host.run(&mut out).unwrap();

        // Three steps, reload, then one more step from a clean machine.
        assert_eq!(host.vm().cpu().registers()[0], 1);
        assert_eq!(host.vm().cpu().pc(), MEM_START as u16 + 2);
    }

    #[test]
    fn test_halt_on_error() {
        let mut host = host("{}");
        host.load_rom(vec![0x00, 0xEE]).unwrap();

        let mut out = Vec::new();
        let err = host.run(&mut out).unwrap_err();

        assert!(matches!(
            err.kind,
            ErrorKind::Chip8(Chip8Error::StackUnderflow { .. })
        ));
        assert_eq!(host.state(), HostState::Idle);
    }

    #[test]
    fn test_frame_written_on_fault() {
        let mut host = host("{}");
        #[rustfmt::skip]
        let rom = vec![
            0x00, 0xE0, // CLS
            0x00, 0xEE, // RET
        ];
        host.load_rom(rom).unwrap();

        let mut out = Vec::new();
        let err = host.run(&mut out).unwrap_err();

        assert!(matches!(
            err.kind,
            ErrorKind::Chip8(Chip8Error::StackUnderflow { address: 0x202 })
        ));
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 32);
    }

    #[test]
    fn test_zero_step_limit() {
        let mut host = host("max_steps: 0");
        // ADD v0, 1
        host.load_rom(vec![0x70, 0x01]).unwrap();

        let mut out = Vec::new();
        let summary = host.run(&mut out).unwrap();

        assert_eq!(summary.ticks, 0);
        assert_eq!(host.state(), HostState::Idle);
        assert_eq!(host.vm().cpu().registers()[0], 0);
        assert_eq!(host.vm().cpu().pc(), MEM_START as u16);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 32);
    }

    #[test]
    fn test_frames_counted() {
        let mut host = host("max_steps: 3\nshow_frames: true");
        #[rustfmt::skip]
        let rom = vec![
            0x00, 0xE0, // CLS
            0x00, 0xE0, // CLS
            0x12, 0x04, // JP 0x204
        ];
        host.load_rom(rom).unwrap();

        let mut out = Vec::new();
        let summary = host.run(&mut out).unwrap();

        assert_eq!(summary.frames, 2);
        // Two shown frames with a blank separator line, and the final frame.
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 33 * 2 + 32);
    }
}
