//! Host configuration, loaded from YAML.
use chip8::{Chip8Conf, KeyCode};
use serde::Deserialize;

use crate::{clock::Hz, error::AppError};

/// Step limit when the configuration does not set one.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostConf {
    /// VM steps per second. Absent or zero runs as fast as possible.
    pub clock_frequency: Option<u64>,
    /// Stop running after this many host ticks.
    pub max_steps: Option<usize>,
    /// Seed for the VM random number generator.
    pub seed: Option<u64>,
    /// Print every redrawn frame, instead of only the last one.
    pub show_frames: bool,
    /// Scripted input, replayed in tick order.
    pub input: Vec<InputDef>,
}

/// Input event fired at a host tick.
///
/// Either presses or releases a Chip8 key, or triggers
/// a named host action.
#[derive(Debug, Clone, Deserialize)]
pub struct InputDef {
    pub step: usize,
    pub chip8: Option<KeyCode>,
    #[serde(default = "default_pressed")]
    pub pressed: bool,
    pub action: Option<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Reset the VM and load the ROM again.
    Reload,
    /// Stop running.
    Exit,
}

fn default_pressed() -> bool {
    true
}

impl HostConf {
    pub fn from_file(filepath: &str) -> Result<Self, AppError> {
        let source = std::fs::read_to_string(filepath)?;
        let conf = Self::from_yaml(&source)?;
        log::debug!("loaded host configuration: {:#?}", conf);
        Ok(conf)
    }

    pub fn from_yaml(source: &str) -> Result<Self, AppError> {
        let mut conf: HostConf = serde_yaml::from_str(source)?;
        conf.sort_input();
        Ok(conf)
    }

    /// Events keep their file order within the same tick.
    fn sort_input(&mut self) {
        self.input.sort_by_key(|def| def.step);
    }

    pub fn chip8_conf(&self) -> Chip8Conf {
        Chip8Conf { seed: self.seed }
    }

    pub fn frequency(&self) -> Hz {
        Hz(self.clock_frequency.unwrap_or_default())
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps.unwrap_or(DEFAULT_MAX_STEPS)
    }
}
