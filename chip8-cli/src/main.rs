//! Entrypoint for CLI
mod clock;
mod config;
mod error;
mod host;

use std::{env, error::Error, fs, io};

use chip8::IMPL_VERSION;
use log::{error, info};

use self::{config::HostConf, error::AppError, host::Host};

static USAGE: &str = r#"
usage: chip8 run ROM [CONFIG]

commands:
    run     Run the target ROM file headless, printing the display when done

arguments:
    ROM     Raw program image, loaded at 0x200
    CONFIG  Optional YAML host configuration

examples:
    chip8 run maze.rom
    chip8 run breakout.rom breakout.yaml
"#;

fn run_rom(filepath: &str, config: Option<&str>) -> Result<(), AppError> {
    let conf = match config {
        Some(path) => HostConf::from_file(path)?,
        None => HostConf::default(),
    };

    info!("running {filepath}");
    let rom = fs::read(filepath)?;

    let mut host = Host::new(conf);
    host.load_rom(rom)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = host.run(&mut out)?;

    info!(
        "done after {} steps, {} frames drawn, host {:?} at 0x{:04X}",
        summary.ticks,
        summary.frames,
        host.state(),
        host.vm().cpu().pc()
    );

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    match parse_args() {
        Some(Cmd::Run { filepath, config }) => {
            if let Err(err) = run_rom(&filepath, config.as_deref()) {
                error!("{err}");
                std::process::exit(1);
            }
        }
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next() {
        Some(cmd) => {
            // don't format me T.T
            match cmd.as_str() {
                "run" => Some(Cmd::Run {
                    filepath: args.next()?,
                    config: args.next(),
                }),
                _ => None,
            }
        }
        None => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file
    Run {
        filepath: String,
        config: Option<String>,
    },
}
