use colored::Colorize;
use log::{error, info};
use simulation::Settings;
use thiserror::Error;
use tokio::runtime::{self, Runtime};

mod logging;
mod simulation;

/// A local voice room with simulated participants
struct Voiceroom {
    settings: Settings,
    runtime: Runtime,
}

#[derive(Debug, Error)]
pub enum VoiceroomError {
    #[error("{name} is set to {value:?}, which is not valid")]
    InvalidVariable { name: &'static str, value: String },

    #[error("Could not build the async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("The room failed: {0:#}")]
    Simulation(#[from] anyhow::Error),
}

impl Voiceroom {
    fn new() -> Result<Self, VoiceroomError> {
        let settings = Settings::from_env()?;

        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("voiceroom-async")
            .build()?;

        Ok(Self { settings, runtime })
    }

    fn run(self) -> Result<(), VoiceroomError> {
        let Self { settings, runtime } = self;
        runtime.block_on(simulation::run(settings))?;

        Ok(())
    }
}

impl VoiceroomError {
    fn hint(&self) -> String {
        match self {
            VoiceroomError::InvalidVariable { name, .. } => {
                format!("Unset {name} or give it a number.")
            }
            VoiceroomError::Runtime(_) => {
                "The operating system refused to start worker threads.".to_string()
            }
            VoiceroomError::Simulation(_) => {
                "Run with VOICEROOM_VERBOSE=1 to see every session event.".to_string()
            }
        }
    }
}

fn main() {
    let verbose = std::env::var("VOICEROOM_VERBOSE").is_ok();

    if let Err(error) = logging::init_logger(verbose) {
        eprintln!("Could not set up logging: {error}");
        return;
    }

    let result = Voiceroom::new().and_then(|voiceroom| {
        info!("Initialized successfully.");
        voiceroom.run()
    });

    if let Err(error) = result {
        error!(
            "{} Read the error below to troubleshoot the issue.",
            "Voiceroom failed!".bold().red()
        );
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).bright_black().italic()
        );
    }
}
