use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(about = "Launch games through Wine, Proton, CrossOver or the Game Porting Toolkit")]
pub struct Cli {
    /// Launch a title and wait for it to exit.
    #[arg(long, value_name = "TITLE")]
    pub launch: Option<String>,

    /// Run a command inside a title's runtime and prefix (after `--`).
    #[arg(long, value_name = "TITLE")]
    pub run: Option<String>,

    /// Check a title's runtime, prefix and launch command without starting it.
    #[arg(long, value_name = "TITLE")]
    pub validate: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub verbose: bool,

    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    pub fn selected_actions(&self) -> usize {
        [&self.launch, &self.run, &self.validate]
            .iter()
            .filter(|action| action.is_some())
            .count()
    }
}
