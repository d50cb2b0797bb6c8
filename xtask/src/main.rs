use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for quadview")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Everything CI runs: fmt, clippy, tests, shader check, smoke
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Compile and reflect the built-in quad shaders
    Shaders,
    /// Run the headless frame dump as a smoke test
    Smoke {
        /// Frames to run
        #[arg(short = 'n', long, default_value = "4")]
        frames: u32,
    },
}

/// One cargo invocation and the name it is reported under.
struct Step {
    name: &'static str,
    args: Vec<String>,
}

impl Step {
    fn new(name: &'static str, args: &[&str]) -> Self {
        Self {
            name,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

fn steps(command: Commands) -> Vec<Step> {
    match command {
        Commands::Check => [
            Commands::Fmt,
            Commands::Clippy,
            Commands::Test,
            Commands::Shaders,
            Commands::Smoke { frames: 4 },
        ]
        .into_iter()
        .flat_map(steps)
        .collect(),
        Commands::Fmt => vec![Step::new("fmt", &["fmt", "--all", "--", "--check"])],
        Commands::Clippy => vec![Step::new(
            "clippy",
            &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        )],
        Commands::Test => vec![Step::new("test", &["test", "--workspace", "--all-targets"])],
        Commands::Shaders => vec![Step::new("shaders", &["run", "-p", "quadview-cli", "--", "check-shaders"])],
        Commands::Smoke { frames } => {
            let mut step = Step::new(
                "smoke",
                &["run", "-p", "quadview-cli", "--", "frames", "--spin", "0.3", "--billboard", "-n"],
            );
            step.args.push(frames.to_string());
            vec![step]
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    for step in steps(cli.command) {
        println!("==> cargo {}", step.args.join(" "));
        let status = Command::new("cargo").args(&step.args).status()?;
        if !status.success() {
            anyhow::bail!("{} failed", step.name);
        }
    }
    Ok(())
}
