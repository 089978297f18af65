use argh::FromArgs;
use jobsh::Interpreter;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

#[derive(FromArgs)]
/// An interactive command interpreter with pipelines, redirections,
/// background jobs and one-level if/then/else/fi blocks.
struct Cli {
    /// run a single command line (or `;`-joined lines) and exit
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// enable debug logging of spawns and reaps
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli: Cli = argh::from_env();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let mut interpreter = Interpreter::new();
    match cli.command {
        Some(command) => interpreter.run_input(&command),
        None => interpreter.repl()?,
    }
    Ok(())
}
