use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use castreel::foundation::paths;
use castreel::pipeline::{Pipeline, RunOutcome, RunPlan, SetupPlan};
use castreel::session::{DockerCli, Terminal, is_docker_on_path};
use castreel::Config;

/// The binary installs no signal handler, so it never cancels a session itself.
const INTERRUPT_NOTE: &str = "Ctrl-C ends castreel and the attached docker client at once; \
the session is not cancelled gracefully and its container is left behind \
(remove it with `docker rm`). Graceful cancellation is available to library callers \
through `Pipeline::with_cancel`.";

#[derive(Parser, Debug)]
#[command(
    name = "castreel",
    version,
    about = "Turn recorded terminal sessions into videos",
    after_help = INTERRUPT_NOTE
)]
struct Cli {
    /// Configuration file (defaults to ~/.castreel.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output; repeat for trace.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a project from a script.
    Setup(SetupArgs),
    /// Record a project, then render and assemble it.
    Record(RecordArgs),
    /// Render the recordings of a project and assemble the video.
    Render(RenderArgs),
    /// Pull the container images.
    Update(UpdateArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Parser, Debug)]
struct SetupArgs {
    /// Script describing the video.
    script: String,

    /// Directory the project is created in.
    #[arg(long, default_value = ".")]
    into: String,

    /// Project directory name.
    #[arg(long)]
    name: String,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Project directory.
    project: String,

    /// Only record; do not render or assemble.
    #[arg(long)]
    no_render: bool,

    /// Render the scenes but do not assemble the final video.
    #[arg(long)]
    gifs_only: bool,

    /// Narration language code.
    #[arg(short = 'l', long)]
    language: Option<String>,

    /// Narration voice name.
    #[arg(short = 'n', long)]
    language_name: Option<String>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Project directory.
    project: String,

    /// Do not assemble the final video.
    #[arg(long)]
    gifs_only: bool,
}

#[derive(Parser, Debug)]
struct UpdateArgs {
    /// Images to pull (defaults to the configured recorder and renderer).
    images: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = Config::load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Setup(args) => cmd_setup(cfg, args),
        Command::Record(args) => cmd_record(cfg, args),
        Command::Render(args) => cmd_render(cfg, args),
        Command::Update(args) => cmd_update(&cfg, args),
        Command::Config => cmd_config(&cfg),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::WARN,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_setup(cfg: Config, args: SetupArgs) -> anyhow::Result<()> {
    let script = existing_path(&args.script, "script")?;
    if !script.is_file() {
        anyhow::bail!("script '{}' is not a file", script.display());
    }
    let into = existing_dir(&args.into, "output directory")?;

    let plan = RunPlan {
        setup: Some(SetupPlan {
            script,
            into,
            name: args.name,
        }),
        project: PathBuf::new(),
        record: false,
        render: false,
        gifs_only: true,
    };
    let outcome = run(cfg, &plan)?;
    println!("project created at {}", outcome.project.display());
    Ok(())
}

fn cmd_record(mut cfg: Config, args: RecordArgs) -> anyhow::Result<()> {
    let project = existing_dir(&args.project, "project")?;
    if let Some(language) = args.language {
        cfg.language = language;
    }
    if let Some(name) = args.language_name {
        cfg.language_name = name;
    }

    let plan = RunPlan {
        render: !args.no_render,
        gifs_only: args.gifs_only,
        ..RunPlan::full(project)
    };
    let outcome = run(cfg, &plan)?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_render(cfg: Config, args: RenderArgs) -> anyhow::Result<()> {
    let project = existing_dir(&args.project, "project")?;
    let plan = RunPlan {
        record: false,
        gifs_only: args.gifs_only,
        ..RunPlan::full(project)
    };
    let outcome = run(cfg, &plan)?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_update(cfg: &Config, args: UpdateArgs) -> anyhow::Result<()> {
    require_docker()?;
    let images: Vec<String> = if args.images.is_empty() {
        cfg.images.all().iter().map(|s| s.to_string()).collect()
    } else {
        args.images
    };

    let docker = DockerCli::new();
    let mut failed = 0usize;
    for image in &images {
        if let Err(e) = docker.pull_image(image) {
            tracing::error!(image = %image, error = %e, "pull failed");
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} image(s) failed to update", images.len());
    }
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    println!("{}", cfg.to_json_pretty()?);
    println!(
        "narration credentials: {}",
        describe_file(cfg.tts_credentials.as_deref())
    );
    println!(
        "passwords file:        {}",
        describe_file(cfg.passwords_env.as_deref())
    );
    Ok(())
}

fn run(cfg: Config, plan: &RunPlan) -> anyhow::Result<RunOutcome> {
    require_docker()?;
    let docker = DockerCli::new();
    let terminal = Terminal::stdio()?;
    let pipeline = Pipeline::new(&docker, cfg, terminal);
    Ok(pipeline.run(plan)?)
}

fn print_outcome(outcome: &RunOutcome) {
    if let Some(report) = &outcome.render {
        println!("{report}");
        for skipped in &report.skipped {
            println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    if let Some(video) = &outcome.video {
        println!("video written to {}", video.display());
    }
}

fn describe_file(path: Option<&std::path::Path>) -> String {
    match path {
        None => "not set".to_string(),
        Some(p) if p.is_file() => p.display().to_string(),
        Some(p) => format!("{} (missing)", p.display()),
    }
}

fn require_docker() -> anyhow::Result<()> {
    if !is_docker_on_path() {
        anyhow::bail!("docker is required, but was not found on PATH");
    }
    Ok(())
}

fn existing_path(input: &str, what: &str) -> anyhow::Result<PathBuf> {
    let path = paths::resolve(input).with_context(|| format!("resolve {what} '{input}'"))?;
    if !paths::exists(&path) {
        anyhow::bail!("{what} '{}' does not exist", path.display());
    }
    Ok(path)
}

fn existing_dir(input: &str, what: &str) -> anyhow::Result<PathBuf> {
    let path = existing_path(input, what)?;
    if !paths::is_directory(&path)? {
        anyhow::bail!("{what} '{}' is not a directory", path.display());
    }
    Ok(path)
}
