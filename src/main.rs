use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand};

use nrseg::config::{Mode, RunConfig};
use nrseg::error::Error;
use nrseg::files;
use nrseg::rewrite::{inspect, transform_with};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    ", revision ",
    env!("NRSEG_REVISION")
);

#[derive(Parser)]
#[command(
    name = "nrseg",
    about = "Insert New Relic segments into every Go function and method",
    version = VERSION,
    disable_version_flag = true,
    args_conflicts_with_subcommands = true,
    after_help = "Rewrites files in place unless --dist names another directory."
)]
struct Cli {
    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    rewrite: RewriteArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Report functions and methods that have no segment. Writes nothing.
    Inspect(InspectArgs),
}

#[derive(Args)]
struct RewriteArgs {
    /// Directory names to skip, comma separated. `testdata` is always skipped.
    #[arg(short, long, value_delimiter = ',', value_name = "DIR")]
    ignore: Vec<String>,

    /// Write rewritten files under this directory instead of in place.
    #[arg(long, value_name = "DIR")]
    dist: Option<PathBuf>,

    /// Leave files marked `// Code generated ... DO NOT EDIT.` alone.
    #[arg(long)]
    skip_generated: bool,

    /// Do not add segments to functions that already have one.
    #[arg(long)]
    skip_instrumented: bool,

    /// Root directory to process.
    #[arg(default_value = "./")]
    dir: PathBuf,
}

#[derive(Args)]
struct InspectArgs {
    /// Directory names to skip, comma separated. `testdata` is always skipped.
    #[arg(short, long, value_delimiter = ',', value_name = "DIR")]
    ignore: Vec<String>,

    /// Leave files marked `// Code generated ... DO NOT EDIT.` alone.
    #[arg(long)]
    skip_generated: bool,

    /// Root directory to inspect.
    #[arg(default_value = "./")]
    dir: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let config = match cli.command {
        Some(Commands::Inspect(args)) => {
            let mut config = RunConfig::new(Mode::Inspect, args.dir, args.ignore);
            config.skip_generated = args.skip_generated;
            config
        }
        None => {
            let args = cli.rewrite;
            let mut config = RunConfig::new(Mode::Rewrite, args.dir, args.ignore);
            config.dist = args.dist;
            config.skip_generated = args.skip_generated;
            config.skip_instrumented = args.skip_instrumented;
            config
        }
    };
    log::info!("processing {} ({:?})", config.root.display(), config.mode);
    match config.mode {
        Mode::Rewrite => cmd_rewrite(&config),
        Mode::Inspect => cmd_inspect(&config),
    }
}

/// Read a source file, or `None` when it is generated and should be skipped.
fn read_source(config: &RunConfig, path: &Path) -> Result<Option<Vec<u8>>, Error> {
    let source = std::fs::read(path).map_err(|source| Error::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    if config.skip_generated && files::is_generated(&source) {
        log::info!("skipping generated file {}", path.display());
        return Ok(None);
    }
    Ok(Some(source))
}

fn cmd_rewrite(config: &RunConfig) -> Result<(), Error> {
    let paths = files::go_files(&config.root, &config.ignore_dirs)?;
    let options = config.options();
    let mut changed = 0usize;
    for path in &paths {
        let Some(source) = read_source(config, path)? else {
            continue;
        };
        let output = transform_with(&path.to_string_lossy(), &source, &options)?;
        if output == source {
            log::debug!("{} unchanged", path.display());
            continue;
        }
        match config.mirror_dir() {
            Some(dist) => {
                let target = files::mirrored_path(&config.root, dist, path)?;
                files::write_output(&target, &output)?;
                anstream::println!("update file {:?}", target.display().to_string());
            }
            None => files::write_output(path, &output)?,
        }
        changed += 1;
    }
    eprintln!("rewrote {changed} of {} file(s)", paths.len());
    Ok(())
}

fn cmd_inspect(config: &RunConfig) -> Result<(), Error> {
    let paths = files::go_files(&config.root, &config.ignore_dirs)?;
    let mut missing = 0usize;
    for path in &paths {
        let Some(source) = read_source(config, path)? else {
            continue;
        };
        for finding in inspect(&path.to_string_lossy(), &source)? {
            anstream::println!(
                "{}:{}:{}: {} no insert segment",
                path.display(),
                finding.position.line,
                finding.position.column,
                finding.name
            );
            missing += 1;
        }
    }
    if missing > 0 {
        return Err(Error::MissingSegments { count: missing });
    }
    Ok(())
}
