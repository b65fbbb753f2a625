use std::io::{self, IsTerminal};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gw_data_fetch::app::{DumpApp, FetchOptions, FrameApp, LogSink, ProgressSink, Schedule};
use gw_data_fetch::config::{JobLoader, SearchTableLoader};
use gw_data_fetch::dump::{DEFAULT_FETCHER, SystemChannelSource};
use gw_data_fetch::error::GwError;
use gw_data_fetch::frame::{
    self, DEFAULT_FRAME_LENGTH, DEFAULT_SERVER, FrameQuery, FrameTypes, FrameWindow,
};
use gw_data_fetch::locator::DEFAULT_DATAFIND_PROGRAM;
use gw_data_fetch::output::{self, JsonOutput};
use gw_data_fetch::remote::SystemRemoteShell;

#[derive(Parser)]
#[command(name = "gwfetch")]
#[command(about = "Resumable download of gravitational-wave frame files and channel data")]
#[command(version)]
struct Cli {
    /// Print diagnostic information to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        about = "Find frame files in a time range on a remote server and download the ones not already present"
    )]
    Frames(FramesArgs),
    #[command(about = "Save channel data in interruptible chunks and concatenate them")]
    Dump(DumpArgs),
}

#[derive(Args)]
struct FramesArgs {
    /// Read `start stop` lines from stdin instead of using --start/--deltat.
    #[arg(short = 'T', long)]
    times: bool,

    /// Extra passes after a failed one; negative keeps retrying forever.
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    retries: i64,

    /// GPS start time, rounded down to a multiple of --length.
    #[arg(short = 't', long)]
    start: Option<i64>,

    /// Assumed duration of each frame file in seconds.
    #[arg(short, long, default_value_t = DEFAULT_FRAME_LENGTH)]
    length: i64,

    /// Only report progress; do not contact any server.
    #[arg(short, long)]
    progress: bool,

    /// Width of the time window in seconds.
    #[arg(short, long)]
    deltat: Option<i64>,

    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    #[arg(short, long, default_value = ".")]
    outdir: Utf8PathBuf,

    /// Frame types for LIGO Hanford, e.g. H1_R or H1_HOFT_C02.
    #[arg(short = 'H', long = "hanford-frametypes", num_args = 0..)]
    hanford: Vec<String>,

    /// Frame types for LIGO Livingston, e.g. L1_R or L1_HOFT_C02.
    #[arg(short = 'L', long = "livingston-frametypes", num_args = 0..)]
    livingston: Vec<String>,

    /// Frame types for Virgo.
    #[arg(short = 'V', long = "virgo-frametypes", num_args = 0..)]
    virgo: Vec<String>,

    /// Worker threads for the download phase.
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// JSON table of observing epochs and frame directories used when the
    /// data-find service has no answer.
    #[arg(long)]
    search_table: Option<Utf8PathBuf>,

    #[arg(long, default_value = SystemRemoteShell::DEFAULT_SSH)]
    ssh_program: String,

    #[arg(long, default_value = SystemRemoteShell::DEFAULT_SCP)]
    scp_program: String,

    #[arg(long, default_value = DEFAULT_DATAFIND_PROGRAM)]
    datafind_program: String,

    /// Print reports as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DumpArgs {
    /// Job file; defaults to jobspec.json in the current directory.
    jobspec: Option<Utf8PathBuf>,

    /// Only report progress.
    #[arg(short, long)]
    progress: bool,

    /// List final output files and whether they exist.
    #[arg(short = 'o', long)]
    outputs: bool,

    #[arg(long, default_value = ".")]
    outdir: Utf8PathBuf,

    /// Worker threads for the download phase.
    #[arg(long, default_value_t = 6)]
    jobs: usize,

    /// Program printing `time value` lines for `<channel> <start> <end>`.
    #[arg(long, default_value = DEFAULT_FETCHER)]
    fetcher: String,

    /// Print reports as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GwError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GwError) -> u8 {
    match error {
        GwError::InvalidJob(_)
        | GwError::InvalidTime(_)
        | GwError::JobRead(_)
        | GwError::JobParse(_)
        | GwError::SearchTableRead(_)
        | GwError::SearchTableParse(_)
        | GwError::MissingTimeWindow => 2,
        GwError::RemoteExec { .. }
        | GwError::DataFind(_)
        | GwError::TargetedSearch(_)
        | GwError::Transfer(_)
        | GwError::RemoteChecksum(_)
        | GwError::LocalChecksum(_)
        | GwError::ChannelFetch(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Frames(args) => run_frames(args, cli.verbose),
        Commands::Dump(args) => run_dump(args),
    }
}

fn frame_queries(args: &FramesArgs) -> Result<Vec<FrameQuery>, GwError> {
    let windows = if args.times {
        frame::read_windows(io::stdin().lock())?
    } else {
        match (args.start, args.deltat) {
            (Some(start), Some(deltat)) => vec![FrameWindow { start, deltat }],
            _ => return Err(GwError::MissingTimeWindow),
        }
    };
    let frametypes = FrameTypes {
        hanford: args.hanford.clone(),
        livingston: args.livingston.clone(),
        virgo: args.virgo.clone(),
    };
    Ok(windows
        .iter()
        .flat_map(|window| {
            frame::build_queries(window, args.length, &args.server, &args.outdir, &frametypes)
        })
        .collect())
}

fn run_frames(args: FramesArgs, verbose: bool) -> miette::Result<()> {
    let queries = frame_queries(&args)?;
    debug!(total = queries.len(), "built frame queries");

    let table = SearchTableLoader::resolve(args.search_table.as_deref())?;
    let remote = SystemRemoteShell::with_programs(&args.ssh_program, &args.scp_program);
    debug!(tools = ?remote.tool_info(), "remote tools");
    let app = FrameApp::new(remote, table).with_datafind_program(&args.datafind_program);

    let show_progress = |app: &FrameApp<SystemRemoteShell>| -> miette::Result<()> {
        let progress = app.progress(&queries);
        if args.json {
            JsonOutput::print_frame_progress(&progress).into_diagnostic()
        } else {
            print!("{}", progress.render());
            Ok(())
        }
    };

    if args.progress {
        return show_progress(&app);
    }
    if verbose {
        eprintln!("Checking progress before starting.");
        show_progress(&app)?;
    }

    let options = FetchOptions {
        retries: args.retries,
        schedule: Schedule::from_jobs(args.jobs),
    };
    let sink: &dyn ProgressSink = if args.json { &JsonOutput } else { &LogSink };
    let result = app.fetch(&queries, options, sink)?;

    if args.json {
        JsonOutput::print_fetch(&result).into_diagnostic()?;
    } else if verbose {
        eprintln!("Done. Checking progress at end:");
        show_progress(&app)?;
    }
    match result.last_error {
        Some(message) if !result.completed => Err(miette::Report::msg(format!(
            "giving up after {} passes: {message}",
            result.passes
        ))),
        _ => Ok(()),
    }
}

fn run_dump(args: DumpArgs) -> miette::Result<()> {
    let job = JobLoader::resolve(args.jobspec.as_deref(), &args.outdir)?;
    debug!(?job, spans = ?job.subspans(), "job after gps conversion");
    let app = DumpApp::new(SystemChannelSource::new(&args.fetcher));

    if args.progress {
        let progress = app.progress(&job);
        if args.json {
            JsonOutput::print_channel_progress(&progress).into_diagnostic()?;
        } else {
            println!(
                "Checking progress on job: {} to {} ({} channels)",
                job.start_iso()?,
                job.end_iso()?,
                job.channels.len()
            );
            println!("{}", progress.render());
        }
    }
    if args.outputs {
        let colored = io::stdout().is_terminal();
        for line in output::render_output_listing(&job.output_filenames(), colored) {
            println!("{line}");
        }
    }
    if args.progress || args.outputs {
        return Ok(());
    }

    let sink: &dyn ProgressSink = if args.json { &JsonOutput } else { &LogSink };
    let result = app.run(&job, Schedule::from_jobs(args.jobs), sink)?;
    if args.json {
        JsonOutput::print_dump(&result).into_diagnostic()?;
    } else {
        println!(
            "chunks: {} saved, {} already present, {} failed; {} outputs",
            result.saved,
            result.present,
            result.failed,
            result.concatenated.len()
        );
    }
    Ok(())
}
