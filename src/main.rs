use anyhow::{Context, bail};
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use qrseq::config::{SequencerConfig, parse_consumer_list};
use qrseq::consumers::{
    ConsumerKind, HistoryConsumer, LogConsumer, LogFormat, NamedTracks, PrintedToneSink,
    SessionHistory, ToneConsumer, TriggerConsumer,
};
use qrseq::detectors::{DetectorAdapter, RqrrDecoder};
use qrseq::dispatch::BatchDispatcher;
use qrseq::engine::{ExitReason, RunSummary, SequencerEngine, StopFlag};
use qrseq::frame::{AnnotatedFrameWriter, ImageSequenceSource, Pacing};
use qrseq::window::DedupPolicy;
use std::io::BufRead;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "qrseq",
    about = "Turn QR codes seen in a video stream into left-to-right sequences",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan frames and dispatch ordered batches
    Run(RunArgs),
    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Image files or directories of images, replayed in order
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Config file (default: $QRSEQ_CONFIG, then the user config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Window length in seconds
    #[arg(long, value_name = "SECONDS")]
    window: Option<f64>,

    /// Dispatch empty batches when a window closes with nothing seen
    #[arg(long)]
    emit_empty: bool,

    /// Which position wins when a code is seen again: first-seen or last-seen
    #[arg(long, value_name = "POLICY")]
    dedup: Option<DedupPolicy>,

    /// Frame rate used to timestamp frames
    #[arg(long, default_value_t = 10.0)]
    fps: f64,

    /// Pace frames at --fps and stamp them with wall-clock time
    #[arg(long)]
    realtime: bool,

    /// Comma-separated consumers: log,tone,trigger,history
    #[arg(long, value_name = "list")]
    consumers: Option<String>,

    /// Output format of the log consumer
    #[arg(long, value_enum)]
    format: Option<LogFormat>,

    /// Write frames with outlined codes to this directory
    #[arg(long, value_name = "DIR")]
    annotate_dir: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Drop codes still pending when the stream ends
    #[arg(long)]
    no_final_flush: bool,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Config file to inspect
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the default configuration as TOML
    #[arg(long, conflicts_with_all = ["path", "schema"])]
    default: bool,

    /// Print the path the configuration is read from
    #[arg(long, conflicts_with = "schema")]
    path: bool,

    /// Print the JSON schema of the configuration file
    #[arg(long)]
    schema: bool,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qrseq=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(false),
            )
            .with(env_filter)
            .init();
    }
}

fn load_config(args: &RunArgs) -> anyhow::Result<SequencerConfig> {
    let mut config = SequencerConfig::load(args.config.as_deref())?;
    if let Some(window) = args.window {
        config.window.duration_seconds = window;
    }
    if args.emit_empty {
        config.window.emit_empty_batches = true;
    }
    if let Some(policy) = args.dedup {
        config.window.dedup_policy = policy;
    }
    if args.no_final_flush {
        config.window.flush_on_exit = false;
    }
    if let Some(list) = args.consumers.as_deref() {
        config.output.consumers = parse_consumer_list(list)?;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    config.validate()?;
    Ok(config)
}

fn build_dispatcher(
    config: &SequencerConfig,
    history: &SessionHistory,
    color: bool,
) -> anyhow::Result<BatchDispatcher> {
    let tone_duration = config.tone_duration()?;
    let mut dispatcher = BatchDispatcher::new();
    for kind in &config.output.consumers {
        dispatcher = match kind {
            ConsumerKind::Log => {
                dispatcher.register(LogConsumer::stdout(config.output.format, color))
            }
            ConsumerKind::Tone => dispatcher.register(ToneConsumer::new(
                PrintedToneSink::stdout(),
                config.tone.frequencies.clone(),
                tone_duration,
            )),
            ConsumerKind::Trigger => dispatcher.register(TriggerConsumer::new(
                NamedTracks::stdout(config.trigger.tracks.clone()),
            )),
            ConsumerKind::History => dispatcher.register(HistoryConsumer::new(history.clone())),
        };
    }
    Ok(dispatcher)
}

/// Raise the stop flag when the user types `q` on an interactive stdin.
fn watch_stop_key(flag: StopFlag) {
    if !std::io::stdin().is_terminal() {
        return;
    }
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    flag.raise();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}

fn render_summary(summary: &RunSummary, color: bool) -> String {
    let exit = match &summary.exit {
        ExitReason::Stopped => "stopped".to_string(),
        ExitReason::EndOfStream => "end of stream".to_string(),
        ExitReason::FrameLimit => "frame limit".to_string(),
        ExitReason::ReadFailure(reason) => format!("read failure: {reason}"),
    };
    let heading = if color {
        "Summary:".bold().cyan().to_string()
    } else {
        "Summary:".to_string()
    };
    format!(
        "{} {} frames, {} batches, {} decode errors, {} consumer failures ({})",
        heading,
        summary.frames,
        summary.batches,
        summary.decode_errors,
        summary.consumer_failures,
        exit
    )
}

fn run_scan(args: RunArgs, color: ColorChoice) -> anyhow::Result<ExitReason> {
    let config = load_config(&args)?;
    let pacing = if args.realtime {
        Pacing::Realtime { fps: args.fps }
    } else {
        Pacing::Virtual { fps: args.fps }
    };
    if !pacing.is_usable() {
        bail!(
            "--fps must be positive with a representable frame interval, got {}",
            args.fps
        );
    }
    let mut source = ImageSequenceSource::from_inputs(&args.inputs, pacing)
        .context("failed to list input frames")?;
    if source.is_empty() {
        bail!("no image frames found in the given inputs");
    }

    let stdout_color = std::io::stdout().is_terminal() && !matches!(color, ColorChoice::Never);
    let stderr_color = std::io::stderr().is_terminal() && !matches!(color, ColorChoice::Never);

    let history = SessionHistory::new();
    let dispatcher = build_dispatcher(&config, &history, stdout_color)?;
    let adapter =
        DetectorAdapter::new(RqrrDecoder::new()).with_annotation(args.annotate_dir.is_some());

    let mut settings = config.engine_settings()?;
    settings.max_frames = args.max_frames;
    let mut engine = SequencerEngine::new(adapter, dispatcher, settings);
    if let Some(dir) = &args.annotate_dir {
        let writer = AnnotatedFrameWriter::create(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        engine = engine.with_sink(writer);
    }

    let mut stop = StopFlag::new();
    watch_stop_key(stop.clone());
    let summary = engine.run(&mut source, &mut stop);

    if config.wants(ConsumerKind::History) {
        println!(
            "Full sequence: {}",
            serde_json::to_string(&history.sequences())?
        );
    }
    eprintln!("{}", render_summary(&summary, stderr_color));
    Ok(summary.exit)
}

fn run_config(args: ConfigArgs) -> anyhow::Result<()> {
    if args.schema {
        let schema = schemars::schema_for!(SequencerConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
    } else if args.default {
        print!("{}", SequencerConfig::default().to_toml()?);
    } else if args.path {
        match SequencerConfig::resolved_path(args.config.as_deref()) {
            Some(path) => println!("{}", path.display()),
            None => println!("(built-in defaults)"),
        }
    } else {
        let config = SequencerConfig::load(args.config.as_deref())?;
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    let mut args = std::env::args_os();
    args.next();
    let flag = args
        .take_while(|arg| arg != "--")
        .any(|arg| arg == "--no-color");
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn main() {
    let color = detect_color_choice();
    if matches!(color, ColorChoice::Never) {
        colored::control::set_override(false);
    }
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let color = if cli.no_color { ColorChoice::Never } else { color };
    init_tracing();

    let result = match cli.command {
        Some(Commands::Run(args)) => run_scan(args, color).map(|exit| match exit {
            ExitReason::ReadFailure(_) => 1,
            _ => 0,
        }),
        Some(Commands::Config(args)) => run_config(args).map(|()| 0),
        None => Ok(0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}
