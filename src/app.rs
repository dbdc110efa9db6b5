use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process;
use tracing::debug;
use vr::config::Config;
use vr::console;
use vr::engine::hardware::{
    CapabilityProvider, FfmpegCapabilities, HardwareClass, HardwareRequest, HardwareSession,
    hardware_encoder_lines,
};
use vr::engine::probe::probe_input_info;
use vr::engine::scale::{Resolution, ScaleMode, auto_target};
use vr::engine::{
    self, EncodeEvent, EncodeJob, EncodeOutcome, EncodeState, EncodeSupervisor, FfmpegLauncher,
    Invocation, QualityProfile, compression_quality, derive_output_path, format_ffmpeg_cmd,
};

pub fn run(cli: Cli) {
    let result = match &cli.command {
        Some(Commands::InitConfig) => {
            handle_init_config();
            Ok(())
        }
        Some(command) => {
            let config = load_config();
            match command {
                Commands::ListGpus => handle_list_gpus(&config),
                Commands::CheckFfmpeg => handle_check_ffmpeg(&config),
                Commands::Probe { file } => handle_probe(&config, file),
                Commands::InitConfig => Ok(()),
            }
        }
        None => handle_encode(&cli, &load_config()),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Using default config: {:#}", e);
        Config::default()
    })
}

fn handle_list_gpus(config: &Config) -> Result<()> {
    let provider = FfmpegCapabilities::new(config.tools.ffmpeg.clone());
    let listing = provider
        .encoder_listing()
        .context("Failed to list encoders. Is ffmpeg installed and in PATH?")?;

    let session = HardwareSession::new(provider);
    println!("Available hardware (in priority order):");
    for class in session.list_available() {
        println!("  {:<16} --hw {}", class.display_name(), class);
    }

    let lines = hardware_encoder_lines(&listing);
    if lines.is_empty() {
        println!("No hardware H.264/H.265 encoders reported by ffmpeg");
    } else {
        println!("Hardware encoders reported by ffmpeg:");
        for line in lines {
            println!("  {}", line);
        }
    }
    Ok(())
}

fn handle_check_ffmpeg(config: &Config) -> Result<()> {
    let version = engine::ffmpeg_version(&config.tools.ffmpeg)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(&config.tools.ffprobe)?;
    println!("ffprobe found: {}", probe_version);
    Ok(())
}

fn handle_probe(config: &Config, file: &Path) -> Result<()> {
    let info = probe_input_info(&config.tools.ffprobe, file)?;
    println!("Resolution: {}", info.resolution());
    match info.duration {
        Some(duration) => println!("Duration: {:.2} seconds", duration),
        None => println!("Duration: unknown"),
    }
    Ok(())
}

fn handle_init_config() {
    if Config::exists() {
        match Config::load() {
            Ok(cfg) => {
                match Config::config_path() {
                    Ok(path) => println!("Config loaded successfully from {}", path.display()),
                    Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
                }
                println!("{:#?}", cfg);
                return;
            }
            Err(e) => println!("Config invalid: {:#}", e),
        }
    } else {
        println!("Config missing");
    }

    println!("Creating default config...");
    if let Err(err) = Config::default().save() {
        eprintln!("Failed to save default config: {:#}", err);
        process::exit(1);
    }
    match Config::config_path() {
        Ok(path) => println!("Default config saved to {}", path.display()),
        Err(e) => println!("Default config saved (path unknown): {:#}", e),
    }
}

fn handle_encode(cli: &Cli, config: &Config) -> Result<()> {
    let (input, profile) = cli.input_and_profile();
    let Some(input) = input else {
        bail!("No input file given (see `vr --help`)");
    };

    engine::ffmpeg_version(&config.tools.ffmpeg)?;
    engine::ffprobe_version(&config.tools.ffprobe)?;
    if !input.is_file() {
        bail!("Input file not found: {}", input.display());
    }

    let profile = profile
        .map(QualityProfile::parse)
        .unwrap_or_else(|| config.defaults.quality_profile());
    let compress = cli.compress || config.defaults.compress;
    let request = cli.hw.unwrap_or(config.defaults.hardware);

    let mut session = HardwareSession::new(FfmpegCapabilities::new(config.tools.ffmpeg.clone()));
    let class = select_hardware(&mut session, request);

    let info = probe_input_info(&config.tools.ffprobe, input)
        .with_context(|| format!("Failed to probe {}", input.display()))?;
    let source = info.resolution();
    if info.duration.is_none() {
        debug!("input duration unknown, progress percentages disabled");
    }

    let mode = if cli.downscale {
        Some(ScaleMode::Down)
    } else if cli.upscale {
        Some(ScaleMode::Up)
    } else {
        None
    };
    let target = mode.map(|mode| auto_target(source, mode));
    match (mode, target) {
        (Some(mode), Some(target)) => {
            console::info("Plan", &format!("{}: {} -> {}", mode.label(), source, target))
        }
        _ => console::info("Plan", &format!("No scaling, keeping {}", source)),
    }

    let output = derive_output_path(input, target, compress);
    if output.exists() {
        console::info(
            "Warning",
            &format!("{} already exists and will be overwritten", output.display()),
        );
    }

    let job = EncodeJob {
        input_path: input.to_path_buf(),
        output_path: output.clone(),
        target,
        profile,
        compress,
        duration_s: info.duration,
    };

    if cli.dry_run {
        let invocation = Invocation::build(session.capabilities(), class, &job);
        println!("{}", format_ffmpeg_cmd(&config.tools.ffmpeg, &invocation.args));
        return Ok(());
    }

    let timeout = cli.encode_timeout(config.defaults.encode_timeout());
    let supervisor = EncodeSupervisor::new(FfmpegLauncher::new(config.tools.ffmpeg.clone()))
        .with_cpu_fallback(!config.defaults.disable_cpu_fallback)
        .with_timeout(timeout);

    console::info(
        "Encode",
        &format!("{} -> {} ({} profile)", input.display(), output.display(), profile),
    );

    let mut inline_active = false;
    let result = supervisor.encode(&mut session, &job, |event| {
        render_event(event, &mut inline_active)
    });
    if inline_active {
        console::end_inline();
    }
    let outcome = result.context("Encoding failed")?;

    print_summary(&job, source, mode, &outcome);
    session.reset_override();
    Ok(())
}

/// Apply the requested hardware mode, warning when it cannot be honoured
fn select_hardware<P: CapabilityProvider>(
    session: &mut HardwareSession<P>,
    request: HardwareRequest,
) -> HardwareClass {
    if request == HardwareRequest::Auto {
        let class = session.classify();
        console::info("Hardware", &format!("Detected {}", class.display_name()));
        return class;
    }

    let selected = session.set_override(request);
    if request.is_satisfied_by(selected) {
        console::info("Hardware", &format!("Using {}", selected.display_name()));
        return selected;
    }

    console::info(
        "Warning",
        &format!(
            "Requested hardware '{}' is not available, using {}",
            request,
            selected.display_name()
        ),
    );
    let available = session.list_available();
    if available.len() > 1 {
        let names: Vec<&str> = available.iter().map(|c| c.as_str()).collect();
        console::info("Hardware", &format!("Available: {}", names.join(", ")));
    }
    selected
}

fn render_event(event: &EncodeEvent, inline_active: &mut bool) {
    match event {
        EncodeEvent::LaunchFailed { class, reason } => {
            if *inline_active {
                console::end_inline();
                *inline_active = false;
            }
            console::info(
                "Warning",
                &format!(
                    "{} encoding failed ({}), trying CPU fallback...",
                    class.display_name(),
                    reason
                ),
            );
        }
        EncodeEvent::Fallback { .. } => console::info("Encode", "Using CPU encoder as fallback"),
        EncodeEvent::Progress { percent, speed, .. } => {
            console::inline(&console::progress_line(*percent, *speed));
            *inline_active = true;
        }
        EncodeEvent::StateChanged(EncodeState::Running(class)) => {
            debug!(%class, "encoder running");
        }
        EncodeEvent::StateChanged(_) => {}
    }
}

fn print_summary(
    job: &EncodeJob,
    source: Resolution,
    mode: Option<ScaleMode>,
    outcome: &EncodeOutcome,
) {
    let operation = match mode {
        Some(mode) if job.compress => format!("{} and compressed", mode.verb()),
        Some(mode) => mode.verb().to_string(),
        None if job.compress => "Compressed".to_string(),
        None => "Re-encoded".to_string(),
    };

    console::info("Done", &format!("Saved to {}", job.output_path.display()));
    console::info(
        "Done",
        &format!("{}: {} -> {}", operation, source, job.target.unwrap_or(source)),
    );
    console::info(
        "Done",
        &format!(
            "Encoder: {} ({})",
            outcome.invocation.encoder(),
            outcome.invocation.class.display_name()
        ),
    );
    if job.compress {
        console::info(
            "Done",
            &format!(
                "Compression: {} profile, quality {}",
                job.profile,
                compression_quality(job.profile)
            ),
        );
    }
}
