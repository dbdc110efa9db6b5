use super::compression::apply_compression;
use super::error::EncodeError;
use super::profile::{EncoderConfig, QualityProfile, resolve};
use super::types::{EncodeEvent, EncodeOutcome, EncodeState, ProgressParser};
use crate::engine::hardware::{
    Capabilities, CapabilityProvider, HardwareClass, HardwareRequest, HardwareSession,
};
use crate::engine::scale::Resolution;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the watchdog checks for cancellation and timeouts
const WATCHDOG_POLL: Duration = Duration::from_millis(50);

/// Arguments that follow the encoder settings on every invocation
const TRAILER_ARGS: [&str; 11] = [
    "-pix_fmt",
    "yuv420p",
    "-c:a",
    "copy",
    "-movflags",
    "+faststart",
    "-progress",
    "pipe:1",
    "-nostats",
    "-loglevel",
    "error",
];

// ============================================================================
// Invocation building
// ============================================================================

/// A single encode request
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Scale to this resolution; `None` re-encodes without a scale filter
    pub target: Option<Resolution>,
    pub profile: QualityProfile,
    pub compress: bool,
    /// Source duration in seconds; progress percentages are suppressed when unknown
    pub duration_s: Option<f64>,
}

impl EncodeJob {
    /// Create a job with no scaling, no compression and unknown duration
    pub fn new(input_path: PathBuf, output_path: PathBuf, profile: QualityProfile) -> Self {
        Self {
            input_path,
            output_path,
            target: None,
            profile,
            compress: false,
            duration_s: None,
        }
    }
}

/// Fully resolved ffmpeg argument list for one hardware class
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub class: HardwareClass,
    /// Config as resolved, before any compression adjustment
    pub resolved: EncoderConfig,
    /// Config passed to ffmpeg
    pub config: EncoderConfig,
    pub args: Vec<String>,
}

impl Invocation {
    /// Resolve, optionally compress, and lay out the arguments for `class`.
    ///
    /// Used for the first attempt and for the CPU retry alike.
    pub fn build(caps: &Capabilities, class: HardwareClass, job: &EncodeJob) -> Self {
        let resolved = resolve(caps, class, job.profile);
        let config = if job.compress {
            apply_compression(&resolved, class, job.profile)
        } else {
            resolved.clone()
        };
        let args = build_args(job, &config);

        Self {
            class,
            resolved,
            config,
            args,
        }
    }

    pub fn encoder(&self) -> &str {
        &self.config.codec
    }
}

/// Lanczos scale filter for `target`
pub fn scale_filter(target: Resolution) -> String {
    format!("scale={}:{}:flags=lanczos", target.width, target.height)
}

/// Build the ffmpeg argument list for `job` encoded with `config`
pub fn build_args(job: &EncodeJob, config: &EncoderConfig) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        job.input_path.to_string_lossy().to_string(),
    ];

    if let Some(target) = job.target {
        args.push("-vf".to_string());
        args.push(scale_filter(target));
    }

    args.extend(config.to_args());
    args.extend(TRAILER_ARGS.iter().map(|a| a.to_string()));
    args.push(job.output_path.to_string_lossy().to_string());
    args
}

/// Format an ffmpeg command as a shell-safe string for display
pub fn format_ffmpeg_cmd(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    let words: Vec<&str> = std::iter::once(program.as_ref())
        .chain(args.iter().map(String::as_str))
        .collect();

    shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "))
}

// ============================================================================
// Process launching
// ============================================================================

/// Exit information of a finished encoder process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running encoder process
pub trait EncodeProcess: Send {
    /// Take the progress channel (the process's stdout). Returns `None` once taken.
    fn take_progress(&mut self) -> Option<Box<dyn Read + Send>>;

    fn kill(&mut self) -> io::Result<()>;

    /// Exit status if the process has already exited, without blocking
    fn try_wait(&mut self) -> io::Result<Option<ExitReport>>;

    fn wait(&mut self) -> io::Result<ExitReport>;
}

/// Starts encoder processes
pub trait EncodeLauncher {
    /// Start the encoder with `args`. An error means the process never started.
    fn launch(&self, args: &[String]) -> io::Result<Box<dyn EncodeProcess>>;
}

impl<T: EncodeLauncher + ?Sized> EncodeLauncher for &T {
    fn launch(&self, args: &[String]) -> io::Result<Box<dyn EncodeProcess>> {
        (**self).launch(args)
    }
}

/// Launches the real ffmpeg binary.
///
/// stdout carries the progress channel; stderr goes straight to the terminal.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: PathBuf,
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl EncodeLauncher for FfmpegLauncher {
    fn launch(&self, args: &[String]) -> io::Result<Box<dyn EncodeProcess>> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        debug!(pid = child.id(), program = %self.program.display(), "spawned encoder");
        Ok(Box::new(ChildProcess(child)))
    }
}

struct ChildProcess(Child);

impl EncodeProcess for ChildProcess {
    fn take_progress(&mut self) -> Option<Box<dyn Read + Send>> {
        self.0
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitReport>> {
        Ok(self.0.try_wait()?.map(|status| ExitReport {
            code: status.code(),
        }))
    }

    fn wait(&mut self) -> io::Result<ExitReport> {
        let status = self.0.wait()?;
        Ok(ExitReport {
            code: status.code(),
        })
    }
}

// ============================================================================
// Supervision
// ============================================================================

/// Cooperative cancellation flag shared between the caller and the supervisor
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    TimedOut,
}

type SharedProcess = Arc<Mutex<Box<dyn EncodeProcess>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one encode at a time, retrying once on the CPU when a GPU encoder cannot launch
pub struct EncodeSupervisor<L = FfmpegLauncher> {
    launcher: L,
    cpu_fallback: bool,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl<L: EncodeLauncher> EncodeSupervisor<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            cpu_fallback: true,
            timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Enable or disable the CPU retry after a GPU launch failure
    pub fn with_cpu_fallback(mut self, enabled: bool) -> Self {
        self.cpu_fallback = enabled;
        self
    }

    /// Kill the encoder if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Encode `job` with the class `session` classifies to.
    ///
    /// If the encoder cannot be launched on a GPU class, the session is forced to CPU,
    /// the invocation rebuilt and launched once more. A second launch failure, a non-zero
    /// exit, cancellation and timeout are terminal; the partial output is removed.
    pub fn encode<P, F>(
        &self,
        session: &mut HardwareSession<P>,
        job: &EncodeJob,
        mut on_event: F,
    ) -> Result<EncodeOutcome, EncodeError>
    where
        P: CapabilityProvider,
        F: FnMut(&EncodeEvent),
    {
        on_event(&EncodeEvent::StateChanged(EncodeState::Idle));
        let class = session.classify();
        let invocation = Invocation::build(session.capabilities(), class, job);
        debug!(
            %class,
            codec = invocation.encoder(),
            params = ?invocation.config.params,
            "resolved encoder"
        );

        on_event(&EncodeEvent::StateChanged(EncodeState::Launching(class)));
        let (invocation, process, fell_back) = match self.launcher.launch(&invocation.args) {
            Ok(process) => (invocation, process, false),
            Err(err) if class.is_gpu() && self.cpu_fallback => {
                warn!(encoder = invocation.encoder(), error = %err, "encoder failed to launch, retrying on CPU");
                on_event(&EncodeEvent::LaunchFailed {
                    class,
                    reason: err.to_string(),
                });

                let cpu = session.set_override(HardwareRequest::Cpu);
                let retry = Invocation::build(session.capabilities(), cpu, job);
                on_event(&EncodeEvent::StateChanged(EncodeState::Launching(cpu)));

                match self.launcher.launch(&retry.args) {
                    Ok(process) => {
                        info!(from = %class, codec = retry.encoder(), "using CPU encoder as fallback");
                        on_event(&EncodeEvent::Fallback { from: class });
                        (retry, process, true)
                    }
                    Err(source) => {
                        on_event(&EncodeEvent::StateChanged(EncodeState::Failed));
                        return Err(EncodeError::FallbackLaunch {
                            first: err.to_string(),
                            source,
                        });
                    }
                }
            }
            Err(source) => {
                on_event(&EncodeEvent::StateChanged(EncodeState::Failed));
                return Err(EncodeError::Launch {
                    encoder: invocation.encoder().to_string(),
                    source,
                });
            }
        };

        match self.supervise(process, job, &invocation, &mut on_event) {
            Ok(parser) => {
                on_event(&EncodeEvent::StateChanged(EncodeState::Succeeded));
                Ok(EncodeOutcome {
                    invocation,
                    fell_back,
                    out_time_s: parser.out_time_s(),
                })
            }
            Err(err) => {
                remove_partial_output(job);
                on_event(&EncodeEvent::StateChanged(EncodeState::Failed));
                Err(err)
            }
        }
    }

    /// Drain the progress channel, then poll for the exit status while the watchdog is armed
    fn supervise<F>(
        &self,
        process: Box<dyn EncodeProcess>,
        job: &EncodeJob,
        invocation: &Invocation,
        on_event: &mut F,
    ) -> Result<ProgressParser, EncodeError>
    where
        F: FnMut(&EncodeEvent),
    {
        let process: SharedProcess = Arc::new(Mutex::new(process));

        let progress = lock(&process).take_progress();
        let Some(progress) = progress else {
            let mut guard = lock(&process);
            let _ = guard.kill();
            let _ = guard.wait();
            return Err(io::Error::other("encoder progress channel unavailable").into());
        };

        let finished = Arc::new(AtomicBool::new(false));
        let watchdog = self.spawn_watchdog(Arc::clone(&process), Arc::clone(&finished));
        on_event(&EncodeEvent::StateChanged(EncodeState::Running(invocation.class)));

        let mut parser = ProgressParser::new();
        for line in BufReader::new(progress).lines() {
            match line {
                Ok(line) => {
                    if !parser.parse_line(&line) {
                        continue;
                    }
                    if let Some(percent) = parser.progress_pct(job.duration_s) {
                        on_event(&EncodeEvent::Progress {
                            percent,
                            out_time_s: parser.out_time_s(),
                            speed: parser.speed,
                        });
                    }
                }
                // Non UTF-8 line; it has been consumed, keep reading
                Err(e) if e.kind() == io::ErrorKind::InvalidData => continue,
                Err(e) => {
                    warn!(error = %e, "progress channel read failed");
                    break;
                }
            }
        }

        // The encoder may close stdout and keep running; the watchdog stays armed until it exits
        let exit = loop {
            let status = lock(&process).try_wait();
            match status {
                Ok(Some(exit)) => break Ok(exit),
                Ok(None) if watchdog.is_finished() => break lock(&process).wait(),
                Ok(None) => thread::sleep(WATCHDOG_POLL),
                Err(e) => break Err(e),
            }
        };

        finished.store(true, Ordering::Release);
        let interrupt = watchdog.join().unwrap_or(None);

        match interrupt {
            Some(Interrupt::Cancelled) => return Err(EncodeError::Cancelled),
            Some(Interrupt::TimedOut) => {
                return Err(EncodeError::TimedOut {
                    secs: self.timeout.map_or(0, |t| t.as_secs()),
                });
            }
            None => {}
        }

        let exit = exit?;
        if !exit.success() {
            return Err(EncodeError::Failed {
                encoder: invocation.encoder().to_string(),
                code: exit.code,
            });
        }

        debug!(out_time_s = parser.out_time_s(), complete = parser.is_complete, "encoder exited");
        Ok(parser)
    }

    fn spawn_watchdog(
        &self,
        process: SharedProcess,
        finished: Arc<AtomicBool>,
    ) -> thread::JoinHandle<Option<Interrupt>> {
        let cancel = self.cancel.clone();
        let deadline = self.timeout.and_then(|t| Instant::now().checked_add(t));

        thread::spawn(move || {
            loop {
                if finished.load(Ordering::Acquire) {
                    return None;
                }

                let interrupt = if cancel.is_cancelled() {
                    Some(Interrupt::Cancelled)
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    Some(Interrupt::TimedOut)
                } else {
                    None
                };

                if let Some(interrupt) = interrupt {
                    if let Err(e) = lock(&process).kill() {
                        warn!(error = %e, "failed to kill encoder");
                    }
                    return Some(interrupt);
                }

                thread::sleep(WATCHDOG_POLL);
            }
        })
    }
}

/// Delete whatever a failed encode left behind. Never touches the input file.
fn remove_partial_output(job: &EncodeJob) {
    if job.output_path == job.input_path || !job.output_path.exists() {
        return;
    }

    match fs::remove_file(&job.output_path) {
        Ok(()) => debug!(path = %job.output_path.display(), "removed partial output"),
        Err(e) => warn!(path = %job.output_path.display(), error = %e, "failed to remove partial output"),
    }
}
