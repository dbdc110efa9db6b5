use std::cell::Cell;
use std::collections::{BTreeSet, VecDeque};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use vr::engine::hardware::{CapabilityProvider, HardwareSession};
use vr::engine::{EncodeEvent, EncodeJob, EncodeLauncher, EncodeProcess, ExitReport, QualityProfile};

// ============================================================================
// Capability fixtures
// ============================================================================

/// Capability provider with a fixed encoder list and adapter description
pub struct FixtureCaps {
    encoders: Vec<String>,
    vendor: Option<String>,
    probes: Cell<usize>,
}

impl FixtureCaps {
    pub fn new(encoders: &[&str]) -> Self {
        Self {
            encoders: encoders.iter().map(|s| s.to_string()).collect(),
            vendor: None,
            probes: Cell::new(0),
        }
    }

    pub fn with_vendor(mut self, vendor: &str) -> Self {
        self.vendor = Some(vendor.to_string());
        self
    }

    /// How many times the encoder list was queried
    pub fn probes(&self) -> usize {
        self.probes.get()
    }
}

impl CapabilityProvider for FixtureCaps {
    fn list_encoders(&self) -> BTreeSet<String> {
        self.probes.set(self.probes.get() + 1);
        self.encoders.iter().cloned().collect()
    }

    fn query_vendor(&self) -> Option<String> {
        self.vendor.clone()
    }
}

pub fn session(encoders: &[&str]) -> HardwareSession<FixtureCaps> {
    HardwareSession::new(FixtureCaps::new(encoders))
}

// ============================================================================
// Fake encoder processes
// ============================================================================

/// What the next launch does
#[derive(Debug, Clone)]
pub enum Step {
    /// The process fails to start
    LaunchError(io::ErrorKind),
    /// The process starts, prints `progress` and exits with `code`
    Run { progress: String, code: Option<i32> },
    /// The process prints `progress`, closes it and keeps running until killed
    Stall { progress: String },
}

impl Step {
    pub fn ok(progress: &str) -> Self {
        Step::Run {
            progress: progress.to_string(),
            code: Some(0),
        }
    }

    pub fn exit(code: i32) -> Self {
        Step::Run {
            progress: String::new(),
            code: Some(code),
        }
    }
}

/// Launcher that plays back scripted steps and records every argument list it was given
#[derive(Default)]
pub struct FakeLauncher {
    steps: Mutex<VecDeque<Step>>,
    launches: Mutex<Vec<Vec<String>>>,
}

impl FakeLauncher {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().unwrap().clone()
    }

    /// Value following `-c:v` in each recorded launch
    pub fn codecs(&self) -> Vec<String> {
        self.launches()
            .iter()
            .map(|args| codec_of(args).unwrap_or_default())
            .collect()
    }
}

impl EncodeLauncher for FakeLauncher {
    fn launch(&self, args: &[String]) -> io::Result<Box<dyn EncodeProcess>> {
        self.launches.lock().unwrap().push(args.to_vec());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::ok("progress=end\n"));

        match step {
            Step::LaunchError(kind) => Err(io::Error::new(kind, "fake launch failure")),
            Step::Run { progress, code } => Ok(Box::new(FakeProcess {
                progress: Some(progress.into_bytes()),
                code,
                stalled: false,
            })),
            Step::Stall { progress } => Ok(Box::new(FakeProcess {
                progress: Some(progress.into_bytes()),
                code: None,
                stalled: true,
            })),
        }
    }
}

struct FakeProcess {
    progress: Option<Vec<u8>>,
    code: Option<i32>,
    /// Still running; cleared by `kill`
    stalled: bool,
}

impl EncodeProcess for FakeProcess {
    fn take_progress(&mut self) -> Option<Box<dyn Read + Send>> {
        self.progress
            .take()
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.stalled = false;
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitReport>> {
        if self.stalled {
            return Ok(None);
        }
        Ok(Some(ExitReport { code: self.code }))
    }

    fn wait(&mut self) -> io::Result<ExitReport> {
        if self.stalled {
            return Err(io::Error::other("fake encoder never exits on its own"));
        }
        Ok(ExitReport { code: self.code })
    }
}

// ============================================================================
// Jobs and arguments
// ============================================================================

pub fn job(dir: &Path, profile: QualityProfile) -> EncodeJob {
    EncodeJob::new(dir.join("input.mp4"), dir.join("input-reencoded.mp4"), profile)
}

pub fn codec_of(args: &[String]) -> Option<String> {
    let idx = args.iter().position(|a| a == "-c:v")?;
    args.get(idx + 1).cloned()
}

pub fn count_fallbacks(events: &[EncodeEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EncodeEvent::Fallback { .. }))
        .count()
}

/// Write an executable shell script standing in for ffmpeg
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, body: &str) -> anyhow::Result<PathBuf> {
    use anyhow::Context;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).context("Failed to make fake ffmpeg executable")?;
    Ok(path)
}
