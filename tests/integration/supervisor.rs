// Supervisor behaviour against scripted fake encoder processes

use std::fs;
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vr::engine::hardware::{HardwareClass, HardwareRequest};
use vr::engine::{CancelToken, EncodeError, EncodeEvent, EncodeState, EncodeSupervisor, QualityProfile};

use crate::common::helpers::*;

fn collect(events: &mut Vec<EncodeEvent>) -> impl FnMut(&EncodeEvent) + '_ {
    move |event: &EncodeEvent| events.push(event.clone())
}

#[test]
fn test_gpu_launch_failure_falls_back_to_cpu() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = session(&["h264_nvenc", "libx264"]);
    assert_eq!(session.set_override(HardwareRequest::Nvidia), HardwareClass::Nvidia);

    let launcher = FakeLauncher::new([
        Step::LaunchError(ErrorKind::NotFound),
        Step::ok("out_time_ms=1000000\nprogress=end\n"),
    ]);
    let supervisor = EncodeSupervisor::new(&launcher);

    let mut events = Vec::new();
    let outcome = supervisor
        .encode(&mut session, &job(temp_dir.path(), QualityProfile::High), collect(&mut events))
        .unwrap();

    assert!(outcome.fell_back);
    assert_eq!(outcome.invocation.class, HardwareClass::Cpu);
    assert_eq!(outcome.invocation.encoder(), "libx264");
    assert_eq!(outcome.out_time_s, 1.0);
    assert_eq!(launcher.codecs(), vec!["h264_nvenc", "libx264"]);

    // The retry uses the CPU table for the same profile
    let retry = &launcher.launches()[1];
    assert!(retry.windows(2).any(|w| w[0] == "-crf" && w[1] == "14"));

    assert_eq!(count_fallbacks(&events), 1);
    assert_eq!(
        events,
        vec![
            EncodeEvent::StateChanged(EncodeState::Idle),
            EncodeEvent::StateChanged(EncodeState::Launching(HardwareClass::Nvidia)),
            EncodeEvent::LaunchFailed {
                class: HardwareClass::Nvidia,
                reason: "fake launch failure".to_string(),
            },
            EncodeEvent::StateChanged(EncodeState::Launching(HardwareClass::Cpu)),
            EncodeEvent::Fallback {
                from: HardwareClass::Nvidia
            },
            EncodeEvent::StateChanged(EncodeState::Running(HardwareClass::Cpu)),
            EncodeEvent::StateChanged(EncodeState::Succeeded),
        ]
    );
}

#[test]
fn test_fallback_sticks_for_the_rest_of_the_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = session(&["h264_nvenc", "libx264"]);
    let launcher = FakeLauncher::new([Step::LaunchError(ErrorKind::NotFound)]);
    let supervisor = EncodeSupervisor::new(&launcher);
    let job = job(temp_dir.path(), QualityProfile::Med);

    let mut first = Vec::new();
    supervisor.encode(&mut session, &job, collect(&mut first)).unwrap();
    assert_eq!(count_fallbacks(&first), 1);
    assert_eq!(session.forced(), Some(HardwareClass::Cpu));

    let mut second = Vec::new();
    let outcome = supervisor.encode(&mut session, &job, collect(&mut second)).unwrap();
    assert!(!outcome.fell_back);
    assert_eq!(count_fallbacks(&second), 0);
    assert_eq!(launcher.codecs(), vec!["h264_nvenc", "libx264", "libx264"]);

    session.reset_override();
    assert_eq!(session.classify(), HardwareClass::Nvidia);
}

#[test]
fn test_double_launch_failure_is_terminal() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = session(&["h264_qsv"]);
    let launcher = FakeLauncher::new([
        Step::LaunchError(ErrorKind::PermissionDenied),
        Step::LaunchError(ErrorKind::NotFound),
    ]);

    let mut events = Vec::new();
    let err = EncodeSupervisor::new(&launcher)
        .encode(&mut session, &job(temp_dir.path(), QualityProfile::Low), collect(&mut events))
        .unwrap_err();

    assert!(matches!(err, EncodeError::FallbackLaunch { .. }));
    assert!(err.is_launch_failure());
    assert_eq!(launcher.launches().len(), 2);
    assert_eq!(count_fallbacks(&events), 0);
    assert_eq!(
        events.last(),
        Some(&EncodeEvent::StateChanged(EncodeState::Failed))
    );
}

#[test]
fn test_cpu_launch_failure_is_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = session(&["libx264"]);
    let launcher = FakeLauncher::new([Step::LaunchError(ErrorKind::NotFound)]);

    let err = EncodeSupervisor::new(&launcher)
        .encode(&mut session, &job(temp_dir.path(), QualityProfile::Med), |_| {})
        .unwrap_err();

    match err {
        EncodeError::Launch { encoder, .. } => assert_eq!(encoder, "libx264"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(launcher.launches().len(), 1);
}

#[test]
fn test_disabled_fallback_reports_gpu_launch_failure() {
    let temp_dir = TempDir::new().unwrap();
    let mut session = session(&["h264_amf"]);
    let launcher = FakeLauncher::new([Step::LaunchError(ErrorKind::NotFound)]);

    let err = EncodeSupervisor::new(&launcher)
        .with_cpu_fallback(false)
        .encode(&mut session, &job(temp_dir.path(), QualityProfile::Med), |_| {})
        .unwrap_err();

    assert!(matches!(err, EncodeError::Launch { ref encoder, .. } if encoder == "h264_amf"));
    assert_eq!(launcher.launches().len(), 1);
    assert_eq!(session.forced(), None);
}

#[test]
fn test_nonzero_exit_fails_without_fallback_and_removes_output() {
    let temp_dir = TempDir::new().unwrap();
    let job = job(temp_dir.path(), QualityProfile::Med);
    fs::write(&job.input_path, b"source").unwrap();
    fs::write(&job.output_path, b"partial").unwrap();

    let mut session = session(&["h264_nvenc"]);
    let launcher = FakeLauncher::new([Step::exit(1)]);

    let mut events = Vec::new();
    let err = EncodeSupervisor::new(&launcher)
        .encode(&mut session, &job, collect(&mut events))
        .unwrap_err();

    assert!(matches!(err, EncodeError::Failed { code: Some(1), .. }));
    assert!(!err.is_launch_failure());
    assert_eq!(launcher.launches().len(), 1);
    assert_eq!(count_fallbacks(&events), 0);
    assert!(!job.output_path.exists());
    assert!(job.input_path.exists());
}

#[test]
fn test_progress_events_follow_known_duration() {
    let temp_dir = TempDir::new().unwrap();
    let mut job = job(temp_dir.path(), QualityProfile::Med);
    job.duration_s = Some(10.0);

    let launcher = FakeLauncher::new([Step::ok(
        "frame=10\nout_time_ms=5000000\nspeed=2.0x\nout_time_ms=N/A\n\
         out_time_ms=10000000\nout_time_ms=30000000\nprogress=end\n",
    )]);

    let mut events = Vec::new();
    EncodeSupervisor::new(&launcher)
        .encode(&mut session(&[]), &job, collect(&mut events))
        .unwrap();

    let progress: Vec<(f64, Option<f64>)> = events
        .iter()
        .filter_map(|e| match e {
            EncodeEvent::Progress { percent, speed, .. } => Some((*percent, *speed)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![(50.0, None), (100.0, Some(2.0)), (100.0, Some(2.0))]
    );
}

#[test]
fn test_unknown_duration_suppresses_percentages() {
    let temp_dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new([Step::ok("out_time_ms=5000000\nprogress=end\n")]);

    let mut events = Vec::new();
    let outcome = EncodeSupervisor::new(&launcher)
        .encode(
            &mut session(&[]),
            &job(temp_dir.path(), QualityProfile::Med),
            collect(&mut events),
        )
        .unwrap();

    assert_eq!(outcome.out_time_s, 5.0);
    assert!(!events.iter().any(|e| matches!(e, EncodeEvent::Progress { .. })));
}

#[test]
fn test_timeout_fires_after_progress_channel_closes() {
    let temp_dir = TempDir::new().unwrap();
    let job = job(temp_dir.path(), QualityProfile::Med);
    fs::write(&job.output_path, b"partial").unwrap();
    let launcher = FakeLauncher::new([Step::Stall {
        progress: "out_time_ms=1000000\n".to_string(),
    }]);

    let mut events = Vec::new();
    let started = Instant::now();
    let err = EncodeSupervisor::new(&launcher)
        .with_timeout(Some(Duration::from_millis(200)))
        .encode(&mut session(&[]), &job, collect(&mut events))
        .unwrap_err();

    assert!(matches!(err, EncodeError::TimedOut { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!job.output_path.exists());
    assert_eq!(
        events.last(),
        Some(&EncodeEvent::StateChanged(EncodeState::Failed))
    );
}

#[test]
fn test_cancel_after_progress_channel_closes() {
    let temp_dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new([Step::Stall {
        progress: String::new(),
    }]);
    let token = CancelToken::new();

    let canceller = {
        let token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            token.cancel();
        })
    };

    let err = EncodeSupervisor::new(&launcher)
        .with_cancel_token(token)
        .encode(
            &mut session(&[]),
            &job(temp_dir.path(), QualityProfile::Med),
            |_| {},
        )
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, EncodeError::Cancelled));
}

#[test]
fn test_every_encode_starts_idle() {
    let temp_dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new([Step::LaunchError(ErrorKind::NotFound)]);

    let mut events = Vec::new();
    EncodeSupervisor::new(&launcher)
        .encode(
            &mut session(&["libx264"]),
            &job(temp_dir.path(), QualityProfile::Low),
            collect(&mut events),
        )
        .unwrap_err();

    assert_eq!(
        events,
        vec![
            EncodeEvent::StateChanged(EncodeState::Idle),
            EncodeEvent::StateChanged(EncodeState::Launching(HardwareClass::Cpu)),
            EncodeEvent::StateChanged(EncodeState::Failed),
        ]
    );
}
