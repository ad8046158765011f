//! End-to-end session tests against an in-memory serial device.
//!
//! Time is paused, so multi-minute windows run instantly and pacing is deterministic.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use volta_daq::session::{AcquisitionSession, SessionOutcome};
use volta_daq::transport::{LineTransport, MAX_LINE_LEN};
use volta_daq::{AcquisitionPlan, DaqError};

fn device() -> (DuplexStream, LineTransport) {
    let (device, host) = tokio::io::duplex(1024);
    (device, LineTransport::spawn(host, 16))
}

fn read_log(path: &Path) -> Vec<(String, String)> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let (ts, value) = line.split_once(' ').expect("two fields");
            (ts.to_string(), value.to_string())
        })
        .collect()
}

fn assert_fixed_point(field: &str, decimals: usize) {
    let (int, frac) = field.split_once('.').expect("decimal point");
    assert!(!int.is_empty() && int.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()));
    assert_eq!(frac.len(), decimals, "{field}");
    assert!(frac.chars().all(|c| c.is_ascii_digit()), "{field}");
}

#[tokio::test(start_paused = true)]
async fn three_samples_over_three_minutes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    let (mut device, transport) = device();

    let feeder = tokio::spawn(async move {
        for (i, line) in ["1.0\r\n", "2.0\r\n", "3.0\r\n"].iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            device.write_all(line.as_bytes()).await.unwrap();
        }
        device
    });

    let plan = AcquisitionPlan::from_minutes(3, 3).unwrap();
    let session = AcquisitionSession::new(plan, Duration::from_secs(1));
    let progress = session.progress();
    let report = session.run(transport, &path).await.unwrap();
    let _device = feeder.await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.samples_written, 3);
    assert_eq!(report.malformed, 0);
    // Paced to the window: 60s before each of the three reads.
    assert!(report.elapsed >= Duration::from_secs(180), "{:?}", report.elapsed);
    assert!(report.elapsed < Duration::from_secs(182), "{:?}", report.elapsed);

    assert!(progress.is_finished());
    assert_eq!(progress.collected(), 3);

    let log = read_log(&path);
    let values: Vec<&str> = log.iter().map(|(_, v)| v.as_str()).collect();
    assert_eq!(values, vec!["1.00", "2.00", "3.00"]);
    for (ts, value) in &log {
        assert_fixed_point(ts, 6);
        assert_fixed_point(value, 2);
    }
    let stamps: Vec<f64> = log.iter().map(|(ts, _)| ts.parse().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn closed_transport_finalizes_partial_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.log");
    let (mut device, transport) = device();

    device.write_all(b"1.5\nabc\n2,5\n").await.unwrap();
    drop(device);

    let plan = AcquisitionPlan::new(Duration::from_secs(10), 10).unwrap();
    let session = AcquisitionSession::new(plan, Duration::from_secs(1));
    let report = session.run(transport, &path).await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::TransportClosed);
    assert_eq!(report.samples_written, 2);
    assert_eq!(report.malformed, 1);

    let values: Vec<String> = read_log(&path).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec!["1.50", "2.50"]);
}

#[tokio::test(start_paused = true)]
async fn quiet_device_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.log");
    let (mut device, transport) = device();

    let feeder = tokio::spawn(async move {
        // Several read timeouts pass before anything arrives.
        tokio::time::sleep(Duration::from_secs(10)).await;
        device.write_all(b"0.25\n0.75\n").await.unwrap();
        device
    });

    let plan = AcquisitionPlan::new(Duration::from_secs(4), 2).unwrap();
    let session = AcquisitionSession::new(plan, Duration::from_secs(1));
    let report = session.run(transport, &path).await.unwrap();
    let _device = feeder.await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    let values: Vec<String> = read_log(&path).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec!["0.25", "0.75"]);
}

#[tokio::test(start_paused = true)]
async fn lines_beyond_target_are_left_unread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.log");
    let (mut device, transport) = device();

    device.write_all(b"1\n2\n3\n4\n5\n").await.unwrap();

    let plan = AcquisitionPlan::new(Duration::from_secs(2), 2).unwrap();
    let session = AcquisitionSession::new(plan, Duration::from_secs(1));
    let report = session.run(transport, &path).await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.samples_written, 2);
    let values: Vec<String> = read_log(&path).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec!["1.00", "2.00"]);
    drop(device);
}

#[tokio::test(start_paused = true)]
async fn unterminated_noise_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.log");
    let (mut device, transport) = device();

    let feeder = tokio::spawn(async move {
        let noise = vec![b'7'; MAX_LINE_LEN * 16];
        device.write_all(&noise).await.unwrap();
        device.write_all(b"\n2,5\n").await.unwrap();
        device
    });

    let plan = AcquisitionPlan::new(Duration::from_secs(1), 1).unwrap();
    let report = AcquisitionSession::new(plan, Duration::from_secs(1))
        .run(transport, &path)
        .await
        .unwrap();
    let _device = feeder.await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.malformed, 0);
    let values: Vec<String> = read_log(&path).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec!["2.50"]);
}

#[tokio::test(start_paused = true)]
async fn existing_log_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replace.log");
    std::fs::write(&path, "old contents\nthat should vanish\n").unwrap();
    let (mut device, transport) = device();

    device.write_all(b"9.999\n").await.unwrap();

    let plan = AcquisitionPlan::new(Duration::from_secs(1), 1).unwrap();
    let report = AcquisitionSession::new(plan, Duration::from_secs(1))
        .run(transport, &path)
        .await
        .unwrap();

    assert_eq!(report.samples_written, 1);
    let log = read_log(&path);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].1, "10.00");
    drop(device);
}

#[tokio::test(start_paused = true)]
async fn unwritable_destination_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("run.log");
    let (mut device, transport) = device();

    device.write_all(b"1.0\n").await.unwrap();

    let plan = AcquisitionPlan::new(Duration::from_secs(1), 1).unwrap();
    let session = AcquisitionSession::new(plan, Duration::from_secs(1));
    let progress = session.progress();
    let err = session.run(transport, &path).await.unwrap_err();

    assert!(matches!(err, DaqError::Io(_)));
    assert!(progress.is_finished());
    assert!(!path.exists());
    drop(device);
}

#[tokio::test(start_paused = true)]
async fn host_loop_follows_session_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.log");
    let (mut device, transport) = device();

    let feeder = tokio::spawn(async move {
        for value in ["0.5", "0.6", "0.7", "0.8"] {
            device.write_all(format!("{value}\n").as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        device
    });

    let plan = AcquisitionPlan::new(Duration::from_secs(20), 4).unwrap();
    let session = AcquisitionSession::new(plan, Duration::from_secs(1));
    let progress = session.progress();
    let task = tokio::spawn(async move { session.run(transport, &path).await });

    let mut seen = Vec::new();
    progress
        .poll_until_finished(|p| {
            if seen.last() != Some(&p.collected()) {
                seen.push(p.collected());
            }
        })
        .await;

    let report = task.await.unwrap().unwrap();
    let _device = feeder.await.unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&4));
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(progress.status().percent(), 100);
    assert_eq!(progress.last_value(), Some(0.8));
}
