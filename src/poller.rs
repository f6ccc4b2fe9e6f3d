//! The polling loop.
//!
//! Each cycle asks the device how many samples it holds, requests the newest
//! one and decodes it:
//!
//! 1. write `01 00 00 00 00`, read the count
//! 2. if the count is zero, skip to the wait
//! 3. write `07 <idx_lo> <idx_hi> 00 00 03` for `idx = count - 1`, read the sample
//! 4. decode and publish
//!
//! The count can change between steps 1 and 3, so the index may be stale by
//! the time the sample query goes out. The protocol gives no way around that.
//!
//! Failures are contained to their cycle. Only the cancellation signal stops
//! the loop.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::ble::session::Session;
use crate::ble::transport::GattDevice;
use crate::cancel::CancellationSignal;
use crate::error::{Error, Result};
use crate::protocol::readings::READING_SLOTS;
use crate::protocol::{
    build_count_query, build_sample_query, decode_available_count, decode_slots, Centi,
    CommandFrame, Reading, ResponseFrame,
};

/// One decoded sample, with the context it was read in.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Index the sample was requested at.
    pub index: u16,
    /// Sample count the device reported in the same cycle.
    pub available: u16,
    /// Temperature and humidity.
    pub reading: Reading,
    /// All six decoded value slots.
    pub slots: [Centi; READING_SLOTS],
    /// When the response was decoded.
    pub received_at: DateTime<Utc>,
}

/// Receives the poller's output.
#[cfg_attr(test, mockall::automock)]
pub trait ReadingSink: Send + Sync {
    /// Called once per successfully decoded sample.
    fn on_sample(&self, sample: &Sample);

    /// Called with every raw response frame.
    fn on_frame(&self, _frame: &ResponseFrame) {}

    /// Called with human-readable status and failure messages.
    fn on_status(&self, _status: &str) {}
}

impl<F> ReadingSink for F
where
    F: Fn(&Sample) + Send + Sync,
{
    fn on_sample(&self, sample: &Sample) {
        self(sample)
    }
}

/// Result of a single poll cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A sample was decoded.
    Sample(Sample),
    /// The device reported no stored samples.
    Empty,
    /// The cycle failed; the loop carries on.
    Failed(Error),
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    /// Cycles started.
    pub cycles: u64,
    /// Samples decoded.
    pub samples: u64,
    /// Cycles with no stored samples.
    pub skipped: u64,
    /// Cycles that failed.
    pub failures: u64,
}

impl PollSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Sample(_) => self.samples += 1,
            CycleOutcome::Empty => self.skipped += 1,
            CycleOutcome::Failed(_) => self.failures += 1,
        }
    }
}

impl std::fmt::Display for PollSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cycles, {} samples, {} empty, {} failed",
            self.cycles, self.samples, self.skipped, self.failures
        )
    }
}

/// Timing parameters for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Wait between cycles.
    pub interval: Duration,
    /// Upper bound on each write-then-read exchange. `None` waits forever.
    pub io_timeout: Option<Duration>,
}

impl PollerConfig {
    /// Default wait between cycles (1 second).
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// Set the wait between cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound each exchange by `timeout`.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            io_timeout: None,
        }
    }
}

/// Polls a bound session for the newest sample.
pub struct Poller<D: GattDevice> {
    session: Session<D>,
    config: PollerConfig,
    signal: CancellationSignal,
    sample_tx: broadcast::Sender<Sample>,
}

impl<D: GattDevice> Poller<D> {
    /// Create a poller with the default timing.
    pub fn new(session: Session<D>, signal: CancellationSignal) -> Self {
        Self::with_config(session, PollerConfig::default(), signal)
    }

    /// Create a poller with custom timing.
    pub fn with_config(
        session: Session<D>,
        config: PollerConfig,
        signal: CancellationSignal,
    ) -> Self {
        let (sample_tx, _) = broadcast::channel(64);

        Self {
            session,
            config,
            signal,
            sample_tx,
        }
    }

    /// Get the bound session.
    pub fn session(&self) -> &Session<D> {
        &self.session
    }

    /// Get the timing parameters.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Subscribe to decoded samples.
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.sample_tx.subscribe()
    }

    /// Run one count query and, if anything is stored, one sample query.
    ///
    /// Returns `Ok(None)` when the device holds no samples. Raw frames and the
    /// available-count line go to `sink`; the decoded sample is returned, not
    /// published.
    pub async fn poll_once(&self, sink: &dyn ReadingSink) -> Result<Option<Sample>> {
        let response = self.exchange(&build_count_query()).await?;
        sink.on_frame(&response);

        let available = decode_available_count(&response)?;
        sink.on_status(&format!(
            "There are {} available data points from this device ({})",
            available,
            self.session.address()
        ));

        if available == 0 {
            debug!("No samples stored on {}", self.session.address());
            return Ok(None);
        }

        let index = available - 1;
        let response = self.exchange(&build_sample_query(index)).await?;
        sink.on_frame(&response);

        let slots = decode_slots(&response)?;

        Ok(Some(Sample {
            index,
            available,
            reading: Reading::from_slots(&slots),
            slots,
            received_at: Utc::now(),
        }))
    }

    /// Run one cycle and publish its sample, containing any failure.
    pub async fn run_cycle(&self, sink: &dyn ReadingSink) -> CycleOutcome {
        match self.poll_once(sink).await {
            Ok(Some(sample)) => {
                trace!("Sample {}: {}", sample.index, sample.reading);
                sink.on_sample(&sample);
                let _ = self.sample_tx.send(sample.clone());
                CycleOutcome::Sample(sample)
            }
            Ok(None) => CycleOutcome::Empty,
            Err(e) => {
                warn!("Poll cycle failed: {}", e);
                sink.on_status(&format!("Poll cycle failed: {}", e));
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Poll until the cancellation signal is raised, then disconnect.
    ///
    /// A cycle in flight when the signal is raised is abandoned. The
    /// disconnect is best effort; a failure is logged only.
    pub async fn run(&self, sink: &dyn ReadingSink) -> PollSummary {
        let mut summary = PollSummary::default();

        info!("Polling {} every {:?}", self.session.address(), self.config.interval);

        while !self.signal.is_cancelled() {
            let outcome = tokio::select! {
                _ = self.signal.cancelled() => break,
                outcome = self.run_cycle(sink) => outcome,
            };

            summary.record(&outcome);

            if self.signal.wait(self.config.interval).await.is_err() {
                break;
            }
        }

        info!("Polling stopped: {}", summary);

        if let Err(e) = self.session.disconnect().await {
            warn!("Failed to disconnect {}: {}", self.session.address(), e);
        }

        summary
    }

    async fn exchange(&self, command: &CommandFrame) -> Result<ResponseFrame> {
        match self.config.io_timeout {
            Some(limit) => tokio::time::timeout(limit, self.session.exchange(command))
                .await
                .map_err(|_| Error::Timeout {
                    operation: "command exchange",
                })?,
            None => self.session.exchange(command).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::fake::{FakeBeacon, FakeDevice, BEACON_ADDRESS};
    use crate::ble::resolver::Resolver;
    use crate::ble::uuids::GattProfile;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn count_response(count: u16) -> Vec<u8> {
        let [lo, hi] = count.to_le_bytes();
        vec![0x01, lo, hi, 0x00, 0x00]
    }

    fn sample_response(raw: [u16; READING_SLOTS]) -> Vec<u8> {
        let mut data = vec![0x07, 0x00, 0x00, 0x00, 0x00, 0x03];
        for value in raw {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    async fn poller(
        beacon: &FakeBeacon,
        config: PollerConfig,
        signal: CancellationSignal,
    ) -> Poller<FakeDevice> {
        let resolver = Resolver::new(beacon.transport.clone(), signal.clone());
        let session = resolver
            .build_session(BEACON_ADDRESS, &GattProfile::thermobeacon())
            .await
            .unwrap();
        Poller::with_config(session, config, signal)
    }

    /// Sink that records everything it is given.
    #[derive(Default)]
    struct RecordingSink {
        samples: Mutex<Vec<Sample>>,
        frames: Mutex<Vec<ResponseFrame>>,
        statuses: Mutex<Vec<String>>,
    }

    impl ReadingSink for RecordingSink {
        fn on_sample(&self, sample: &Sample) {
            self.samples.lock().push(sample.clone());
        }

        fn on_frame(&self, frame: &ResponseFrame) {
            self.frames.lock().push(frame.clone());
        }

        fn on_status(&self, status: &str) {
            self.statuses.lock().push(status.to_string());
        }
    }

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.io_timeout, None);
        assert_eq!(
            config.with_io_timeout(Duration::from_secs(3)).io_timeout,
            Some(Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn test_end_to_end_cycle() {
        let beacon = FakeBeacon::new();
        beacon.rx.push_response(vec![0xAA, 0x05, 0x00]);
        beacon
            .rx
            .push_response(sample_response([0x0158, 0, 0, 0x02D1, 0, 0]));

        let poller = poller(&beacon, PollerConfig::default(), CancellationSignal::new()).await;
        let sink = RecordingSink::default();

        let sample = poller.poll_once(&sink).await.unwrap().unwrap();

        assert_eq!(sample.index, 4);
        assert_eq!(sample.available, 5);
        assert_eq!(sample.reading.temperature.to_string(), "21.50");
        assert_eq!(sample.reading.humidity.to_string(), "45.06");
        assert_eq!(
            beacon.tx.writes(),
            vec![
                vec![0x01, 0x00, 0x00, 0x00, 0x00],
                vec![0x07, 0x04, 0x00, 0x00, 0x00, 0x03],
            ]
        );
        assert_eq!(sink.frames.lock().len(), 2);
        assert_eq!(
            sink.statuses.lock().as_slice(),
            &["There are 5 available data points from this device (AA:BB:CC:DD:EE:FF)".to_string()]
        );
        // poll_once does not publish.
        assert!(sink.samples.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_device_skips_sample_query() {
        let beacon = FakeBeacon::new();
        beacon.rx.push_response(count_response(0));

        let poller = poller(&beacon, PollerConfig::default(), CancellationSignal::new()).await;
        let outcome = poller.run_cycle(&RecordingSink::default()).await;

        assert!(matches!(outcome, CycleOutcome::Empty));
        assert_eq!(beacon.tx.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_short_frames_fail_the_cycle() {
        let beacon = FakeBeacon::new();
        beacon.rx.push_response(vec![0x01, 0x05]);
        beacon.rx.push_response(count_response(3));
        beacon.rx.push_response(vec![0x07; 12]);

        let poller = poller(&beacon, PollerConfig::default(), CancellationSignal::new()).await;
        let sink = RecordingSink::default();

        match poller.run_cycle(&sink).await {
            CycleOutcome::Failed(Error::FrameTooShort { expected: 3, actual: 2 }) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        match poller.run_cycle(&sink).await {
            CycleOutcome::Failed(Error::FrameTooShort { expected: 18, actual: 12 }) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(sink.samples.lock().is_empty());
        assert!(sink
            .statuses
            .lock()
            .iter()
            .any(|s| s.starts_with("Poll cycle failed")));
    }

    #[tokio::test]
    async fn test_run_cycle_publishes() {
        let beacon = FakeBeacon::new();
        beacon.rx.push_response(count_response(1));
        beacon.rx.push_response(sample_response([16, 0, 0, 800, 0, 0]));

        let poller = poller(&beacon, PollerConfig::default(), CancellationSignal::new()).await;
        let mut rx = poller.subscribe();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_sink = seen.clone();
        let sink = move |sample: &Sample| seen_by_sink.lock().push(sample.reading);

        let outcome = poller.run_cycle(&sink).await;
        assert!(matches!(outcome, CycleOutcome::Sample(_)));
        assert_eq!(beacon.tx.writes()[1], vec![0x07, 0x00, 0x00, 0x00, 0x00, 0x03]);

        let published = rx.recv().await.unwrap();
        assert_eq!(published.reading.temperature, Centi::from_hundredths(100));
        assert_eq!(published.reading.humidity, Centi::from_hundredths(5000));
        assert_eq!(seen.lock().as_slice(), &[published.reading]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_failures_until_cancelled() {
        let beacon = FakeBeacon::new();
        beacon.rx.push_error("link dropped");
        beacon.rx.push_response(count_response(0));
        beacon.rx.push_response(count_response(2));
        beacon.rx.push_response(sample_response([320, 0, 0, 640, 0, 0]));

        let signal = CancellationSignal::new();
        let poller = poller(&beacon, PollerConfig::default(), signal.clone()).await;

        let mut sink = MockReadingSink::new();
        sink.expect_on_frame().returning(|_| ());
        sink.expect_on_status().returning(|_| ());
        let trigger = signal.clone();
        sink.expect_on_sample()
            .times(1)
            .withf(|sample: &Sample| {
                sample.index == 1 && sample.reading.temperature.to_string() == "20.00"
            })
            .returning(move |_| trigger.cancel());

        let start = Instant::now();
        let summary = poller.run(&sink).await;

        assert_eq!(
            summary,
            PollSummary {
                cycles: 3,
                samples: 1,
                skipped: 1,
                failures: 1,
            }
        );
        // Two full waits; the third is cut short by the cancel.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(beacon.device.disconnect_calls(), 1);
        assert!(!beacon.device.connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_timeout() {
        let beacon = FakeBeacon::new();
        beacon.rx.hang_reads();

        let config = PollerConfig::default().with_io_timeout(Duration::from_secs(2));
        let poller = poller(&beacon, config, CancellationSignal::new()).await;

        let err = poller.poll_once(&RecordingSink::default()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_exchange() {
        let beacon = FakeBeacon::new();
        beacon.rx.hang_reads();

        let signal = CancellationSignal::new();
        let poller = poller(&beacon, PollerConfig::default(), signal.clone()).await;

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let summary = poller.run(&RecordingSink::default()).await;

        assert_eq!(summary.cycles, 0);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(beacon.device.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_run_when_already_cancelled() {
        let beacon = FakeBeacon::new();
        let signal = CancellationSignal::new();
        let poller = poller(&beacon, PollerConfig::default(), signal.clone()).await;
        signal.cancel();

        let summary = poller.run(&RecordingSink::default()).await;

        assert_eq!(summary, PollSummary::default());
        assert!(beacon.tx.writes().is_empty());
        assert!(!beacon.device.connected());
    }

    #[test]
    fn test_summary_display() {
        let mut summary = PollSummary::default();
        summary.record(&CycleOutcome::Empty);
        summary.record(&CycleOutcome::Failed(Error::Cancelled));
        assert_eq!(summary.to_string(), "2 cycles, 0 samples, 1 empty, 1 failed");
    }
}
