//! Simulated spectrometer for exercising acquisition code without hardware.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Notify;
use tokio::time::Instant;

use ieapspect_core::error::{Error, Result};
use ieapspect_core::event::Event;
use ieapspect_core::spectrometer::{SessionState, Spectrometer, SpectrometerInfo, StateCell};

pub const DRIVER_NAME: &str = "Dummy";
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);
pub const DEFAULT_CHANNELS: u32 = 1024;

/// Emits one event per period, on a fixed tick grid.
///
/// Pulse heights follow a two-peak spectrum: a fifth of the events form a
/// narrow peak near the bottom of the range, the rest a wider peak at mid
/// range.
pub struct DummySpectrometer {
    info: SpectrometerInfo,
    state: StateCell,
    period: Duration,
    next_tick: tokio::sync::Mutex<Instant>,
    rng: Mutex<StdRng>,
    closed: Notify,
}

impl DummySpectrometer {
    pub fn new(period: Duration, channels: u32) -> Self {
        Self {
            info: SpectrometerInfo {
                driver: DRIVER_NAME,
                channels,
                fw_version: "1.0".to_string(),
                serial_number: None,
            },
            state: StateCell::new(SessionState::Running),
            period,
            next_tick: tokio::sync::Mutex::new(Instant::now() + period),
            rng: Mutex::new(StdRng::from_entropy()),
            closed: Notify::new(),
        }
    }

    /// Make the generated values reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn draw(&self) -> Result<u32> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Protocol("value generator poisoned".into()))?;
        Ok(sample_value(&mut *rng, self.info.channels))
    }
}

impl Default for DummySpectrometer {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, DEFAULT_CHANNELS)
    }
}

/// Normal deviate by the Box-Muller transform.
fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let u1 = 1.0 - rng.r#gen::<f64>();
    let u2 = rng.r#gen::<f64>();
    mean + sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// One pulse height in `1..=channels`.
fn sample_value<R: Rng + ?Sized>(rng: &mut R, channels: u32) -> u32 {
    loop {
        let x = if rng.r#gen::<f64>() < 0.2 {
            gauss(rng, 0.05, 0.025)
        } else {
            gauss(rng, 0.5, 0.075)
        };
        let value = (x * f64::from(channels)) as i64;
        if value > 0 && value <= i64::from(channels) {
            return value as u32;
        }
    }
}

#[async_trait]
impl Spectrometer for DummySpectrometer {
    fn info(&self) -> &SpectrometerInfo {
        &self.info
    }

    fn state(&self) -> SessionState {
        self.state.get()
    }

    async fn start(&self) -> Result<()> {
        self.state.ensure_running()
    }

    async fn end(&self) -> Result<()> {
        self.state.ensure_running()
    }

    async fn next_event(&self) -> Result<Event> {
        self.state.ensure_running()?;
        let mut tick = self.next_tick.lock().await;
        tokio::select! {
            _ = tokio::time::sleep_until(*tick) => {}
            _ = self.closed.notified() => return Err(Error::NotConnected),
        }
        *tick += self.period;
        Ok(Event::new(self.draw()?))
    }

    async fn close(&self) -> Result<()> {
        self.state.close();
        self.closed.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn values_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let v = sample_value(&mut rng, 64);
            assert!((1..=64).contains(&v), "value {v} out of range");
        }
    }

    #[test]
    fn spectrum_has_two_peaks() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 5000;
        let low = (0..n)
            .filter(|_| sample_value(&mut rng, 4096) < 4096 / 5)
            .count();
        // About a fifth of the events belong to the low peak.
        assert!(low > n * 15 / 100 && low < n * 25 / 100, "low peak holds {low} of {n}");
    }

    #[tokio::test(start_paused = true)]
    async fn events_follow_the_tick_grid() {
        let start = Instant::now();
        let spect = DummySpectrometer::new(Duration::from_millis(250), 1024).with_seed(1);

        let ev = spect.next_event().await.unwrap();
        assert!(ev.value >= 1 && ev.value <= 1024);
        assert_eq!(start.elapsed(), Duration::from_millis(250));

        // A slow consumer does not push the grid back.
        tokio::time::sleep(Duration::from_millis(100)).await;
        spect.next_event().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn info_and_properties() {
        let spect = DummySpectrometer::default();
        assert_eq!(spect.info().fw_version, "1.0");
        assert_eq!(spect.info().channels, 1024);
        assert_eq!(spect.period(), Duration::from_secs(1));
        assert!(spect.properties().is_empty());
        assert!(matches!(spect.get_prop(1).await, Err(Error::Unsupported(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn close_wakes_pending_wait() {
        let spect = Arc::new(DummySpectrometer::new(Duration::from_secs(60), 16));
        let waiter = {
            let spect = Arc::clone(&spect);
            tokio::spawn(async move { spect.next_event().await })
        };
        tokio::task::yield_now().await;
        spect.close().await.unwrap();

        assert!(matches!(waiter.await.unwrap(), Err(Error::NotConnected)));
        assert_eq!(spect.state(), SessionState::Closed);
        assert!(matches!(spect.start().await, Err(Error::NotConnected)));
    }
}
