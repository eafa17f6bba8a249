//! Simulated spacecraft
//!
//! Takes the place of a flatsat, engineering model or real satellite.
//! Holds the per-satellite mutable state the execution engine and the
//! telemetry beacon both touch.

mod stepper;
mod telemetry;

pub use stepper::Channel;
pub use telemetry::{BatteryAlert, BeaconMode, TelemetryBank};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use groundlink_shared::{now_ms, Event, EventLevel, FileEntry, Measurement};
use rand::Rng;
use serde_json::json;
use tokio::sync::RwLock;

/// Per-satellite mutable state, shared by handle
pub struct Satellite {
    name: String,
    start: Instant,
    safemode: AtomicBool,
    bank: RwLock<TelemetryBank>,
    files: RwLock<Vec<FileEntry>>,
}

/// What one beacon tick produced
#[derive(Debug)]
pub struct BeaconTick {
    pub metrics: Vec<Measurement>,
    pub events: Vec<Event>,
    /// Safemode halted the beacon; no further ticks will produce metrics
    pub halted: bool,
}

impl Satellite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            safemode: AtomicBool::new(false),
            bank: RwLock::new(TelemetryBank::new()),
            files: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Settable externally at any time; a running beacon observes it at
    /// its next tick
    pub fn enter_safemode(&self) {
        self.safemode.store(true, Ordering::SeqCst);
    }

    pub fn in_safemode(&self) -> bool {
        self.safemode.load(Ordering::SeqCst)
    }

    /// Arm a new beacon run: leave safemode and, in ERROR mode, depress
    /// the battery channel to its fault starting value
    pub async fn begin_beacon(&self, mode: BeaconMode) {
        self.safemode.store(false, Ordering::SeqCst);
        if mode == BeaconMode::Error {
            self.bank.write().await.force_error_entry();
        }
    }

    /// One beacon tick: step the channels and report
    pub async fn beacon_tick(&self, mode: BeaconMode) -> BeaconTick {
        if self.in_safemode() {
            let event = Event::new(&self.name, "Stopping telemetry beacon, entering safemode.")
                .event_type("Telemetry Alert")
                .level(EventLevel::Warning);
            return BeaconTick {
                metrics: Vec::new(),
                events: vec![event],
                halted: true,
            };
        }

        let mut bank = self.bank.write().await;
        bank.step_all();

        let mut events = Vec::new();
        if mode == BeaconMode::Error {
            match bank.check_alert() {
                Some(BatteryAlert::BelowThreshold(voltage)) => events.push(
                    Event::new(
                        &self.name,
                        format!("Battery level below critical threshold: {voltage:.2}"),
                    )
                    .event_type("Telemetry Alert")
                    .level(EventLevel::Error)
                    .debug(json!({
                        "subsystem": "battery",
                        "metric": "voltage",
                        "value": voltage,
                        "timestamp": now_ms(),
                    })),
                ),
                Some(BatteryAlert::BackToNominal(voltage)) => events.push(
                    Event::new(
                        &self.name,
                        format!("Battery level back to nominal: {voltage:.2}"),
                    )
                    .event_type("Telemetry Alert"),
                ),
                None => {}
            }
        }

        let mut metrics: Vec<Measurement> = bank
            .readings()
            .map(|(subsystem, metric, value)| {
                Measurement::new(&self.name, subsystem, metric, value)
            })
            .collect();
        metrics.push(Measurement::new(
            &self.name,
            "obc",
            "uptime",
            self.uptime_secs(),
        ));

        BeaconTick {
            metrics,
            events,
            halted: false,
        }
    }

    /// Grow the simulated payload image index; returns how many entries
    /// were added
    pub async fn grow_file_list(&self, show_hidden: bool) -> usize {
        let mut files = self.files.write().await;
        let mut rng = rand::thread_rng();
        let before = files.len();

        let count = rng.gen_range(2..=4);
        for i in 0..count {
            let seq = files.len() + 1;
            files.push(FileEntry {
                name: format!("Payload-Image-{seq:04}.png"),
                size: rng.gen_range(2_000_000..=3_000_000),
                timestamp: now_ms() + i * 10,
                metadata: json!({
                    "type": "image",
                    "lat": rng.gen_range(-89.0..=89.0),
                    "lng": rng.gen_range(-179.0..=179.0),
                }),
            });

            if show_hidden {
                for _ in 0..rng.gen_range(1..=2) {
                    let seq = files.len() + 1;
                    files.push(FileEntry {
                        name: format!(".thumb-{seq:04}.png"),
                        size: rng.gen_range(200..=300),
                        timestamp: now_ms() + i * 10,
                        metadata: json!({ "type": "thumbnail" }),
                    });
                }
            }
        }

        files.len() - before
    }

    pub async fn file_list(&self) -> Vec<FileEntry> {
        self.files.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nominal_tick_reports_every_channel_plus_uptime() {
        let sat = Satellite::new("Space Oddity");
        let tick = sat.beacon_tick(BeaconMode::Nominal).await;
        assert!(!tick.halted);
        assert_eq!(tick.metrics.len(), 6);
        assert!(tick.events.is_empty());
        assert!(tick
            .metrics
            .iter()
            .any(|m| m.subsystem == "obc" && m.metric == "uptime"));
    }

    #[tokio::test]
    async fn error_entry_alerts_on_the_first_tick() {
        let sat = Satellite::new("Space Oddity");
        sat.begin_beacon(BeaconMode::Error).await;

        let tick = sat.beacon_tick(BeaconMode::Error).await;
        assert_eq!(tick.events.len(), 1);
        assert!(tick.events[0].message.contains("below critical threshold"));
        assert_eq!(tick.events[0].level, EventLevel::Error);

        // The latch keeps the alert from re-firing while still low
        let next = sat.beacon_tick(BeaconMode::Error).await;
        assert!(next.events.is_empty());
    }

    #[tokio::test]
    async fn safemode_halts_with_a_single_warning() {
        let sat = Satellite::new("Space Oddity");
        sat.begin_beacon(BeaconMode::Nominal).await;
        assert!(!sat.in_safemode());

        sat.enter_safemode();
        let tick = sat.beacon_tick(BeaconMode::Nominal).await;
        assert!(tick.halted);
        assert!(tick.metrics.is_empty());
        assert_eq!(tick.events.len(), 1);
        assert_eq!(tick.events[0].level, EventLevel::Warning);
        assert!(tick.events[0].message.contains("entering safemode"));
    }

    #[tokio::test]
    async fn beacon_entry_clears_safemode() {
        let sat = Satellite::new("Space Oddity");
        sat.enter_safemode();
        sat.begin_beacon(BeaconMode::Nominal).await;
        assert!(!sat.in_safemode());
    }

    #[tokio::test]
    async fn file_list_grows_and_keeps_history() {
        let sat = Satellite::new("Space Oddity");
        let added = sat.grow_file_list(false).await;
        assert!((2..=4).contains(&added));

        let files = sat.file_list().await;
        assert_eq!(files.len(), added);
        assert_eq!(files[0].name, "Payload-Image-0001.png");

        let more = sat.grow_file_list(true).await;
        // Hidden thumbnails ride along with each image
        assert!(more > 2);
        assert_eq!(sat.file_list().await.len(), added + more);
        assert!(sat
            .file_list()
            .await
            .iter()
            .any(|f| f.name.starts_with(".thumb-")));
    }
}
