//! Simulated health-and-status telemetry with hysteresis alerting

use std::fmt;

use groundlink_shared::limits;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::stepper::Channel;

/// Beacon operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconMode {
    Nominal,
    Error,
}

impl BeaconMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOMINAL" => Some(BeaconMode::Nominal),
            "ERROR" => Some(BeaconMode::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BeaconMode::Nominal => "NOMINAL",
            BeaconMode::Error => "ERROR",
        }
    }
}

impl fmt::Display for BeaconMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold crossing on the designated alert channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatteryAlert {
    BelowThreshold(f64),
    BackToNominal(f64),
}

struct ChannelDef {
    subsystem: &'static str,
    metric: &'static str,
    channel: Channel,
}

/// The satellite's telemetry channels plus the battery alert latch
pub struct TelemetryBank {
    channels: Vec<ChannelDef>,
    alerted: bool,
    rng: StdRng,
}

impl TelemetryBank {
    /// The standard five-channel bank
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Seeded variant for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        let def = |subsystem, metric, channel| ChannelDef {
            subsystem,
            metric,
            channel,
        };
        Self {
            channels: vec![
                def("battery", "voltage", Channel::new(3.9, 0.01, 3.0, 4.2)),
                def("battery", "temperature", Channel::new(20.0, 0.1, 5.0, 35.0)),
                def("panels", "temperature_x", Channel::new(25.0, 0.1, 20.0, 35.0)),
                def("panels", "temperature_y", Channel::new(25.5, 0.1, 20.0, 35.0)),
                def("panels", "temperature_z", Channel::new(24.5, 0.1, 20.0, 35.0)),
            ],
            alerted: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Depress the designated alert channel to the fault starting value
    pub fn force_error_entry(&mut self) {
        self.set("battery", "voltage", limits::ERROR_MODE_START_VOLTS);
    }

    pub fn set(&mut self, subsystem: &str, metric: &str, value: f64) {
        if let Some(def) = self
            .channels
            .iter_mut()
            .find(|d| d.subsystem == subsystem && d.metric == metric)
        {
            def.channel.value = value;
        }
    }

    pub fn battery_voltage(&self) -> f64 {
        self.channels
            .iter()
            .find(|d| d.subsystem == "battery" && d.metric == "voltage")
            .map(|d| d.channel.value)
            .unwrap_or_default()
    }

    /// Step every channel one tick
    pub fn step_all(&mut self) {
        let rng = &mut self.rng;
        for def in &mut self.channels {
            def.channel.step(rng);
        }
    }

    /// Edge-triggered hysteresis check on the designated channel.
    ///
    /// Fires once on crossing at or below the alert threshold, and once on
    /// recovering at or above the (higher) recovery threshold. Nothing
    /// re-fires while the value stays on one side.
    pub fn check_alert(&mut self) -> Option<BatteryAlert> {
        let voltage = self.battery_voltage();
        if !self.alerted && voltage <= limits::BATTERY_ALERT_VOLTS {
            self.alerted = true;
            Some(BatteryAlert::BelowThreshold(voltage))
        } else if self.alerted && voltage >= limits::BATTERY_RECOVER_VOLTS {
            self.alerted = false;
            Some(BatteryAlert::BackToNominal(voltage))
        } else {
            None
        }
    }

    /// Current value of every channel
    pub fn readings(&self) -> impl Iterator<Item = (&'static str, &'static str, f64)> + '_ {
        self.channels
            .iter()
            .map(|d| (d.subsystem, d.metric, d.channel.value))
    }
}

impl Default for TelemetryBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_bank_has_five_channels() {
        let bank = TelemetryBank::with_seed(1);
        assert_eq!(bank.readings().count(), 5);
        assert!((bank.battery_voltage() - 3.9).abs() < 1e-9);
    }

    #[test]
    fn error_entry_forces_the_battery_low() {
        let mut bank = TelemetryBank::with_seed(1);
        bank.force_error_entry();
        assert!((bank.battery_voltage() - limits::ERROR_MODE_START_VOLTS).abs() < 1e-9);
    }

    #[test]
    fn hysteresis_fires_exactly_once_per_edge() {
        let mut bank = TelemetryBank::with_seed(1);
        let trace = [
            3.0, 2.8, 2.6, 2.5, 2.4, 2.3, 2.4, 2.6, 3.0, 3.1, 3.2, 3.4, 3.5,
        ];
        let mut fired = Vec::new();
        for voltage in trace {
            bank.set("battery", "voltage", voltage);
            if let Some(alert) = bank.check_alert() {
                fired.push(alert);
            }
        }
        assert_eq!(
            fired,
            vec![
                BatteryAlert::BelowThreshold(2.5),
                BatteryAlert::BackToNominal(3.2),
            ]
        );
    }

    #[test]
    fn no_alerts_while_inside_the_band() {
        let mut bank = TelemetryBank::with_seed(1);
        for voltage in [3.0, 2.9, 2.8, 3.0, 3.1, 3.0] {
            bank.set("battery", "voltage", voltage);
            assert_eq!(bank.check_alert(), None);
        }
    }
}
