use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

/// Attribute written by the `setValue` command.
pub const VALUE_ATTRIBUTE: &str = "value";

const INITIAL_TEMPERATURE: f64 = 30.0;
const INITIAL_HUMIDITY: f64 = 50.0;
const INITIAL_LIGHT: f64 = 100.0;

/// Numeric sensor readings, as published on the telemetry topic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
}

#[derive(Debug)]
struct Inner {
    sensors: TelemetrySample,
    attributes: HashMap<String, Value>,
}

/// Shared device record. All fields sit behind one mutex so a command
/// write is never observed half-applied by a telemetry read.
#[derive(Debug)]
pub struct DeviceState {
    inner: Mutex<Inner>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(TelemetrySample {
            temperature: INITIAL_TEMPERATURE,
            humidity: INITIAL_HUMIDITY,
            light: INITIAL_LIGHT,
        })
    }
}

impl DeviceState {
    pub fn new(sensors: TelemetrySample) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sensors,
                attributes: HashMap::new(),
            }),
        }
    }

    // Every write is a single assignment, so a poisoned lock still guards
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a sample, then advance the simulated sensors by one step.
    pub fn sample_and_advance(&self) -> TelemetrySample {
        let mut inner = self.lock();
        let sample = inner.sensors;
        inner.sensors.temperature += 1.0;
        inner.sensors.humidity += 1.0;
        inner.sensors.light += 1.0;
        sample
    }

    pub fn set_attribute(&self, name: &str, value: Value) {
        self.lock().attributes.insert(name.to_string(), value);
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.lock().attributes.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn starts_with_default_sensor_values() {
        let state = DeviceState::default();
        assert_eq!(
            state.sample_and_advance(),
            TelemetrySample {
                temperature: 30.0,
                humidity: 50.0,
                light: 100.0
            }
        );
        assert_eq!(state.attribute(VALUE_ATTRIBUTE), None);
    }

    #[test]
    fn sample_and_advance_returns_pre_drift_values() {
        let state = DeviceState::default();
        let first = state.sample_and_advance();
        let second = state.sample_and_advance();
        assert_eq!(first.temperature, 30.0);
        assert_eq!(second.temperature, 31.0);
        assert_eq!(second.humidity, 51.0);
        assert_eq!(second.light, 101.0);
    }

    #[test]
    fn attributes_do_not_touch_sensors() {
        let state = DeviceState::default();
        state.set_attribute(VALUE_ATTRIBUTE, json!(42));
        assert_eq!(state.attribute(VALUE_ATTRIBUTE), Some(json!(42)));
        assert_eq!(state.sample_and_advance().temperature, 30.0);
    }

    #[test]
    fn concurrent_writers_and_readers_see_whole_values() {
        let state = Arc::new(DeviceState::default());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for n in 0..250 {
                        state.set_attribute(VALUE_ATTRIBUTE, json!({ "writer": i, "n": n }));
                    }
                })
            })
            .collect();
        let reader = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    state.sample_and_advance();
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        let last = state.attribute(VALUE_ATTRIBUTE).unwrap();
        assert!(last["writer"].is_number() && last["n"].as_u64() == Some(249));
        assert_eq!(state.sample_and_advance().temperature, 1030.0);
    }
}
