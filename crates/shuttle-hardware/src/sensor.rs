//! Position sensors reporting meters

use parking_lot::Mutex as ParkingLotMutex;
use shuttle_core::Interrupted;

/// A sensor that reports a linear position in meters
///
/// Reads may block on the device, so both operations are cancellable.
pub trait MetricPositionSensor: Send + Sync {
    /// Current position, in meters
    fn position_meters(&self) -> Result<f64, Interrupted>;

    /// Re-zero the sensor so that it currently reads `current_position`
    fn update_offset_to_match(&self, current_position: f64) -> Result<(), Interrupted>;
}

/// Turns a raw reading into a [`MetricPositionSensor`] with a software offset
pub struct OffsetSensor<F> {
    read_raw: F,
    offset: ParkingLotMutex<f64>,
}

impl<F> OffsetSensor<F>
where
    F: Fn() -> Result<f64, Interrupted> + Send + Sync,
{
    /// Wrap a raw reading (in meters) with a zero offset
    pub fn new(read_raw: F) -> Self {
        Self {
            read_raw,
            offset: ParkingLotMutex::new(0.0),
        }
    }

    /// The offset currently added to raw readings
    pub fn offset(&self) -> f64 {
        *self.offset.lock()
    }
}

impl<F> MetricPositionSensor for OffsetSensor<F>
where
    F: Fn() -> Result<f64, Interrupted> + Send + Sync,
{
    fn position_meters(&self) -> Result<f64, Interrupted> {
        Ok((self.read_raw)()? + self.offset())
    }

    fn update_offset_to_match(&self, current_position: f64) -> Result<(), Interrupted> {
        let raw = (self.read_raw)()?;
        *self.offset.lock() = current_position - raw;
        tracing::debug!(raw, current_position, "sensor offset updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_offset_matches_reference() {
        let sensor = OffsetSensor::new(|| Ok(0.75));
        assert_eq!(sensor.position_meters(), Ok(0.75));

        sensor.update_offset_to_match(1.0).unwrap();
        assert!((sensor.offset() - 0.25).abs() < 1e-12);
        assert!((sensor.position_meters().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_interrupted_read_keeps_offset() {
        let fail = AtomicBool::new(false);
        let sensor = OffsetSensor::new(|| {
            if fail.load(Ordering::SeqCst) {
                Err(Interrupted)
            } else {
                Ok(0.5)
            }
        });
        sensor.update_offset_to_match(0.0).unwrap();

        fail.store(true, Ordering::SeqCst);
        assert_eq!(sensor.update_offset_to_match(2.0), Err(Interrupted));
        assert_eq!(sensor.position_meters(), Err(Interrupted));
        assert_eq!(sensor.offset(), -0.5);
    }
}
