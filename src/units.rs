use crate::api::PhysicsUnitConverter;
use crate::error::{PhysicsError, Result};

/// Fixed-scale converter between pixel and meter units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UnitConverter {
    pixels_per_meter: f32,
    meters_per_pixel: f32,
    app_height: f32,
}

impl UnitConverter {
    pub fn new(pixels_per_meter: f32, app_height: f32) -> Result<Self> {
        if !pixels_per_meter.is_finite() || pixels_per_meter <= 0.0 {
            return Err(PhysicsError::InvalidPixelsPerMeter(pixels_per_meter));
        }
        Ok(Self {
            pixels_per_meter,
            meters_per_pixel: 1.0 / pixels_per_meter,
            app_height,
        })
    }

    pub fn pixels_per_meter(&self) -> f32 {
        self.pixels_per_meter
    }
}

impl PhysicsUnitConverter for UnitConverter {
    fn to_meters(&self, pixels: f32) -> f32 {
        pixels * self.meters_per_pixel
    }

    fn to_pixels(&self, meters: f32) -> f32 {
        meters * self.pixels_per_meter
    }

    fn app_height(&self) -> f32 {
        self.app_height
    }
}
