use crate::foundation::error::{FrameschedError, FrameschedResult};

/// Point in time, or a span of time, in whole milliseconds on an event loop's clock.
///
/// Time zero is the moment the loop was created.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Millis(pub u64);

impl Millis {
    /// Time zero.
    pub const ZERO: Self = Self(0);

    /// `self + rhs`, saturating at `u64::MAX`.
    pub fn saturating_add(self, rhs: Millis) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// `self - rhs`, saturating at zero.
    pub fn saturating_sub(self, rhs: Millis) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Convert to a [`std::time::Duration`].
    pub fn as_duration(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl std::fmt::Display for Millis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// 0-based index of a frame delivered by a frame ticker.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32, // must be > 0
}

impl Fps {
    /// Create a validated frame rate.
    pub fn new(num: u32, den: u32) -> FrameschedResult<Self> {
        let fps = Self { num, den };
        fps.validate()?;
        Ok(fps)
    }

    /// Check that both parts are non-zero.
    pub fn validate(self) -> FrameschedResult<()> {
        if self.den == 0 {
            return Err(FrameschedError::config("Fps den must be > 0"));
        }
        if self.num == 0 {
            return Err(FrameschedError::config("Fps num must be > 0"));
        }
        Ok(())
    }

    /// Floating-point frames per second.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Distance between frame boundaries, rounded up to whole milliseconds (at least 1ms).
    ///
    /// Callers must have validated `self`.
    pub fn frame_interval(self) -> Millis {
        let num = u64::from(self.num.max(1));
        let ms = (1000 * u64::from(self.den)).div_ceil(num);
        Millis(ms.max(1))
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 60, den: 1 }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
