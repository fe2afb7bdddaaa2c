use crate::{
    Result,
    constants::{CU_LOCK_COUNT, DEFAULT_FULLCHARGED_MA, DEFAULT_NOTCHARGED_MA},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor/locker identifier.
///
/// Sensor nodes are addressed by a single byte. The same number names the
/// physical bay, so lockers `1..=16` map onto the CU controller's lock
/// nibble as `id - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u8);

impl DeviceId {
    #[must_use]
    pub const fn new(id: u8) -> Self {
        DeviceId(id)
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Zero-based lock nibble on the CU controller, if this id is a locker.
    ///
    /// # Examples
    ///
    /// ```
    /// use elocker_core::DeviceId;
    ///
    /// assert_eq!(DeviceId::new(1).lock_nibble(), Some(0));
    /// assert_eq!(DeviceId::new(16).lock_nibble(), Some(15));
    /// assert_eq!(DeviceId::new(0).lock_nibble(), None);
    /// assert_eq!(DeviceId::new(17).lock_nibble(), None);
    /// ```
    #[must_use]
    pub fn lock_nibble(&self) -> Option<u8> {
        (1..=CU_LOCK_COUNT).contains(&self.0).then(|| self.0 - 1)
    }

    /// Locker id for a zero-based bit position in a CU status mask.
    #[must_use]
    pub fn from_lock_bit(bit: u8) -> Self {
        DeviceId(bit + 1)
    }
}

impl From<u8> for DeviceId {
    fn from(id: u8) -> Self {
        DeviceId(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current boundaries used to classify a slot's charge state.
///
/// Persisted as `{"fullcharged": .., "notcharged": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Current below which a charging battery is considered full (mA).
    #[serde(rename = "fullcharged")]
    pub fullcharged_ma: f64,

    /// Current at or below which no battery is drawing (mA).
    #[serde(rename = "notcharged")]
    pub notcharged_ma: f64,
}

impl Thresholds {
    /// Create thresholds, rejecting values that are negative or not finite.
    ///
    /// Ordering is not enforced; the classifier simply falls through to
    /// `NotCharging`/`Charging` when `notcharged >= fullcharged`.
    pub fn new(fullcharged_ma: f64, notcharged_ma: f64) -> Result<Self> {
        for (name, value) in [("fullcharged", fullcharged_ma), ("notcharged", notcharged_ma)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(Self {
            fullcharged_ma,
            notcharged_ma,
        })
    }

    /// True when a sample lies strictly inside the full-charge band.
    #[must_use]
    pub fn in_full_band(&self, milliamps: u32) -> bool {
        let ma = f64::from(milliamps);
        self.notcharged_ma < ma && ma < self.fullcharged_ma
    }

    /// Classify a current reading.
    #[must_use]
    pub fn classify(&self, milliamps: u32) -> ChargeStatus {
        ChargeStatus::classify(milliamps, self)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fullcharged_ma: DEFAULT_FULLCHARGED_MA,
            notcharged_ma: DEFAULT_NOTCHARGED_MA,
        }
    }
}

impl fmt::Display for Thresholds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Full Charged: {}(mA), Not Charged: {}(mA)",
            self.fullcharged_ma, self.notcharged_ma
        )
    }
}

/// Derived charge state of a slot.
///
/// `FullyCharged` means the current has dropped into the band where
/// charging has completed, not that the current is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeStatus {
    #[serde(rename = "notcharge")]
    NotCharging,

    #[serde(rename = "fullcharged")]
    FullyCharged,

    #[serde(rename = "charging")]
    Charging,
}

impl ChargeStatus {
    /// Map a current reading to a charge state.
    ///
    /// # Examples
    ///
    /// ```
    /// use elocker_core::{ChargeStatus, Thresholds};
    ///
    /// let t = Thresholds::new(300.0, 100.0).unwrap();
    /// assert_eq!(ChargeStatus::classify(100, &t), ChargeStatus::NotCharging);
    /// assert_eq!(ChargeStatus::classify(150, &t), ChargeStatus::FullyCharged);
    /// assert_eq!(ChargeStatus::classify(300, &t), ChargeStatus::Charging);
    /// ```
    #[must_use]
    pub fn classify(milliamps: u32, thresholds: &Thresholds) -> Self {
        let ma = f64::from(milliamps);
        if ma <= thresholds.notcharged_ma {
            ChargeStatus::NotCharging
        } else if ma < thresholds.fullcharged_ma {
            ChargeStatus::FullyCharged
        } else {
            ChargeStatus::Charging
        }
    }

    /// Wire label used by the HTTP API.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::NotCharging => "notcharge",
            ChargeStatus::FullyCharged => "fullcharged",
            ChargeStatus::Charging => "charging",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
