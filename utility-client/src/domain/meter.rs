use serde::Deserialize;

/// A metering point as reported by the provider's meters listing.
///
/// Only the fields the archival pipeline needs are modelled; everything else
/// in the provider payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Meter {
    pub uid: String,
    #[serde(default)]
    pub is_activated: bool,
    #[serde(default)]
    pub is_archived: bool,
}

impl Meter {
    /// Activated and not archived.
    pub fn is_active(&self) -> bool {
        self.is_activated && !self.is_archived
    }
}

/// Envelope of `GET /meters`.
#[derive(Debug, Clone, Deserialize)]
pub struct MeterListing {
    pub meters: Vec<Meter>,
}
