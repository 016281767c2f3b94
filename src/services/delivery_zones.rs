use std::collections::HashSet;

use crate::config::DeliveryConfig;

/// Pincodes the shop delivers to.
#[derive(Debug, Clone)]
pub struct DeliveryZones {
    allowed: HashSet<String>,
}

impl DeliveryZones {
    pub fn new<I, S>(pincodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: pincodes
                .into_iter()
                .map(|p| p.as_ref().trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_deliverable(&self, pincode: &str) -> bool {
        self.allowed.contains(pincode.trim())
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl From<&DeliveryConfig> for DeliveryZones {
    fn from(cfg: &DeliveryConfig) -> Self {
        Self::new(&cfg.allowed_pincodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_zone_covers_cherthala() {
        let zones = DeliveryZones::from(&DeliveryConfig::default());
        assert_eq!(zones.len(), 20);
        assert!(zones.is_deliverable("688524"));
        assert!(zones.is_deliverable(" 688582 "));
        assert!(!zones.is_deliverable("682001"));
        assert!(!zones.is_deliverable(""));
    }
}
