//! Source credibility tiers.
//!
//! A static domain → tier table from configuration, consumed by downstream
//! ranking. Lookups normalize the domain; anything unmapped is `Standard`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SourceTier {
    Authoritative = 1,
    Verified = 2,
    Standard = 3,
    Aggregator = 4,
}

impl SourceTier {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(SourceTier::Authoritative),
            2 => Some(SourceTier::Verified),
            3 => Some(SourceTier::Standard),
            4 => Some(SourceTier::Aggregator),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceTier::Authoritative => "authoritative",
            SourceTier::Verified => "verified",
            SourceTier::Standard => "standard",
            SourceTier::Aggregator => "aggregator",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceTiers {
    mappings: HashMap<String, SourceTier>,
}

impl SourceTiers {
    /// Build from the `[tiers]` config table. Entries with tier numbers
    /// outside 1..=4 are dropped.
    pub fn from_config(raw: &HashMap<String, u8>) -> Self {
        let mappings = raw
            .iter()
            .filter_map(|(domain, &n)| {
                SourceTier::from_number(n).map(|tier| (normalize(domain), tier))
            })
            .collect();
        Self { mappings }
    }

    /// Tier for a source id; unmapped domains are `Standard`.
    pub fn tier_for(&self, source_id: &str) -> SourceTier {
        self.mappings
            .get(&normalize(source_id))
            .copied()
            .unwrap_or(SourceTier::Standard)
    }

    pub fn label_for(&self, source_id: &str) -> &'static str {
        self.tier_for(source_id).label()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> SourceTiers {
        let mut raw = HashMap::new();
        raw.insert("cna.com.tw".to_string(), 1);
        raw.insert("LTN.com.tw".to_string(), 2);
        raw.insert("junk.example".to_string(), 9); // invalid, dropped
        SourceTiers::from_config(&raw)
    }

    #[test]
    fn mapped_domains_resolve() {
        let t = tiers();
        assert_eq!(t.tier_for("cna.com.tw"), SourceTier::Authoritative);
        assert_eq!(t.tier_for("ltn.com.tw"), SourceTier::Verified);
    }

    #[test]
    fn unmapped_is_standard() {
        assert_eq!(tiers().tier_for("unknown.example"), SourceTier::Standard);
        assert_eq!(SourceTiers::default().tier_for("anything"), SourceTier::Standard);
    }

    #[test]
    fn lookup_normalizes_case_and_whitespace() {
        assert_eq!(tiers().tier_for("  CNA.com.TW "), SourceTier::Authoritative);
    }

    #[test]
    fn invalid_tier_numbers_fall_back_to_standard() {
        assert_eq!(tiers().tier_for("junk.example"), SourceTier::Standard);
    }

    #[test]
    fn labels() {
        assert_eq!(tiers().label_for("cna.com.tw"), "authoritative");
        assert_eq!(tiers().label_for("nobody.example"), "standard");
    }
}
