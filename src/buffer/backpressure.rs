use serde::{Deserialize, Serialize};

/// What a producer experiences when the queue is at its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the producer until the consumer frees a slot.
    #[default]
    Block,
    /// Evict the oldest queued record to admit the new one.
    #[serde(alias = "drop-oldest")]
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackpressureLevel {
    None,
    Low,
    Medium,
    High,
}

impl BackpressureLevel {
    pub fn from_fill_ratio(ratio: f64) -> Self {
        if ratio < 0.5 {
            BackpressureLevel::None
        } else if ratio < 0.8 {
            BackpressureLevel::Low
        } else if ratio < 0.95 {
            BackpressureLevel::Medium
        } else {
            BackpressureLevel::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_by_ratio() {
        assert_eq!(BackpressureLevel::from_fill_ratio(0.0), BackpressureLevel::None);
        assert_eq!(BackpressureLevel::from_fill_ratio(0.6), BackpressureLevel::Low);
        assert_eq!(BackpressureLevel::from_fill_ratio(0.9), BackpressureLevel::Medium);
        assert_eq!(BackpressureLevel::from_fill_ratio(1.0), BackpressureLevel::High);
    }

    #[test]
    fn test_policy_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: OverflowPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"drop_oldest\"").unwrap();
        assert_eq!(w.policy, OverflowPolicy::DropOldest);
        let w: Wrapper = toml::from_str("policy = \"drop-oldest\"").unwrap();
        assert_eq!(w.policy, OverflowPolicy::DropOldest);
        let w: Wrapper = toml::from_str("policy = \"block\"").unwrap();
        assert_eq!(w.policy, OverflowPolicy::Block);
        assert!(toml::from_str::<Wrapper>("policy = \"spill\"").is_err());
    }
}
