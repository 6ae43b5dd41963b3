//! Cosmetic position jitter.
//!
//! Purely visual variance applied on top of the projected position so that
//! co-located agents do not render inside each other.  It is not a precision
//! model.  [`NoJitter`] is the default and keeps placement deterministic.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use geolens_perception::transform::Vec3;
use geolens_types::AgentRecord;

/// Offset added to an agent's projected position.
pub trait Jitter: Send + Sync {
    fn offset(&self, agent: &AgentRecord) -> Vec3;
}

/// No offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn offset(&self, _agent: &AgentRecord) -> Vec3 {
        Vec3::zero()
    }
}

/// Stable per-agent offset of at most `amplitude_m` on each axis, derived
/// from a hash of the agent id.  The same id always gets the same offset,
/// so objects do not wobble between updates.
#[derive(Debug, Clone, Copy)]
pub struct HashJitter {
    pub amplitude_m: f64,
}

impl Jitter for HashJitter {
    fn offset(&self, agent: &AgentRecord) -> Vec3 {
        if self.amplitude_m <= 0.0 || !self.amplitude_m.is_finite() {
            return Vec3::zero();
        }
        let mut hasher = DefaultHasher::new();
        agent.id.hash(&mut hasher);
        let bits = hasher.finish();

        // Three 16-bit lanes mapped to [-1, 1].
        let lane = |shift: u32| ((bits >> shift) & 0xffff) as f64 / 65_535.0 * 2.0 - 1.0;
        Vec3::new(lane(0), lane(16), lane(32)).scale(self.amplitude_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolens_types::GeoPoint;

    fn agent(id: &str) -> AgentRecord {
        AgentRecord::new(id, GeoPoint::new(0.0, 0.0))
    }

    #[test]
    fn no_jitter_is_zero() {
        assert_eq!(NoJitter.offset(&agent("a")), Vec3::zero());
    }

    #[test]
    fn hash_jitter_is_bounded_and_stable() {
        let jitter = HashJitter { amplitude_m: 0.05 };
        for id in ["a", "b", "agent-42", ""] {
            let first = jitter.offset(&agent(id));
            assert_eq!(first, jitter.offset(&agent(id)));
            for axis in [first.x, first.y, first.z] {
                assert!(axis.abs() <= 0.05 + 1e-12);
            }
        }
    }

    #[test]
    fn zero_amplitude_disables_hash_jitter() {
        let jitter = HashJitter { amplitude_m: 0.0 };
        assert_eq!(jitter.offset(&agent("a")), Vec3::zero());
    }
}
