//! Strategy registry.
//!
//! Maps stable string ids to strategy instances. Adding a strategy means
//! adding an arm here; ids are part of the config surface and must not
//! change once shipped.

use crate::strategy::{ChannelBreakout, EmaCross, PairSpread, Strategy, StrategyError};

/// All registered strategy ids, in registration order.
pub fn known_ids() -> &'static [&'static str] {
    &[EmaCross::ID, ChannelBreakout::ID, PairSpread::ID]
}

/// Build a strategy by id.
pub fn build(id: &str) -> Result<Box<dyn Strategy>, StrategyError> {
    match id {
        EmaCross::ID => Ok(Box::new(EmaCross)),
        ChannelBreakout::ID => Ok(Box::new(ChannelBreakout)),
        PairSpread::ID => Ok(Box::new(PairSpread)),
        other => Err(StrategyError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_id_builds() {
        for id in known_ids() {
            let s = build(id).unwrap();
            assert_eq!(s.id(), *id);
            assert!(!s.default_grid().is_empty());
        }
    }

    #[test]
    fn unknown_id_errors() {
        assert!(matches!(
            build("nope"),
            Err(StrategyError::Unknown(ref s)) if s == "nope"
        ));
    }

    #[test]
    fn ids_are_unique() {
        let ids = known_ids();
        let mut sorted: Vec<_> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }
}
