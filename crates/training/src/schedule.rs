use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("empty learning rate schedule")]
    Empty,
    #[error("invalid learning rate '{0}'")]
    Rate(String),
    #[error("invalid iteration '{0}'")]
    Iteration(String),
}

/// Learning rate as a function of the global iteration counter.
#[derive(Debug, Clone, PartialEq)]
pub enum LearningRateSchedule {
    Fixed(f64),
    /// The rate of the greatest key `<= iteration` applies; before the first
    /// key, the first rate does.
    Map(BTreeMap<u64, f64>),
}

impl LearningRateSchedule {
    pub fn from_map(map: BTreeMap<u64, f64>) -> Result<Self, ScheduleError> {
        if map.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if let Some(bad) = map.values().find(|lr| !lr.is_finite() || **lr <= 0.0) {
            return Err(ScheduleError::Rate(bad.to_string()));
        }
        Ok(Self::Map(map))
    }

    pub fn rate_at(&self, iteration: u64) -> f64 {
        match self {
            Self::Fixed(lr) => *lr,
            Self::Map(map) => map
                .range(..=iteration)
                .next_back()
                .or_else(|| map.iter().next())
                .map(|(_, lr)| *lr)
                .unwrap_or(0.0),
        }
    }
}

fn parse_rate(raw: &str) -> Result<f64, ScheduleError> {
    let lr: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ScheduleError::Rate(raw.trim().to_string()))?;
    if !lr.is_finite() || lr <= 0.0 {
        return Err(ScheduleError::Rate(raw.trim().to_string()));
    }
    Ok(lr)
}

/// `"1e-4"` for a fixed rate, `"0:5e-5,200:1e-5"` for a map.
impl FromStr for LearningRateSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if !s.contains(':') {
            return parse_rate(s).map(Self::Fixed);
        }
        let mut map = BTreeMap::new();
        for entry in s.split(',').filter(|e| !e.trim().is_empty()) {
            let (iter, lr) = entry
                .split_once(':')
                .ok_or_else(|| ScheduleError::Iteration(entry.trim().to_string()))?;
            let iteration: u64 = iter
                .trim()
                .parse()
                .map_err(|_| ScheduleError::Iteration(iter.trim().to_string()))?;
            map.insert(iteration, parse_rate(lr)?);
        }
        Self::from_map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_steps_down_at_keys() {
        let sched: LearningRateSchedule = "0:5e-5, 200:1e-5, 600:5e-6, 800:1e-7".parse().unwrap();
        assert_eq!(sched.rate_at(0), 5e-5);
        assert_eq!(sched.rate_at(199), 5e-5);
        assert_eq!(sched.rate_at(200), 1e-5);
        assert_eq!(sched.rate_at(799), 5e-6);
        assert_eq!(sched.rate_at(10_000), 1e-7);
    }

    #[test]
    fn before_first_key_uses_first_rate() {
        let sched: LearningRateSchedule = "100:1e-3,200:1e-4".parse().unwrap();
        assert_eq!(sched.rate_at(5), 1e-3);
    }

    #[test]
    fn fixed_rate() {
        let sched: LearningRateSchedule = "1e-4".parse().unwrap();
        assert_eq!(sched, LearningRateSchedule::Fixed(1e-4));
        assert_eq!(sched.rate_at(42), 1e-4);
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<LearningRateSchedule>(), Err(ScheduleError::Empty));
        assert_eq!(
            "x:1e-4".parse::<LearningRateSchedule>(),
            Err(ScheduleError::Iteration("x".into()))
        );
        assert_eq!(
            "0:-1".parse::<LearningRateSchedule>(),
            Err(ScheduleError::Rate("-1".into()))
        );
        assert!(LearningRateSchedule::from_map(BTreeMap::new()).is_err());
    }
}
