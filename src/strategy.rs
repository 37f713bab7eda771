use std::collections::BTreeMap;

use crate::data::{stint_groups, Compound, LapRecord, LapTable};

#[derive(Debug, Clone, PartialEq)]
pub struct StintBar {
    pub driver: String,
    pub stint: u32,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
}

impl StintBar {
    pub fn length(&self) -> u32 {
        self.end_lap - self.start_lap + 1
    }

    /// Compound letter, only for bars long enough to hold it.
    pub fn label(&self) -> Option<char> {
        (self.length() > 3).then(|| self.compound.initial())
    }
}

pub fn driver_stints(laps: &[LapRecord]) -> Vec<StintBar> {
    stint_groups(laps)
        .into_iter()
        .filter_map(|g| {
            Some(StintBar {
                driver: g.driver.to_string(),
                stint: g.stint,
                compound: g.compound(),
                start_lap: g.first_lap()?,
                end_lap: g.last_lap()?,
            })
        })
        .collect()
}

/// Stint bars for the requested drivers, in the order given. Drivers with
/// no laps are left out.
pub fn strategy_chart(table: &LapTable, drivers: &[&str]) -> Vec<StintBar> {
    drivers
        .iter()
        .filter_map(|d| table.driver(d).ok())
        .flat_map(driver_stints)
        .collect()
}

// average stint length per compound over every driver. stint ids already
// mark tyre changes, so a second set of the same compound is its own stint.
pub fn average_stint_lengths(table: &LapTable) -> BTreeMap<Compound, f64> {
    let mut lengths: BTreeMap<Compound, Vec<u32>> = BTreeMap::new();
    for laps in table.driver_laps.values() {
        for bar in driver_stints(laps) {
            lengths.entry(bar.compound).or_default().push(bar.length());
        }
    }
    lengths
        .into_iter()
        .filter(|(_, l)| !l.is_empty())
        .map(|(c, l)| (c, l.iter().sum::<u32>() as f64 / l.len() as f64))
        .collect()
}
