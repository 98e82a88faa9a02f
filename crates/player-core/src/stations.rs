//! Station tuning over the flat configured list.
//!
//! Traversal follows configuration order; `grouped_by_country` is only for
//! display and does not change what next/previous land on.

use std::collections::BTreeMap;

use player_proto::protocol::RadioStation;

#[derive(Debug, Default)]
pub struct StationNavigator {
    stations: Vec<RadioStation>,
    current: Option<usize>,
}

impl StationNavigator {
    pub fn new(stations: Vec<RadioStation>) -> Self {
        Self {
            stations,
            current: None,
        }
    }

    pub fn stations(&self) -> &[RadioStation] {
        &self.stations
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&RadioStation> {
        self.current.and_then(|i| self.stations.get(i))
    }

    /// Tune `index`.  Stale indices are ignored.
    pub fn select(&mut self, index: usize) -> Option<&RadioStation> {
        let station = self.stations.get(index)?;
        self.current = Some(index);
        Some(station)
    }

    /// Untune (a file was selected instead).
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Step forward.  Returns the new index, or `None` at the last station or
    /// when nothing is tuned.
    pub fn next(&mut self) -> Option<usize> {
        let cur = self.current?;
        if cur + 1 >= self.stations.len() {
            return None;
        }
        self.current = Some(cur + 1);
        self.current
    }

    /// Step back.  Returns the new index, or `None` at the first station or
    /// when nothing is tuned.
    pub fn previous(&mut self) -> Option<usize> {
        let prev = self.current?.checked_sub(1)?;
        self.current = Some(prev);
        self.current
    }

    pub fn has_next(&self) -> bool {
        self.current
            .is_some_and(|cur| cur + 1 < self.stations.len())
    }

    pub fn has_previous(&self) -> bool {
        self.current.is_some_and(|cur| cur > 0)
    }

    /// Stations grouped by country (countries sorted), each paired with its
    /// flat index so a selection from the grouped view tunes the right row.
    pub fn grouped_by_country(&self) -> BTreeMap<&str, Vec<(usize, &RadioStation)>> {
        let mut groups: BTreeMap<&str, Vec<(usize, &RadioStation)>> = BTreeMap::new();
        for (i, station) in self.stations.iter().enumerate() {
            groups
                .entry(station.country.as_str())
                .or_default()
                .push((i, station));
        }
        groups
    }
}
