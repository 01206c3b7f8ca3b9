// src/preprocess.rs
//! Turns candidate pairs into per-location occupancy counts binned by time.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::{CandidatePair, Source};

/// One candidate pair reduced to a single location and an occupancy per side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyRecord {
    pub time1: i64,
    pub time2: i64,
    pub lat: f64,
    pub lon: f64,
    pub occupancy1: i64,
    pub occupancy2: i64,
}

/// Occupancy summed over one time interval at one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyBin {
    pub time: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
    pub occupancy1: i64,
    pub occupancy2: i64,
}

/// Which time a record is binned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSelection {
    Source(Source),
    /// Integer mean of both sources' times.
    Average,
}

impl FromStr for TimeSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(TimeSelection::Source(Source::One)),
            "2" => Ok(TimeSelection::Source(Source::Two)),
            "avg" => Ok(TimeSelection::Average),
            other => bail!("Time selection not valid: '{}', expected '1', '2' or 'avg'", other),
        }
    }
}

/// The location of `source`'s detection stands in for the pair.
pub fn spatial_grouping(pair: &CandidatePair, source: Source) -> (f64, f64) {
    let record = pair.record(source);
    (record.lat, record.lon)
}

fn utc_date(epoch_secs: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.date_naive())
        .with_context(|| format!("epoch value {} is outside the datetime range", epoch_secs))
}

/// Running occupancy for `source`: per element and calendar day, in time
/// order, cumulative boardings minus cumulative alightings. Returned in the
/// order of `pairs`. Missing counts contribute zero.
pub fn daily_cumulative(pairs: &[CandidatePair], source: Source) -> Result<Vec<i64>> {
    let mut order: Vec<(usize, i64)> = pairs
        .iter()
        .enumerate()
        .map(|(idx, pair)| (idx, pair.record(source).time.primary().epoch_seconds()))
        .collect();
    order.sort_by_key(|&(_, time)| time);

    let mut running: HashMap<(&str, NaiveDate), (i64, i64)> = HashMap::new();
    let mut occupancy = vec![0; pairs.len()];
    for (idx, time) in order {
        let record = pairs[idx].record(source);
        let sums = running
            .entry((record.element_id.as_str(), utc_date(time)?))
            .or_insert((0, 0));
        sums.0 += i64::from(record.boardings.unwrap_or(0));
        sums.1 += i64::from(record.alightings.unwrap_or(0));
        occupancy[idx] = sums.0 - sums.1;
    }
    Ok(occupancy)
}

/// Occupancy per side: the daily running occupancy when that side reports
/// boardings, otherwise 1 per detected individual.
pub fn occupancy_level(pairs: &[CandidatePair], location: Source) -> Result<Vec<OccupancyRecord>> {
    let side = |source: Source| -> Result<Vec<i64>> {
        if pairs.iter().any(|p| p.record(source).boardings.is_some()) {
            daily_cumulative(pairs, source)
        } else {
            Ok(vec![1; pairs.len()])
        }
    };
    let occupancy1 = side(Source::One)?;
    let occupancy2 = side(Source::Two)?;

    Ok(pairs
        .iter()
        .zip(occupancy1.into_iter().zip(occupancy2))
        .map(|(pair, (occupancy1, occupancy2))| {
            let (lat, lon) = spatial_grouping(pair, location);
            OccupancyRecord {
                time1: pair.record1.time.primary().epoch_seconds(),
                time2: pair.record2.time.primary().epoch_seconds(),
                lat,
                lon,
                occupancy1,
                occupancy2,
            }
        })
        .collect())
}

fn bin_order(a: &(i64, f64, f64), b: &(i64, f64, f64)) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.total_cmp(&b.1))
        .then_with(|| a.2.total_cmp(&b.2))
}

/// Sums occupancy over `interval_secs` bins aligned to the epoch, per
/// location. Bins come back ordered by time, then latitude, then longitude.
pub fn time_grouping(
    records: &[OccupancyRecord],
    interval_secs: i64,
    selection: TimeSelection,
) -> Result<Vec<OccupancyBin>> {
    if interval_secs <= 0 {
        bail!("Time grouping interval must be positive, got {}", interval_secs);
    }

    let mut keyed: Vec<((i64, f64, f64), &OccupancyRecord)> = records
        .iter()
        .map(|r| {
            let time = match selection {
                TimeSelection::Source(Source::One) => r.time1,
                TimeSelection::Source(Source::Two) => r.time2,
                TimeSelection::Average => (r.time1 + r.time2) / 2,
            };
            let bin_start = time.div_euclid(interval_secs) * interval_secs;
            ((bin_start, r.lat, r.lon), r)
        })
        .collect();
    keyed.sort_by(|a, b| bin_order(&a.0, &b.0));

    let mut bins: Vec<((i64, f64, f64), i64, i64)> = Vec::new();
    for (key, record) in keyed {
        match bins.last_mut() {
            Some((last, o1, o2)) if bin_order(last, &key) == Ordering::Equal => {
                *o1 += record.occupancy1;
                *o2 += record.occupancy2;
            }
            _ => bins.push((key, record.occupancy1, record.occupancy2)),
        }
    }

    let grouped = bins
        .into_iter()
        .map(|((bin_start, lat, lon), occupancy1, occupancy2)| {
            let time = DateTime::from_timestamp(bin_start, 0)
                .map(|dt| dt.naive_utc())
                .with_context(|| format!("bin start {} is outside the datetime range", bin_start))?;
            Ok(OccupancyBin {
                time,
                lat,
                lon,
                occupancy1,
                occupancy2,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "Time grouping: {} records -> {} bins of {}s",
        records.len(),
        grouped.len(),
        interval_secs
    );
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_OCCUPANCY_INTERVAL_SECS;
    use crate::models::Record;

    fn occupancy_record(time1: i64, time2: i64, occupancy1: i64, occupancy2: i64) -> OccupancyRecord {
        OccupancyRecord {
            time1,
            time2,
            lat: 44.44,
            lon: 55.55,
            occupancy1,
            occupancy2,
        }
    }

    fn bin_time(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_time_grouping_sums_one_interval() {
        let records = vec![
            occupancy_record(1519330080, 1519330090, 2, 3),
            occupancy_record(1519330081, 1519330030, 1, 4),
        ];
        let bins = time_grouping(
            &records,
            DEFAULT_OCCUPANCY_INTERVAL_SECS,
            TimeSelection::Source(Source::One),
        )
        .unwrap();
        assert_eq!(
            bins,
            vec![OccupancyBin {
                time: bin_time("2018-02-22 20:00:00"),
                lat: 44.44,
                lon: 55.55,
                occupancy1: 3,
                occupancy2: 7,
            }]
        );
    }

    #[test]
    fn test_time_grouping_splits_locations_and_intervals() {
        let mut far = occupancy_record(1519330080, 1519330080, 1, 1);
        far.lat = 45.0;
        let records = vec![
            occupancy_record(1519330080, 1519330080, 1, 1),
            occupancy_record(1519331000, 1519331000, 1, 1),
            far,
        ];
        let bins = time_grouping(&records, 900, TimeSelection::Source(Source::Two)).unwrap();
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].time, bin_time("2018-02-22 20:00:00"));
        assert_eq!(bins[0].lat, 44.44);
        assert_eq!(bins[1].lat, 45.0);
        assert_eq!(bins[2].time, bin_time("2018-02-22 20:15:00"));
    }

    #[test]
    fn test_average_time_selection() {
        // Mean of 20:14:50 and 20:15:20 is 20:15:05.
        let records = vec![occupancy_record(1519330490, 1519330520, 1, 1)];
        let bins = time_grouping(&records, 900, TimeSelection::Average).unwrap();
        assert_eq!(bins[0].time, bin_time("2018-02-22 20:15:00"));
    }

    #[test]
    fn test_time_selection_parsing() {
        assert_eq!("avg".parse::<TimeSelection>().unwrap(), TimeSelection::Average);
        assert_eq!("2".parse::<TimeSelection>().unwrap(), TimeSelection::Source(Source::Two));
        let err = "mean".parse::<TimeSelection>().unwrap_err();
        assert!(err.to_string().contains("Time selection not valid"));
        assert!(time_grouping(&[], 0, TimeSelection::Average).is_err());
    }

    #[test]
    fn test_daily_cumulative_per_element_and_day() {
        let apc = |id: &str, t: i64, on: u32, off: u32| {
            CandidatePair::new(
                Record::instant(id, t, 44.5, -123.5).with_counts(on, off),
                Record::instant("mac", t, 44.5, -123.5),
            )
        };
        let pairs = vec![
            apc("bus7", 1519330200, 2, 1),
            apc("bus7", 1519330100, 5, 0),
            apc("bus9", 1519330150, 3, 0),
            // Next UTC day starts a fresh count.
            apc("bus7", 1519430100, 1, 0),
        ];
        let occupancy = daily_cumulative(&pairs, Source::One).unwrap();
        assert_eq!(occupancy, vec![6, 5, 3, 1]);
    }

    #[test]
    fn test_occupancy_level_mixes_counts_and_individuals() {
        let pairs = vec![
            CandidatePair::new(
                Record::instant("bus7", 1519330100, 44.5, -123.5).with_counts(4, 1),
                Record::instant("mac1", 1519330110, 44.6, -123.6),
            ),
            CandidatePair::new(
                Record::instant("bus7", 1519330200, 44.5, -123.5).with_counts(0, 2),
                Record::instant("mac2", 1519330210, 44.6, -123.6),
            ),
        ];
        let records = occupancy_level(&pairs, Source::Two).unwrap();
        assert_eq!(records[0].occupancy1, 3);
        assert_eq!(records[1].occupancy1, 1);
        assert!(records.iter().all(|r| r.occupancy2 == 1));
        assert_eq!((records[0].lat, records[0].lon), (44.6, -123.6));
        assert_eq!(records[1].time2, 1519330210);
    }

    #[test]
    fn test_spatial_grouping() {
        let pair = CandidatePair::new(
            Record::instant("a", 0, 1.0, 2.0),
            Record::instant("b", 0, 3.0, 4.0),
        );
        assert_eq!(spatial_grouping(&pair, Source::One), (1.0, 2.0));
        assert_eq!(spatial_grouping(&pair, Source::Two), (3.0, 4.0));
    }
}
