/// Built-in data snapshot, served when a table has never been fetched.
///
/// Labels follow the live tables (local authority names for water quality,
/// split Dublin and Cork authorities in the 2022 census, CSO pollutant
/// labels), so the snapshot exercises the same normalization paths as live
/// data. Census counts are the published county totals; emissions and
/// bathing-water counts are representative values, not official figures.

use crate::counties::COUNTY_REGISTRY;
use crate::model::{DatasetId, RawObservation};

// ---------------------------------------------------------------------------
// Population
// ---------------------------------------------------------------------------

const STATE_LABEL: &str = "State";

// Registry order: Carlow ... Wicklow.
const CENSUS_2011: [u64; 26] = [
    54_612, 73_183, 117_196, 519_032, 161_137, 1_273_069, 250_653, 145_502, 210_312, 95_419,
    80_559, 31_798, 191_809, 39_000, 122_897, 130_638, 184_135, 60_483, 76_687, 64_065, 65_393,
    158_754, 113_795, 86_164, 145_320, 136_640,
];

const CENSUS_2016: [u64; 26] = [
    56_932, 76_176, 118_817, 542_868, 159_192, 1_347_359, 258_058, 147_707, 222_504, 99_232,
    84_697, 32_044, 194_899, 40_873, 128_884, 130_507, 195_044, 61_386, 77_961, 64_544, 65_535,
    159_553, 116_176, 88_770, 149_722, 142_425,
];

const CENSUS_2022: [u64; 26] = [
    61_968, 81_704, 127_938, 584_156, 167_084, 1_458_154, 277_737, 156_458, 247_774, 104_160,
    91_877, 35_199, 209_536, 46_751, 139_703, 137_970, 220_826, 65_288, 83_150, 70_259, 70_198,
    167_895, 127_363, 96_221, 163_919, 155_851,
];

// 2022 tables report Dublin and Cork by local authority.
const SPLIT_2022: &[(&str, &[(&str, u64)])] = &[
    (
        "Dublin",
        &[
            ("Dublin City", 592_713),
            ("Fingal", 330_506),
            ("South Dublin", 301_075),
            ("Dún Laoghaire-Rathdown", 233_860),
        ],
    ),
    ("Cork", &[("Cork City", 224_004), ("Cork County", 360_152)]),
];

fn census_rows(year: i32) -> Vec<RawObservation> {
    let counts: &[u64; 26] = match year {
        2011 => &CENSUS_2011,
        2016 => &CENSUS_2016,
        2022 => &CENSUS_2022,
        _ => return Vec::new(),
    };

    let mut rows = vec![RawObservation::new(
        DatasetId::Population,
        STATE_LABEL,
        year,
        "Population",
        counts.iter().sum::<u64>() as f64,
    )];
    for (county, &count) in COUNTY_REGISTRY.iter().zip(counts.iter()) {
        let split = SPLIT_2022
            .iter()
            .find(|(name, _)| year == 2022 && *name == county.name)
            .map(|(_, parts)| *parts);
        match split {
            Some(parts) => rows.extend(parts.iter().map(|(label, n)| {
                RawObservation::new(DatasetId::Population, *label, year, "Population", *n as f64)
            })),
            None => rows.push(RawObservation::new(
                DatasetId::Population,
                county.name,
                year,
                "Population",
                count as f64,
            )),
        }
    }
    rows
}

pub const CENSUS_YEARS: [i32; 3] = [2011, 2016, 2022];

// ---------------------------------------------------------------------------
// Emissions (kilotonnes, all sectors)
// ---------------------------------------------------------------------------

const EMISSION_YEARS: std::ops::RangeInclusive<i32> = 2009..=2023;

const EMISSIONS: &[(&str, [f64; 15])] = &[
    (
        "Carbon dioxide (CO2)",
        [
            41_800.0, 39_900.0, 38_600.0, 38_300.0, 37_900.0, 37_700.0, 39_300.0, 40_800.0,
            40_400.0, 40_200.0, 38_700.0, 35_600.0, 37_400.0, 36_900.0, 34_900.0,
        ],
    ),
    (
        "Nitrogen oxides (NOx)",
        [
            118.0, 113.0, 104.0, 101.0, 97.0, 95.0, 96.0, 97.0, 92.0, 90.0, 86.0, 78.0, 80.0,
            79.0, 76.0,
        ],
    ),
    (
        "Sulphur dioxide (SO2)",
        [
            31.0, 27.0, 25.0, 24.0, 22.0, 19.0, 17.0, 14.0, 13.0, 12.0, 11.0, 9.0, 10.0, 9.0,
            8.0,
        ],
    ),
    (
        "Particulate matter (PM2.5)",
        [
            16.2, 16.9, 15.8, 15.1, 14.7, 14.3, 14.6, 14.9, 14.1, 13.6, 13.2, 12.8, 13.1, 12.4,
            11.9,
        ],
    ),
    (
        "Particulate matter (PM10)",
        [
            30.5, 31.2, 29.7, 28.9, 28.1, 27.6, 28.0, 28.4, 27.3, 26.9, 26.1, 25.4, 25.9, 25.0,
            24.3,
        ],
    ),
];

fn emission_rows() -> Vec<RawObservation> {
    let mut rows = Vec::new();
    for (pollutant, series) in EMISSIONS {
        for (year, value) in EMISSION_YEARS.zip(series.iter()) {
            rows.push(RawObservation::new(DatasetId::Pollution, STATE_LABEL, year, *pollutant, *value));
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Bathing water quality (site counts per classification)
// ---------------------------------------------------------------------------

const WATER_YEARS: std::ops::RangeInclusive<i32> = 2021..=2024;

struct AuthoritySites {
    authority: &'static str,
    /// 2021 counts: excellent, good, sufficient, poor.
    base: [u32; 4],
    /// Sites moving from Good to Excellent each season.
    drift: u32,
}

const WATER_SITES: &[AuthoritySites] = &[
    AuthoritySites { authority: "Cavan County Council", base: [2, 1, 1, 0], drift: 0 },
    AuthoritySites { authority: "Clare County Council", base: [16, 3, 1, 0], drift: 0 },
    AuthoritySites { authority: "Cork County Council", base: [50, 7, 2, 1], drift: 1 },
    AuthoritySites { authority: "Cork City Council", base: [1, 1, 0, 0], drift: 0 },
    AuthoritySites { authority: "Donegal County Council", base: [46, 6, 2, 0], drift: 1 },
    AuthoritySites { authority: "Dublin City Council", base: [3, 2, 1, 2], drift: 0 },
    AuthoritySites { authority: "Dún Laoghaire-Rathdown County Council", base: [5, 2, 1, 0], drift: 0 },
    AuthoritySites { authority: "Fingal County Council", base: [9, 4, 1, 1], drift: 1 },
    AuthoritySites { authority: "Galway County Council", base: [20, 4, 1, 0], drift: 1 },
    AuthoritySites { authority: "Galway City Council", base: [2, 1, 1, 1], drift: 0 },
    AuthoritySites { authority: "Kerry County Council", base: [39, 5, 1, 0], drift: 1 },
    AuthoritySites { authority: "Leitrim County Council", base: [1, 1, 0, 0], drift: 0 },
    AuthoritySites { authority: "Limerick City and County Council", base: [2, 1, 0, 0], drift: 0 },
    AuthoritySites { authority: "Louth County Council", base: [4, 3, 1, 0], drift: 0 },
    AuthoritySites { authority: "Mayo County Council", base: [38, 3, 1, 0], drift: 1 },
    AuthoritySites { authority: "Meath County Council", base: [3, 2, 1, 0], drift: 0 },
    AuthoritySites { authority: "Sligo County Council", base: [7, 1, 1, 0], drift: 0 },
    AuthoritySites { authority: "Tipperary County Council", base: [2, 2, 1, 0], drift: 0 },
    AuthoritySites { authority: "Waterford City and County Council", base: [17, 3, 1, 0], drift: 1 },
    AuthoritySites { authority: "Westmeath County Council", base: [4, 1, 0, 0], drift: 0 },
    AuthoritySites { authority: "Wexford County Council", base: [18, 4, 1, 1], drift: 1 },
    AuthoritySites { authority: "Wicklow County Council", base: [6, 3, 1, 0], drift: 0 },
];

const RATINGS: [&str; 4] = ["Excellent", "Good", "Sufficient", "Poor"];

fn water_rows() -> Vec<RawObservation> {
    let mut rows = Vec::new();
    for sites in WATER_SITES {
        for (season, year) in WATER_YEARS.enumerate() {
            let moved = (sites.drift * season as u32).min(sites.base[1]);
            let counts = [sites.base[0] + moved, sites.base[1] - moved, sites.base[2], sites.base[3]];
            for (rating, count) in RATINGS.iter().zip(counts) {
                if count > 0 {
                    rows.push(RawObservation::new(
                        DatasetId::WaterQuality,
                        sites.authority,
                        year,
                        *rating,
                        count as f64,
                    ));
                }
            }
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Public access
// ---------------------------------------------------------------------------

/// Snapshot rows for one dataset. For population, `census_year` selects a
/// single census; `None` returns all of them.
pub fn rows(dataset: DatasetId, census_year: Option<i32>) -> Vec<RawObservation> {
    match dataset {
        DatasetId::Pollution => emission_rows(),
        DatasetId::WaterQuality => water_rows(),
        DatasetId::Population => match census_year {
            Some(year) => census_rows(year),
            None => CENSUS_YEARS.iter().flat_map(|&y| census_rows(y)).collect(),
        },
    }
}

/// Every snapshot row across all datasets.
pub fn all_rows() -> Vec<RawObservation> {
    DatasetId::ALL.into_iter().flat_map(|d| rows(d, None)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counties::{NameNormalizer, Region};

    #[test]
    fn test_snapshot_covers_all_datasets() {
        for dataset in DatasetId::ALL {
            assert!(!rows(dataset, None).is_empty(), "{} snapshot is empty", dataset);
        }
    }

    #[test]
    fn test_census_split_authorities_sum_to_county_total() {
        let rows = census_rows(2022);
        let dublin: f64 = rows
            .iter()
            .filter(|r| ["Dublin City", "Fingal", "South Dublin", "Dún Laoghaire-Rathdown"].contains(&r.region.as_str()))
            .map(|r| r.value)
            .sum();
        assert_eq!(dublin, 1_458_154.0);
        let cork: f64 = rows.iter().filter(|r| r.region.starts_with("Cork")).map(|r| r.value).sum();
        assert_eq!(cork, 584_156.0);
    }

    #[test]
    fn test_every_snapshot_label_resolves() {
        let normalizer = NameNormalizer::default();
        for row in all_rows() {
            assert!(
                normalizer.normalize(&row.region).is_ok(),
                "snapshot label '{}' does not resolve",
                row.region
            );
        }
    }

    #[test]
    fn test_emissions_are_national_and_complete() {
        let normalizer = NameNormalizer::default();
        let emissions = rows(DatasetId::Pollution, None);
        assert_eq!(emissions.len(), EMISSIONS.len() * 15);
        assert!(emissions.iter().all(|r| normalizer.normalize(&r.region) == Ok(Region::National)));
    }

    #[test]
    fn test_single_census_selection() {
        let census = rows(DatasetId::Population, Some(2016));
        assert!(census.iter().all(|r| r.year == 2016));
        assert_eq!(census.len(), 27, "26 counties plus the State row");
        assert!(rows(DatasetId::Population, Some(2019)).is_empty());
    }

    #[test]
    fn test_water_drift_never_goes_negative() {
        for row in water_rows() {
            assert!(row.value > 0.0);
        }
    }
}
