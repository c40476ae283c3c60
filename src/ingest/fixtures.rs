/// Test fixtures: representative JSON-stat 2.0 payloads from the CSO PxStat API.
///
/// Structurally complete but cut down to a handful of categories. They
/// mirror the envelope returned by:
///   https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset/{table}/JSON-stat/2.0/en
///
/// Response shape:
///   class, label, source, updated     — metadata (ignored)
///   id[] / size[]                     — dimension order and category counts
///   role.{time,geo,metric}[]          — dimension roles
///   dimension[id].category.index      — codes in order (array or object)
///   dimension[id].category.label      — code → label
///   value[]                           — row-major cube, last dimension fastest
///
/// Note: CSO pads missing cells with `null` rather than omitting them.

/// EPA02-style bathing water table: two local authorities, two seasons,
/// three classifications. Fingal has no Poor sites reported in 2022 (null).
#[cfg(test)]
pub(crate) fn fixture_water_quality_json() -> &'static str {
    r#"{
      "class": "dataset",
      "label": "Bathing Water Quality",
      "source": "Central Statistics Office, Ireland",
      "updated": "2024-05-15T11:00:00Z",
      "id": ["STATISTIC", "TLIST(A1)", "C03789V04537", "C03790V04538"],
      "size": [1, 2, 2, 3],
      "role": {
        "time": ["TLIST(A1)"],
        "geo": ["C03789V04537"],
        "metric": ["STATISTIC"]
      },
      "dimension": {
        "STATISTIC": {
          "label": "Statistic",
          "category": {
            "index": ["EPA02C01"],
            "label": { "EPA02C01": "Bathing Water Sites" },
            "unit": { "EPA02C01": { "label": "Number", "decimals": 0 } }
          }
        },
        "TLIST(A1)": {
          "label": "Year",
          "category": {
            "index": ["2022", "2023"],
            "label": { "2022": "2022", "2023": "2023" }
          }
        },
        "C03789V04537": {
          "label": "Local Authority",
          "category": {
            "index": ["05", "14"],
            "label": { "05": "Fingal County Council", "14": "Kerry County Council" }
          }
        },
        "C03790V04538": {
          "label": "Water Quality Classification",
          "category": {
            "index": ["1", "2", "4"],
            "label": { "1": "Excellent", "2": "Good", "4": "Poor" }
          }
        }
      },
      "value": [10, 3, null, 40, 5, 1, 11, 2, 1, 41, 4, 0]
    }"#
}

/// Census table without a time dimension. Carries a sex dimension (only
/// "Both sexes" should be kept) and a second statistic that must be
/// filtered out. The county dimension uses the object form of `index`.
#[cfg(test)]
pub(crate) fn fixture_population_json() -> &'static str {
    r#"{
      "class": "dataset",
      "label": "Population by Sex and County",
      "id": ["STATISTIC", "C03737V04485", "C03004V03625"],
      "size": [2, 3, 3],
      "role": {
        "geo": ["C03004V03625"],
        "metric": ["STATISTIC"]
      },
      "dimension": {
        "STATISTIC": {
          "label": "Statistic",
          "category": {
            "index": ["G0420C01", "G0420C02"],
            "label": { "G0420C01": "Population", "G0420C02": "Percentage change" }
          }
        },
        "C03737V04485": {
          "label": "Sex",
          "category": {
            "index": ["-", "1", "2"],
            "label": { "-": "Both sexes", "1": "Male", "2": "Female" }
          }
        },
        "C03004V03625": {
          "label": "County",
          "category": {
            "index": { "IE0": 0, "01": 1, "02": 2 },
            "label": { "IE0": "State", "01": "Carlow", "02": "Cavan" }
          }
        }
      },
      "value": [
        5149139, 61968, 81704,
        2544549, 30994, 41097,
        2604590, 30974, 40607,
        8.1, 8.8, 7.3,
        8.0, 8.9, 7.6,
        8.2, 8.7, 7.0
      ]
    }"#
}

/// EAA20-style emissions table: national only (no geo role), two
/// pollutants, two years, and a sector dimension whose total category
/// must be selected.
#[cfg(test)]
pub(crate) fn fixture_emissions_json() -> &'static str {
    r#"{
      "class": "dataset",
      "label": "Air Emissions by Sector",
      "id": ["STATISTIC", "TLIST(A1)", "C02388V02888", "C02196V02652"],
      "size": [1, 2, 2, 2],
      "role": {
        "time": ["TLIST(A1)"],
        "metric": ["STATISTIC"]
      },
      "dimension": {
        "STATISTIC": {
          "label": "Air Emissions",
          "category": {
            "index": ["EAA20C01"],
            "label": { "EAA20C01": "Air Emissions" }
          }
        },
        "TLIST(A1)": {
          "label": "Year",
          "category": {
            "index": ["2021", "2022"],
            "label": { "2021": "2021", "2022": "2022" }
          }
        },
        "C02388V02888": {
          "label": "Type of Emission",
          "category": {
            "index": ["CO2", "NOX"],
            "label": { "CO2": "Carbon dioxide (CO2)", "NOX": "Nitrogen oxides (NOx)" }
          }
        },
        "C02196V02652": {
          "label": "NACE Rev 2 Economic Sector",
          "category": {
            "index": ["-", "A"],
            "label": { "-": "All NACE economic sectors", "A": "Agriculture, forestry and fishing" }
          }
        }
      },
      "value": [38000, 8000, 90, 30, 37000, 7900, 85, 29]
    }"#
}
