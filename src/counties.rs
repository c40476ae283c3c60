/// County registry and name normalization.
///
/// Defines the canonical list of the 26 counties of the Republic of Ireland,
/// which is the common join key across all three datasets. This is the
/// single source of truth for county names: every other module refers to
/// counties through a [`CountyKey`] obtained from here.
///
/// The three sources spell regions differently ("Co. Cork", "Cork County
/// Council", "Dún Laoghaire-Rathdown", "State"), so raw labels go through a
/// [`NameNormalizer`] that folds case, punctuation, diacritics and
/// county / city designations before consulting the registry and an
/// injected [`AliasTable`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::config::ConfigError;
use crate::model::UnmatchedCountyError;

// ---------------------------------------------------------------------------
// County metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Province {
    Connacht,
    Leinster,
    Munster,
    Ulster,
}

/// Metadata for a single county.
pub struct County {
    /// Canonical English name, as used in CSO county tables.
    pub name: &'static str,
    pub province: Province,
    /// Land area in square kilometres, used for population density.
    pub area_km2: f64,
}

/// All counties of the Republic of Ireland, alphabetical.
///
/// Areas: Ordnance Survey Ireland county land areas, rounded to km².
pub static COUNTY_REGISTRY: &[County] = &[
    County { name: "Carlow", province: Province::Leinster, area_km2: 896.0 },
    County { name: "Cavan", province: Province::Ulster, area_km2: 1932.0 },
    County { name: "Clare", province: Province::Munster, area_km2: 3450.0 },
    County { name: "Cork", province: Province::Munster, area_km2: 7500.0 },
    County { name: "Donegal", province: Province::Ulster, area_km2: 4861.0 },
    County { name: "Dublin", province: Province::Leinster, area_km2: 922.0 },
    County { name: "Galway", province: Province::Connacht, area_km2: 6149.0 },
    County { name: "Kerry", province: Province::Munster, area_km2: 4807.0 },
    County { name: "Kildare", province: Province::Leinster, area_km2: 1695.0 },
    County { name: "Kilkenny", province: Province::Leinster, area_km2: 2073.0 },
    County { name: "Laois", province: Province::Leinster, area_km2: 1720.0 },
    County { name: "Leitrim", province: Province::Connacht, area_km2: 1590.0 },
    County { name: "Limerick", province: Province::Munster, area_km2: 2756.0 },
    County { name: "Longford", province: Province::Leinster, area_km2: 1091.0 },
    County { name: "Louth", province: Province::Leinster, area_km2: 826.0 },
    County { name: "Mayo", province: Province::Connacht, area_km2: 5586.0 },
    County { name: "Meath", province: Province::Leinster, area_km2: 2342.0 },
    County { name: "Monaghan", province: Province::Ulster, area_km2: 1296.0 },
    County { name: "Offaly", province: Province::Leinster, area_km2: 2001.0 },
    County { name: "Roscommon", province: Province::Connacht, area_km2: 2548.0 },
    County { name: "Sligo", province: Province::Connacht, area_km2: 1838.0 },
    County { name: "Tipperary", province: Province::Munster, area_km2: 4303.0 },
    County { name: "Waterford", province: Province::Munster, area_km2: 1857.0 },
    County { name: "Westmeath", province: Province::Leinster, area_km2: 1840.0 },
    County { name: "Wexford", province: Province::Leinster, area_km2: 2365.0 },
    County { name: "Wicklow", province: Province::Leinster, area_km2: 2025.0 },
];

/// Canonical county identifier: an index into [`COUNTY_REGISTRY`], so every
/// `CountyKey` names a real county. Orders alphabetically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountyKey(usize);

impl CountyKey {
    /// Looks up a county by its exact canonical name.
    pub fn from_canonical(name: &str) -> Option<Self> {
        COUNTY_REGISTRY.iter().position(|c| c.name == name).map(CountyKey)
    }

    /// Every registry county, in registry order.
    pub fn all() -> impl Iterator<Item = CountyKey> {
        (0..COUNTY_REGISTRY.len()).map(CountyKey)
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn info(&self) -> &'static County {
        &COUNTY_REGISTRY[self.0]
    }
}

impl fmt::Debug for CountyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountyKey({})", self.name())
    }
}

impl fmt::Display for CountyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CountyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Regions and aliases
// ---------------------------------------------------------------------------

/// What a raw region label resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// The national aggregate ("State", "Ireland").
    National,
    County(CountyKey),
}

/// Label used for the national aggregate when a dataset has no region.
pub const NATIONAL_LABEL: &str = "Ireland";

/// Administrative units that no longer exist or were split, plus the
/// national aggregate labels. Keys are in normalized form.
const BUILTIN_ALIASES: &[(&str, Option<&str>)] = &[
    // Dublin's four local authorities since 1994
    ("fingal", Some("Dublin")),
    ("south dublin", Some("Dublin")),
    ("dun laoghaire rathdown", Some("Dublin")),
    ("dun laoghaire", Some("Dublin")),
    // Tipperary ridings, merged in 2014
    ("north tipperary", Some("Tipperary")),
    ("south tipperary", Some("Tipperary")),
    ("tipperary north riding", Some("Tipperary")),
    ("tipperary south riding", Some("Tipperary")),
    ("tipperary north", Some("Tipperary")),
    ("tipperary south", Some("Tipperary")),
    // National aggregate
    ("state", None),
    ("ireland", None),
    ("republic of ireland", None),
];

/// Immutable alias table, built once and injected into the normalizer.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: HashMap<String, Region>,
}

impl AliasTable {
    /// The built-in aliases for renamed and split administrative units.
    pub fn builtin() -> Self {
        let entries = BUILTIN_ALIASES
            .iter()
            .filter_map(|(alias, target)| {
                let region = match target {
                    Some(name) => Region::County(CountyKey::from_canonical(name)?),
                    None => Region::National,
                };
                Some((alias.to_string(), region))
            })
            .collect();
        Self { entries }
    }

    /// Returns a new table with extra `alias → canonical county` entries
    /// (as read from configuration). Targets must be registry names.
    pub fn extended(&self, extra: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut entries = self.entries.clone();
        for (alias, target) in extra {
            let county = CountyKey::from_canonical(target.trim()).ok_or_else(|| {
                ConfigError::UnknownAliasTarget {
                    alias: alias.clone(),
                    target: target.clone(),
                }
            })?;
            entries.insert(normalize_label(alias), Region::County(county));
        }
        Ok(Self { entries })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, normalized: &str) -> Option<Region> {
        self.entries.get(normalized).copied()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

const PREFIXES: &[&str] = &["county ", "co "];

// Longest first so "city and county council" wins over "county council".
const SUFFIXES: &[&str] = &[
    " city and county council",
    " county council",
    " city council",
    " county",
    " city",
    " council",
];

fn fold_char(c: char) -> char {
    match c {
        'á' | 'Á' => 'a',
        'é' | 'É' => 'e',
        'í' | 'Í' => 'i',
        'ó' | 'Ó' => 'o',
        'ú' | 'Ú' => 'u',
        '-' | '.' | ',' | '(' | ')' => ' ',
        other => other,
    }
}

/// Reduces a raw label to the form used for registry and alias lookups:
/// diacritics folded, punctuation blanked, whitespace collapsed, lowercase,
/// and county / city / council designations removed.
pub fn normalize_label(raw: &str) -> String {
    let folded = raw
        .chars()
        .filter(|c| !matches!(c, '\'' | '’'))
        .map(fold_char)
        .collect::<String>()
        .to_lowercase();
    let mut label = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    for prefix in PREFIXES {
        if let Some(rest) = label.strip_prefix(prefix) {
            label = rest.to_string();
            break;
        }
    }
    for suffix in SUFFIXES {
        if let Some(rest) = label.strip_suffix(suffix) {
            if !rest.is_empty() {
                label = rest.to_string();
            }
            break;
        }
    }
    label
}

/// Resolves raw region labels to canonical regions.
///
/// Pure: the only state is the alias table handed in at construction.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    aliases: AliasTable,
    canonical: HashMap<String, CountyKey>,
}

impl NameNormalizer {
    pub fn new(aliases: AliasTable) -> Self {
        let canonical = CountyKey::all()
            .map(|key| (normalize_label(key.name()), key))
            .collect();
        Self { aliases, canonical }
    }

    /// Maps a raw label to a county or the national aggregate.
    ///
    /// # Errors
    /// [`UnmatchedCountyError`] when neither the registry nor the alias
    /// table knows the label. Callers count these as coverage gaps.
    pub fn normalize(&self, raw: &str) -> Result<Region, UnmatchedCountyError> {
        let label = normalize_label(raw);
        if let Some(key) = self.canonical.get(&label) {
            return Ok(Region::County(*key));
        }
        self.aliases.get(&label).ok_or_else(|| UnmatchedCountyError {
            raw: raw.to_string(),
        })
    }
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(AliasTable::builtin())
    }
}
