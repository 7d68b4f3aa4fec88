//! In-memory school catalog: static school records plus calibrated parameters.
//!
//! Records and parameters come from separate files and need not cover the same
//! ids. A school without parameters is kept in the catalog but is never
//! predicted; parameters without a record are ignored.

use crate::types::{ApplicantProfile, SchoolModelParams, SchoolRecord};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

const BUILTIN_SCHOOLS: &str = include_str!("../data/schools.toml");
const BUILTIN_PARAMS: &str = include_str!("../data/school_params.toml");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read or write catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("School id '{0}' appears more than once in the catalog.")]
    DuplicateSchool(String),
    #[error("School '{id}' has tier {tier}; tiers run from 1 to 4.")]
    InvalidTier { id: String, tier: u8 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchoolListFile {
    schools: Vec<SchoolRecord>,
}

/// Calibrated parameters keyed by school id. Ordered so files diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchoolParamTable {
    pub params: BTreeMap<String, SchoolModelParams>,
}

impl SchoolParamTable {
    pub fn get(&self, id: &str) -> Option<&SchoolModelParams> {
        self.params.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, params: SchoolModelParams) {
        self.params.insert(id.into(), params);
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub fn schools_from_toml_str(text: &str) -> Result<Vec<SchoolRecord>, CatalogError> {
    let file: SchoolListFile = toml::from_str(text)?;
    Ok(file.schools)
}

pub fn load_schools(path: &Path) -> Result<Vec<SchoolRecord>, CatalogError> {
    schools_from_toml_str(&fs::read_to_string(path)?)
}

pub fn save_schools(path: &Path, schools: &[SchoolRecord]) -> Result<(), CatalogError> {
    let file = SchoolListFile {
        schools: schools.to_vec(),
    };
    fs::write(path, toml::to_string_pretty(&file)?)?;
    Ok(())
}

impl ApplicantProfile {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    schools: Vec<SchoolRecord>,
    index: AHashMap<String, usize>,
    params: SchoolParamTable,
}

impl Catalog {
    pub fn new(schools: Vec<SchoolRecord>, params: SchoolParamTable) -> Result<Self, CatalogError> {
        let mut index = AHashMap::with_capacity(schools.len());
        for (i, school) in schools.iter().enumerate() {
            if !(1..=4).contains(&school.tier) {
                return Err(CatalogError::InvalidTier {
                    id: school.id.clone(),
                    tier: school.tier,
                });
            }
            if index.insert(school.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateSchool(school.id.clone()));
            }
        }

        for school in &schools {
            if params.get(&school.id).is_none() {
                log::warn!("No calibrated parameters for '{}'; it will be skipped.", school.id);
            }
        }
        for id in params.params.keys() {
            if !index.contains_key(id) {
                log::warn!("Parameters for unknown school '{}' are ignored.", id);
            }
        }

        Ok(Self {
            schools,
            index,
            params,
        })
    }

    pub fn load(schools_path: &Path, params_path: &Path) -> Result<Self, CatalogError> {
        let schools = load_schools(schools_path)?;
        let params = SchoolParamTable::load(params_path)?;
        log::info!(
            "Loaded {} schools and {} parameter sets.",
            schools.len(),
            params.len()
        );
        Self::new(schools, params)
    }

    /// The fictional reference catalog shipped in `data/`.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(
            schools_from_toml_str(BUILTIN_SCHOOLS)?,
            SchoolParamTable::from_toml_str(BUILTIN_PARAMS)?,
        )
    }

    /// A copy of this catalog using a different parameter table.
    pub fn with_params(&self, params: SchoolParamTable) -> Result<Self, CatalogError> {
        Self::new(self.schools.clone(), params)
    }

    pub fn schools(&self) -> &[SchoolRecord] {
        &self.schools
    }

    pub fn param_table(&self) -> &SchoolParamTable {
        &self.params
    }

    pub fn school(&self, id: &str) -> Option<&SchoolRecord> {
        self.index.get(id).map(|&i| &self.schools[i])
    }

    pub fn params(&self, id: &str) -> Option<&SchoolModelParams> {
        self.params.get(id)
    }

    /// Record and parameters together, or `None` for an unpredictable school.
    pub fn lookup(&self, id: &str) -> Option<(&SchoolRecord, &SchoolModelParams)> {
        Some((self.school(id)?, self.params(id)?))
    }

    /// Schools that have both a record and parameters, in catalog order.
    pub fn predictable(&self) -> impl Iterator<Item = (&SchoolRecord, &SchoolModelParams)> {
        self.schools
            .iter()
            .filter_map(|s| self.params.get(&s.id).map(|p| (s, p)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.schools.iter().map(|s| s.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.schools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::average_applicant;

    #[test]
    fn builtin_catalog_is_complete() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.len(), 16);
        assert_eq!(catalog.predictable().count(), 16);
        for school in catalog.schools() {
            assert!(school.interview_rate().is_some_and(|r| r > 0.0 && r < 1.0));
            let p = catalog.params(&school.id).unwrap();
            assert!(p.slope_c_interview > p.slope_c_accept);
            assert!(p.slope_c_accept > 0.0);
        }
    }

    #[test]
    fn missing_params_make_school_unpredictable() {
        let catalog = Catalog::builtin().unwrap();
        let mut table = catalog.param_table().clone();
        table.params.remove("halden-med");
        table.insert(
            "not-a-school",
            *catalog.params("westbrook-med").unwrap(),
        );
        let trimmed = catalog.with_params(table).unwrap();
        assert!(trimmed.school("halden-med").is_some());
        assert!(trimmed.lookup("halden-med").is_none());
        assert!(trimmed.lookup("not-a-school").is_none());
        assert_eq!(trimmed.predictable().count(), 15);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let catalog = Catalog::builtin().unwrap();
        let mut schools = catalog.schools().to_vec();
        schools.push(schools[0].clone());
        assert!(matches!(
            Catalog::new(schools, SchoolParamTable::default()),
            Err(CatalogError::DuplicateSchool(id)) if id == "halden-med"
        ));
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::builtin().unwrap();

        let schools_path = dir.path().join("schools.toml");
        let params_path = dir.path().join("params.toml");
        save_schools(&schools_path, catalog.schools()).unwrap();
        catalog.param_table().save(&params_path).unwrap();
        let reloaded = Catalog::load(&schools_path, &params_path).unwrap();
        assert_eq!(reloaded.schools(), catalog.schools());
        assert_eq!(reloaded.param_table(), catalog.param_table());

        let applicant_path = dir.path().join("applicant.toml");
        let applicant = average_applicant();
        applicant.save(&applicant_path).unwrap();
        assert_eq!(ApplicantProfile::load(&applicant_path).unwrap(), applicant);
    }
}
