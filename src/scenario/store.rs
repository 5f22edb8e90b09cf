//! Scenario Store (C2): loads, indexes, and serves the versioned scenario
//! library. Bundles are cached by `(domain, version)`; invalidation happens
//! only on process restart, per the platform's concurrency contract.

use super::types::{EvaluationScenario, ScenarioBundle, Severity};
use crate::error::{Error, Result};
use crate::normaliser::NormalisedOutput;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct ScenarioStore {
    base_dir: std::path::PathBuf,
    cache: Mutex<HashMap<(String, String), Arc<ScenarioBundle>>>,
}

impl ScenarioStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load (or return the cached copy of) the scenario bundle for
    /// `(domain, version)`. Bundle files are discovered by glob under
    /// `base_dir/<domain>/<version>/*.json` and merged into one bundle.
    pub fn load(&self, domain: &str, version: &str) -> Result<Arc<ScenarioBundle>> {
        let key = (domain.to_string(), version.to_string());
        if let Some(bundle) = self.cache.lock().unwrap().get(&key) {
            return Ok(bundle.clone());
        }

        let pattern = self
            .base_dir
            .join(domain)
            .join(version)
            .join("*.json")
            .to_string_lossy()
            .into_owned();

        let mut scenarios = Vec::new();
        for entry in glob::glob(&pattern).map_err(|e| Error::input(e.to_string()))? {
            let path = entry.map_err(|e| Error::input(e.to_string()))?;
            scenarios.extend(Self::load_file(&path)?);
        }

        let bundle = Arc::new(Self::validate(ScenarioBundle {
            domain: domain.to_string(),
            version: version.to_string(),
            scenarios,
        })?);

        self.cache.lock().unwrap().insert(key, bundle.clone());
        Ok(bundle)
    }

    /// Insert an already-constructed bundle directly into the cache, useful
    /// for tests and for callers that assemble scenarios in memory rather
    /// than from files on disk.
    pub fn load_in_memory(&self, bundle: ScenarioBundle) -> Result<Arc<ScenarioBundle>> {
        let key = (bundle.domain.clone(), bundle.version.clone());
        let bundle = Arc::new(Self::validate(bundle)?);
        self.cache.lock().unwrap().insert(key, bundle.clone());
        Ok(bundle)
    }

    fn load_file(path: &Path) -> Result<Vec<EvaluationScenario>> {
        let text = std::fs::read_to_string(path)?;
        let scenarios: Vec<EvaluationScenario> = serde_json::from_str(&text)?;
        Ok(scenarios)
    }

    fn validate(bundle: ScenarioBundle) -> Result<ScenarioBundle> {
        let mut seen = std::collections::HashSet::new();
        for s in &bundle.scenarios {
            if !seen.insert(s.id.clone()) {
                return Err(Error::input(format!("duplicate scenario id: {}", s.id)));
            }
            if s.name.trim().is_empty() || s.expected_behaviour.trim().is_empty() {
                return Err(Error::input(format!(
                    "scenario {} has an empty name or expected_behaviour",
                    s.id
                )));
            }
        }
        Ok(bundle)
    }

    pub fn get<'a>(bundle: &'a ScenarioBundle, id: &str) -> Option<&'a EvaluationScenario> {
        bundle.scenarios.iter().find(|s| s.id == id)
    }

    pub fn filter<'a>(
        bundle: &'a ScenarioBundle,
        categories: Option<&[String]>,
        severities: Option<&[Severity]>,
        ids: Option<&[String]>,
    ) -> Vec<&'a EvaluationScenario> {
        bundle
            .scenarios
            .iter()
            .filter(|s| categories.map_or(true, |c| c.contains(&s.category)))
            .filter(|s| severities.map_or(true, |sv| sv.contains(&s.severity)))
            .filter(|s| ids.map_or(true, |i| i.contains(&s.id)))
            .collect()
    }

    /// Scenarios whose id matches an output's `scenario_affinity` tag.
    pub fn targeted<'a>(
        bundle: &'a ScenarioBundle,
        outputs: &[NormalisedOutput],
    ) -> Vec<&'a EvaluationScenario> {
        let affinities: std::collections::HashSet<&str> = outputs
            .iter()
            .filter_map(|o| o.scenario_affinity.as_deref())
            .collect();
        bundle
            .scenarios
            .iter()
            .filter(|s| affinities.contains(s.id.as_str()))
            .collect()
    }
}
